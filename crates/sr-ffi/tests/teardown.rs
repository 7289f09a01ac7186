//! Unload racing an in-flight call across the C ABI. Kept in its own test
//! binary so the process-wide runtime uses this file's backend and config.

use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sr_engine::scripted::{Script, ScriptedBackend};
use sr_ffi::*;

#[test]
fn test_unload_during_held_step_leaks_instead_of_freeing() {
    let config = CString::new(r#"{"unload":{"wait_ms":30,"poll_ms":5}}"#).unwrap();
    assert_eq!(unsafe { sr_init(config.as_ptr()) }, SRStatus::Ok);
    // Same config again is a no-op; a different one is refused.
    assert_eq!(unsafe { sr_init(config.as_ptr()) }, SRStatus::Ok);
    let other = CString::new(r#"{"unload":{"wait_ms":500}}"#).unwrap();
    assert_eq!(
        unsafe { sr_init(other.as_ptr()) },
        SRStatus::ErrorAlreadyInitialised
    );

    let entered = Arc::new(AtomicBool::new(false));
    let released = Arc::new(AtomicBool::new(false));
    let hook = {
        let entered = Arc::clone(&entered);
        let released = Arc::clone(&released);
        Arc::new(move |index: usize| {
            if index == 1 {
                entered.store(true, Ordering::SeqCst);
                while !released.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };
    let backend = ScriptedBackend::new(Script::emitting("abcdef").on_decode(hook));
    let stats = backend.stats();
    install_backend(Arc::new(backend));

    let path = CString::new("model.gguf").unwrap();
    let h = unsafe { sr_load(path.as_ptr(), 64, 1) };
    assert_ne!(h, SR_NULL_HANDLE);

    let worker = thread::spawn(move || {
        let prompt = CString::new("p").unwrap();
        let ptr = unsafe { sr_run_inference(h, prompt.as_ptr(), 32, 0.0, 1.0, 60_000) };
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { sr_free_string(ptr) };
        s
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    while !entered.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(1));
    }

    sr_unload(h);
    assert_eq!(stats.live_models(), 1);
    assert_eq!(stats.contexts_freed(), 0);

    released.store(true, Ordering::SeqCst);
    let out = worker.join().unwrap();
    assert!(out.starts_with("1|"), "{}", out);
    assert!(out.ends_with("|a"), "{}", out);
    assert_eq!(stats.live_models(), 1);
}
