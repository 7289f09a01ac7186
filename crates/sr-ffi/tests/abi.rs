use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use sr_engine::scripted::{Script, ScriptedBackend};
use sr_ffi::*;

const REPLY: &str = r#"{"intent":"ok","n":1}"#;

fn setup() {
    install_backend(Arc::new(ScriptedBackend::new(Script::emitting(&format!(
        "{} trailing",
        REPLY
    )))));
}

fn take(ptr: *mut c_char) -> String {
    assert!(!ptr.is_null());
    let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
    unsafe { sr_free_string(ptr) };
    s
}

fn last_error() -> Option<String> {
    let ptr = sr_last_error();
    if ptr.is_null() {
        None
    } else {
        Some(take(ptr))
    }
}

fn load(n_ctx: i32) -> u64 {
    let path = CString::new("model.gguf").unwrap();
    unsafe { sr_load(path.as_ptr(), n_ctx, 2) }
}

fn infer(handle: u64, prompt: &str) -> String {
    let prompt = CString::new(prompt).unwrap();
    take(unsafe { sr_run_inference(handle, prompt.as_ptr(), 64, 0.0, 1.0, 10_000) })
}

#[test]
fn test_load_infer_unload() {
    setup();
    let h = load(128);
    assert_ne!(h, SR_NULL_HANDLE);

    let out = infer(h, "extract slots");
    assert!(out.starts_with(&format!("{}|", REPLY.len())), "{}", out);
    assert!(out.ends_with(&format!("|{}", REPLY)), "{}", out);

    sr_unload(h);
    assert!(infer(h, "again").starts_with("ERR|STALE_HANDLE|"));
    sr_unload(h);
}

#[test]
fn test_null_and_unknown_handles() {
    setup();
    assert!(infer(0, "p").starts_with("ERR|NULL_HANDLE|"));
    assert!(infer(0xdead_beef_0000_0001, "p").starts_with("ERR|STALE_HANDLE|"));
    sr_cancel_inference(0);
    sr_cancel_inference(42);
    sr_unload(0);
    sr_unload(42);
}

#[test]
fn test_null_prompt() {
    setup();
    let h = load(64);
    let out = take(unsafe { sr_run_inference(h, std::ptr::null(), 8, 0.0, 1.0, 1000) });
    assert_eq!(out, "ERR|NULL_PROMPT|null prompt");
    sr_unload(h);
}

#[test]
fn test_invalid_utf8_prompt() {
    setup();
    let h = load(64);
    let prompt = CString::new(vec![0xc3u8, 0x28]).unwrap();
    let out = take(unsafe { sr_run_inference(h, prompt.as_ptr(), 8, 0.0, 1.0, 1000) });
    assert!(out.starts_with("ERR|INVALID_PROMPT|"), "{}", out);
    sr_unload(h);
}

#[test]
fn test_prompt_overflow() {
    setup();
    let h = load(4);
    assert!(infer(h, "far too long").starts_with("ERR|CTX_OVERFLOW|"));
    sr_unload(h);
}

#[test]
fn test_failed_loads_report_reason() {
    setup();
    assert_eq!(unsafe { sr_load(std::ptr::null(), 64, 1) }, SR_NULL_HANDLE);
    assert_eq!(last_error().as_deref(), Some("null model path"));

    assert_eq!(load(0), SR_NULL_HANDLE);
    assert!(last_error().unwrap().contains("context size"));

    let path = CString::new("model.gguf").unwrap();
    assert_eq!(unsafe { sr_load(path.as_ptr(), 64, -2) }, SR_NULL_HANDLE);
    assert!(last_error().unwrap().contains("thread count"));

    assert!(last_error().is_none());
}

#[test]
fn test_handles_are_not_reused() {
    setup();
    let a = load(32);
    sr_unload(a);
    let b = load(32);
    assert_ne!(a, b);
    assert!(b > a);
    sr_unload(b);
}

#[test]
fn test_init_rejects_bad_config() {
    let bad = CString::new("{\"unload\": 12}").unwrap();
    assert_eq!(unsafe { sr_init(bad.as_ptr()) }, SRStatus::ErrorConfig);
    assert!(last_error().unwrap().contains("invalid config"));

    let zero_poll = CString::new(r#"{"unload":{"poll_ms":0}}"#).unwrap();
    assert_eq!(unsafe { sr_init(zero_poll.as_ptr()) }, SRStatus::ErrorConfig);
}
