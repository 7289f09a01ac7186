mod common;

use std::sync::Arc;
use std::thread;

use common::{load, request, runtime, runtime_with, Gate};
use sr_engine::scripted::Script;
use sr_runtime::{InferenceError, RuntimeConfig, StopReason, TeardownPolicy, UnloadOutcome};

fn short_wait(policy: TeardownPolicy) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.unload.wait_ms = 40;
    config.unload.poll_ms = 5;
    config.unload.on_timeout = policy;
    config
}

#[test]
fn test_unload_leaks_when_step_outlasts_wait() {
    let gate = Gate::at(1);
    let (rt, stats) = runtime_with(
        gate.install(Script::emitting("abcdef")),
        short_wait(TeardownPolicy::Leak),
    );
    let h = load(&rt);

    let worker = {
        let rt = Arc::clone(&rt);
        thread::spawn(move || rt.run_inference(h, "p", &request(32)))
    };
    gate.wait_entered();

    assert_eq!(rt.unload(h), UnloadOutcome::Leaked);
    assert_eq!(stats.live_models(), 1);
    assert_eq!(stats.contexts_freed(), 0);
    assert!(matches!(
        rt.run_inference(h, "p", &request(4)),
        Err(InferenceError::StaleHandle(_))
    ));

    gate.release();
    let g = worker.join().unwrap().unwrap();
    assert_eq!(g.stop, StopReason::Cancelled);
    assert_eq!(g.text, "a");

    // The in-flight call held the last reference; it is gone and the native
    // resources were still not released.
    assert_eq!(stats.live_models(), 1);
    assert_eq!(stats.contexts_freed(), 0);
}

#[test]
fn test_unload_defers_release_to_last_reference() {
    let gate = Gate::at(2);
    let (rt, stats) = runtime_with(
        gate.install(Script::emitting("abcdef")),
        short_wait(TeardownPolicy::ReleaseOnLastReference),
    );
    let h = load(&rt);

    let worker = {
        let rt = Arc::clone(&rt);
        thread::spawn(move || rt.run_inference(h, "p", &request(32)))
    };
    gate.wait_entered();

    assert_eq!(rt.unload(h), UnloadOutcome::Deferred);
    assert_eq!(stats.live_models(), 1);

    gate.release();
    let g = worker.join().unwrap().unwrap();
    assert_eq!(g.text, "ab");
    assert_eq!(stats.live_models(), 0);
    assert_eq!(stats.contexts_freed(), 1);
}

#[test]
fn test_unload_waits_for_short_step_then_frees() {
    let gate = Gate::at(1);
    let (rt, stats) = runtime(gate.install(Script::emitting("").then_repeat(b'x')));
    let h = load(&rt);

    let worker = {
        let rt = Arc::clone(&rt);
        thread::spawn(move || rt.run_inference(h, "p", &request(200)))
    };
    gate.wait_entered();

    let releaser = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(30));
            gate.release();
        })
    };

    assert_eq!(rt.unload(h), UnloadOutcome::Freed);
    assert_eq!(stats.live_models(), 0);
    releaser.join().unwrap();

    let g = worker.join().unwrap().unwrap();
    assert_eq!(g.stop, StopReason::Cancelled);
    assert_eq!(g.tokens, 1);
}

#[test]
fn test_second_call_on_busy_handle_rejected() {
    let gate = Gate::at(1);
    let (rt, _) = runtime(gate.install(Script::emitting("abc")));
    let h = load(&rt);

    let worker = {
        let rt = Arc::clone(&rt);
        thread::spawn(move || rt.run_inference(h, "p", &request(8)))
    };
    gate.wait_entered();

    match rt.run_inference(h, "p", &request(8)) {
        Err(e @ InferenceError::Busy(_)) => assert_eq!(e.kind().as_str(), "BUSY"),
        other => panic!("expected BUSY, got {:?}", other),
    }

    gate.release();
    let g = worker.join().unwrap().unwrap();
    assert_eq!(g.text, "abc");
    assert_eq!(g.stop, StopReason::Eos);

    // The rejected call did not disturb the running flag.
    assert_eq!(rt.run_inference(h, "p", &request(8)).unwrap().text, "abc");
}

#[test]
fn test_sessions_are_independent() {
    let (rt, stats) = runtime(Script::emitting("hey"));
    let a = load(&rt);
    let b = load(&rt);
    assert_ne!(a, b);

    rt.unload(a);
    assert_eq!(rt.run_inference(b, "p", &request(8)).unwrap().text, "hey");
    assert_eq!(stats.live_models(), 1);
    rt.unload(b);
    assert_eq!(stats.live_models(), 0);
}

#[test]
fn test_concurrent_calls_cancels_and_unloads() {
    let (rt, stats) = runtime(
        Script::emitting("")
            .then_repeat(b'y')
            .with_step_delay(std::time::Duration::from_millis(1)),
    );
    let handles: Vec<_> = (0..4).map(|_| load(&rt)).collect();

    let mut workers = Vec::new();
    for &h in &handles {
        for _ in 0..2 {
            let rt = Arc::clone(&rt);
            workers.push(thread::spawn(move || {
                for _ in 0..5 {
                    match rt.run_inference(h, "p", &request(20)) {
                        Ok(g) => assert!(g.tokens <= 20),
                        Err(e) => assert!(matches!(
                            e,
                            InferenceError::Busy(_)
                                | InferenceError::StaleHandle(_)
                                | InferenceError::Poisoned
                                | InferenceError::PoisonedDuringSetup
                                | InferenceError::NullContext
                        )),
                    }
                }
            }));
        }
    }
    for &h in &handles {
        let rt = Arc::clone(&rt);
        workers.push(thread::spawn(move || {
            rt.cancel(h);
            thread::sleep(std::time::Duration::from_millis(5));
            rt.unload(h);
        }));
    }
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(rt.live_sessions(), 0);
    assert_eq!(stats.live_models(), 0);
}
