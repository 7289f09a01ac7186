use std::sync::atomic::Ordering;

use crate::session::Session;

/// Marks a session as running for the lifetime of one inference call.
///
/// Acquiring flips `running` from false to true; dropping stores false on
/// every exit path (return, early break, panic unwind). A second concurrent
/// acquire on the same session fails instead of stealing the flag.
pub struct LifetimeGuard<'a> {
    session: &'a Session,
}

impl<'a> LifetimeGuard<'a> {
    pub fn acquire(session: &'a Session) -> Option<Self> {
        session
            .running_flag()
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { session })
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }
}

impl Drop for LifetimeGuard<'_> {
    fn drop(&mut self) {
        self.session.running_flag().store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scripted_session;
    use sr_engine::scripted::{Script, ScriptedBackend};

    #[test]
    fn test_running_bracketed_by_guard() {
        let backend = ScriptedBackend::new(Script::emitting(""));
        let s = scripted_session(&backend);
        {
            let _guard = LifetimeGuard::acquire(&s).unwrap();
            assert!(s.is_running());
        }
        assert!(!s.is_running());
    }

    #[test]
    fn test_second_acquire_refused() {
        let backend = ScriptedBackend::new(Script::emitting(""));
        let s = scripted_session(&backend);
        let first = LifetimeGuard::acquire(&s).unwrap();
        assert!(LifetimeGuard::acquire(&s).is_none());
        assert!(s.is_running());
        drop(first);
        assert!(LifetimeGuard::acquire(&s).is_some());
    }

    #[test]
    fn test_cleared_on_early_return() {
        fn bail(s: &Session) -> Result<(), &'static str> {
            let _guard = LifetimeGuard::acquire(s).ok_or("busy")?;
            Err("bailed")
        }
        let backend = ScriptedBackend::new(Script::emitting(""));
        let s = scripted_session(&backend);
        assert!(bail(&s).is_err());
        assert!(!s.is_running());
    }

    #[test]
    fn test_cleared_on_panic() {
        let backend = ScriptedBackend::new(Script::emitting(""));
        let s = scripted_session(&backend);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = LifetimeGuard::acquire(&s).unwrap();
            panic!("fault inside inference");
        }));
        assert!(result.is_err());
        assert!(!s.is_running());
    }
}
