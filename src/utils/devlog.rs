//! Developer trace events with a thread-local capture sink, so tests can
//! assert on internal decisions without racing on the global logger.

use std::cell::RefCell;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Stops capturing on drop.
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Start capturing trace events on the current thread.
pub fn capture() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

#[doc(hidden)]
pub fn record(event: &str) {
    CAPTURE.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(event.to_owned());
        }
    });
}

/// Take everything captured so far on this thread.
pub fn take() -> Vec<String> {
    CAPTURE.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Emit a developer trace event: captured when enabled on this thread and
/// logged at TRACE under `searchrepo::devtrace`.
#[macro_export]
macro_rules! devtrace {
    ($($arg:tt)*) => {{
        let __event = format!($($arg)*);
        $crate::utils::devlog::record(&__event);
        log::trace!(target: $crate::utils::logger::DEVTRACE_TARGET, "{}", __event);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_only_while_guard_lives() {
        {
            let _g = capture();
            crate::devtrace!("evict {}", 3);
            let events = take();
            assert_eq!(events, vec!["evict 3".to_string()]);
            assert!(take().is_empty());
        }
        crate::devtrace!("after");
        assert!(take().is_empty());
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _g = capture();
        let child = std::thread::spawn(|| {
            crate::devtrace!("child");
            take()
        })
        .join()
        .unwrap();
        assert!(child.is_empty());
    }
}
