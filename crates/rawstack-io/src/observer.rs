//! Decode options and the callbacks a presentation layer can inject.
//!
//! The decoder never talks to a UI directly. Status text, progress,
//! cancellation, validation diagnostics and calibration conflicts all go
//! through [`DecodeObserver`], whose methods default to no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::calibration::CalibrationConflict;
use crate::error::ValidationError;

/// Default read-ahead of the gzip inflate adapter.
pub const DEFAULT_INFLATE_BUFFER: usize = 50_000;
/// Header offsets below this pass validation without a length check.
pub const DEFAULT_VALIDATION_THRESHOLD: i64 = 1000;

/// HTTP proxy used by the built-in URL opener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy host name.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxySettings {
    /// Proxy on `host` with the default port 8080.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 8080,
        }
    }
}

/// Options for one decode call. Read-only while decoding.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Suppress status and progress callbacks (logged at debug level only).
    pub silent: bool,
    /// Surface calibration conflicts to the observer.
    pub report_conflicts: bool,
    /// Read-ahead of the gzip inflate adapter, in bytes.
    pub inflate_buffer_size: usize,
    /// Header offsets below this skip the file-length check.
    pub validation_threshold: i64,
    /// Proxy for `http://` sources.
    pub proxy: Option<ProxySettings>,
    /// Upper bound on frame bytes held by one stack decode, counted as
    /// uncompressed frame size.
    ///
    /// A frame that would cross it stops the stack as out of memory.
    /// `None` leaves only the allocator to refuse.
    pub memory_limit: Option<u64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            silent: false,
            report_conflicts: true,
            inflate_buffer_size: DEFAULT_INFLATE_BUFFER,
            validation_threshold: DEFAULT_VALIDATION_THRESHOLD,
            proxy: None,
            memory_limit: None,
        }
    }
}

/// Callbacks into the presentation layer.
pub trait DecodeObserver: Send + Sync {
    /// Short status line, e.g. `Reading: 3/40`.
    fn show_status(&self, _message: &str) {}

    /// Progress after a completed frame.
    fn show_progress(&self, _done: u32, _total: u32) {}

    /// Polled once per frame boundary; `true` stops the stack decode.
    fn cancel_requested(&self) -> bool {
        false
    }

    /// The descriptor was rejected before reading.
    fn validation_failed(&self, _error: &ValidationError) {}

    /// The image calibration disagrees with the global calibration.
    fn calibration_conflict(&self, _conflict: &CalibrationConflict) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl DecodeObserver for NullObserver {}

/// Cooperative cancellation flag, cheap to clone across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl DecodeObserver for CancelToken {
    fn cancel_requested(&self) -> bool {
        self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = DecodeOptions::default();
        assert!(!opts.silent);
        assert!(opts.report_conflicts);
        assert_eq!(opts.inflate_buffer_size, 50_000);
        assert_eq!(opts.validation_threshold, 1000);
        assert_eq!(ProxySettings::new("proxy.local").port, 8080);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.cancel_requested());
        token.cancel();
        assert!(other.cancel_requested());
        other.reset();
        assert!(!token.is_cancelled());
    }
}
