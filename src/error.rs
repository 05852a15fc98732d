//! Bridge errors.
//!
//! Every failing bridge operation also records its message in a thread-local
//! slot, mirroring the host library's `GetError` convention. The C entry points
//! read it back through [`last_error`].

use std::cell::RefCell;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("webOS libraries are not initialized")]
    NotInitialized,

    #[error("call to {uri} was rejected (status {status})")]
    SubmissionRejected { uri: String, status: i32 },

    #[error("call to {uri} got no reply within {timeout:?}")]
    TimedOut { uri: String, timeout: Duration },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("subscription requests cannot be made blocking")]
    UnsupportedMode,

    #[error("failed to load {library}: {message}")]
    LibraryLoad { library: String, message: String },

    #[error("{library} does not export {symbol}")]
    MissingSymbol { library: String, symbol: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed reply from {uri}: {reason}")]
    MalformedReply { uri: String, reason: String },

    #[error("{uri} failed: {reason}")]
    ServiceFailed { uri: String, reason: String },
}

impl BridgeError {
    pub fn rejected(uri: impl Into<String>, status: i32) -> Self {
        Self::SubmissionRejected {
            uri: uri.into(),
            status,
        }
    }

    pub fn timed_out(uri: impl Into<String>, timeout: Duration) -> Self {
        Self::TimedOut {
            uri: uri.into(),
            timeout,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn library_load(library: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LibraryLoad {
            library: library.into(),
            message: message.into(),
        }
    }

    pub fn missing_symbol(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::MissingSymbol {
            library: library.into(),
            symbol: symbol.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn malformed_reply(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedReply {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn service_failed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceFailed {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// The bridge never retries; this only tells the caller whether trying again can help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::NotInitialized
                | BridgeError::SubmissionRejected { .. }
                | BridgeError::TimedOut { .. }
        )
    }

    /// Errors that mean the bridge itself cannot work in this process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::LibraryLoad { .. } | BridgeError::MissingSymbol { .. }
        )
    }

    pub fn code(&self) -> u32 {
        match self {
            BridgeError::NotInitialized => 1,
            BridgeError::SubmissionRejected { .. } => 2,
            BridgeError::TimedOut { .. } => 3,
            BridgeError::InvalidArgument { .. } => 10,
            BridgeError::UnsupportedMode => 11,
            BridgeError::LibraryLoad { .. } => 20,
            BridgeError::MissingSymbol { .. } => 21,
            BridgeError::Config { .. } => 30,
            BridgeError::Io(_) => 31,
            BridgeError::MalformedReply { .. } => 40,
            BridgeError::ServiceFailed { .. } => 41,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Stores `err` as this thread's last error.
pub fn set_last_error(err: &BridgeError) {
    let message = err.to_string();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Message of the last error recorded on this thread.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Records the error (if any) and passes the result through.
pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        set_last_error(err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BridgeError::NotInitialized.to_string(),
            "webOS libraries are not initialized"
        );
        assert_eq!(
            BridgeError::rejected("luna://a/b", 1).to_string(),
            "call to luna://a/b was rejected (status 1)"
        );
    }

    #[test]
    fn test_categories() {
        assert!(BridgeError::rejected("luna://a/b", 1).is_retryable());
        assert!(!BridgeError::UnsupportedMode.is_retryable());
        assert!(BridgeError::missing_symbol("libhelpers.so.2", "HLunaServiceCall").is_fatal());
        assert!(!BridgeError::NotInitialized.is_fatal());
    }

    #[test]
    fn test_last_error_is_per_thread() {
        clear_last_error();
        let _ = record::<()>(Err(BridgeError::NotInitialized));
        assert_eq!(
            last_error().as_deref(),
            Some("webOS libraries are not initialized")
        );
        std::thread::spawn(|| assert_eq!(last_error(), None))
            .join()
            .unwrap();
        clear_last_error();
        assert_eq!(last_error(), None);
    }
}
