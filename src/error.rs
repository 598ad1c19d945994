//! Error Taxonomy
//!
//! The cache distinguishes configuration errors (fatal at construction),
//! operational outcomes (reported as values: a miss, an admission rejection),
//! loader errors (propagated to `get_or_load` callers), and internal errors.
//!
//! Every error carries a stable string code (see [`ErrorKind::code`]), a
//! human-readable message, and a context map. Retryability is an attribute of
//! the error value: admission rejections and loader failures are retryable,
//! configuration and not-found errors are not.
//!
//! Errors are `Clone` so a single loader outcome can be shared with every
//! single-flight waiter; the underlying cause, when present, is held behind
//! an `Arc` for the same reason.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Boxed error type accepted from user-supplied loaders.
pub type LoaderError = Box<dyn StdError + Send + Sync + 'static>;

/// The category of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The construction configuration was rejected.
    #[error("invalid cache configuration")]
    InvalidConfig,

    /// The key was not present. `get` reports this as a plain miss; the
    /// error form appears on loader paths, when a loader reports that the
    /// backing store has no value for the key.
    #[error("key not found")]
    KeyNotFound,

    /// The admission gate rejected the entry at capacity.
    #[error("admission rejected at capacity")]
    AdmissionRejected,

    /// No loader was supplied. Unused by the Rust API (a closure cannot be
    /// null) but kept as a stable code for embedding layers.
    #[error("no loader supplied")]
    LoaderInvalid,

    /// The loader returned an error; the cause is attached.
    #[error("loader failed")]
    LoaderFailed,

    /// The waiter's cancellation token fired before the load completed.
    #[error("load cancelled")]
    LoaderCancelled,

    /// The loader panicked; the panic was recovered at the single-flight
    /// boundary.
    #[error("loader panicked")]
    LoaderTrapped,

    /// An internal invariant was violated or the cache is closed.
    #[error("internal cache error")]
    Internal,
}

impl ErrorKind {
    /// The stable string code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "invalid-config",
            ErrorKind::KeyNotFound => "key-not-found",
            ErrorKind::AdmissionRejected => "cache-full-admission-rejected",
            ErrorKind::LoaderInvalid => "loader-invalid",
            ErrorKind::LoaderFailed => "loader-failed",
            ErrorKind::LoaderCancelled => "loader-cancelled",
            ErrorKind::LoaderTrapped => "loader-trapped",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether an operation failing with this kind may succeed if retried.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::AdmissionRejected | ErrorKind::LoaderFailed
        )
    }
}

/// An error surfaced at the cache boundary.
#[derive(Clone)]
pub struct CacheError {
    kind: ErrorKind,
    message: String,
    context: BTreeMap<String, String>,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl CacheError {
    /// Creates an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Creates an `invalid-config` error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    /// Creates an `internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Creates a `key-not-found` error.
    ///
    /// Loaders return this to report that the backing store has no value for
    /// the requested key; the single-flight boundary propagates a
    /// [`CacheError`] from a loader unchanged instead of wrapping it in
    /// `loader-failed`.
    pub fn key_not_found() -> Self {
        Self::new(ErrorKind::KeyNotFound, "key not found in backing store")
    }

    /// Creates a `cache-full-admission-rejected` error, the error form of a
    /// `set` the admission gate turned away.
    pub fn admission_rejected() -> Self {
        Self::new(
            ErrorKind::AdmissionRejected,
            "admission gate rejected the entry at capacity",
        )
    }

    /// Creates a `loader-failed` error wrapping the loader's cause.
    pub fn loader_failed(cause: LoaderError) -> Self {
        let mut err = Self::new(ErrorKind::LoaderFailed, cause.to_string());
        err.source = Some(Arc::from(cause));
        err
    }

    /// Creates a `loader-cancelled` error.
    pub fn loader_cancelled() -> Self {
        Self::new(ErrorKind::LoaderCancelled, "cancelled while waiting for load")
    }

    /// Creates a `loader-trapped` error from a recovered panic payload.
    pub fn loader_trapped(panic_message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LoaderTrapped, panic_message)
    }

    /// Attaches a context key/value pair, returning the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The error's category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable string code.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Whether the failed operation may succeed if retried.
    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    /// The attached context map.
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheError")
            .field("kind", &self.kind)
            .field("code", &self.code())
            .field("message", &self.message)
            .field("context", &self.context)
            .field("retryable", &self.retryable())
            .finish()
    }
}

impl StdError for CacheError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn StdError + 'static))
    }
}
