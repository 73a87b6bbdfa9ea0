//! Result and error types for the harness.

use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur in the harness
///
/// "Not found" after a scroll-retry budget is never an error: locator helpers
/// return `Option`. [`HarnessError::NoSuchElement`] only surfaces from the raw
/// [`Session::find_element`](crate::Session::find_element) seam.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Selector argument the remote locator grammar cannot express
    #[error("unknown arg type to build uiautomator selector in .{segment}(): {value}")]
    UnsupportedArgument {
        /// Segment carrying the bad argument
        segment: String,
        /// The offending value
        value: String,
    },

    /// Computed swipe vector has a negative coordinate
    #[error(
        "all swipe co-ordinates should be positive: ({start_x}, {start_y}) -> ({end_x}, {end_y})"
    )]
    NegativeSwipeCoordinate {
        /// Start x
        start_x: i64,
        /// Start y
        start_y: i64,
        /// End x
        end_x: i64,
        /// End y
        end_y: i64,
    },

    /// Direction name did not parse
    #[error("unknown direction {name}, should be one of LEFT, RIGHT, UP, DOWN")]
    UnknownDirection {
        /// Name that was given
        name: String,
    },

    /// Swipe distance is not a finite number
    #[error("swipe distance {distance} is not a finite fraction")]
    InvalidSwipeDistance {
        /// Distance that was given
        distance: f64,
    },

    /// Remote lookup matched nothing
    #[error("unable to locate element {strategy}={value}")]
    NoSuchElement {
        /// Locator strategy
        strategy: String,
        /// Locator value
        value: String,
    },

    /// Named UI context is not available
    #[error("unable to find {wanted} in available contexts {available:?}")]
    ContextNotFound {
        /// Context name fragment that was wanted
        wanted: String,
        /// Contexts the session reported
        available: Vec<String>,
    },

    /// Underlying remote call failed
    #[error("remote call failed: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// Neither a capability nor the wrapped handle defines the member
    #[error("session has no member named '{name}'")]
    UnknownMember {
        /// Member name
        name: String,
    },

    /// Dynamic member call received arguments it cannot use
    #[error("invalid arguments for '{member}': {message}")]
    InvalidArgument {
        /// Member name
        member: String,
        /// Error message
        message: String,
    },

    /// Poll budget exhausted
    #[error("gave up after {attempts} attempts, last observed: {last}")]
    TimeoutExhausted {
        /// Attempts made
        attempts: usize,
        /// Description of the last observed result or fault
        last: String,
    },

    /// Deadline passed without the condition holding
    #[error("condition not met within {ms}ms: {waited_for}")]
    DeadlineExceeded {
        /// Timeout in milliseconds
        ms: u64,
        /// What was waited for
        waited_for: String,
    },

    /// Configuration is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HarnessError {
    /// Create a transport fault
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error for a dynamic member call
    pub fn invalid_argument(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            member: member.into(),
            message: message.into(),
        }
    }

    /// Whether this is the raw "element not found" outcome
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchElement { .. })
    }

    /// Whether this error comes from the remote session rather than from
    /// a programming mistake in the caller
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::NoSuchElement { .. } | Self::ContextNotFound { .. }
        )
    }
}
