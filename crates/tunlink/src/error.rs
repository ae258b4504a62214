//! Error types for tunlink operations.

use std::io;
use std::net::Ipv4Addr;

/// Result type for tunlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving routes, transitioning the route
/// table, or decoding control messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message or record was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// The routing subsystem has no usable route toward the probe.
    #[error("no route with a next hop toward {destination}")]
    NoRoute {
        /// The probe destination that was looked up.
        destination: Ipv4Addr,
    },

    /// A route command ran but reported failure.
    #[error("route command `{command}` failed (exit code {exit_code}): {}", .output.trim())]
    RouteCommand {
        /// The rendered command line.
        command: String,
        /// Exit code, or -1 when terminated by a signal.
        exit_code: i32,
        /// Raw command output (stdout and stderr).
        output: String,
        /// Number of steps of the current transition applied before this one.
        applied: usize,
    },

    /// A route command could not be started.
    #[error("cannot run `{command}`: {source}")]
    CommandSpawn {
        /// The rendered command line.
        command: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// Operation not valid in the controller's current state.
    #[error("cannot {operation} while routes are {state}")]
    InvalidState {
        /// The operation that was refused.
        operation: &'static str,
        /// The state the controller was in.
        state: String,
    },

    /// Requested length exceeds a buffer's capacity.
    #[error("length {requested} exceeds buffer capacity {capacity}")]
    Capacity {
        /// Requested length.
        requested: usize,
        /// Capacity of the buffer.
        capacity: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Check if gateway resolution failed for lack of a route.
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Self::NoRoute { .. })
    }

    /// Check if a route command failed or could not be started.
    pub fn is_route_command(&self) -> bool {
        matches!(self, Self::RouteCommand { .. } | Self::CommandSpawn { .. })
    }

    /// Check if this is a control-message or netlink decoding error.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::InvalidMessage(_) | Self::InvalidAttribute(_)
        )
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, missing file).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, 2 | 19) // ENOENT=2, ENODEV=19
            }
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, 1 | 13) // EPERM=1, EACCES=13
            }
            _ => false,
        }
    }

    /// Check if the kernel reported the destination unreachable.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, libc::ENETUNREACH | libc::EHOSTUNREACH | libc::ENOENT)
            }
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
