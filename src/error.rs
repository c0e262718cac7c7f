/// Error handling module for MCP Supervisor.
///
/// This module defines the error types used throughout the library.
/// It provides a comprehensive set of errors that can occur when
/// supervising MCP server processes, along with helpful context for
/// debugging.
///
/// # Example
///
/// ```
/// use mcp_supervisor::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::ServerNotFound(id)) => println!("Server '{}' is not registered", id),
///         Err(Error::InvalidTransition { id, from, event }) => {
///             println!("Server '{}' cannot apply '{}' while {}", id, event, from)
///         }
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the mcp-supervisor library.
///
/// This enum represents all possible error types that can be returned from
/// operations in the MCP Supervisor library. Each variant includes context
/// information to help diagnose and handle the error appropriately.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration JSON/YAML is malformed
    /// - Required fields are missing
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed successfully but contains invalid values.
    ///
    /// This error occurs when:
    /// - A launch command is empty
    /// - A listening port is zero
    /// - Two servers share the same id
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A server id was registered twice.
    ///
    /// This error occurs when:
    /// - `register` is called with an id that already exists in the registry
    #[error("Duplicate server id: {0}")]
    DuplicateId(String),

    /// Requested server was not found in the registry.
    ///
    /// This error occurs when:
    /// - A control or query operation names an id that was never registered
    /// - The server was deregistered before the operation arrived
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// A lifecycle event is not valid from the server's current status.
    ///
    /// This error occurs when:
    /// - `start` is requested while the server is already running
    /// - `stop` is requested while the server is already stopping
    /// - A stale probe result arrives after the operator changed the state
    ///
    /// The server's recorded state is left untouched.
    #[error("Invalid transition for server '{id}': event '{event}' not allowed from {from}")]
    InvalidTransition {
        /// Server id the event targeted.
        id: String,
        /// Status the server was in when the event arrived.
        from: String,
        /// The rejected event.
        event: String,
    },

    /// The server process could not be launched.
    ///
    /// This error occurs when:
    /// - The executable cannot be spawned
    /// - The configured port is already bound
    ///
    /// The server remains in its prior state.
    #[error("Launch failure: {0}")]
    Launch(String),

    /// The server process could not be stopped.
    ///
    /// This error occurs when:
    /// - Signalling a live process fails
    ///
    /// A process that has already exited is not an error; stop is
    /// idempotent in that case.
    #[error("Stop failure: {0}")]
    Stop(String),

    /// Any other error not covered by the above categories.
    ///
    /// This is a catch-all error for cases not explicitly handled elsewhere.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for mcp-supervisor operations.
///
/// This is a convenience type alias for `std::result::Result` with the `Error` type
/// from this module. Use this throughout the library and in client code to handle
/// errors in a consistent way.
pub type Result<T> = std::result::Result<T, Error>;
