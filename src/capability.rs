//! Capability-polymorphic request handling per server kind.
//!
//! Each [`ServerType`] advertises which request kinds it can serve and
//! provides a handler for them. Handlers are stateless values behind a
//! trait object; there is no shared base state between kinds.

use crate::config::ServerType;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

/// The kinds of requests an MCP server can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Tool invocation.
    Tools,
    /// Resource retrieval.
    Resources,
    /// Prompt templates.
    Prompts,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestKind::Tools => "tools",
            RequestKind::Resources => "resources",
            RequestKind::Prompts => "prompts",
        };
        write!(f, "{}", s)
    }
}

/// A request routed to a server's handler.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    /// Which capability the request targets.
    pub kind: RequestKind,
    /// Operation name within the capability, e.g. a tool name.
    pub operation: String,
    /// Operation arguments.
    pub params: Value,
}

/// Per-kind request handler.
///
/// `run` is only called for kinds the handler `supports`; callers must
/// check first and treat an unsupported kind as a routing error.
#[async_trait]
pub trait ServerHandler: Send + Sync {
    /// Whether this handler serves the given request kind.
    fn supports(&self, kind: RequestKind) -> bool;

    /// Execute a request, producing the JSON result to relay.
    async fn run(&self, request: ServerRequest) -> Result<Value>;
}

/// Returns the handler implementation for a server kind.
pub fn handler_for(server_type: ServerType) -> Box<dyn ServerHandler> {
    match server_type {
        ServerType::Filesystem => Box::new(FilesystemHandler),
        ServerType::Fetch => Box::new(FetchHandler),
        ServerType::Memory => Box::new(MemoryHandler),
        ServerType::Database => Box::new(DatabaseHandler),
        ServerType::Custom => Box::new(CustomHandler),
    }
}

/// Capability names a server kind supports, for snapshot metadata.
pub fn capabilities_of(server_type: ServerType) -> Vec<RequestKind> {
    let handler = handler_for(server_type);
    [RequestKind::Tools, RequestKind::Resources, RequestKind::Prompts]
        .into_iter()
        .filter(|kind| handler.supports(*kind))
        .collect()
}

fn unsupported(kind: RequestKind, server_type: &str) -> Error {
    Error::Other(format!(
        "Request kind '{}' is not supported by {} servers",
        kind, server_type
    ))
}

fn acknowledge(request: &ServerRequest) -> Value {
    json!({
        "kind": request.kind.to_string(),
        "operation": request.operation,
        "params": request.params,
    })
}

struct FilesystemHandler;

#[async_trait]
impl ServerHandler for FilesystemHandler {
    fn supports(&self, kind: RequestKind) -> bool {
        matches!(kind, RequestKind::Tools | RequestKind::Resources)
    }

    async fn run(&self, request: ServerRequest) -> Result<Value> {
        if !self.supports(request.kind) {
            return Err(unsupported(request.kind, "filesystem"));
        }
        Ok(acknowledge(&request))
    }
}

struct FetchHandler;

#[async_trait]
impl ServerHandler for FetchHandler {
    fn supports(&self, kind: RequestKind) -> bool {
        matches!(kind, RequestKind::Tools)
    }

    async fn run(&self, request: ServerRequest) -> Result<Value> {
        if !self.supports(request.kind) {
            return Err(unsupported(request.kind, "fetch"));
        }
        Ok(acknowledge(&request))
    }
}

struct MemoryHandler;

#[async_trait]
impl ServerHandler for MemoryHandler {
    fn supports(&self, kind: RequestKind) -> bool {
        matches!(kind, RequestKind::Tools | RequestKind::Resources)
    }

    async fn run(&self, request: ServerRequest) -> Result<Value> {
        if !self.supports(request.kind) {
            return Err(unsupported(request.kind, "memory"));
        }
        Ok(acknowledge(&request))
    }
}

struct DatabaseHandler;

#[async_trait]
impl ServerHandler for DatabaseHandler {
    fn supports(&self, kind: RequestKind) -> bool {
        matches!(
            kind,
            RequestKind::Tools | RequestKind::Resources | RequestKind::Prompts
        )
    }

    async fn run(&self, request: ServerRequest) -> Result<Value> {
        if !self.supports(request.kind) {
            return Err(unsupported(request.kind, "database"));
        }
        Ok(acknowledge(&request))
    }
}

struct CustomHandler;

#[async_trait]
impl ServerHandler for CustomHandler {
    fn supports(&self, kind: RequestKind) -> bool {
        matches!(kind, RequestKind::Tools)
    }

    async fn run(&self, request: ServerRequest) -> Result<Value> {
        if !self.supports(request.kind) {
            return Err(unsupported(request.kind, "custom"));
        }
        Ok(acknowledge(&request))
    }
}
