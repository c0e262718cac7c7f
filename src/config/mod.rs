//! Configuration module for MCP Supervisor.
//!
//! This module handles parsing, validation, and access to configuration
//! settings for supervised MCP servers. It supports loading configurations
//! from files or strings in JSON format, and from YAML files.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use mcp_supervisor::config::Config;
//!
//! let config = Config::from_file("supervisor.json").unwrap();
//! println!("Loaded configuration with {} servers", config.servers.len());
//! ```
//!
//! Creating a configuration programmatically:
//! ```
//! use mcp_supervisor::config::{Config, ServerConfig, ServerType};
//! use std::collections::HashMap;
//!
//! let server_config = ServerConfig {
//!     id: "fetch".to_string(),
//!     server_type: ServerType::Fetch,
//!     command: "uvx".to_string(),
//!     args: vec!["mcp-server-fetch".to_string()],
//!     env: HashMap::new(),
//!     working_dir: None,
//!     port: 3001,
//!     health_endpoint: "/health".to_string(),
//!     probe_interval_secs: None,
//! };
//!
//! let config = Config {
//!     servers: vec![server_config],
//!     ..Config::default()
//! };
//! ```
mod parser;
pub mod validator;

pub use parser::{ApiConfig, Config, MonitorConfig, RestartConfig, ServerConfig, ServerType};
pub use validator::validate_config;
