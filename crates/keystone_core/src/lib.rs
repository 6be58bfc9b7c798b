#![doc = include_str!("../README.md")]

/// Configuration options (working-directory and engine config)
pub mod config;

/// Error (common error types)
pub mod error;

/// Filesystem abstraction
pub mod fs;

/// Descriptor paths and types
pub mod path;

/// Versioned descriptors, checksums and reverse patches
pub mod descriptor;

/// Project and environment membership
pub mod members;

/// Line and structural merges
pub mod merge;

/// Member hubs and the identity service
pub mod storage;

/// Conflicts and their resolution strategies
pub mod conflict;

/// The member a process acts as
pub mod session;

/// Fan-in, divergence detection and fan-out of descriptors
pub mod reconcile;

/// Projects, environments and their files
pub mod project;

/// Local mirror of a working directory
pub mod mirror;

/// Unified Keystone API
pub mod keystone;

/// Working-directory commands
pub mod commands;

/// Command pattern API
pub mod command;

mod command_handler;

pub use command::{Command, Response};
pub use error::{KeystoneError, Result, SerializableError};
pub use keystone::Keystone;
