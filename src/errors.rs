//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`KilnError`] covers the hard failure modes:
//! - Structural defects found while initializing a [`Document`](crate::document::Document)
//! - Shader source table problems (include cycles, unknown includes)
//! - Shader compilation and program link failures reported by the device
//! - Settings parsing
//!
//! Soft failures (a missing uniform, an absent accessor on one primitive) are
//! *not* errors: they are logged once and the affected binding is skipped.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiln::errors::{KilnError, Result};
//!
//! fn load() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the renderer.
#[derive(Error, Debug)]
pub enum KilnError {
    // ========================================================================
    // Document Structure Errors
    // ========================================================================
    /// The document contains no scene at all.
    #[error("Document contains no scenes")]
    NoScenes,

    /// A cross-reference inside the document points past the end of its table.
    #[error("Index out of bounds: {context} (index: {index})")]
    IndexOutOfBounds {
        /// Description of what was being accessed
        context: String,
        /// The invalid index
        index: usize,
    },

    /// The node graph is not a forest.
    #[error("Node {0} is reachable through a cycle")]
    NodeCycle(usize),

    /// An accessor's byte layout does not fit its buffer view.
    #[error("Accessor {accessor} is malformed: {reason}")]
    InvalidAccessor {
        /// Accessor index
        accessor: usize,
        /// Human readable reason
        reason: String,
    },

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// The `#include` graph of the shader source table contains a cycle.
    #[error("Shader include cycle: {0}")]
    ShaderIncludeCycle(String),

    /// A shader source includes a name that is not in the source table.
    #[error("Shader '{source_name}' includes unknown source '{include}'")]
    UnknownShaderInclude {
        /// The source containing the include marker
        source_name: String,
        /// The missing include name
        include: String,
    },

    /// The device rejected a shader.
    #[error("Shader compilation failed: {0}")]
    ShaderCompile(String),

    /// The device failed to link a program.
    #[error("Program link failed: {0}")]
    ProgramLink(String),

    // ========================================================================
    // Device & Frame Errors
    // ========================================================================
    /// Generic device-side failure (out of memory, lost context, ...).
    #[error("GPU device error: {0}")]
    Device(String),

    /// `new_frame` was asked for an offscreen target outside the pool.
    #[error("Render target {index} is outside the pool (size {pool_size})")]
    RenderTargetOutOfRange {
        /// Requested target index
        index: usize,
        /// Configured pool size
        pool_size: usize,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_json::Error),
}

impl KilnError {
    pub(crate) fn out_of_bounds(context: impl Into<String>, index: usize) -> Self {
        Self::IndexOutOfBounds {
            context: context.into(),
            index,
        }
    }
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;
