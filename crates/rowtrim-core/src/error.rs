// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Rowtrim.

use thiserror::Error;

/// Top-level error type for all Rowtrim operations.
#[derive(Debug, Error)]
pub enum RowtrimError {
    // -- Request validation --
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("missing upload: {0}")]
    MissingUpload(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("request body requires a Content-Length header")]
    LengthRequired,

    // -- Image codec --
    #[error("image decoding failed: {0}")]
    ImageDecode(String),

    #[error("image encoding failed: {0}")]
    ImageEncode(String),

    // -- Service --
    #[error("server error: {0}")]
    Server(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RowtrimError>;
