// ncm-core - NCM container decoder
// Copyright (C) 2025 ncm-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Error types for ncm-core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are split between the decoder core (everything that can go wrong while
//! reading one container) and the outer layers (paths, cover fetching, batch
//! conversion).
//!
//! ## Decoder Errors
//! Every failed decode surfaces exactly one of these, and none is retried:
//! - `NotContainerFormat` - bad magic, stop immediately
//! - `TruncatedContainer` - a section declares more bytes than the stream holds
//! - `InvalidPadding` - AES-ECB PKCS7 check failed (almost always a wrong key)
//! - `MalformedMetadata` - the decrypted metadata did not parse
//! - `SourceReadError` - the underlying stream failed, propagated verbatim
//!
//! `SinkWriteError` is kept apart from these: it reports the caller's output
//! sink failing during a streaming decode, not a problem with the container.
//!
//! ## Outer Layer Errors
//! - File layout: `InvalidPath`, `FileAlreadyExists`
//! - Remote cover art: `NetworkError`, `InvalidCoverUrl`, `CoverTooLarge`
//! - Collaborators: `TagWriteFailed`
//! - Configuration: `InvalidConfiguration`

use thiserror::Error;

/// Result type alias using our NcmError type
pub type Result<T> = std::result::Result<T, NcmError>;

/// Main error type for ncm-core
#[derive(Error, Debug)]
pub enum NcmError {
    // ===== Decoder Errors =====

    /// The stream does not start with the container signature
    #[error("Not an NCM container: {0}")]
    NotContainerFormat(String),

    /// A length-prefixed read ran past the end of the stream
    #[error("Truncated container: {section} section needs {expected} bytes, only {available} available")]
    TruncatedContainer {
        /// Section being read when the stream ran out
        section: &'static str,
        /// Bytes the section declared (or the fixed field width)
        expected: u64,
        /// Bytes actually delivered before end of stream
        available: u64,
    },

    /// PKCS7 padding (or the decrypted key material) failed validation
    #[error("Invalid padding: {0}")]
    InvalidPadding(String),

    /// Decrypted metadata could not be decoded
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// Underlying byte source failed
    #[error("Source read error: {0}")]
    SourceReadError(#[from] std::io::Error),

    /// Output sink of the streaming decoder failed
    #[error("Output write error: {0}")]
    SinkWriteError(std::io::Error),

    // ===== File Errors =====

    /// Invalid input or output path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Output file already exists and overwrite not allowed
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    // ===== Cover Art Errors =====

    /// Network failure while fetching a remote cover image
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Cover URL is not an http(s) URL
    #[error("Invalid cover URL: {0}")]
    InvalidCoverUrl(String),

    /// Remote cover exceeded the configured size limit
    #[error("Cover image too large: limit is {limit} bytes")]
    CoverTooLarge { limit: usize },

    // ===== Collaborator / Configuration Errors =====

    /// Tag writer rejected the decoded output
    #[error("Tag write failed: {0}")]
    TagWriteFailed(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// JSON error outside the metadata section (configuration files)
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
}

impl From<tokio::task::JoinError> for NcmError {
    fn from(err: tokio::task::JoinError) -> Self {
        NcmError::InternalError(format!("Worker task failed: {}", err))
    }
}

// Helper methods for creating common errors
impl NcmError {
    /// Create a TruncatedContainer error
    pub fn truncated(section: &'static str, expected: u64, available: u64) -> Self {
        NcmError::TruncatedContainer {
            section,
            expected,
            available,
        }
    }

    /// Create an InvalidPadding error with a message
    pub fn invalid_padding<S: Into<String>>(message: S) -> Self {
        NcmError::InvalidPadding(message.into())
    }

    /// Create a MalformedMetadata error with a message
    pub fn malformed_metadata<S: Into<String>>(message: S) -> Self {
        NcmError::MalformedMetadata(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        NcmError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        NcmError::InternalError(message.into())
    }

    /// Check if error comes from the container structure itself
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            NcmError::NotContainerFormat(_)
                | NcmError::TruncatedContainer { .. }
                | NcmError::MalformedMetadata(_)
        )
    }

    /// Check if error is related to decryption (wrong key, corrupted ciphertext)
    pub fn is_crypto_error(&self) -> bool {
        matches!(self, NcmError::InvalidPadding(_))
    }

    /// Check if error is retryable
    ///
    /// Decoder errors never are: a container either decodes or it doesn't.
    /// Only transient network failures from the cover fetcher qualify, and
    /// retrying them is the caller's policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            NcmError::NetworkError { is_transient, .. } => *is_transient,
            NcmError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            NcmError::NotContainerFormat(_) => {
                "This file is not an NCM container.".to_string()
            }
            NcmError::TruncatedContainer { section, .. } => {
                format!("The file is incomplete (the {} section is cut short). Please download it again.", section)
            }
            NcmError::InvalidPadding(_) => {
                "The file could not be decrypted. It is probably corrupted.".to_string()
            }
            NcmError::MalformedMetadata(_) => {
                "The file's embedded song information is unreadable.".to_string()
            }
            NcmError::FileAlreadyExists(path) => {
                format!("'{}' already exists. Enable overwrite to replace it.", path)
            }
            _ => self.to_string(),
        }
    }
}
