//! # Error Types
//!
//! Error handling for job calls, from local encoding failures to
//! end-to-end integrity failures reported after a full response parse.
//!
//! ## Error Categories
//! - **Encoding**: bad input detected before any byte was written
//! - **I/O**: transport or filesystem failure mid-message
//! - **Decoding**: malformed or truncated response structure
//! - **Digest mismatch**: response parsed but failed the SHA-1 check
//! - **Remote**: the server answered with a non-zero return code
//!
//! Only `Encoding` and `Remote` leave the transport in a known state.
//! Every other variant means the byte stream is out of sync and the
//! transport must be discarded; see [`ProtocolError::is_fatal`].
//!
//! ## Example Usage
//! ```rust
//! use jobwire::error::{ProtocolError, Result};
//! use std::fs::File;
//! use std::io::Read;
//! use tracing::{info, error};
//!
//! fn read_attachment(path: &str) -> Result<Vec<u8>> {
//!     let mut file = File::open(path).map_err(ProtocolError::Io)?;
//!     let mut contents = Vec::new();
//!     file.read_to_end(&mut contents).map_err(ProtocolError::Io)?;
//!     Ok(contents)
//! }
//!
//! fn main() {
//!     match read_attachment("input.csv") {
//!         Ok(bytes) => info!(len = bytes.len(), "Read attachment"),
//!         Err(e) => error!(error=%e, "Error reading attachment"),
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Parameter encoding errors
    pub const ERR_EMPTY_NAME: &str = "Parameter name cannot be empty";
    pub const ERR_NAME_CONTAINS_NUL: &str = "Parameter name contains a NUL byte";
    pub const ERR_NAME_TOO_LONG: &str = "Parameter name exceeds 64 KiB";
    pub const ERR_BLOCK_TOO_LARGE: &str = "Parameter block exceeds u32 offset range";

    /// Parameter decoding errors
    pub const ERR_TRUNCATED_BLOCK: &str = "Parameter block truncated";
    pub const ERR_UNTERMINATED_NAME: &str = "Parameter name is not NUL-terminated";
    pub const ERR_BAD_OFFSETS: &str = "Parameter offsets out of order or out of range";

    /// Frame errors
    pub const ERR_BODY_TOO_SHORT: &str = "Declared body length is shorter than the digest trailer";
    pub const ERR_MISSING_RETURN: &str = "Response carries no return code";
    pub const ERR_NEGATIVE_STREAMS: &str = "Response declares a negative file count";
}

/// Primary error type for all job protocol operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Remote job failed with return code {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Transport is unusable after a failed call")]
    TransportUnusable,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error leaves the transport in an undefined state.
    ///
    /// Fatal errors happen after the first byte has gone out (or while the
    /// response is being read), so unread bytes may still sit in the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::Decoding(_)
                | ProtocolError::DigestMismatch { .. }
                | ProtocolError::TransportUnusable
        )
    }

    /// Map a short read while reading a fixed-size frame to a decoding error.
    ///
    /// A peer closing the stream inside a declared length is a structural
    /// fault in the response, not a transport fault.
    pub(crate) fn from_frame_read(err: io::Error, frame: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::Decoding(format!("stream ended inside {frame}"))
        } else {
            ProtocolError::Io(err)
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ProtocolError::Io(io::Error::other("reset")).is_fatal());
        assert!(ProtocolError::Decoding("x".into()).is_fatal());
        assert!(ProtocolError::DigestMismatch {
            expected: "00".into(),
            actual: "11".into()
        }
        .is_fatal());
        assert!(ProtocolError::TransportUnusable.is_fatal());

        assert!(!ProtocolError::Encoding("x".into()).is_fatal());
        assert!(!ProtocolError::Remote {
            code: 5,
            message: "no".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_short_read_becomes_decoding_error() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            ProtocolError::from_frame_read(eof, "job header"),
            ProtocolError::Decoding(msg) if msg.contains("job header")
        ));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            ProtocolError::from_frame_read(reset, "job header"),
            ProtocolError::Io(_)
        ));
    }
}
