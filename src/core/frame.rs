//! Fixed-size frames: job header, file header and file footer.
//!
//! ```text
//! Job header  (20): [body_length:u32][internal_block_length:u32][reserved:12]
//! File header (32): [file_length:u64][extension:24, NUL-padded]
//! File footer (20): constant sentinel
//! Digest      (20): SHA-1 of every preceding byte in the same direction
//! ```
//!
//! All integers are little-endian.

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut};

pub const JOB_HEADER_SIZE: usize = 20;
pub const FILE_HEADER_SIZE: usize = 32;
pub const FILE_FOOTER_SIZE: usize = 20;
pub const DIGEST_SIZE: usize = 20;

/// Bytes available for the extension text, including its NUL terminator
const EXTENSION_FIELD_SIZE: usize = FILE_HEADER_SIZE - 8;

/// Longest extension a file header can carry
pub const MAX_EXTENSION_LEN: usize = EXTENSION_FIELD_SIZE - 1;

/// Sentinel closing every file sub-frame. Carries no content-derived data.
pub const FILE_FOOTER: [u8; FILE_FOOTER_SIZE] = *b"--JOB-FILE-TRAILER--";

/// Header preceding every request and response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHeader {
    /// Length of both parameter blocks plus the digest trailer
    pub body_length: u32,
    /// Length of the internal parameter block, which comes first in the body
    pub internal_block_length: u32,
}

impl JobHeader {
    /// Header for a body made of the two given parameter blocks
    pub fn for_blocks(internal_len: usize, user_len: usize) -> Result<Self> {
        let body = internal_len
            .checked_add(user_len)
            .and_then(|n| n.checked_add(DIGEST_SIZE))
            .ok_or_else(|| ProtocolError::Encoding(constants::ERR_BLOCK_TOO_LARGE.into()))?;
        let body_length = u32::try_from(body)
            .map_err(|_| ProtocolError::Encoding(constants::ERR_BLOCK_TOO_LARGE.into()))?;
        let internal_block_length = u32::try_from(internal_len)
            .map_err(|_| ProtocolError::Encoding(constants::ERR_BLOCK_TOO_LARGE.into()))?;
        Ok(Self {
            body_length,
            internal_block_length,
        })
    }

    /// Number of parameter-block bytes that follow the header
    pub fn param_bytes(&self) -> usize {
        self.body_length as usize - DIGEST_SIZE
    }

    pub fn to_bytes(&self) -> [u8; JOB_HEADER_SIZE] {
        let mut out = [0u8; JOB_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.body_length);
        buf.put_u32_le(self.internal_block_length);
        out
    }

    /// Parse and sanity-check a received header
    pub fn from_bytes(bytes: &[u8; JOB_HEADER_SIZE], max_body_length: u32) -> Result<Self> {
        let mut buf = &bytes[..];
        let body_length = buf.get_u32_le();
        let internal_block_length = buf.get_u32_le();

        if (body_length as usize) < DIGEST_SIZE {
            return Err(ProtocolError::Decoding(format!(
                "{} ({body_length})",
                constants::ERR_BODY_TOO_SHORT
            )));
        }
        if body_length > max_body_length {
            return Err(ProtocolError::Decoding(format!(
                "Body length {body_length} exceeds limit {max_body_length}"
            )));
        }
        let header = Self {
            body_length,
            internal_block_length,
        };
        if internal_block_length as usize > header.param_bytes() {
            return Err(ProtocolError::Decoding(format!(
                "Internal block length {internal_block_length} exceeds body"
            )));
        }
        Ok(header)
    }
}

/// Header preceding the contents of each attached or returned file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub file_length: u64,
    pub extension: String,
}

impl FileHeader {
    pub fn new(file_length: u64, extension: impl Into<String>) -> Result<Self> {
        let extension = extension.into();
        if extension.len() > MAX_EXTENSION_LEN {
            return Err(ProtocolError::Encoding(format!(
                "File extension '{extension}' longer than {MAX_EXTENSION_LEN} bytes"
            )));
        }
        if !extension.is_ascii() || extension.contains('\0') {
            return Err(ProtocolError::Encoding(format!(
                "File extension '{}' must be ASCII without NUL",
                extension.escape_default()
            )));
        }
        Ok(Self {
            file_length,
            extension,
        })
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut out = [0u8; FILE_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.file_length);
        buf.put_slice(self.extension.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; FILE_HEADER_SIZE]) -> Result<Self> {
        let mut buf = &bytes[..];
        let file_length = buf.get_u64_le();
        let field = &bytes[8..];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let extension = std::str::from_utf8(&field[..end])
            .map_err(|_| ProtocolError::Decoding("File extension is not valid UTF-8".into()))?
            .to_string();
        // the extension ends up in a spool path
        if extension.contains(['/', '\\']) || extension == ".." {
            return Err(ProtocolError::Decoding(format!(
                "File extension '{extension}' contains a path separator"
            )));
        }
        Ok(Self {
            file_length,
            extension,
        })
    }
}
