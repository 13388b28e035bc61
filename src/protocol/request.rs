//! Request side: frames a job description onto the wire.
//!
//! The job header states the length of what follows it, so framing runs
//! in two phases. [`RequestFramer::new`] encodes both parameter blocks,
//! sizes the header and opens every attached file; nothing is written yet,
//! so bad input or a missing file leaves the transport untouched.
//! [`RequestFramer::write_to`] then emits the message in one pass:
//!
//! ```text
//! [job header][internal block][user block]
//! ([file header][file bytes][file footer]) x streams
//! [digest]
//! ```

use crate::config::ClientConfig;
use crate::core::digest::DigestWriter;
use crate::core::frame::{
    FileHeader, JobHeader, DIGEST_SIZE, FILE_FOOTER, FILE_HEADER_SIZE, JOB_HEADER_SIZE,
};
use crate::core::params::{encode_entries, encode_params};
use crate::core::types::{JobDescription, TypedValue};
use crate::error::{ProtocolError, Result};
use crate::utils::metrics::global_metrics;
use bytes::BytesMut;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Name of the internal parameter carrying the attached-file count
pub const STREAMS_PARAM: &str = "streams";

struct Attachment {
    path: PathBuf,
    header: FileHeader,
    file: File,
}

/// A fully prepared request, ready to be written
pub struct RequestFramer {
    method: String,
    header: JobHeader,
    internal: BytesMut,
    user: BytesMut,
    attachments: Vec<Attachment>,
    send_chunk_size: usize,
}

impl RequestFramer {
    /// Encode parameters and open attachments without touching the transport.
    ///
    /// # Errors
    /// - `Encoding` for invalid parameter names or unusable file extensions
    /// - `Io` if an attached file is missing or unreadable
    pub fn new(job: &JobDescription, config: &ClientConfig) -> Result<Self> {
        let streams = TypedValue::Integer(job.files.len() as i64);
        let internal = encode_entries(&[(STREAMS_PARAM, &streams)])?;
        let user = encode_params(&job.params)?;
        let header = JobHeader::for_blocks(internal.len(), user.len())?;

        let attachments = job
            .files
            .iter()
            .map(|path| open_attachment(path))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            method: job.method.clone(),
            header,
            internal,
            user,
            attachments,
            send_chunk_size: config.send_chunk_size.max(1),
        })
    }

    pub fn header(&self) -> JobHeader {
        self.header
    }

    pub fn file_count(&self) -> usize {
        self.attachments.len()
    }

    /// Total bytes `write_to` will put on the wire
    pub fn wire_len(&self) -> u64 {
        let files: u64 = self
            .attachments
            .iter()
            .map(|a| (FILE_HEADER_SIZE + FILE_FOOTER.len()) as u64 + a.header.file_length)
            .sum();
        JOB_HEADER_SIZE as u64 + self.header.body_length as u64 + files
    }

    /// Write the whole message and its digest, then flush.
    ///
    /// Returns the number of bytes written. On error the message is
    /// partially sent and the transport must be discarded.
    #[instrument(skip(self, out), fields(method = %self.method, streams = self.attachments.len()))]
    pub fn write_to<W: Write>(self, out: W) -> Result<u64> {
        let mut writer = DigestWriter::new(out);

        writer.write_all(&self.header.to_bytes())?;
        writer.write_all(&self.internal)?;
        writer.write_all(&self.user)?;
        debug!(
            body_length = self.header.body_length,
            internal = self.internal.len(),
            user = self.user.len(),
            "Wrote job header and parameter blocks"
        );

        let mut chunk = vec![0u8; self.send_chunk_size];
        for mut attachment in self.attachments {
            writer.write_all(&attachment.header.to_bytes())?;
            stream_file(&mut attachment, &mut writer, &mut chunk)?;
            writer.write_all(&FILE_FOOTER)?;
            global_metrics().file_sent();
            debug!(
                path = %attachment.path.display(),
                bytes = attachment.header.file_length,
                "Streamed attachment"
            );
        }

        let (_, hashed) = writer.finish()?;
        let total = hashed + DIGEST_SIZE as u64;
        global_metrics().bytes_sent(total);
        Ok(total)
    }
}

fn open_attachment(path: &Path) -> Result<Attachment> {
    let with_path = |e: io::Error| {
        ProtocolError::Io(io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    };
    let file = File::open(path).map_err(with_path)?;
    let metadata = file.metadata().map_err(with_path)?;
    if !metadata.is_file() {
        return Err(ProtocolError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        )));
    }

    let extension = match path.extension() {
        Some(ext) => ext.to_str().ok_or_else(|| {
            ProtocolError::Encoding(format!(
                "File extension of {} is not valid UTF-8",
                path.display()
            ))
        })?,
        None => "",
    };

    Ok(Attachment {
        path: path.to_path_buf(),
        header: FileHeader::new(metadata.len(), extension)?,
        file,
    })
}

/// Copy exactly the declared length in fixed-size chunks.
///
/// A file that shrank since it was opened surfaces as `UnexpectedEof`.
fn stream_file<W: Write>(
    attachment: &mut Attachment,
    writer: &mut W,
    chunk: &mut [u8],
) -> Result<()> {
    let mut remaining = attachment.header.file_length;
    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        attachment.file.read_exact(&mut chunk[..want])?;
        writer.write_all(&chunk[..want])?;
        remaining -= want as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::digest::DigestAccumulator;
    use crate::core::frame::FILE_FOOTER_SIZE;
    use crate::core::params::decode_params;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_header_counts_blocks_and_trailer() {
        let job = JobDescription::new("sum").param("x", 42i64);
        let framer = RequestFramer::new(&job, &ClientConfig::default()).unwrap();
        let header = framer.header();

        let mut wire = Vec::new();
        let written = framer.write_to(&mut wire).unwrap();
        assert_eq!(written as usize, wire.len());

        let body = &wire[JOB_HEADER_SIZE..wire.len() - DIGEST_SIZE];
        assert_eq!(header.body_length as usize, body.len() + DIGEST_SIZE);

        let (internal, user) = body.split_at(header.internal_block_length as usize);
        let internal = decode_params(internal).unwrap();
        assert_eq!(internal, vec![("streams".to_string(), TypedValue::Integer(0))]);
        let user = decode_params(user).unwrap();
        assert_eq!(user, vec![("x".to_string(), TypedValue::Integer(42))]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_digest_covers_everything_before_trailer() {
        let job = JobDescription::new("echo").param("msg", "hello");
        let mut wire = Vec::new();
        RequestFramer::new(&job, &ClientConfig::default())
            .unwrap()
            .write_to(&mut wire)
            .unwrap();

        let (message, trailer) = wire.split_at(wire.len() - DIGEST_SIZE);
        let mut expected = DigestAccumulator::new();
        expected.feed(message);
        assert_eq!(trailer, expected.finish());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_attachment_subframe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        let contents: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &contents).unwrap();

        let job = JobDescription::new("load").file(&path);
        let framer = RequestFramer::new(&job, &ClientConfig::default()).unwrap();
        let expected_len = framer.wire_len();
        let body_length = framer.header().body_length as usize;

        let mut wire = Vec::new();
        framer.write_to(&mut wire).unwrap();
        assert_eq!(wire.len() as u64, expected_len);

        let file_start = JOB_HEADER_SIZE + body_length - DIGEST_SIZE;
        let header = &wire[file_start..file_start + FILE_HEADER_SIZE];
        assert_eq!(&header[..8], &(contents.len() as u64).to_le_bytes());
        assert_eq!(&header[8..11], b"csv");

        let data_start = file_start + FILE_HEADER_SIZE;
        let data_end = data_start + contents.len();
        assert_eq!(&wire[data_start..data_end], &contents[..]);
        assert_eq!(&wire[data_end..data_end + FILE_FOOTER_SIZE], &FILE_FOOTER);
    }

    #[test]
    fn test_missing_file_fails_before_writing() {
        let job = JobDescription::new("load").file("/definitely/not/here.bin");
        let result = RequestFramer::new(&job, &ClientConfig::default());
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }

    #[test]
    fn test_bad_param_fails_before_writing() {
        let job = JobDescription::new("x").param("", 1i64);
        let result = RequestFramer::new(&job, &ClientConfig::default());
        assert!(matches!(result, Err(ProtocolError::Encoding(_))));
    }
}
