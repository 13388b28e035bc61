//! Response side: parses and verifies a framed job response.
//!
//! The parser is an explicit state machine:
//!
//! ```text
//! ReadHeader -> ReadBody -> ReadFiles(n) -> VerifyDigest -> Done
//!      \____________\____________\_______________\______> Error
//! ```
//!
//! Every byte before the trailing digest goes through a [`DigestReader`],
//! so the integrity check runs only after the whole structure has been
//! parsed. A digest mismatch therefore means the response was readable
//! but corrupted.
//!
//! [`ResponseFramer`] writes the same layout from the server's side.

use crate::config::ClientConfig;
use crate::core::digest::{DigestReader, DigestWriter};
use crate::core::frame::{
    FileHeader, JobHeader, DIGEST_SIZE, FILE_FOOTER, FILE_FOOTER_SIZE, FILE_HEADER_SIZE,
    JOB_HEADER_SIZE,
};
use crate::core::params::{decode_params, encode_entries, encode_params};
use crate::core::types::{JobResult, Param, ResultFile, TypedValue};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::request::STREAMS_PARAM;
use crate::utils::metrics::global_metrics;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Internal parameter carrying the job's return code
pub const RETURN_PARAM: &str = "return";

/// Internal parameter carrying reported error lines (may repeat)
pub const ERRORS_PARAM: &str = "errors";

/// Parser position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    ReadHeader,
    ReadBody,
    ReadFiles { remaining: u64 },
    VerifyDigest,
    Done,
    Error,
}

/// Streaming parser for one response
pub struct ResponseParser<R> {
    reader: DigestReader<R>,
    state: ParseState,
    header: Option<JobHeader>,
    return_code: i32,
    error_message: Option<String>,
    values: HashMap<String, TypedValue>,
    files: Vec<ResultFile>,
    cache_byte_limit: u64,
    spool_dir: PathBuf,
    recv_chunk_size: usize,
    max_body_length: u32,
}

impl<R: Read> ResponseParser<R> {
    pub fn new(reader: R, config: &ClientConfig) -> Self {
        Self {
            reader: DigestReader::new(reader),
            state: ParseState::ReadHeader,
            header: None,
            return_code: 0,
            error_message: None,
            values: HashMap::new(),
            files: Vec::new(),
            cache_byte_limit: config.cache_byte_limit,
            spool_dir: config.spool_dir(),
            recv_chunk_size: config.recv_chunk_size.max(1),
            max_body_length: config.max_body_length,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Header of the response, once `ReadHeader` has completed
    pub fn header(&self) -> Option<JobHeader> {
        self.header
    }

    /// Run the state machine to completion
    #[instrument(skip(self), name = "parse_response")]
    pub fn parse(mut self) -> Result<JobResult> {
        while self.state != ParseState::Done {
            self.step()?;
        }

        let bytes = self.reader.digest().bytes_fed() + DIGEST_SIZE as u64;
        global_metrics().bytes_received(bytes);
        info!(
            return_code = self.return_code,
            values = self.values.len(),
            files = self.files.len(),
            bytes,
            "Response verified"
        );

        Ok(JobResult {
            values: self.values,
            files: self.files,
            return_code: self.return_code,
            error_message: self.error_message,
        })
    }

    /// Perform a single transition and return the new state.
    ///
    /// On failure the parser moves to `Error`, removes any files it spooled,
    /// and every later call returns `TransportUnusable`.
    pub fn step(&mut self) -> Result<ParseState> {
        let next = match self.state {
            ParseState::ReadHeader => self.read_header(),
            ParseState::ReadBody => self.read_body(),
            ParseState::ReadFiles { remaining } => self.read_file(remaining),
            ParseState::VerifyDigest => self.verify_digest(),
            ParseState::Done => Ok(ParseState::Done),
            ParseState::Error => Err(ProtocolError::TransportUnusable),
        };

        match next {
            Ok(state) => {
                debug!(from = ?self.state, to = ?state, "Parser transition");
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                if self.state != ParseState::Error {
                    self.state = ParseState::Error;
                    self.discard_files();
                }
                Err(e)
            }
        }
    }

    fn read_header(&mut self) -> Result<ParseState> {
        let mut bytes = [0u8; JOB_HEADER_SIZE];
        self.read_frame(&mut bytes, "job header")?;
        let header = JobHeader::from_bytes(&bytes, self.max_body_length)?;
        self.header = Some(header);
        Ok(ParseState::ReadBody)
    }

    fn read_body(&mut self) -> Result<ParseState> {
        let header = self
            .header
            .ok_or_else(|| ProtocolError::Decoding("Body read before header".into()))?;
        let mut body = vec![0u8; header.param_bytes()];
        self.read_frame(&mut body, "response body")?;

        let (internal, user) = body.split_at(header.internal_block_length as usize);
        let streams = self.apply_internal(decode_params(internal)?)?;

        for (name, value) in decode_params(user)? {
            if self.values.insert(name.clone(), value).is_some() {
                debug!(name = %name, "Duplicate result value, keeping the last");
            }
        }

        Ok(if streams > 0 {
            ParseState::ReadFiles { remaining: streams }
        } else {
            ParseState::VerifyDigest
        })
    }

    /// Interpret protocol-level parameters; returns the declared file count
    fn apply_internal(&mut self, entries: Vec<(String, TypedValue)>) -> Result<u64> {
        let mut return_code = None;
        let mut streams = 0u64;
        let mut lines: Vec<String> = Vec::new();

        for (name, value) in entries {
            match (name.as_str(), value) {
                (RETURN_PARAM, TypedValue::Integer(code)) => {
                    let code = i32::try_from(code).map_err(|_| {
                        ProtocolError::Decoding(format!("Return code {code} out of range"))
                    })?;
                    return_code = Some(code);
                }
                (STREAMS_PARAM, TypedValue::Integer(n)) => {
                    streams = u64::try_from(n).map_err(|_| {
                        ProtocolError::Decoding(format!("{} ({n})", constants::ERR_NEGATIVE_STREAMS))
                    })?;
                }
                (ERRORS_PARAM, TypedValue::String(text)) => {
                    lines.extend(
                        text.lines()
                            .filter(|l| !l.trim().is_empty())
                            .map(str::to_string),
                    );
                }
                (RETURN_PARAM | STREAMS_PARAM | ERRORS_PARAM, other) => {
                    return Err(ProtocolError::Decoding(format!(
                        "Internal parameter '{name}' has unexpected type {}",
                        other.param_type().name()
                    )));
                }
                (other, _) => debug!(name = other, "Ignoring unknown internal parameter"),
            }
        }

        let code = return_code
            .ok_or_else(|| ProtocolError::Decoding(constants::ERR_MISSING_RETURN.into()))?;
        self.return_code = code;
        self.error_message = if code != 0 {
            Some(if lines.is_empty() {
                format!("job failed with return code {code}")
            } else {
                lines.join("\n")
            })
        } else {
            if !lines.is_empty() {
                warn!(lines = lines.len(), "Dropping error lines of a successful job");
            }
            None
        };

        Ok(streams)
    }

    fn read_file(&mut self, remaining: u64) -> Result<ParseState> {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        self.read_frame(&mut bytes, "file header")?;
        let header = FileHeader::from_bytes(&bytes)?;

        // Small files go to disk and large ones stay in memory. This mirrors
        // the deployed behavior and must not be flipped without the server side.
        let file = if header.file_length <= self.cache_byte_limit {
            self.spool_file(&header)?
        } else {
            self.buffer_file(&header)?
        };
        debug!(
            name = %file.name(),
            bytes = header.file_length,
            spooled = file.is_spooled(),
            "Received file"
        );
        self.files.push(file);

        let mut footer = [0u8; FILE_FOOTER_SIZE];
        self.read_frame(&mut footer, "file footer")?;

        let remaining = remaining - 1;
        Ok(if remaining > 0 {
            ParseState::ReadFiles { remaining }
        } else {
            ParseState::VerifyDigest
        })
    }

    fn spool_file(&mut self, header: &FileHeader) -> Result<ResultFile> {
        let suffix = if header.extension.is_empty() {
            String::new()
        } else {
            format!(".{}", header.extension)
        };
        let mut temp = tempfile::Builder::new()
            .prefix("job-result-")
            .suffix(&suffix)
            .tempfile_in(&self.spool_dir)?;

        self.copy_body(header.file_length, temp.as_file_mut())?;
        temp.as_file_mut().flush()?;

        // Closing the handle happens here; the path outlives the parser.
        let path = temp.into_temp_path().keep().map_err(std::io::Error::from)?;
        global_metrics().file_spooled();
        Ok(ResultFile::Spooled { path })
    }

    fn buffer_file(&mut self, header: &FileHeader) -> Result<ResultFile> {
        let capacity = header.file_length.min(self.max_body_length as u64) as usize;
        let mut bytes = Vec::with_capacity(capacity);
        self.copy_body(header.file_length, &mut bytes)?;
        global_metrics().file_buffered();
        Ok(ResultFile::Buffered {
            name: synthesize_name(&header.extension),
            bytes,
        })
    }

    fn copy_body<W: Write>(&mut self, length: u64, sink: &mut W) -> Result<()> {
        let mut chunk = vec![0u8; self.recv_chunk_size];
        let mut remaining = length;
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            self.read_frame(&mut chunk[..want], "file body")?;
            sink.write_all(&chunk[..want])?;
            remaining -= want as u64;
        }
        Ok(())
    }

    fn verify_digest(&mut self) -> Result<ParseState> {
        let computed = self.reader.digest().finish();
        let transmitted = self
            .reader
            .read_trailer()
            .map_err(|e| ProtocolError::from_frame_read(e, "digest trailer"))?;

        if computed != transmitted {
            global_metrics().digest_mismatch();
            warn!(
                expected = %hex::encode(transmitted),
                actual = %hex::encode(computed),
                "Response digest mismatch"
            );
            return Err(ProtocolError::DigestMismatch {
                expected: hex::encode(transmitted),
                actual: hex::encode(computed),
            });
        }
        Ok(ParseState::Done)
    }

    fn read_frame(&mut self, buf: &mut [u8], frame: &str) -> Result<()> {
        self.reader
            .read_exact(buf)
            .map_err(|e| ProtocolError::from_frame_read(e, frame))
    }

    fn discard_files(&mut self) {
        for file in self.files.drain(..) {
            if let ResultFile::Spooled { ref path } = file {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove spooled file");
                }
            }
        }
    }
}

/// Unique name for a buffered file with the given extension
fn synthesize_name(extension: &str) -> String {
    let id: u64 = rand::random();
    if extension.is_empty() {
        format!("job-result-{id:016x}")
    } else {
        format!("job-result-{id:016x}.{extension}")
    }
}

/// Server-side writer producing a response in the layout the parser reads
#[derive(Debug, Clone, Default)]
pub struct ResponseFramer {
    return_code: i32,
    errors: Vec<String>,
    params: Vec<Param>,
    files: Vec<(String, Vec<u8>)>,
}

impl ResponseFramer {
    pub fn new(return_code: i32) -> Self {
        Self {
            return_code,
            ..Self::default()
        }
    }

    pub fn error_line(mut self, line: impl Into<String>) -> Self {
        self.errors.push(line.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.params.push(Param::new(name, value));
        self
    }

    pub fn file(mut self, extension: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.push((extension.into(), bytes.into()));
        self
    }

    /// Write the full response including its digest; returns bytes written
    pub fn write_to<W: Write>(&self, out: W) -> Result<u64> {
        let code = TypedValue::Integer(self.return_code as i64);
        let streams = TypedValue::Integer(self.files.len() as i64);
        let errors: Vec<TypedValue> = self
            .errors
            .iter()
            .map(|e| TypedValue::String(e.clone()))
            .collect();

        let mut entries = vec![(RETURN_PARAM, &code), (STREAMS_PARAM, &streams)];
        entries.extend(errors.iter().map(|e| (ERRORS_PARAM, e)));
        let internal = encode_entries(&entries)?;
        let user = encode_params(&self.params)?;
        let header = JobHeader::for_blocks(internal.len(), user.len())?;

        let mut writer = DigestWriter::new(out);
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&internal)?;
        writer.write_all(&user)?;
        for (extension, bytes) in &self.files {
            let file_header = FileHeader::new(bytes.len() as u64, extension.as_str())?;
            writer.write_all(&file_header.to_bytes())?;
            writer.write_all(bytes)?;
            writer.write_all(&FILE_FOOTER)?;
        }
        let (_, hashed) = writer.finish()?;
        Ok(hashed + DIGEST_SIZE as u64)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}
