//! # jobwire
//!
//! Client core for a binary job-invocation protocol: call a named remote
//! job with typed parameters and attached files over an established byte
//! stream (TCP, TLS, pipe), and get back typed results and returned files.
//!
//! ## Architecture
//! - **core**: data model, parameter codec, fixed frames, SHA-1 accumulator
//! - **protocol**: request framer, response parser, job caller
//! - **config**: tuning and logging configuration
//! - **utils**: logging setup and metrics
//!
//! ## Integrity
//! Every message ends with a SHA-1 digest over all bytes that preceded it
//! in the same direction. The response digest is verified after the whole
//! structure has been parsed.
//!
//! ## Transport ownership
//! Connection setup, TLS, timeouts and retries belong to the caller. A call
//! owns the transport until the response digest has been read; any failure
//! after the first byte is written leaves the stream out of sync, and the
//! transport must be dropped.
//!
//! ## Example
//! ```no_run
//! use jobwire::{JobCaller, JobDescription, TypedValue};
//! use std::net::TcpStream;
//!
//! # fn main() -> jobwire::error::Result<()> {
//! let mut caller = JobCaller::new(TcpStream::connect("10.0.0.5:7400")?);
//! let result = caller.call(&JobDescription::new("sum").param("a", 2i64).param("b", 3i64))?;
//! assert_eq!(result.value("total"), Some(&TypedValue::Integer(5)));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use crate::core::digest::DigestAccumulator;
pub use crate::core::params::{decode_params, encode_params};
pub use crate::core::types::{
    JobDescription, JobResult, Param, ParamType, ResultFile, TypedValue,
};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::caller::JobCaller;
pub use crate::protocol::request::RequestFramer;
pub use crate::protocol::response::{ParseState, ResponseFramer, ResponseParser};
