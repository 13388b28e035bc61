//! # Job Protocol
//!
//! Request framing, response parsing and the call orchestration tying them
//! to a transport.
//!
//! The protocol is strictly single-flight: one request, then one response,
//! on a transport owned exclusively for the duration of the call.

pub mod caller;
pub mod request;
pub mod response;
