//! # Core Protocol Components
//!
//! Data model, parameter codec, fixed frames and the running digest.
//!
//! ## Components
//! - **Types**: `Param`, `TypedValue`, `JobDescription`, `ResultFile`, `JobResult`
//! - **Params**: parameter block encoding and decoding
//! - **Frame**: job header, file header and file footer
//! - **Digest**: SHA-1 accumulator and hashing stream wrappers
//!
//! ## Message Layout
//! ```text
//! [JobHeader(20)] [internal params] [user params]
//! ([FileHeader(32)] [bytes] [FileFooter(20)])*
//! [SHA-1(20)]
//! ```
//!
//! ## Safety Limits
//! - Response bodies are capped by `max_body_length` (16MB default)
//! - Parameter names are capped at 64 KiB
//! - All offsets are bounds-checked before slicing

pub mod digest;
pub mod frame;
pub mod params;
pub mod types;
