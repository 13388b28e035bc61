//! Data model shared by the request and response sides.

use crate::error::{ProtocolError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Wire type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Double,
    DateTime,
    Base64,
}

impl ParamType {
    /// Discriminant written into a description entry
    pub fn type_id(self) -> u32 {
        match self {
            ParamType::String => 0,
            ParamType::Integer => 1,
            ParamType::Boolean => 2,
            ParamType::Double => 3,
            ParamType::DateTime => 4,
            ParamType::Base64 => 5,
        }
    }

    /// Resolve a discriminant read from the wire
    pub fn from_type_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(ParamType::String),
            1 => Some(ParamType::Integer),
            2 => Some(ParamType::Boolean),
            3 => Some(ParamType::Double),
            4 => Some(ParamType::DateTime),
            5 => Some(ParamType::Base64),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            ParamType::String => "String",
            ParamType::Integer => "Integer",
            ParamType::Boolean => "Boolean",
            ParamType::Double => "Double",
            ParamType::DateTime => "DateTime",
            ParamType::Base64 => "Base64",
        }
    }
}

/// A parameter value tagged with its wire type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Double(f64),
    DateTime(NaiveDateTime),
    /// Raw payload, carried as base64 text on the wire
    Base64(Vec<u8>),
}

impl TypedValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            TypedValue::String(_) => ParamType::String,
            TypedValue::Integer(_) => ParamType::Integer,
            TypedValue::Boolean(_) => ParamType::Boolean,
            TypedValue::Double(_) => ParamType::Double,
            TypedValue::DateTime(_) => ParamType::DateTime,
            TypedValue::Base64(_) => ParamType::Base64,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TypedValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of `String` values, and of `Base64` payloads that hold UTF-8
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(v) => Some(v),
            TypedValue::Base64(v) => std::str::from_utf8(v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TypedValue::Base64(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::String(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Integer(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Boolean(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Double(value)
    }
}

impl From<NaiveDateTime> for TypedValue {
    fn from(value: NaiveDateTime) -> Self {
        TypedValue::DateTime(value)
    }
}

/// Named input argument to a job
///
/// The wire type is the tag of `value`, so a parameter can never declare
/// one type and carry another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: TypedValue,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn param_type(&self) -> ParamType {
        self.value.param_type()
    }
}

/// What to call: method name, arguments and files to attach
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub method: String,
    pub params: Vec<Param>,
    pub files: Vec<PathBuf>,
}

impl JobDescription {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.params.push(Param::new(name, value));
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }
}

/// A file returned by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultFile {
    /// Written to a temporary file the caller now owns
    Spooled { path: PathBuf },
    /// Held in memory
    Buffered { name: String, bytes: Vec<u8> },
}

impl ResultFile {
    /// File name (the final path component for spooled files)
    pub fn name(&self) -> String {
        match self {
            ResultFile::Spooled { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ResultFile::Buffered { name, .. } => name.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ResultFile::Spooled { path } => Some(path),
            ResultFile::Buffered { .. } => None,
        }
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, ResultFile::Spooled { .. })
    }

    /// Size of the file contents in bytes
    pub fn len(&self) -> Result<u64> {
        match self {
            ResultFile::Spooled { path } => Ok(fs::metadata(path)?.len()),
            ResultFile::Buffered { bytes, .. } => Ok(bytes.len() as u64),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Full contents, read from disk for spooled files
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ResultFile::Spooled { path } => Ok(fs::read(path)?),
            ResultFile::Buffered { bytes, .. } => Ok(bytes.clone()),
        }
    }

    /// Delete the backing temporary file, if any
    pub fn remove(self) -> Result<()> {
        match self {
            ResultFile::Spooled { path } => fs::remove_file(path).map_err(ProtocolError::Io),
            ResultFile::Buffered { .. } => Ok(()),
        }
    }
}

/// Decoded outcome of one job call
///
/// `error_message` is `Some` exactly when `return_code != 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub values: HashMap<String, TypedValue>,
    pub files: Vec<ResultFile>,
    pub return_code: i32,
    pub error_message: Option<String>,
}

impl JobResult {
    pub fn value(&self, name: &str) -> Option<&TypedValue> {
        self.values.get(name)
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }

    /// Turn a non-zero return code into `ProtocolError::Remote`.
    ///
    /// Spooled files of a failed job are removed since the caller never
    /// sees them.
    pub fn into_checked(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        for file in self.files {
            let path = file.path().map(Path::to_path_buf);
            if let Err(e) = file.remove() {
                if let Some(path) = path {
                    warn!(path = %path.display(), error = %e, "Failed to remove spooled file");
                }
            }
        }
        Err(ProtocolError::Remote {
            code: self.return_code,
            message: self.error_message.unwrap_or_default(),
        })
    }
}
