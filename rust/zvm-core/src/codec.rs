//! Media types understood by the built-in getters and putters.

use std::fmt;

use crate::error::{Result, VmError};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Json,
    Json5,
    Hjson,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Json, MediaType::Json5, MediaType::Hjson];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Json5 => "application/json5",
            MediaType::Hjson => "application/hjson",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        MediaType::ALL.into_iter().find(|m| m.as_str() == s)
    }

    /// Infer the media type of a document from the suffix of its path.
    pub fn from_path_suffix(path: &str) -> Self {
        if path.ends_with(".json5") {
            MediaType::Json5
        } else if path.ends_with(".hjson") {
            MediaType::Hjson
        } else {
            MediaType::Json
        }
    }

    pub fn decode(self, text: &str) -> Result<Value> {
        match self {
            MediaType::Json => serde_json::from_str(text).map_err(|e| self.error(e)),
            MediaType::Json5 => decode_json5(text),
            MediaType::Hjson => decode_hjson(text),
        }
    }

    pub fn encode(self, value: &Value) -> Result<String> {
        match self {
            MediaType::Json => serde_json::to_string(value).map_err(|e| self.error(e)),
            MediaType::Json5 => encode_json5(value),
            // JSON is a subset of HJSON; pretty output keeps it hand-editable.
            MediaType::Hjson => {
                require_hjson()?;
                serde_json::to_string_pretty(value).map_err(|e| self.error(e))
            }
        }
    }

    fn error(self, e: impl fmt::Display) -> VmError {
        VmError::Codec {
            media_type: self.as_str(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "json5")]
fn decode_json5(text: &str) -> Result<Value> {
    json5::from_str(text).map_err(|e| MediaType::Json5.error(e))
}

#[cfg(not(feature = "json5"))]
fn decode_json5(_text: &str) -> Result<Value> {
    Err(VmError::UnsupportedMediaType(
        "json5 support not enabled".to_string(),
    ))
}

#[cfg(feature = "json5")]
fn encode_json5(value: &Value) -> Result<String> {
    json5::to_string(value).map_err(|e| MediaType::Json5.error(e))
}

#[cfg(not(feature = "json5"))]
fn encode_json5(_value: &Value) -> Result<String> {
    Err(VmError::UnsupportedMediaType(
        "json5 support not enabled".to_string(),
    ))
}

#[cfg(feature = "hjson")]
fn decode_hjson(text: &str) -> Result<Value> {
    deser_hjson::from_str(text).map_err(|e| MediaType::Hjson.error(e))
}

#[cfg(not(feature = "hjson"))]
fn decode_hjson(_text: &str) -> Result<Value> {
    require_hjson().map(|_| Value::Null)
}

fn require_hjson() -> Result<()> {
    if cfg!(feature = "hjson") {
        Ok(())
    } else {
        Err(VmError::UnsupportedMediaType(
            "hjson support not enabled".to_string(),
        ))
    }
}

/// Parse a single literal the way the REPL does: strict JSON first, then
/// JSON5 when it is available.
pub fn parse_literal(text: &str) -> Result<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(json_err) if cfg!(feature = "json5") => decode_json5(text).map_err(|_| {
            VmError::Codec {
                media_type: MediaType::Json.as_str(),
                message: json_err.to_string(),
            }
        }),
        Err(json_err) => Err(MediaType::Json.error(json_err)),
    }
}
