//! Canonical JSON serialization for integrity hashing.
//!
//! Audit entries are hashed over a canonical text form so that verification
//! is independent of field order or formatting:
//!
//! - Object keys sorted lexicographically (byte order)
//! - No whitespace between tokens
//! - Integer-only numbers (floats are rejected)
//! - Minimal string escaping
//! - Bounded nesting depth

use std::fmt::Write as _;

use serde_json::Value;
use thiserror::Error;

/// Maximum nesting depth accepted during canonicalization.
pub const MAX_DEPTH: usize = 64;

/// Errors that can occur during canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// A floating-point number was encountered.
    ///
    /// Canonical form requires integer-only numbers so the byte
    /// representation is deterministic across platforms.
    #[error("float not allowed in canonical form")]
    FloatNotAllowed,

    /// Nesting exceeded [`MAX_DEPTH`].
    #[error("nesting depth exceeds {MAX_DEPTH}")]
    TooDeep,
}

/// Produces the canonical text form of a JSON value.
///
/// # Errors
///
/// Returns an error if the value contains a float or nests too deeply.
pub fn canonicalize(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_value(&mut out, value, 0)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::TooDeep);
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let _ = write!(out, "{i}");
            } else if let Some(u) = n.as_u64() {
                let _ = write!(out, "{u}");
            } else {
                return Err(CanonicalError::FloatNotAllowed);
            }
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json's default map is already key-ordered; sort
            // explicitly so canonical form does not depend on that.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()], depth + 1)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
