//! Canonical JSON encoding for deterministic block digests.
//!
//! A block's digest is taken over a JSON object with these rules:
//! - Object keys sorted by code point
//! - `", "` between items and `": "` between key and value
//! - Non-ASCII characters escaped as `\uXXXX` (UTF-16 surrogate pairs above U+FFFF)
//!
//! The encoding is byte-for-byte the output of Python's
//! `json.dumps(value, sort_keys=True)` for integers, strings, booleans, null,
//! arrays and objects. Only the encoding matches: block digests themselves are
//! not interchangeable with the Python node's, which keys the first block to a
//! numeric `0` and reuses one hasher across nonces.
//! Floats use the shortest round-trip form, which differs from Python's `repr`
//! for exponents (`1e20` vs `1e+20`).
//!
//! The preimage object uses the field names of the on-disk record:
//!
//! ```text
//! {"data": <payload>, "id": <index>, "nonce": <nonce>,
//!  "prev_hash": <previous_hash>, "timestamp": <timestamp>, "type": <kind>}
//! ```

use std::io;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::error::CoreError;

/// Preimage object keys, in canonical (sorted) order.
pub mod keys {
    pub const DATA: &str = "data";
    pub const ID: &str = "id";
    pub const NONCE: &str = "nonce";
    pub const PREV_HASH: &str = "prev_hash";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TYPE: &str = "type";
}

/// Encode a JSON value canonically.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    Sorted(value)
        .serialize(&mut ser)
        .map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Build the full canonical preimage for a set of block fields.
pub fn block_preimage(
    index: u64,
    previous_hash: &str,
    kind: &str,
    timestamp: &str,
    payload: &Value,
    nonce: u64,
) -> Result<Vec<u8>, CoreError> {
    let parts = PreimageParts::new(index, previous_hash, kind, timestamp, payload)?;
    let mut buf = Vec::with_capacity(parts.prefix.len() + parts.suffix.len() + 20);
    parts.write_with_nonce(nonce, &mut buf);
    Ok(buf)
}

/// The preimage split around the nonce.
///
/// `nonce` sorts between `id` and `prev_hash`, so everything before and after
/// it is fixed for a given template. The proof-of-work loop encodes the two
/// halves once and only formats the nonce per attempt.
#[derive(Debug, Clone)]
pub struct PreimageParts {
    pub prefix: Vec<u8>,
    pub suffix: Vec<u8>,
}

impl PreimageParts {
    /// Encode the fixed halves of the preimage.
    pub fn new(
        index: u64,
        previous_hash: &str,
        kind: &str,
        timestamp: &str,
        payload: &Value,
    ) -> Result<Self, CoreError> {
        let mut prefix = Vec::new();
        prefix.push(b'{');
        push_key(&mut prefix, keys::DATA, true)?;
        prefix.extend_from_slice(&canonical_json(payload)?);
        push_key(&mut prefix, keys::ID, false)?;
        prefix.extend_from_slice(index.to_string().as_bytes());
        push_key(&mut prefix, keys::NONCE, false)?;

        let mut suffix = Vec::new();
        push_key(&mut suffix, keys::PREV_HASH, false)?;
        suffix.extend_from_slice(&canonical_json(&Value::String(previous_hash.to_string()))?);
        push_key(&mut suffix, keys::TIMESTAMP, false)?;
        suffix.extend_from_slice(&canonical_json(&Value::String(timestamp.to_string()))?);
        push_key(&mut suffix, keys::TYPE, false)?;
        suffix.extend_from_slice(&canonical_json(&Value::String(kind.to_string()))?);
        suffix.push(b'}');

        Ok(Self { prefix, suffix })
    }

    /// Write `prefix || nonce || suffix` into `buf` (which is cleared first).
    pub fn write_with_nonce(&self, nonce: u64, buf: &mut Vec<u8>) {
        buf.clear();
        buf.extend_from_slice(&self.prefix);
        buf.extend_from_slice(nonce.to_string().as_bytes());
        buf.extend_from_slice(&self.suffix);
    }
}

fn push_key(buf: &mut Vec<u8>, key: &str, first: bool) -> Result<(), CoreError> {
    if !first {
        buf.extend_from_slice(b", ");
    }
    buf.extend_from_slice(&canonical_json(&Value::String(key.to_string()))?);
    buf.extend_from_slice(b": ");
    Ok(())
}

/// Serializes a [`Value`] with object keys sorted regardless of how the map
/// was built.
struct Sorted<'a>(&'a Value);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Sorted(item))?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Sorted(value))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

/// JSON formatter with spaced separators and ASCII-only output.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units).iter() {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
