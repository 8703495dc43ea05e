//! Block: a sealed, append-only ledger entry.
//!
//! A block is built from a [`BlockTemplate`] (index, link, kind, timestamp,
//! payload) by searching for a nonce whose digest meets the difficulty target.
//! See [`crate::pow::seal`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{block_preimage, PreimageParts};
use crate::error::CoreError;
use crate::pow::digest;
use crate::types::BlockHash;

/// Field order of the ledger record tuple exchanged between peers.
pub const RECORD_FIELDS: [&str; 7] = [
    "index",
    "previous_hash",
    "kind",
    "timestamp",
    "payload",
    "nonce",
    "hash",
];

/// Local time as an ISO-8601 string with microsecond precision.
pub fn now_timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// The unsealed fields of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: BlockHash,
    pub kind: String,
    pub timestamp: String,
    pub payload: Value,
}

impl BlockTemplate {
    /// Template for the first block of an empty chain.
    pub fn genesis(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            index: 1,
            previous_hash: BlockHash::sentinel(),
            kind: kind.into(),
            timestamp: now_timestamp(),
            payload,
        }
    }

    /// Template for the block following `tip`.
    pub fn on_top_of(tip: &Block, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            index: tip.index + 1,
            previous_hash: tip.hash.clone(),
            kind: kind.into(),
            timestamp: now_timestamp(),
            payload,
        }
    }

    /// Template following `tip`, or the genesis template when the chain is empty.
    pub fn next(tip: Option<&Block>, kind: impl Into<String>, payload: Value) -> Self {
        match tip {
            Some(tip) => Self::on_top_of(tip, kind, payload),
            None => Self::genesis(kind, payload),
        }
    }

    /// Override the timestamp (deterministic tests, replayed data).
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Encode the fixed halves of the canonical preimage.
    pub fn preimage_parts(&self) -> Result<PreimageParts, CoreError> {
        PreimageParts::new(
            self.index,
            self.previous_hash.as_str(),
            &self.kind,
            &self.timestamp,
            &self.payload,
        )
    }

    /// Attach a nonce and hash, producing a block.
    pub fn into_block(self, nonce: u64, hash: BlockHash) -> Block {
        Block {
            index: self.index,
            previous_hash: self.previous_hash,
            kind: self.kind,
            timestamp: self.timestamp,
            payload: self.payload,
            nonce,
            hash,
        }
    }
}

/// A sealed block.
///
/// Invariant (checked by [`crate::validation`], not by construction):
/// `hash == digest(canonical(index, previous_hash, kind, timestamp, payload, nonce))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain.
    pub index: u64,
    /// Hash of the block at `index - 1`, or the sentinel for index 1.
    pub previous_hash: BlockHash,
    /// Application-defined tag.
    pub kind: String,
    /// ISO-8601 creation time.
    pub timestamp: String,
    /// Arbitrary structured payload.
    pub payload: Value,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Hex digest of the canonical preimage.
    pub hash: BlockHash,
}

impl Block {
    /// Recompute the digest from the block's fields.
    pub fn compute_hash(&self) -> Result<BlockHash, CoreError> {
        let preimage = block_preimage(
            self.index,
            self.previous_hash.as_str(),
            &self.kind,
            &self.timestamp,
            &self.payload,
            self.nonce,
        )?;
        Ok(digest(&preimage))
    }

    /// Whether this block claims to be the first in its chain.
    pub fn is_first(&self) -> bool {
        self.index == 1
    }

    /// Encode as the record tuple
    /// `[index, previous_hash, kind, timestamp, payload, nonce, hash]`.
    pub fn to_record(&self) -> Value {
        Value::Array(vec![
            Value::from(self.index),
            Value::String(self.previous_hash.as_str().to_string()),
            Value::String(self.kind.clone()),
            Value::String(self.timestamp.clone()),
            self.payload.clone(),
            Value::from(self.nonce),
            Value::String(self.hash.as_str().to_string()),
        ])
    }

    /// Decode a record tuple.
    ///
    /// Accepts the lenient encodings older nodes produce: a numeric `0` for
    /// the sentinel previous hash and the nonce as a decimal string.
    pub fn from_record(record: &Value) -> Result<Self, CoreError> {
        let fields = record
            .as_array()
            .ok_or_else(|| CoreError::MalformedRecord("record is not an array".into()))?;

        if fields.len() != RECORD_FIELDS.len() {
            return Err(CoreError::MalformedRecord(format!(
                "expected {} fields, got {}",
                RECORD_FIELDS.len(),
                fields.len()
            )));
        }

        let index = fields[0]
            .as_u64()
            .ok_or_else(|| CoreError::MalformedRecord("index is not a non-negative integer".into()))?;

        let previous_hash = match &fields[1] {
            Value::String(s) => BlockHash::from(s.clone()),
            Value::Number(n) if n.as_u64() == Some(0) => BlockHash::sentinel(),
            _ => return Err(CoreError::MalformedRecord("previous_hash is not a string".into())),
        };

        let kind = text_field(&fields[2], "kind")?;
        let timestamp = text_field(&fields[3], "timestamp")?;
        let payload = fields[4].clone();

        let nonce = match &fields[5] {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| CoreError::MalformedRecord("nonce is not a non-negative integer".into()))?;

        let hash = BlockHash::from(text_field(&fields[6], "hash")?);

        Ok(Self {
            index,
            previous_hash,
            kind,
            timestamp,
            payload,
            nonce,
            hash,
        })
    }

    /// Decode either a record tuple or an object with [`Block`]'s field names.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::Array(_) => Self::from_record(value),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| CoreError::MalformedRecord(e.to_string())),
            _ => Err(CoreError::MalformedRecord(
                "expected an array or an object".into(),
            )),
        }
    }
}

fn text_field(value: &Value, name: &str) -> Result<String, CoreError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CoreError::MalformedRecord(format!("{} is not a string", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_block() -> Block {
        BlockTemplate::genesis("t1", json!("x"))
            .timestamp("2024-01-01T00:00:00.000000")
            .into_block(42, BlockHash::from_digest(&[0x11; 64]))
    }

    #[test]
    fn test_genesis_template() {
        let template = BlockTemplate::genesis("kind", json!({"a": 1}));
        assert_eq!(template.index, 1);
        assert!(template.previous_hash.is_sentinel());
    }

    #[test]
    fn test_template_on_top_of_links() {
        let tip = sample_block();
        let next = BlockTemplate::on_top_of(&tip, "t2", json!("y"));
        assert_eq!(next.index, 2);
        assert_eq!(next.previous_hash, tip.hash);
    }

    #[test]
    fn test_record_shape() {
        let block = sample_block();
        let record = block.to_record();
        let fields = record.as_array().unwrap();

        assert_eq!(fields.len(), RECORD_FIELDS.len());
        assert_eq!(fields[0], json!(1));
        assert_eq!(fields[1], json!("0"));
        assert_eq!(fields[2], json!("t1"));
        assert_eq!(fields[5], json!(42));
    }

    #[test]
    fn test_record_decodes_back() {
        let block = sample_block();
        assert_eq!(Block::from_record(&block.to_record()).unwrap(), block);
    }

    #[test]
    fn test_record_lenient_fields() {
        let record = json!([1, 0, "t", "ts", "data", "17", "ff"]);
        let block = Block::from_record(&record).unwrap();
        assert!(block.previous_hash.is_sentinel());
        assert_eq!(block.nonce, 17);
    }

    #[test]
    fn test_record_wrong_arity() {
        let record = json!([1, "0", "t"]);
        assert!(matches!(
            Block::from_record(&record),
            Err(CoreError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_record_negative_index_rejected() {
        let record = json!([-1, "0", "t", "ts", null, 0, "ff"]);
        assert!(Block::from_record(&record).is_err());
    }

    #[test]
    fn test_from_value_accepts_object() {
        let block = sample_block();
        let object = serde_json::to_value(&block).unwrap();
        assert_eq!(Block::from_value(&object).unwrap(), block);
        assert!(Block::from_value(&json!("hello")).is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        // YYYY-MM-DDTHH:MM:SS.ffffff
        assert_eq!(ts.len(), 26);
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }
}
