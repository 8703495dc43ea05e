//! Golden test vectors for deterministic verification.
//!
//! Each vector fixes every input of a block and records the nonce and hash
//! that sealing must find. The digests are compatible with nodes that hash
//! Python-style `json.dumps(..., sort_keys=True)` output.

use serde_json::Value;

use nodechain_core::{block_preimage, digest, seal, Block, BlockHash, BlockTemplate, CoreError};

/// Timestamp shared by the vectors.
pub const VECTOR_TIMESTAMP: &str = "2024-01-01T00:00:00.000000";

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub index: u64,
    pub previous_hash: &'static str,
    pub kind: &'static str,
    pub timestamp: &'static str,
    /// Payload as JSON text.
    pub payload: &'static str,
    pub difficulty: usize,
    /// Smallest nonce meeting `difficulty`.
    pub expected_nonce: u64,
    /// Expected block hash (hex).
    pub expected_hash: &'static str,
}

impl GoldenVector {
    pub fn payload_value(&self) -> Value {
        serde_json::from_str(self.payload).unwrap_or(Value::Null)
    }

    pub fn template(&self) -> BlockTemplate {
        BlockTemplate {
            index: self.index,
            previous_hash: BlockHash::from(self.previous_hash.to_string()),
            kind: self.kind.to_string(),
            timestamp: self.timestamp.to_string(),
            payload: self.payload_value(),
        }
    }
}

/// Digest of the first vector's preimage with nonce 0.
pub const FIRST_PREIMAGE_NONCE0_HASH: &str = "12ae8b39cc5e69c6dce3e10afe3d0a25de7ca7737368d494cdb669f5cc27b95012aab1be5aa9f43316eead7149f79b13d17abf331efcf01cbb4ed76e383167a2";

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "first block with text payload",
            index: 1,
            previous_hash: "0",
            kind: "t1",
            timestamp: VECTOR_TIMESTAMP,
            payload: r#""x""#,
            difficulty: 2,
            expected_nonce: 681,
            expected_hash: "006a12aa7a96df3796fb442c869356369a1eb26ad8e65a587291a8fe9d2f73dbc5be6bb98e389a816fc91eadabd93bffcfae92ee97ddacfd8e7c91292cea2f63",
        },
        GoldenVector {
            name: "second block linked to the first",
            index: 2,
            previous_hash: "006a12aa7a96df3796fb442c869356369a1eb26ad8e65a587291a8fe9d2f73dbc5be6bb98e389a816fc91eadabd93bffcfae92ee97ddacfd8e7c91292cea2f63",
            kind: "t2",
            timestamp: "2024-01-01T00:00:01.000000",
            payload: r#""y""#,
            difficulty: 2,
            expected_nonce: 67,
            expected_hash: "00158feb006a289a4c2f09540fa3d9263ac383917fe7e35decc8712cca0e327af58a830ce458b1a62af5faa6c4095055b62df5854dba423b568e6ae8a7ff6f62",
        },
        GoldenVector {
            name: "object payload with non-ascii text",
            index: 1,
            previous_hash: "0",
            kind: "transfer",
            timestamp: VECTOR_TIMESTAMP,
            payload: r#"{"to":"bob","amount":5,"memo":"café"}"#,
            difficulty: 3,
            expected_nonce: 6344,
            expected_hash: "000c311bccb58184232d009c76d8657b0b181aba5faedb3d79e6c34a64ecc51b5c8d4b8eb91c50843c1fd138f4c5b81543bce280ba46eba6aeb8b675583f2e76",
        },
    ]
}

/// The block a vector describes, with its expected nonce and hash.
pub fn block_from_vector(vector: &GoldenVector) -> Block {
    vector.template().into_block(
        vector.expected_nonce,
        BlockHash::from(vector.expected_hash.to_string()),
    )
}

/// Seal a vector's template from scratch.
pub fn seal_vector(vector: &GoldenVector) -> Result<Block, CoreError> {
    seal(vector.template(), vector.difficulty)
}

/// Check every vector, returning the first mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    let first = &all_vectors()[0];
    let preimage = block_preimage(
        first.index,
        first.previous_hash,
        first.kind,
        first.timestamp,
        &first.payload_value(),
        0,
    )
    .map_err(|e| e.to_string())?;
    if digest(&preimage).as_str() != FIRST_PREIMAGE_NONCE0_HASH {
        return Err(format!("{}: nonce 0 digest mismatch", first.name));
    }

    for vector in all_vectors() {
        let block = seal_vector(&vector).map_err(|e| format!("{}: {}", vector.name, e))?;
        if block.nonce != vector.expected_nonce {
            return Err(format!(
                "{}: nonce {} != expected {}",
                vector.name, block.nonce, vector.expected_nonce
            ));
        }
        if block.hash.as_str() != vector.expected_hash {
            return Err(format!("{}: hash mismatch", vector.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_verify() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_vector_blocks_recompute() {
        for vector in all_vectors() {
            let block = block_from_vector(&vector);
            assert_eq!(block.compute_hash().unwrap(), block.hash, "{}", vector.name);
        }
    }
}
