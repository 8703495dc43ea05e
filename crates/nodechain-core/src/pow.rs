//! Proof-of-work: SHA-512 digests with a leading-zero-digit target.

use sha2::{Digest, Sha512};

use crate::block::{Block, BlockTemplate};
use crate::error::CoreError;
use crate::types::{BlockHash, HASH_HEX_LEN};

/// Difficulty used when none is configured.
pub const DEFAULT_DIFFICULTY: usize = 5;

/// SHA-512 of `data` as a lowercase hex [`BlockHash`].
pub fn digest(data: &[u8]) -> BlockHash {
    BlockHash::from_digest(&Sha512::digest(data))
}

/// Whether `hash` starts with at least `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &BlockHash, difficulty: usize) -> bool {
    hash.leading_zeros() >= difficulty
}

/// Seal a template by searching nonces upward from zero.
///
/// The returned nonce is the smallest one whose digest meets `difficulty`.
/// This is CPU-bound; async callers should run it on a blocking thread.
pub fn seal(template: BlockTemplate, difficulty: usize) -> Result<Block, CoreError> {
    if difficulty > HASH_HEX_LEN {
        return Err(CoreError::EncodingError(format!(
            "difficulty {} exceeds digest length {}",
            difficulty, HASH_HEX_LEN
        )));
    }

    let parts = template.preimage_parts()?;
    let mut buf = Vec::with_capacity(parts.prefix.len() + parts.suffix.len() + 20);
    let mut nonce: u64 = 0;

    loop {
        parts.write_with_nonce(nonce, &mut buf);
        let hash = digest(&buf);
        if meets_difficulty(&hash, difficulty) {
            return Ok(template.into_block(nonce, hash));
        }
        nonce = nonce
            .checked_add(1)
            .ok_or_else(|| CoreError::EncodingError("nonce space exhausted".into()))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const TS: &str = "2024-01-01T00:00:00.000000";

    #[test]
    fn test_digest_is_sha512_hex() {
        let h = digest(b"abc");
        assert!(h.is_well_formed());
        assert!(h.as_str().starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn test_difficulty_zero_accepts_first_nonce() {
        let block = seal(BlockTemplate::genesis("t", json!(null)), 0).unwrap();
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn test_seal_golden() {
        let template = BlockTemplate::genesis("t1", json!("x")).timestamp(TS);
        let block = seal(template, 2).unwrap();

        assert_eq!(block.nonce, 681);
        assert_eq!(
            block.hash.as_str(),
            "006a12aa7a96df3796fb442c869356369a1eb26ad8e65a587291a8fe9d2f73dbc5be6bb98e389a816fc91eadabd93bffcfae92ee97ddacfd8e7c91292cea2f63"
        );
        assert_eq!(block.compute_hash().unwrap(), block.hash);
    }

    #[test]
    fn test_difficulty_out_of_range() {
        let template = BlockTemplate::genesis("t", json!(null));
        assert!(seal(template, HASH_HEX_LEN + 1).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn seal_finds_smallest_nonce(
            difficulty in 0usize..=2,
            kind in "[a-z]{1,8}",
            text in ".{0,16}",
            index in 1u64..1000,
        ) {
            let template = BlockTemplate {
                index,
                previous_hash: BlockHash::sentinel(),
                kind,
                timestamp: TS.to_string(),
                payload: json!(text),
            };
            let block = seal(template, difficulty).unwrap();

            prop_assert!(meets_difficulty(&block.hash, difficulty));
            prop_assert_eq!(block.compute_hash().unwrap(), block.hash.clone());

            for smaller in 0..block.nonce {
                let mut candidate = block.clone();
                candidate.nonce = smaller;
                prop_assert!(!meets_difficulty(&candidate.compute_hash().unwrap(), difficulty));
            }
        }
    }
}
