//! Block validation: digest, proof-of-work, and chain linkage checks.

use crate::block::Block;
use crate::error::ValidationError;
use crate::pow::meets_difficulty;
use crate::types::BlockHash;

/// Validate a block's structure and seal without chain context.
///
/// This performs:
/// - Index and sentinel consistency (index 1 links to the sentinel, later
///   blocks link to a real digest)
/// - Hash format check
/// - Recomputed hash comparison
/// - Proof-of-work target check
pub fn validate_block_structure(block: &Block, difficulty: usize) -> Result<(), ValidationError> {
    // 1. Index is 1-based
    if block.index == 0 {
        return Err(ValidationError::InvalidIndex {
            expected: 1,
            got: 0,
        });
    }

    // 2. Only the first block may use the sentinel
    if block.is_first() && !block.previous_hash.is_sentinel() {
        return Err(ValidationError::InvalidPrevious {
            expected: BlockHash::sentinel(),
            got: block.previous_hash.clone(),
        });
    }
    if !block.is_first() && !block.previous_hash.is_well_formed() {
        return Err(ValidationError::StructuralError(format!(
            "block {} has a malformed previous hash",
            block.index
        )));
    }

    // 3. Hash is a full digest
    if !block.hash.is_well_formed() {
        return Err(ValidationError::StructuralError(format!(
            "block {} has a malformed hash",
            block.index
        )));
    }

    // 4. Hash matches contents
    let computed = block.compute_hash()?;
    if computed != block.hash {
        return Err(ValidationError::HashMismatch {
            claimed: block.hash.clone(),
            computed,
        });
    }

    // 5. Work target met
    if !meets_difficulty(&block.hash, difficulty) {
        return Err(ValidationError::InsufficientWork { difficulty });
    }

    Ok(())
}

/// Validate that `block` extends `tip` (or starts an empty chain).
pub fn validate_successor(block: &Block, tip: Option<&Block>) -> Result<(), ValidationError> {
    let (expected_index, expected_previous) = match tip {
        Some(tip) => (tip.index + 1, tip.hash.clone()),
        None => (1, BlockHash::sentinel()),
    };

    if block.index != expected_index {
        return Err(ValidationError::InvalidIndex {
            expected: expected_index,
            got: block.index,
        });
    }

    if block.previous_hash != expected_previous {
        return Err(ValidationError::InvalidPrevious {
            expected: expected_previous,
            got: block.previous_hash.clone(),
        });
    }

    Ok(())
}

/// Full validation: structure, seal, and linkage to `tip`.
pub fn validate_block(
    block: &Block,
    tip: Option<&Block>,
    difficulty: usize,
) -> Result<(), ValidationError> {
    validate_block_structure(block, difficulty)?;
    validate_successor(block, tip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockTemplate;
    use crate::pow::seal;
    use serde_json::json;

    const DIFFICULTY: usize = 1;

    fn genesis() -> Block {
        seal(BlockTemplate::genesis("t1", json!("x")), DIFFICULTY).unwrap()
    }

    fn child(tip: &Block) -> Block {
        seal(BlockTemplate::on_top_of(tip, "t2", json!("y")), DIFFICULTY).unwrap()
    }

    #[test]
    fn test_valid_genesis() {
        let block = genesis();
        assert!(validate_block(&block, None, DIFFICULTY).is_ok());
    }

    #[test]
    fn test_valid_child() {
        let first = genesis();
        let second = child(&first);
        assert!(validate_block(&second, Some(&first), DIFFICULTY).is_ok());
    }

    #[test]
    fn test_tampered_payload() {
        let mut block = genesis();
        block.payload = json!("tampered");

        let result = validate_block_structure(&block, DIFFICULTY);
        assert!(matches!(result, Err(ValidationError::HashMismatch { .. })));
    }

    #[test]
    fn test_insufficient_work() {
        let block = seal(BlockTemplate::genesis("t", json!(1)), 0).unwrap();
        if block.hash.leading_zeros() < 4 {
            let result = validate_block_structure(&block, 4);
            assert!(matches!(
                result,
                Err(ValidationError::InsufficientWork { difficulty: 4 })
            ));
        }
    }

    #[test]
    fn test_zero_index() {
        let mut block = genesis();
        block.index = 0;
        let result = validate_block_structure(&block, DIFFICULTY);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidIndex { expected: 1, got: 0 })
        ));
    }

    #[test]
    fn test_first_block_must_use_sentinel() {
        let first = genesis();
        let mut fake = seal(
            BlockTemplate::on_top_of(&first, "t", json!(null)),
            DIFFICULTY,
        )
        .unwrap();
        fake.index = 1;
        let result = validate_block_structure(&fake, DIFFICULTY);
        assert!(matches!(result, Err(ValidationError::InvalidPrevious { .. })));
    }

    #[test]
    fn test_wrong_index_for_tip() {
        let first = genesis();
        let second = child(&first);
        let result = validate_successor(&second, None);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidIndex { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_broken_linkage() {
        let first = genesis();
        let other = seal(BlockTemplate::genesis("other", json!("z")), DIFFICULTY).unwrap();
        let second = child(&other);

        let result = validate_successor(&second, Some(&first));
        // Same index, different previous hash (unless the two genesis blocks collide)
        if other.hash != first.hash {
            assert!(matches!(result, Err(ValidationError::InvalidPrevious { .. })));
        }
    }

    #[test]
    fn test_malformed_hash() {
        let mut block = genesis();
        block.hash = BlockHash::from_hex_unchecked("00zz");
        let result = validate_block_structure(&block, DIFFICULTY);
        assert!(matches!(result, Err(ValidationError::StructuralError(_))));
    }
}
