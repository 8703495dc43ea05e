//! Property tests over generated blocks and messages.

use proptest::prelude::*;

use nodechain_core::{digest, meets_difficulty, seal, validate_block, Block};
use nodechain_net::{FrameDecoder, Framing, Message};
use nodechain_testkit::generators::{frame_body, genesis_template, message};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sealed_nonce_is_minimal(template in genesis_template()) {
        let block = seal(template.clone(), 1).unwrap();
        prop_assert!(meets_difficulty(&block.hash, 1));
        validate_block(&block, None, 1).unwrap();

        let parts = template.preimage_parts().unwrap();
        let mut buf = Vec::new();
        for nonce in 0..block.nonce {
            parts.write_with_nonce(nonce, &mut buf);
            prop_assert!(!meets_difficulty(&digest(&buf), 1));
        }
    }

    #[test]
    fn prop_record_round_trip(template in genesis_template()) {
        let block = seal(template, 1).unwrap();
        let decoded = Block::from_value(&block.to_record()).unwrap();
        prop_assert_eq!(decoded, block);
    }

    #[test]
    fn prop_messages_survive_both_framings(
        messages in prop::collection::vec(message(), 1..6),
        chunk in 1usize..17,
    ) {
        for framing in [Framing::Delimited, Framing::LengthPrefixed] {
            let mut wire = Vec::new();
            for m in &messages {
                wire.extend(framing.encode(m).unwrap());
            }

            // Feed the stream in arbitrary chunk sizes.
            let mut decoder = FrameDecoder::new(framing);
            let mut decoded = Vec::new();
            for piece in wire.chunks(chunk) {
                decoder.extend(piece);
                while let Some(frame) = decoder.next_frame().unwrap() {
                    decoded.push(Message::decode(&frame));
                }
            }
            prop_assert_eq!(&decoded, &messages);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn prop_length_prefix_carries_any_bytes(body in frame_body(64), extra in any::<u8>()) {
        let mut bytes = body;
        bytes.push(extra);
        let frame = Framing::LengthPrefixed.encode_payload(&bytes).unwrap();

        let mut decoder = FrameDecoder::new(Framing::LengthPrefixed);
        decoder.extend(&frame);
        let payload = decoder.next_frame().unwrap().unwrap();
        prop_assert_eq!(payload.as_ref(), bytes.as_slice());
    }
}
