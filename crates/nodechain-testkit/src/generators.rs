//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use nodechain_core::{BlockHash, BlockTemplate};
use nodechain_net::{Message, DELIMITER};

/// Generate a block kind.
pub fn kind() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// Generate a timestamp in the ledger's format.
pub fn timestamp() -> impl Strategy<Value = String> {
    (2000u32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60, 0u32..1_000_000).prop_map(
        |(y, mo, d, h, mi, s, us)| format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}", y, mo, d, h, mi, s, us),
    )
}

/// Generate a JSON payload up to a small nesting depth.
pub fn payload() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "\\PC{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate a template for the first block of a chain.
pub fn genesis_template() -> impl Strategy<Value = BlockTemplate> {
    (kind(), timestamp(), payload()).prop_map(|(kind, timestamp, payload)| BlockTemplate {
        index: 1,
        previous_hash: BlockHash::sentinel(),
        kind,
        timestamp,
        payload,
    })
}

/// Generate raw bytes that do not contain the frame delimiter.
pub fn frame_body(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>().prop_filter("delimiter", |b| *b != DELIMITER), 0..=max_len)
}

/// Generate an application message of any kind.
///
/// Text messages never parse as JSON and byte messages are never valid
/// UTF-8, so each survives the decode cascade as its own kind.
pub fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        "[a-z ]{0,24}"
            .prop_filter("parses as JSON", |s| serde_json::from_str::<Value>(s).is_err())
            .prop_map(Message::Text),
        payload().prop_map(Message::Json),
        frame_body(32)
            .prop_filter("valid UTF-8", |b| std::str::from_utf8(b).is_err())
            .prop_map(Message::Bytes),
    ]
}
