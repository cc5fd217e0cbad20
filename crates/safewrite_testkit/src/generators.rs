//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for generating one write's payload (arbitrary bytes).
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for generating a sequence of writes, possibly empty.
pub fn write_sequence_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 0..16)
}

/// Strategy for generating text with multi-byte characters.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just('a'),
            Just('\n'),
            Just('é'),
            Just('€'),
            Just('𝄞'),
            any::<char>(),
        ],
        0..256,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// Strategy for generating chunk sizes small enough to split payloads.
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..64
}

/// Strategy for generating file names that are safe on every platform.
pub fn file_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}\\.(txt|json|bin)").expect("Invalid regex")
}
