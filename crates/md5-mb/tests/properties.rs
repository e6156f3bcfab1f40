//! Property tests: the scheduler agrees with the reference for any input.

mod common;

use common::{hash_chunked, hash_entire, kernels, reference};
use md5_mb::digest_batch;
use proptest::prelude::*;

fn inputs_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..=300), 0..=24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn entire_submissions_match_reference(inputs in inputs_strategy()) {
        let expected: Vec<_> = inputs.iter().map(|input| reference(input)).collect();
        for kernel in kernels() {
            prop_assert_eq!(hash_entire(kernel, &inputs), expected.clone());
        }
    }

    #[test]
    fn interleaved_chunks_match_reference(
        inputs in inputs_strategy(),
        chunk in 1usize..=200,
        seed in any::<u64>(),
    ) {
        let expected: Vec<_> = inputs.iter().map(|input| reference(input)).collect();
        for kernel in kernels() {
            prop_assert_eq!(hash_chunked(kernel, &inputs, chunk, Some(seed)), expected.clone());
        }
    }

    #[test]
    fn batch_matches_reference(inputs in inputs_strategy()) {
        let expected: Vec<_> = inputs.iter().map(|input| reference(input)).collect();
        prop_assert_eq!(digest_batch(&inputs), expected);
    }
}
