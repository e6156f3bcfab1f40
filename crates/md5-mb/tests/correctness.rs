//! Correctness tests for the md5-mb public API.

mod common;

use common::{buffer, hash_entire, kernels, reference, to_hex};
use md5_mb::kernel::MAX_LANES;
use md5_mb::{digest, digest_batch};

/// RFC 1321, appendix A.5.
const RFC1321_VECTORS: &[(&str, &str)] = &[
    ("", "d41d8cd98f00b204e9800998ecf8427e"),
    ("a", "0cc175b9c0f1b6a831c399e269772661"),
    ("abc", "900150983cd24fb0d6963f7d28e17f72"),
    ("message digest", "f96b697d7cb7938d525a2f31aaf161d0"),
    ("abcdefghijklmnopqrstuvwxyz", "c3fcd3d76192e4007dfb496cca67e13b"),
    (
        "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
        "d174ab98d277d9f5a5611c2c9f419d9f",
    ),
    (
        "12345678901234567890123456789012345678901234567890123456789012345678901234567890",
        "57edf4a22be3c955ac49da2e2107b67a",
    ),
];

#[test]
fn single_digest_matches_rfc1321() {
    for (input, expected) in RFC1321_VECTORS {
        assert_eq!(to_hex(&digest(input.as_bytes())), *expected, "input {input:?}");
    }
}

#[test]
fn every_kernel_matches_rfc1321() {
    let inputs: Vec<Vec<u8>> = RFC1321_VECTORS
        .iter()
        .map(|(input, _)| input.as_bytes().to_vec())
        .collect();

    for kernel in kernels() {
        let digests = hash_entire(kernel, &inputs);
        for ((input, expected), got) in RFC1321_VECTORS.iter().zip(&digests) {
            assert_eq!(to_hex(got), *expected, "{kernel:?} on {input:?}");
        }
    }
}

#[test]
fn every_kernel_matches_reference_across_padding_boundaries() {
    // Every length from empty through three blocks and a bit, which covers
    // one- and two-block padding at each offset.
    let inputs: Vec<Vec<u8>> = (0..=200).map(|len| buffer(len, len as u64)).collect();
    let expected: Vec<_> = inputs.iter().map(|input| reference(input)).collect();

    for kernel in kernels() {
        assert_eq!(hash_entire(kernel, &inputs), expected, "{kernel:?}");
    }
}

#[test]
fn large_buffers_match_reference() {
    let inputs: Vec<Vec<u8>> = [4096, 65_537, 1 << 20]
        .into_iter()
        .enumerate()
        .map(|(seed, len)| buffer(len, seed as u64))
        .collect();
    let expected: Vec<_> = inputs.iter().map(|input| reference(input)).collect();

    for kernel in kernels() {
        assert_eq!(hash_entire(kernel, &inputs), expected, "{kernel:?}");
    }
}

#[test]
fn batch_wider_than_every_kernel_keeps_input_order() {
    // Long buffers first so short ones overtake them in the lanes.
    let inputs: Vec<Vec<u8>> = (0..3 * MAX_LANES + 1)
        .map(|i| buffer(((3 * MAX_LANES - i) * 97) % 900, i as u64))
        .collect();
    let expected: Vec<_> = inputs.iter().map(|input| reference(input)).collect();

    assert_eq!(digest_batch(&inputs), expected);
}

#[test]
fn batch_of_none_or_one() {
    let none: &[&[u8]] = &[];
    assert!(digest_batch(none).is_empty());

    let one = digest_batch(&[b"message digest"]);
    assert_eq!(one, [digest(b"message digest")]);
    assert_eq!(to_hex(&one[0]), "f96b697d7cb7938d525a2f31aaf161d0");
}
