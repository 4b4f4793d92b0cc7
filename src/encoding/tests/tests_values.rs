//! Tests for tagged payload encoding — tombstone vs. empty value, tag
//! validation.

use crate::encoding::*;

#[test]
fn value_roundtrip() {
    let raw = encode_payload(Some(b"hello"));
    assert_eq!(raw[0], TAG_VALUE);
    assert_eq!(decode_payload(&raw).unwrap(), Some(b"hello".to_vec()));
}

#[test]
fn tombstone_roundtrip() {
    let raw = encode_payload(None);
    assert_eq!(raw, [TAG_TOMBSTONE]);
    assert_eq!(decode_payload(&raw).unwrap(), None);
}

#[test]
fn empty_value_is_not_a_tombstone() {
    let raw = encode_payload(Some(b""));
    assert_eq!(raw, [TAG_VALUE]);
    assert_eq!(decode_payload(&raw).unwrap(), Some(Vec::new()));
}

#[test]
fn payload_tags() {
    assert_eq!(payload_tag(Some(b"x")), TAG_VALUE);
    assert_eq!(payload_tag(Some(b"")), TAG_VALUE);
    assert_eq!(payload_tag(None), TAG_TOMBSTONE);
}

#[test]
fn decode_rejects_unknown_tag() {
    assert!(matches!(
        decode_payload(&[0x7A, 1, 2]),
        Err(EncodingError::InvalidTag { tag: 0x7A, .. })
    ));
}

#[test]
fn decode_rejects_empty_buffer() {
    assert!(matches!(
        decode_payload(&[]),
        Err(EncodingError::UnexpectedEof { .. })
    ));
}

#[test]
fn decode_rejects_tombstone_with_payload() {
    assert!(matches!(
        decode_payload(&[TAG_TOMBSTONE, 0xAB]),
        Err(EncodingError::Malformed(_))
    ));
}
