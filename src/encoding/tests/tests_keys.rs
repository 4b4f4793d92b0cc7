//! Tests for entry-row and timeline-row key encoding: round-trips,
//! order preservation, escaping, and prefix stepping bounds.

use crate::encoding::*;

// ------------------------------------------------------------------------------------------------
// Entry rows
// ------------------------------------------------------------------------------------------------

#[test]
fn entry_key_roundtrip() {
    let raw = entry_key("account", 42);
    let (key, ts) = decode_entry_key(&raw).unwrap();
    assert_eq!(key, "account");
    assert_eq!(ts, 42);
}

#[test]
fn entry_key_roundtrip_extreme_timestamps() {
    for ts in [0, 1, i64::MAX] {
        let raw = entry_key("k", ts);
        assert_eq!(decode_entry_key(&raw).unwrap(), ("k".to_string(), ts));
    }
}

#[test]
fn entry_key_roundtrip_nul_in_key() {
    let nasty = "a\0b\0\0c";
    let raw = entry_key(nasty, 7);
    let (key, ts) = decode_entry_key(&raw).unwrap();
    assert_eq!(key, nasty);
    assert_eq!(ts, 7);
}

#[test]
fn entry_keys_order_by_timestamp_within_key() {
    let a = entry_key("k", 1);
    let b = entry_key("k", 2);
    let c = entry_key("k", 300);
    assert!(a < b);
    assert!(b < c);
}

#[test]
fn entry_keys_order_by_user_key_first() {
    // Every timestamp of "a" sorts before every timestamp of "b".
    assert!(entry_key("a", i64::MAX) < entry_key("b", 0));
    // A key that is a prefix of another sorts first regardless of timestamps.
    assert!(entry_key("a", i64::MAX) < entry_key("aa", 0));
    // NUL-containing keys keep their raw byte order.
    assert!(entry_key("a", i64::MAX) < entry_key("a\0", 0));
}

#[test]
fn prefix_successor_bounds_exactly_one_key() {
    let succ = entry_prefix_successor("a");

    // Past every entry of "a"...
    assert!(succ > entry_key("a", i64::MAX));
    // ...but before any entry of any later key, including tricky neighbours.
    assert!(succ < entry_key("a\0", 0));
    assert!(succ < entry_key("aa", 0));
    assert!(succ < entry_key("b", 0));
}

#[test]
fn prefix_covers_only_its_own_key() {
    let prefix = entry_key_prefix("a");
    assert!(entry_key("a", 0).starts_with(&prefix));
    assert!(entry_key("a", i64::MAX).starts_with(&prefix));
    assert!(!entry_key("aa", 0).starts_with(&prefix));
    assert!(!entry_key("a\0", 0).starts_with(&prefix));
}

#[test]
fn decode_entry_key_rejects_wrong_region() {
    let raw = timeline_key(1, "k");
    assert!(matches!(
        decode_entry_key(&raw),
        Err(EncodingError::InvalidTag { .. })
    ));
}

#[test]
fn decode_entry_key_rejects_truncation() {
    let raw = entry_key("k", 1);
    for cut in 0..raw.len() {
        assert!(decode_entry_key(&raw[..cut]).is_err(), "cut at {cut}");
    }
}

#[test]
fn decode_entry_key_rejects_trailing_bytes() {
    let mut raw = entry_key("k", 1);
    raw.push(0x00);
    assert!(matches!(
        decode_entry_key(&raw),
        Err(EncodingError::Malformed(_))
    ));
}

// ------------------------------------------------------------------------------------------------
// Timeline rows
// ------------------------------------------------------------------------------------------------

#[test]
fn timeline_key_roundtrip() {
    let raw = timeline_key(99, "account\0x");
    let (ts, key) = decode_timeline_key(&raw).unwrap();
    assert_eq!(ts, 99);
    assert_eq!(key, "account\0x");
}

#[test]
fn timeline_orders_by_timestamp_then_key() {
    assert!(timeline_key(1, "z") < timeline_key(2, "a"));
    assert!(timeline_key(2, "a") < timeline_key(2, "b"));
}

#[test]
fn timeline_start_is_inclusive_lower_bound() {
    assert!(timeline_start(5) <= timeline_key(5, "a"));
    assert!(timeline_start(5) > timeline_key(4, "z"));
}

#[test]
fn timeline_end_bounds_the_region() {
    assert!(timeline_key(i64::MAX, "z") < timeline_end());
    assert!(timeline_start(0) < timeline_end());
}

#[test]
fn regions_do_not_interleave() {
    // metadata < every entry row < every timeline row
    assert!(META_KEY.to_vec() < entry_key("a", 0));
    assert!(entry_key("\u{10FFFF}", i64::MAX) < timeline_start(0));
    assert!(entry_prefix_successor("\u{10FFFF}") < timeline_start(0));
}
