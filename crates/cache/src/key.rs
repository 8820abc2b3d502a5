//! Deterministic cache key helpers

/// Marker used in keys when no explicit field list was requested
pub const DEFAULT_FIELDS_MARKER: &str = "default";

/// Order-insensitive hash of a field list.
///
/// Duplicates are ignored and the list is sorted before hashing, so
/// `["name", "sex"]` and `["sex", "name", "name"]` produce the same digest.
pub fn stable_fields_hash<S: AsRef<str>>(fields: &[S]) -> String {
    let mut sorted: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = blake3::Hasher::new();
    for field in sorted {
        hasher.update(field.as_bytes());
        // Unit separator keeps ["ab", "c"] distinct from ["a", "bc"]
        hasher.update(&[0x1f]);
    }

    let digest = hasher.finalize();
    hex::encode(&digest.as_bytes()[..8])
}

/// Hash of an optional field list, falling back to [`DEFAULT_FIELDS_MARKER`]
pub fn fields_key_part<S: AsRef<str>>(fields: Option<&[S]>) -> String {
    match fields {
        Some(fields) if !fields.is_empty() => stable_fields_hash(fields),
        _ => DEFAULT_FIELDS_MARKER.to_string(),
    }
}
