use serde_json::Value;

/// Rough heap footprint of a cached entry.
#[inline]
pub fn approximate_entry_size(key: &str, value: &Value) -> usize {
    let body = serde_json::to_vec(value).map_or(0, |b| b.len());
    // key + body + expiry and bookkeeping
    key.len() + body + 12 + 8
}
