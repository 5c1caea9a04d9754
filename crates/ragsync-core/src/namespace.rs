//! Filesystem- and SQL-safe keys derived from owner identities.
//!
//! The same derivation names the per-owner vector index namespace and the
//! per-owner sync-state file, so both stay aligned for one owner.

use sha2::{Digest, Sha256};

/// Longest identifier accepted by the SQL backends (PostgreSQL's limit).
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Length of the hash suffix appended when a key must be truncated.
const HASH_SUFFIX_LEN: usize = 8;

/// Derive a safe key from an owner identity.
///
/// Lowercases, spells `@` as `_at_`, maps every other character outside
/// `[a-z0-9_]` to `_`, and prefixes `user_` when the result would start with
/// a digit. Keys longer than `max_len` are cut and suffixed with a short
/// SHA-256 of the original identity, so truncation alone never merges two
/// owners.
///
/// Sanitizing is lossy: identities that differ only in characters mapped to
/// `_` (`a.b@x.com` and `a_b@x.com`) get the same key, and with it the same
/// namespace and sync-state file. Owner identities are expected to be
/// unique after this mapping.
///
/// ```rust
/// use ragsync_core::namespace::safe_key;
///
/// assert_eq!(safe_key("Ana.Lopez+docs@example.com", 64), "ana_lopez_docs_at_example_com");
/// assert_eq!(safe_key("42@example.com", 64), "user_42_at_example_com");
/// ```
pub fn safe_key(owner: &str, max_len: usize) -> String {
    let mut key = String::with_capacity(owner.len() + 8);
    for c in owner.to_lowercase().chars() {
        match c {
            '@' => key.push_str("_at_"),
            c if c.is_ascii_alphanumeric() || c == '_' => key.push(c),
            _ => key.push('_'),
        }
    }
    if key.is_empty() {
        key.push_str("user");
    }
    if key.starts_with(|c: char| c.is_ascii_digit()) {
        key.insert_str(0, "user_");
    }

    let max_len = max_len.max(HASH_SUFFIX_LEN + 2);
    if key.len() > max_len {
        let digest = hex::encode(Sha256::digest(owner.as_bytes()));
        key.truncate(max_len - HASH_SUFFIX_LEN - 1);
        key.push('_');
        key.push_str(&digest[..HASH_SUFFIX_LEN]);
    }
    key
}

/// Name of an owner's namespace under a table/collection prefix.
pub fn namespace_name(prefix: &str, owner: &str, max_len: usize) -> String {
    let budget = max_len.saturating_sub(prefix.len() + 1);
    format!("{}_{}", prefix, safe_key(owner, budget))
}
