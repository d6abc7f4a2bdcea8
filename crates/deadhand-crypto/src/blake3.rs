//! Domain-separated BLAKE3 hashing for Deadhand.
//!
//! Every derived key or signed digest uses one of the registered context
//! strings below so that no value from one purpose can be replayed in
//! another.

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const GUARDIAN_HEARTBEAT: &str = "Deadhand v1 guardian-heartbeat";
    pub const SHARE_SEAL_KEY: &str = "Deadhand v1 share-seal-key";
    pub const SHARE_SEAL_NONCE: &str = "Deadhand v1 share-seal-nonce";

    /// All registered context strings.
    pub const ALL_CONTEXTS: &[&str] = &[GUARDIAN_HEARTBEAT, SHARE_SEAL_KEY, SHARE_SEAL_NONCE];
}

/// Derive a key using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (must start with "Deadhand v1 ")
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}
