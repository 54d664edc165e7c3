//! Bearer-token minting and parsing.
//!
//! Token format (bit-exact): `ns_<BASE64URL(namespace_id)>_<64 hex chars>`.
//! The base64url segment (no padding) embeds the namespace id so routing can
//! extract it without a lookup; the hex segment is 32 cryptographically
//! random bytes.  Only the SHA-256 of the full token string is stored.
//!
//! Note the base64url alphabet itself contains `_`, so parsing splits on the
//! *last* underscore; the hex segment never contains one.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

const PREFIX: &str = "ns_";
const SECRET_HEX_LEN: usize = 64;

/// Mint a fresh token for a namespace.
pub fn mint(namespace_id: &str) -> String {
    let mut secret = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    format!(
        "{}{}_{}",
        PREFIX,
        URL_SAFE_NO_PAD.encode(namespace_id.as_bytes()),
        hex::encode(secret)
    )
}

/// Extract the embedded namespace id, or `None` for a malformed token.
pub fn parse_namespace_id(token: &str) -> Option<String> {
    let rest = token.strip_prefix(PREFIX)?;
    let (encoded_id, secret) = rest.rsplit_once('_')?;
    if secret.len() != SECRET_HEX_LEN || !secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    if encoded_id.is_empty() {
        return None;
    }
    let id_bytes = URL_SAFE_NO_PAD.decode(encoded_id).ok()?;
    String::from_utf8(id_bytes).ok()
}

/// SHA-256 of the full token string; the only form the registry stores.
pub fn hash(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
