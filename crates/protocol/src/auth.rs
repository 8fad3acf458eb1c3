//! Challenge/response authentication for the control surface.
//!
//! obs-websocket 5.x authenticates clients with a two-round SHA-256 digest:
//! the server's `Hello` carries a `salt` and a `challenge`, and the client
//! proves knowledge of the shared password by sending
//! `b64(sha256(b64(sha256(password + salt)) + challenge))` in `Identify`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Computes the authentication string for an `Identify` message.
pub fn authentication_string(password: &str, salt: &str, challenge: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    let secret = STANDARD.encode(hasher.finalize());

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(challenge.as_bytes());
    STANDARD.encode(hasher.finalize())
}
