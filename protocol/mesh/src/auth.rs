//! Symmetric frame authentication and content digests.
//!
//! Frames are authenticated, not encrypted: the digest field of an encoded
//! frame carries a keyed BLAKE3 tag over the rest of the frame, truncated to
//! 16 bytes. A peer without the shared secret cannot forge an acceptable
//! update; payloads remain readable on the wire.

use crate::row::DIGEST_LEN;

/// Domain separation for deriving the 32-byte frame key from the configured
/// secret. Changing this string breaks wire compatibility.
const KEY_CONTEXT: &str = "meshcache frame auth v1";

/// Cluster shared secret, pre-derived into a fixed-size frame key.
#[derive(Clone)]
pub struct Secret {
    key: [u8; 32],
}

impl Secret {
    /// Derive the frame key from arbitrary secret material.
    pub fn new(material: &[u8]) -> Self {
        Secret {
            key: blake3::derive_key(KEY_CONTEXT, material),
        }
    }
}

impl std::fmt::Debug for Secret {
    // Never print key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Content fingerprint of a value: truncated unkeyed BLAKE3.
pub fn content_digest(value: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = blake3::hash(value);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hash.as_bytes()[..DIGEST_LEN]);
    digest
}

/// Compute the keyed tag over everything after the digest field.
fn tag(frame: &[u8], secret: &Secret) -> [u8; DIGEST_LEN] {
    let hash = blake3::keyed_hash(&secret.key, &frame[DIGEST_LEN..]);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hash.as_bytes()[..DIGEST_LEN]);
    out
}

/// Overwrite an encoded frame's digest field with the authentication tag.
///
/// # Panics
///
/// Panics if `frame` is shorter than the digest field; callers seal only
/// buffers produced by [`Row::encode`](crate::Row::encode).
pub fn seal(frame: &mut [u8], secret: &Secret) {
    assert!(frame.len() >= DIGEST_LEN);
    let tag = tag(frame, secret);
    frame[..DIGEST_LEN].copy_from_slice(&tag);
}

/// Check a received frame's tag in constant time.
pub fn verify(frame: &[u8], secret: &Secret) -> bool {
    if frame.len() < DIGEST_LEN {
        return false;
    }
    let expected = tag(frame, secret);
    frame[..DIGEST_LEN]
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
