//! Wire format for the meshcache replication protocol.
//!
//! Cache mutations travel between nodes as single UDP datagrams. Each
//! datagram carries exactly one [`Row`] in a fixed-layout frame:
//!
//! - Request: `PUT` (`'p'`) upserts the row on the receiving node
//! - Request: `REMOVE` (`'r'`) deletes the row's key
//! - `OTHER` (`'?'`) is reserved; receivers drop it
//!
//! Frames never exceed [`MAX_FRAME_LEN`] bytes so they always fit a single
//! safe UDP payload. All multi-byte integers are unsigned big-endian.
//!
//! The leading 16-byte digest field does double duty: at rest it is the
//! content fingerprint of the value; in transit it carries a keyed
//! authentication tag mixed from the cluster's shared secret (see [`auth`]).
//!
//! # Example
//!
//! ```
//! use protocol_mesh::{auth, Command, Row, Secret};
//!
//! let secret = Secret::new(b"cluster secret");
//! let row = Row::new(b"grey:198.51.100.7", b"2", 1700000000, 1700000600).unwrap();
//!
//! let mut buf = [0u8; protocol_mesh::MAX_FRAME_LEN];
//! let len = row.encode(&mut buf).unwrap();
//! auth::seal(&mut buf[..len], &secret);
//!
//! assert!(auth::verify(&buf[..len], &secret));
//! let mut decoded = Row::decode(&buf[..len]).unwrap();
//! decoded.refresh_digest();
//! assert_eq!(decoded.value, row.value);
//! assert_eq!(decoded.command, Command::Put);
//! ```

pub mod auth;
mod row;

pub use auth::Secret;
pub use row::{
    Command, Row, DIGEST_LEN, HEADER_LEN, MAX_FRAME_LEN, MAX_KEY_LEN, MAX_VALUE_LEN,
};

/// Frame encode/decode error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Buffer is shorter than the fixed header.
    #[error("frame truncated")]
    Truncated,
    /// Declared key length exceeds the maximum or the key is empty.
    #[error("bad key length {0}")]
    BadKeyLength(usize),
    /// Declared value length exceeds the maximum.
    #[error("bad value length {0}")]
    BadValueLength(usize),
    /// Command byte is not one of the recognized tags.
    #[error("unrecognized command byte 0x{0:02x}")]
    BadCommand(u8),
    /// Buffer length disagrees with the declared key/value lengths.
    #[error("frame length {actual} does not match declared {expected}")]
    LengthMismatch {
        /// Length implied by the header fields.
        expected: usize,
        /// Length of the buffer presented for decoding.
        actual: usize,
    },
    /// Destination buffer is too small for the encoded frame.
    #[error("encode buffer too small")]
    BufferTooSmall,
}
