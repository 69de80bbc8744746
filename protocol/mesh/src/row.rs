//! The replicated cache row and its fixed-width codec.

use crate::auth::content_digest;
use crate::FrameError;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 383;

/// Maximum value length in bytes.
pub const MAX_VALUE_LEN: usize = 92;

/// Length of the digest / authentication tag field.
pub const DIGEST_LEN: usize = 16;

/// Fixed header: digest, created, touched, expires, hits, key length,
/// value length, command.
pub const HEADER_LEN: usize = DIGEST_LEN + 4 + 4 + 4 + 4 + 2 + 1 + 1;

/// Maximum encoded frame length. Fits a single safe UDP payload (512 bytes).
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_KEY_LEN + MAX_VALUE_LEN;

// Header field offsets.
const OFF_CREATED: usize = DIGEST_LEN;
const OFF_TOUCHED: usize = OFF_CREATED + 4;
const OFF_EXPIRES: usize = OFF_TOUCHED + 4;
const OFF_HITS: usize = OFF_EXPIRES + 4;
const OFF_KEY_LEN: usize = OFF_HITS + 4;
const OFF_VALUE_LEN: usize = OFF_KEY_LEN + 2;
const OFF_COMMAND: usize = OFF_VALUE_LEN + 1;

/// Replication command tag carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Upsert the row on the receiving node.
    Put,
    /// Delete the row's key on the receiving node.
    Remove,
    /// Reserved; recognized on the wire but dropped by receivers.
    Other,
}

impl Command {
    /// The single-byte wire tag.
    pub const fn as_u8(self) -> u8 {
        match self {
            Command::Put => b'p',
            Command::Remove => b'r',
            Command::Other => b'?',
        }
    }

    /// Parse a wire tag. Returns `None` for unrecognized bytes.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            b'p' => Some(Command::Put),
            b'r' => Some(Command::Remove),
            b'?' => Some(Command::Other),
            _ => None,
        }
    }
}

/// One cache entry: the unit of storage and replication.
///
/// The `digest` field holds the content fingerprint of `value`. On the wire
/// it is overwritten by the authentication tag; receivers call
/// [`Row::refresh_digest`] after verification to restore the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Content fingerprint of `value` (auth tag while in transit).
    pub digest: [u8; DIGEST_LEN],
    /// Unix time the key was first inserted.
    pub created: u32,
    /// Unix time of the most recent insert of this key.
    pub touched: u32,
    /// Unix time after which the row is eligible for expiry.
    pub expires: u32,
    /// Number of inserts of this key since creation.
    pub hits: u32,
    /// Command tag for replication.
    pub command: Command,
    /// Opaque key, 1..=[`MAX_KEY_LEN`] bytes.
    pub key: Vec<u8>,
    /// Opaque value, up to [`MAX_VALUE_LEN`] bytes.
    pub value: Vec<u8>,
}

impl Row {
    /// Build a fresh `PUT` row with `hits == 1` and a computed content
    /// digest. Rejects out-of-bounds keys and values.
    pub fn new(key: &[u8], value: &[u8], now: u32, expires: u32) -> Result<Self, FrameError> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(FrameError::BadKeyLength(key.len()));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(FrameError::BadValueLength(value.len()));
        }
        Ok(Row {
            digest: content_digest(value),
            created: now,
            touched: now,
            expires,
            hits: 1,
            command: Command::Put,
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Recompute the content digest from the current value.
    pub fn refresh_digest(&mut self) {
        self.digest = content_digest(&self.value);
    }

    /// Encoded frame length for this row.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.key.len() + self.value.len()
    }

    /// Encode into `buf`, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        if self.key.is_empty() || self.key.len() > MAX_KEY_LEN {
            return Err(FrameError::BadKeyLength(self.key.len()));
        }
        if self.value.len() > MAX_VALUE_LEN {
            return Err(FrameError::BadValueLength(self.value.len()));
        }
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(FrameError::BufferTooSmall);
        }

        buf[..DIGEST_LEN].copy_from_slice(&self.digest);
        buf[OFF_CREATED..OFF_CREATED + 4].copy_from_slice(&self.created.to_be_bytes());
        buf[OFF_TOUCHED..OFF_TOUCHED + 4].copy_from_slice(&self.touched.to_be_bytes());
        buf[OFF_EXPIRES..OFF_EXPIRES + 4].copy_from_slice(&self.expires.to_be_bytes());
        buf[OFF_HITS..OFF_HITS + 4].copy_from_slice(&self.hits.to_be_bytes());
        buf[OFF_KEY_LEN..OFF_KEY_LEN + 2]
            .copy_from_slice(&(self.key.len() as u16).to_be_bytes());
        buf[OFF_VALUE_LEN] = self.value.len() as u8;
        buf[OFF_COMMAND] = self.command.as_u8();

        let key_end = HEADER_LEN + self.key.len();
        buf[HEADER_LEN..key_end].copy_from_slice(&self.key);
        buf[key_end..len].copy_from_slice(&self.value);

        Ok(len)
    }

    /// Decode a frame.
    ///
    /// Rejects buffers that are too short, whose declared lengths exceed the
    /// bounds or disagree with the buffer length, or whose command byte is
    /// unrecognized. A rejected frame is discarded, never partially applied.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_LEN {
            return Err(FrameError::Truncated);
        }

        let key_len = u16::from_be_bytes([data[OFF_KEY_LEN], data[OFF_KEY_LEN + 1]]) as usize;
        let value_len = data[OFF_VALUE_LEN] as usize;
        if key_len == 0 || key_len > MAX_KEY_LEN {
            return Err(FrameError::BadKeyLength(key_len));
        }
        if value_len > MAX_VALUE_LEN {
            return Err(FrameError::BadValueLength(value_len));
        }
        let command = Command::from_u8(data[OFF_COMMAND])
            .ok_or(FrameError::BadCommand(data[OFF_COMMAND]))?;

        let expected = HEADER_LEN + key_len + value_len;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&data[..DIGEST_LEN]);

        let key_end = HEADER_LEN + key_len;
        Ok(Row {
            digest,
            created: u32::from_be_bytes(data[OFF_CREATED..OFF_CREATED + 4].try_into().unwrap()),
            touched: u32::from_be_bytes(data[OFF_TOUCHED..OFF_TOUCHED + 4].try_into().unwrap()),
            expires: u32::from_be_bytes(data[OFF_EXPIRES..OFF_EXPIRES + 4].try_into().unwrap()),
            hits: u32::from_be_bytes(data[OFF_HITS..OFF_HITS + 4].try_into().unwrap()),
            command,
            key: data[HEADER_LEN..key_end].to_vec(),
            value: data[key_end..expected].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let mut row = Row::new(b"grey:192.0.2.1:alice@example.org", b"3", 1000, 1600).unwrap();
        row.hits = 4;
        row.touched = 1200;
        row
    }

    #[test]
    fn test_frame_fits_udp_payload() {
        assert!(MAX_FRAME_LEN <= 512);
        let row = Row::new(
            &[b'k'; MAX_KEY_LEN],
            &[b'v'; MAX_VALUE_LEN],
            u32::MAX,
            u32::MAX,
        )
        .unwrap();
        assert_eq!(row.encoded_len(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_command_tags() {
        assert_eq!(Command::Put.as_u8(), b'p');
        assert_eq!(Command::Remove.as_u8(), b'r');
        assert_eq!(Command::Other.as_u8(), b'?');
        assert_eq!(Command::from_u8(b'p'), Some(Command::Put));
        assert_eq!(Command::from_u8(b'r'), Some(Command::Remove));
        assert_eq!(Command::from_u8(b'?'), Some(Command::Other));
        assert_eq!(Command::from_u8(b'x'), None);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let row = sample_row();
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = row.encode(&mut buf).unwrap();
        assert_eq!(len, row.encoded_len());

        let decoded = Row::decode(&buf[..len]).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_encode_rejects_oversize() {
        let long_key = vec![b'k'; MAX_KEY_LEN + 1];
        assert_eq!(
            Row::new(&long_key, b"v", 0, 0),
            Err(FrameError::BadKeyLength(MAX_KEY_LEN + 1))
        );

        let long_value = vec![b'v'; MAX_VALUE_LEN + 1];
        assert_eq!(
            Row::new(b"k", &long_value, 0, 0),
            Err(FrameError::BadValueLength(MAX_VALUE_LEN + 1))
        );

        assert_eq!(Row::new(b"", b"v", 0, 0), Err(FrameError::BadKeyLength(0)));
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let row = sample_row();
        let mut buf = [0u8; HEADER_LEN];
        assert_eq!(row.encode(&mut buf), Err(FrameError::BufferTooSmall));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert_eq!(Row::decode(&[]), Err(FrameError::Truncated));
        assert_eq!(Row::decode(&[0u8; HEADER_LEN - 1]), Err(FrameError::Truncated));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let row = sample_row();
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = row.encode(&mut buf).unwrap();

        // Declared key length beyond the bound.
        let mut bad = buf;
        bad[OFF_KEY_LEN..OFF_KEY_LEN + 2]
            .copy_from_slice(&((MAX_KEY_LEN + 1) as u16).to_be_bytes());
        assert_eq!(
            Row::decode(&bad[..len]),
            Err(FrameError::BadKeyLength(MAX_KEY_LEN + 1))
        );

        // Declared value length beyond the bound.
        let mut bad = buf;
        bad[OFF_VALUE_LEN] = (MAX_VALUE_LEN + 1) as u8;
        assert_eq!(
            Row::decode(&bad[..len]),
            Err(FrameError::BadValueLength(MAX_VALUE_LEN + 1))
        );

        // Truncated payload disagrees with the header.
        assert!(matches!(
            Row::decode(&buf[..len - 1]),
            Err(FrameError::LengthMismatch { .. })
        ));

        // Trailing garbage disagrees with the header.
        assert!(matches!(
            Row::decode(&buf[..len + 1]),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_command() {
        let row = sample_row();
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = row.encode(&mut buf).unwrap();
        buf[OFF_COMMAND] = b'z';
        assert_eq!(Row::decode(&buf[..len]), Err(FrameError::BadCommand(b'z')));
    }

    #[test]
    fn test_big_endian_layout() {
        let mut row = sample_row();
        row.created = 0x0102_0304;
        let mut buf = [0u8; MAX_FRAME_LEN];
        row.encode(&mut buf).unwrap();
        assert_eq!(&buf[OFF_CREATED..OFF_CREATED + 4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_value_roundtrip() {
        let mut row = Row::new(b"tombstone", b"", 10, 20).unwrap();
        row.command = Command::Remove;
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = row.encode(&mut buf).unwrap();
        let decoded = Row::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.command, Command::Remove);
        assert!(decoded.value.is_empty());
    }
}
