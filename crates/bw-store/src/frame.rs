//! On-disk framing for snapshot files.
//!
//! ```text
//! [4 bytes: magic "BWS1"]
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (JSON-encoded Snapshot)]
//! ```
//!
//! A frame is valid only if all three header fields check out and the file
//! ends exactly where the payload does.

/// File magic, bumped if the layout ever changes.
pub const MAGIC: [u8; 4] = *b"BWS1";

/// Header size: magic + length + CRC.
pub const HEADER_SIZE: usize = 12;

/// Why a frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("file is {0} bytes, shorter than the frame header")]
    ShortHeader(usize),

    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("length field says {declared} bytes but {actual} follow the header")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("payload of {0} bytes exceeds the u32 length field")]
    TooLarge(usize),
}

/// Wrap `payload` in a frame.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;
    let crc = crc32fast::hash(payload);

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Validate a frame and return its payload.
pub fn decode(bytes: &[u8]) -> Result<&[u8], FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::ShortHeader(bytes.len()));
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != MAGIC {
        return Err(FrameError::BadMagic(magic));
    }

    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let expected_crc = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != declared {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(FrameError::CrcMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    Ok(payload)
}
