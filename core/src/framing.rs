use crate::error::{AudioModemError, Result};

/// Length byte in front of the payload plus the CRC-16 behind it.
pub const FRAME_OVERHEAD_BYTES: usize = 3;

/// Largest frame byte sequence: capacity payload + overhead, rounded up to even.
pub const MAX_FRAME_BYTES: usize = frame_byte_len(crate::PAYLOAD_CAPACITY);

/// CRC-16-CCITT for payload integrity verification
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u32 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u32) << 8;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x10000 != 0 {
                crc ^= 0x1021;
            }
        }
    }
    (crc & 0xFFFF) as u16
}

/// Number of frame bytes carrying a payload of `payload_len` bytes.
///
/// Frames are padded to an even length so they split into whole parity groups.
pub const fn frame_byte_len(payload_len: usize) -> usize {
    let raw = payload_len + FRAME_OVERHEAD_BYTES;
    raw + (raw & 1)
}

/// Lay out `[len] ++ payload ++ crc16(len ++ payload)` plus the padding byte.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(AudioModemError::PayloadEmptyMessage);
    }
    if payload.len() > crate::PAYLOAD_CAPACITY {
        return Err(AudioModemError::PayloadTooLong {
            len: payload.len(),
            max: crate::PAYLOAD_CAPACITY,
        });
    }

    let mut encoded = Vec::with_capacity(frame_byte_len(payload.len()));
    encoded.push(payload.len() as u8);
    encoded.extend_from_slice(payload);

    let crc = crc16(&encoded);
    encoded.push((crc >> 8) as u8);
    encoded.push(crc as u8);

    encoded.resize(frame_byte_len(payload.len()), 0);
    Ok(encoded)
}

/// Payload length announced by the first frame byte.
pub fn announced_len(bytes: &[u8]) -> Result<usize> {
    match bytes.first() {
        Some(0) => Err(AudioModemError::PayloadTooShort),
        Some(&len) => Ok(len as usize),
        None => Err(AudioModemError::PayloadDecodeFailed),
    }
}

/// Verify a frame and borrow its payload.
///
/// The frame must have exactly the padded length its header announces and a
/// matching CRC. A mismatch never yields partial data.
pub fn decode_frame(bytes: &[u8]) -> Result<&[u8]> {
    let len = announced_len(bytes)?;
    if bytes.len() != frame_byte_len(len) {
        return Err(AudioModemError::PayloadDecodeFailed);
    }

    let payload_end = 1 + len;
    let received_crc = ((bytes[payload_end] as u16) << 8) | (bytes[payload_end + 1] as u16);
    if received_crc != crc16(&bytes[..payload_end]) {
        return Err(AudioModemError::PayloadDecodeFailed);
    }

    Ok(&bytes[1..payload_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_encode_decode() {
        let encoded = encode_frame(b"Hello").unwrap();
        assert_eq!(encoded.len(), 8); // 1 + 5 + 2, already even
        assert_eq!(encoded[0], 5);
        assert_eq!(decode_frame(&encoded).unwrap(), b"Hello");
    }

    #[test]
    fn test_frame_is_padded_to_even_length() {
        let encoded = encode_frame(b"Hi").unwrap();
        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded[5], 0);
        assert_eq!(decode_frame(&encoded).unwrap(), b"Hi");
    }

    #[test]
    fn test_frame_payload_crc_validation() {
        let mut encoded = encode_frame(b"Hello").unwrap();
        // Corrupt payload byte (change 'H' to 'G')
        encoded[1] = b'G';
        assert_eq!(decode_frame(&encoded), Err(AudioModemError::PayloadDecodeFailed));
    }

    #[test]
    fn test_corrupted_length_rejected() {
        let mut encoded = encode_frame(b"Hello World").unwrap();
        encoded[0] = 3;
        assert_eq!(decode_frame(&encoded), Err(AudioModemError::PayloadDecodeFailed));

        encoded[0] = 0;
        assert_eq!(decode_frame(&encoded), Err(AudioModemError::PayloadTooShort));
    }

    #[test]
    fn test_encode_rejects_empty_and_oversize() {
        assert_eq!(encode_frame(b""), Err(AudioModemError::PayloadEmptyMessage));
        let big = vec![0u8; crate::PAYLOAD_CAPACITY + 1];
        assert!(matches!(
            encode_frame(&big),
            Err(AudioModemError::PayloadTooLong { len: 256, .. })
        ));
    }

    #[test]
    fn test_crc16_known_value() {
        // CRC-16/CCITT-FALSE check value
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }
}
