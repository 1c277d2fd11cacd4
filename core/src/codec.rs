use std::fmt;
use std::ops::Deref;

use crate::error::{AudioModemError, Result};
use crate::framing::{self, MAX_FRAME_BYTES};
use crate::fsk::{DATA_TONES, MARKER_SYMBOLS, TONES_PER_CHANNEL};
use crate::symbol_redundancy::{self, SymbolRedundancyMode, GROUP_BYTES};
use crate::PAYLOAD_CAPACITY;

/// A payload held inline, so it can travel through events without allocating.
#[derive(Clone, Copy)]
pub struct Payload {
    bytes: [u8; PAYLOAD_CAPACITY],
    len: u8,
}

impl Payload {
    /// Copy `bytes` into an inline payload. Only the absolute capacity is
    /// checked here; profile limits are the codec's business.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AudioModemError::PayloadEmptyMessage);
        }
        if bytes.len() > PAYLOAD_CAPACITY {
            return Err(AudioModemError::PayloadTooLong {
                len: bytes.len(),
                max: PAYLOAD_CAPACITY,
            });
        }
        let mut payload = Self {
            bytes: [0; PAYLOAD_CAPACITY],
            len: bytes.len() as u8,
        };
        payload.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn to_hex(&self) -> String {
        crate::session::payload_to_hex(self.as_bytes())
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Payload {}

impl PartialEq<[u8]> for Payload {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", self.to_hex())
    }
}

/// Symbol-domain representation of one payload: markers, then data symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    symbols: Vec<u8>,
    payload: Payload,
}

impl Frame {
    /// Every symbol of the frame, markers included
    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    /// Symbols following the markers.
    pub fn data_symbols(&self) -> &[u8] {
        &self.symbols[MARKER_SYMBOLS.len()..]
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Pure transform between payload bytes and frame symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadCodec {
    max_payload_bytes: usize,
    redundancy: SymbolRedundancyMode,
}

impl PayloadCodec {
    pub fn new(max_payload_bytes: usize, redundancy: SymbolRedundancyMode) -> Self {
        Self {
            max_payload_bytes: max_payload_bytes.clamp(1, PAYLOAD_CAPACITY),
            redundancy,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn redundancy(&self) -> SymbolRedundancyMode {
        self.redundancy
    }

    /// Symbols in the first group, which carries the length byte.
    pub fn header_symbols(&self) -> usize {
        self.redundancy.group_symbols()
    }

    /// Data symbols of a frame carrying `len` payload bytes.
    pub fn data_symbols_for(&self, len: usize) -> usize {
        framing::frame_byte_len(len) / GROUP_BYTES * self.redundancy.group_symbols()
    }

    /// Data symbols of the longest frame this codec accepts.
    pub fn max_data_symbols(&self) -> usize {
        self.data_symbols_for(self.max_payload_bytes)
    }

    /// Check a payload against the length limits.
    ///
    /// Every byte value is representable, so length is the only constraint.
    pub fn validate(&self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(AudioModemError::PayloadEmptyMessage);
        }
        if payload.len() > self.max_payload_bytes {
            return Err(AudioModemError::PayloadTooLong {
                len: payload.len(),
                max: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    pub fn encode(&self, payload: &[u8]) -> Result<Frame> {
        self.validate(payload)?;
        let bytes = framing::encode_frame(payload)?;

        let mut symbols =
            Vec::with_capacity(MARKER_SYMBOLS.len() + self.data_symbols_for(payload.len()));
        symbols.extend_from_slice(&MARKER_SYMBOLS);
        symbol_redundancy::encode_symbols(&bytes, self.redundancy, &mut symbols);

        Ok(Frame {
            symbols,
            payload: Payload::new(payload)?,
        })
    }

    /// Total data symbols of the frame whose header group is `header`.
    ///
    /// Lets a receiver size the frame as soon as the first group is in.
    pub fn expected_data_symbols(&self, header: &[u8]) -> Result<usize> {
        let first = symbol_redundancy::decode_group(header, self.redundancy)?;
        let len = framing::announced_len(&first)?;
        if len > self.max_payload_bytes {
            return Err(AudioModemError::PayloadTooLong {
                len,
                max: self.max_payload_bytes,
            });
        }
        Ok(self.data_symbols_for(len))
    }

    /// Recover the payload from the data symbols of a frame (markers stripped).
    ///
    /// Never returns partial data: any integrity problem is an error.
    pub fn decode(&self, symbols: &[u8]) -> Result<Payload> {
        if symbols.iter().any(|&s| s as usize >= TONES_PER_CHANNEL) {
            return Err(AudioModemError::PayloadInvalidMessage);
        }
        if symbols.iter().any(|&s| s as usize >= DATA_TONES) {
            return Err(AudioModemError::PayloadUnknownSymbols);
        }

        let group = self.redundancy.group_symbols();
        if symbols.is_empty() || symbols.len() % group != 0 {
            return Err(AudioModemError::PayloadDecodeFailed);
        }
        let byte_len = symbols.len() / group * GROUP_BYTES;
        if byte_len > MAX_FRAME_BYTES {
            return Err(AudioModemError::PayloadDecodeFailed);
        }

        let mut bytes = [0u8; MAX_FRAME_BYTES];
        for (chunk, out) in symbols
            .chunks(group)
            .zip(bytes.chunks_mut(GROUP_BYTES))
        {
            out.copy_from_slice(&symbol_redundancy::decode_group(chunk, self.redundancy)?);
        }

        let len = framing::announced_len(&bytes[..byte_len])?;
        if len > self.max_payload_bytes {
            return Err(AudioModemError::PayloadTooLong {
                len,
                max: self.max_payload_bytes,
            });
        }
        let payload = framing::decode_frame(&bytes[..byte_len])?;
        Payload::new(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PayloadCodec {
        PayloadCodec::new(32, SymbolRedundancyMode::Parity)
    }

    #[test]
    fn test_encode_layout() {
        let frame = codec().encode(&[0x01, 0x02]).unwrap();
        assert_eq!(&frame.symbols()[..2], &MARKER_SYMBOLS);
        // 1 + 2 + 2 = 5 bytes, padded to 6 -> 3 groups of 6 symbols
        assert_eq!(frame.data_symbols().len(), 18);
        assert_eq!(&frame.data_symbols()[..4], &[0x0, 0x2, 0x0, 0x1]);
        assert_eq!(frame.payload().as_bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = codec().encode(b"same input").unwrap();
        let b = codec().encode(b"same input").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_roundtrip_every_length() {
        for mode in [SymbolRedundancyMode::Parity, SymbolRedundancyMode::None] {
            let codec = PayloadCodec::new(32, mode);
            for len in 1..=32usize {
                let payload: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
                let frame = codec.encode(&payload).unwrap();
                assert_eq!(frame.data_symbols().len(), codec.data_symbols_for(len));
                let decoded = codec.decode(frame.data_symbols()).unwrap();
                assert_eq!(decoded.as_bytes(), payload.as_slice());
            }
        }
    }

    #[test]
    fn test_encode_rejects_bad_lengths() {
        assert_eq!(codec().encode(&[]), Err(AudioModemError::PayloadEmptyMessage));
        assert_eq!(
            codec().encode(&[0u8; 33]),
            Err(AudioModemError::PayloadTooLong { len: 33, max: 32 })
        );
    }

    #[test]
    fn test_decode_repairs_single_symbol_errors() {
        let frame = codec().encode(b"abcd").unwrap();
        let mut symbols = frame.data_symbols().to_vec();
        symbols[1] ^= 0x3;
        symbols[8] ^= 0x1;
        assert_eq!(codec().decode(&symbols).unwrap().as_bytes(), b"abcd");
    }

    #[test]
    fn test_decode_fails_hard_on_heavy_damage() {
        let frame = codec().encode(b"abcd").unwrap();
        let mut symbols = frame.data_symbols().to_vec();
        // Two wrong data symbols in one group are beyond repair
        symbols[7] ^= 0x3;
        symbols[8] ^= 0x5;
        assert_eq!(
            codec().decode(&symbols),
            Err(AudioModemError::PayloadDecodeFailed)
        );
    }

    #[test]
    fn test_decode_rejects_marker_symbols() {
        let frame = codec().encode(b"abcd").unwrap();
        let mut symbols = frame.data_symbols().to_vec();
        symbols[3] = crate::fsk::MARKER_A;
        assert_eq!(
            codec().decode(&symbols),
            Err(AudioModemError::PayloadUnknownSymbols)
        );
        symbols[3] = 40;
        assert_eq!(
            codec().decode(&symbols),
            Err(AudioModemError::PayloadInvalidMessage)
        );
    }

    #[test]
    fn test_decode_enforces_profile_limit() {
        let wide = PayloadCodec::new(64, SymbolRedundancyMode::Parity);
        let frame = wide.encode(&[7u8; 40]).unwrap();
        assert_eq!(
            codec().decode(frame.data_symbols()),
            Err(AudioModemError::PayloadTooLong { len: 40, max: 32 })
        );
        assert!(matches!(
            codec().expected_data_symbols(&frame.data_symbols()[..6]),
            Err(AudioModemError::PayloadTooLong { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        let frame = codec().encode(b"hello world").unwrap();
        let data = frame.data_symbols();
        assert_eq!(
            codec().decode(&data[..data.len() - 6]),
            Err(AudioModemError::PayloadDecodeFailed)
        );
        assert_eq!(codec().decode(&[]), Err(AudioModemError::PayloadDecodeFailed));
    }

    #[test]
    fn test_expected_symbols_from_header() {
        let frame = codec().encode(&[9u8; 10]).unwrap();
        let header = &frame.data_symbols()[..codec().header_symbols()];
        assert_eq!(
            codec().expected_data_symbols(header).unwrap(),
            frame.data_symbols().len()
        );
    }

    #[test]
    fn test_payload_inline_behaviour() {
        let payload = Payload::new(&[0xde, 0xad]).unwrap();
        let copy = payload;
        assert_eq!(payload, copy);
        assert_eq!(&*copy, &[0xde, 0xad]);
        assert_eq!(format!("{:?}", copy), "Payload(dead)");
        assert_eq!(Payload::new(&[]), Err(AudioModemError::PayloadEmptyMessage));
    }
}
