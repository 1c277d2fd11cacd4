use crate::error::{AudioModemError, Result};

/// How frame bytes are spread onto 4-bit symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolRedundancyMode {
    /// Two data nibbles per byte, nothing else.
    None,
    /// Every 4 data nibbles are followed by 2 GF(16) Reed-Solomon parity
    /// nibbles, which repair any single wrong symbol in the group.
    #[default]
    Parity,
}

/// Frame bytes covered by one symbol group.
pub const GROUP_BYTES: usize = 2;

const GF16_EXP: [u8; 30] = [
    1, 2, 4, 8, 3, 6, 12, 11, 5, 10, 7, 14, 15, 13, 9, 1, 2, 4, 8, 3, 6, 12, 11, 5, 10, 7, 14, 15,
    13, 9,
];

const GF16_LOG: [i8; 16] = [-1, 0, 1, 4, 2, 8, 5, 10, 3, 14, 9, 7, 6, 13, 11, 12];
const RS_GEN_G1: u8 = 6; // alpha^1 + alpha^2
const RS_GEN_G0: u8 = 8; // alpha^1 * alpha^2

impl SymbolRedundancyMode {
    /// Symbols transmitted for every [`GROUP_BYTES`] frame bytes.
    pub const fn group_symbols(self) -> usize {
        match self {
            SymbolRedundancyMode::None => 4,
            SymbolRedundancyMode::Parity => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SymbolRedundancyMode::None => "none",
            SymbolRedundancyMode::Parity => "parity",
        }
    }
}

impl std::str::FromStr for SymbolRedundancyMode {
    type Err = AudioModemError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(SymbolRedundancyMode::None),
            "parity" => Ok(SymbolRedundancyMode::Parity),
            other => Err(AudioModemError::InvalidConfig(format!(
                "unknown redundancy mode '{}'",
                other
            ))),
        }
    }
}

/// Expand frame bytes into data symbols, appending to `out`.
///
/// `bytes` must have an even length; framing pads it.
pub fn encode_symbols(bytes: &[u8], mode: SymbolRedundancyMode, out: &mut Vec<u8>) {
    out.reserve(bytes.len() / GROUP_BYTES * mode.group_symbols());
    for chunk in bytes.chunks(GROUP_BYTES) {
        let d0 = chunk.first().copied().unwrap_or(0);
        let d1 = chunk.get(1).copied().unwrap_or(0);
        let data_nibbles = [(d0 >> 4) & 0x0F, d0 & 0x0F, (d1 >> 4) & 0x0F, d1 & 0x0F];
        out.extend_from_slice(&data_nibbles);
        if mode == SymbolRedundancyMode::Parity {
            out.extend_from_slice(&rs_encode_4_data_symbols(&data_nibbles));
        }
    }
}

/// Recover the two frame bytes of one symbol group.
///
/// Symbols must already be data symbols (`0..16`). In parity mode a single
/// wrong symbol is repaired; worse damage passes through and is caught by the
/// frame CRC.
pub fn decode_group(symbols: &[u8], mode: SymbolRedundancyMode) -> Result<[u8; GROUP_BYTES]> {
    if symbols.len() != mode.group_symbols() {
        return Err(AudioModemError::PayloadDecodeFailed);
    }
    if symbols.iter().any(|&s| s > 0x0F) {
        return Err(AudioModemError::PayloadUnknownSymbols);
    }

    let mut data = [symbols[0], symbols[1], symbols[2], symbols[3]];
    if mode == SymbolRedundancyMode::Parity {
        rs_correct_single_symbol(&mut data, [symbols[4], symbols[5]]);
    }
    Ok([(data[0] << 4) | data[1], (data[2] << 4) | data[3]])
}

fn rs_encode_4_data_symbols(data: &[u8; 4]) -> [u8; 2] {
    let mut parity = [0u8; 2];
    for &symbol in data {
        let feedback = symbol ^ parity[0];
        parity[0] = parity[1] ^ gf16_mul(feedback, RS_GEN_G1);
        parity[1] = gf16_mul(feedback, RS_GEN_G0);
    }
    parity
}

fn rs_correct_single_symbol(data: &mut [u8; 4], parity: [u8; 2]) {
    if rs_encode_4_data_symbols(data) == parity {
        return;
    }

    for idx in 0..4 {
        let original = data[idx];
        for cand in 0..16 {
            if cand == original {
                continue;
            }
            data[idx] = cand;
            if rs_encode_4_data_symbols(data) == parity {
                return;
            }
        }
        data[idx] = original;
    }
    // Either a parity symbol was hit (data is fine) or the group is beyond repair.
}

fn gf16_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let log_a = GF16_LOG[a as usize] as i32;
    let log_b = GF16_LOG[b as usize] as i32;
    let idx = ((log_a + log_b) % 15) as usize;
    GF16_EXP[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(symbols: &[u8], mode: SymbolRedundancyMode) -> Vec<u8> {
        symbols
            .chunks(mode.group_symbols())
            .flat_map(|group| decode_group(group, mode).unwrap())
            .collect()
    }

    #[test]
    fn test_parity_encode_decode_roundtrip() {
        let data = b"Parity layer test data";
        let mut encoded = Vec::new();
        encode_symbols(data, SymbolRedundancyMode::Parity, &mut encoded);
        assert_eq!(encoded.len(), data.len() / 2 * 6);
        assert!(encoded.iter().all(|&s| s < 16));
        assert_eq!(decode_all(&encoded, SymbolRedundancyMode::Parity), data);
    }

    #[test]
    fn test_single_nibble_error_correction() {
        let data = [0xAB, 0xCD, 0xEF, 0x01];
        let mut encoded = Vec::new();
        encode_symbols(&data, SymbolRedundancyMode::Parity, &mut encoded);

        for position in 0..encoded.len() {
            let mut corrupted = encoded.clone();
            corrupted[position] ^= 0x05;
            assert_eq!(
                decode_all(&corrupted, SymbolRedundancyMode::Parity),
                data,
                "symbol {} not repaired",
                position
            );
        }
    }

    #[test]
    fn test_no_parity_mode_passthrough() {
        let bytes = [0x12, 0x34];
        let mut encoded = Vec::new();
        encode_symbols(&bytes, SymbolRedundancyMode::None, &mut encoded);
        assert_eq!(encoded, vec![1, 2, 3, 4]);
        assert_eq!(
            decode_group(&encoded, SymbolRedundancyMode::None).unwrap(),
            bytes
        );
    }

    #[test]
    fn test_marker_symbol_in_group_is_unknown() {
        let group = [1, 2, 16, 4, 0, 0];
        assert_eq!(
            decode_group(&group, SymbolRedundancyMode::Parity),
            Err(AudioModemError::PayloadUnknownSymbols)
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("parity".parse(), Ok(SymbolRedundancyMode::Parity));
        assert_eq!("none".parse(), Ok(SymbolRedundancyMode::None));
        assert!("fancy".parse::<SymbolRedundancyMode>().is_err());
    }
}
