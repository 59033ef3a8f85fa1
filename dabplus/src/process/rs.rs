//! Reed-Solomon outer error protection of DAB+ superframes.
//!
//! A superframe is protected by RS(120,110) codewords, shortened from
//! RS(255,245). Codeword `i` takes every `columns`-th byte of the superframe
//! starting at byte `i`, so a burst error is spread over all codewords. The
//! parity bytes occupy the last `columns * 10` bytes of the superframe.

use log::trace;
use reed_solomon::Decoder;

pub const RS_CODEWORD_LEN: usize = 120;
pub const RS_DATA_LEN: usize = 110;
pub const RS_PARITY_LEN: usize = RS_CODEWORD_LEN - RS_DATA_LEN;

/// Corrects single RS(120,110) codewords.
pub trait CodewordCorrector {
    /// Corrects `codeword` in place.
    ///
    /// Returns the number of corrected symbols, `None` if the codeword is
    /// uncorrectable. An uncorrectable codeword is left as received.
    fn correct(&mut self, codeword: &mut [u8; RS_CODEWORD_LEN]) -> Option<usize>;
}

/// [`CodewordCorrector`] backed by the `reed-solomon` crate.
pub struct RsCorrector {
    decoder: Decoder,
}

impl Default for RsCorrector {
    fn default() -> Self {
        Self {
            decoder: Decoder::new(RS_PARITY_LEN),
        }
    }
}

impl CodewordCorrector for RsCorrector {
    fn correct(&mut self, codeword: &mut [u8; RS_CODEWORD_LEN]) -> Option<usize> {
        match self.decoder.correct_err_count(&codeword[..], None) {
            Ok((corrected, errors)) => {
                if errors > 0 {
                    codeword[..RS_DATA_LEN].copy_from_slice(corrected.data());
                }
                Some(errors)
            }
            Err(_) => None,
        }
    }
}

/// Correction outcome of one superframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrectionStats {
    pub codewords: usize,
    pub corrected_symbols: usize,
    pub uncorrectable: usize,
}

impl CorrectionStats {
    pub fn is_degraded(&self) -> bool {
        self.uncorrectable > 0
    }
}

/// Number of interleaved codewords in a superframe of `sf_len` bytes.
pub fn columns(sf_len: usize) -> usize {
    sf_len / RS_CODEWORD_LEN
}

/// De-interleaves, corrects and re-interleaves all codewords of `sf` in place.
pub fn decode_superframe<C>(corrector: &mut C, sf: &mut [u8]) -> CorrectionStats
where
    C: CodewordCorrector + ?Sized,
{
    let columns = columns(sf.len());
    let mut stats = CorrectionStats {
        codewords: columns,
        ..Default::default()
    };
    let mut packet = [0u8; RS_CODEWORD_LEN];

    for i in 0..columns {
        for (pos, byte) in packet.iter_mut().enumerate() {
            *byte = sf[pos * columns + i];
        }

        match corrector.correct(&mut packet) {
            Some(0) => continue,
            Some(errors) => {
                trace!("RS codeword {i}: corrected {errors} symbols");
                stats.corrected_symbols += errors;
            }
            None => {
                trace!("RS codeword {i}: uncorrectable");
                stats.uncorrectable += 1;
                continue;
            }
        }

        for (pos, byte) in packet.iter().enumerate() {
            sf[pos * columns + i] = *byte;
        }
    }

    stats
}

#[cfg(test)]
pub(crate) fn rs_encode_superframe(payload: &[u8]) -> Vec<u8> {
    let columns = payload.len() / RS_DATA_LEN;
    let encoder = reed_solomon::Encoder::new(RS_PARITY_LEN);
    let mut sf = vec![0u8; columns * RS_CODEWORD_LEN];
    sf[..payload.len()].copy_from_slice(payload);

    for i in 0..columns {
        let data: Vec<u8> = (0..RS_DATA_LEN).map(|pos| sf[pos * columns + i]).collect();
        let encoded = encoder.encode(&data);
        for (pos, byte) in encoded.iter().enumerate() {
            sf[pos * columns + i] = *byte;
        }
    }

    sf
}

#[test]
fn interleaving_order() {
    struct Recorder(Vec<[u8; RS_CODEWORD_LEN]>);

    impl CodewordCorrector for Recorder {
        fn correct(&mut self, codeword: &mut [u8; RS_CODEWORD_LEN]) -> Option<usize> {
            self.0.push(*codeword);
            None
        }
    }

    let mut sf: Vec<u8> = (0..RS_CODEWORD_LEN * 3).map(|i| (i % 251) as u8).collect();
    let original = sf.clone();
    let mut recorder = Recorder(Vec::new());

    let stats = decode_superframe(&mut recorder, &mut sf);
    assert_eq!(stats.uncorrectable, 3);
    assert!(stats.is_degraded());
    assert_eq!(sf, original);

    assert_eq!(recorder.0.len(), 3);
    assert_eq!(recorder.0[1][0], original[1]);
    assert_eq!(recorder.0[1][1], original[4]);
    assert_eq!(recorder.0[2][119], original[119 * 3 + 2]);
}

#[test]
fn rs_corrects_burst_errors() {
    // 96 kbit/s: 1440 bytes, 12 columns
    let payload: Vec<u8> = (0..12 * RS_DATA_LEN).map(|i| (i * 7 % 256) as u8).collect();
    let clean = rs_encode_superframe(&payload);
    let mut sf = clean.clone();

    // a burst of 24 bytes hits each codeword twice
    for byte in &mut sf[100..124] {
        *byte ^= 0x5A;
    }

    let stats = decode_superframe(&mut RsCorrector::default(), &mut sf);
    assert_eq!(stats.codewords, 12);
    assert_eq!(stats.corrected_symbols, 24);
    assert!(!stats.is_degraded());
    assert_eq!(sf[..payload.len()], clean[..payload.len()]);
}
