use std::fmt::{Display, Formatter};

use crate::errs::{GlomError, GlomResult};

pub const DNA_SYMBOLS: [char; 4] = ['A', 'C', 'G', 'T'];
pub const AMBIGUOUS_SYMBOL: char = 'N';

/// Alphabet over which sequences are digitized. The ambiguous symbol, when
/// set, digitizes to the index one past the last real symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    symbols: Vec<char>,
    ambiguous: Option<char>,
}

impl Default for Track {
    fn default() -> Self {
        Track::dna()
    }
}

impl Track {
    pub fn dna() -> Self {
        Self { symbols: DNA_SYMBOLS.to_vec(), ambiguous: Some(AMBIGUOUS_SYMBOL) }
    }

    pub fn alphabet_size(&self) -> usize {
        self.symbols.len()
    }

    pub fn ambiguous_index(&self) -> Option<u8> {
        self.ambiguous.map(|_| self.symbols.len() as u8)
    }

    pub fn symbol_index(&self, ch: char) -> GlomResult<u8> {
        if Some(ch) == self.ambiguous {
            return Ok(self.symbols.len() as u8);
        }
        self.symbols
            .iter()
            .position(|&s| s == ch)
            .map(|i| i as u8)
            .ok_or_else(|| {
                GlomError::Data(format!("symbol {ch} is not on the track"))
            })
    }

    pub fn symbol(&self, index: u8) -> char {
        if Some(index) == self.ambiguous_index() {
            self.ambiguous.unwrap()
        } else {
            self.symbols[index as usize]
        }
    }
}

/// A named read, stored both digitized (for comparisons) and as the original
/// ungapped string (for output). Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    name: String,
    digitized: Vec<u8>,
    undigitized: String,
    cyst_position: Option<usize>,
}

impl Sequence {
    pub fn new(
        track: &Track,
        name: String,
        seq: &str,
        cyst_position: Option<usize>,
    ) -> GlomResult<Self> {
        let digitized = seq
            .chars()
            .map(|ch| track.symbol_index(ch))
            .collect::<GlomResult<Vec<u8>>>()?;
        Ok(Self { name, digitized, undigitized: seq.to_owned(), cyst_position })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn undigitized(&self) -> &str {
        &self.undigitized
    }

    pub fn cyst_position(&self) -> Option<usize> {
        self.cyst_position
    }

    pub fn len(&self) -> usize {
        self.digitized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digitized.is_empty()
    }

    #[inline]
    pub fn at(&self, position: usize) -> u8 {
        self.digitized[position]
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.undigitized)
    }
}

/// Symbol-disagreement rate between two equal-length sequences, skipping
/// every position where either side is the ambiguous symbol. The denominator
/// is the number of positions actually compared.
pub fn hamming_fraction(
    seq_a: &Sequence,
    seq_b: &Sequence,
    track: &Track,
) -> GlomResult<f64> {
    if seq_a.len() != seq_b.len() {
        return Err(GlomError::Data(format!(
            "sequences of different length in hamming fraction ({}, {})",
            seq_a.undigitized(),
            seq_b.undigitized()
        )));
    }
    let ambiguous_index = track.ambiguous_index();
    let mut distance = 0usize;
    let mut len_excluding_ambigs = 0usize;
    for ic in 0..seq_a.len() {
        let (ch_a, ch_b) = (seq_a.at(ic), seq_b.at(ic));
        if Some(ch_a) == ambiguous_index || Some(ch_b) == ambiguous_index {
            continue;
        }
        len_excluding_ambigs += 1;
        if ch_a != ch_b {
            distance += 1;
        }
    }
    if len_excluding_ambigs == 0 {
        return Err(GlomError::Data(format!(
            "no comparable positions between {} and {}",
            seq_a.name(),
            seq_b.name()
        )));
    }
    Ok(distance as f64 / len_excluding_ambigs as f64)
}

#[cfg(test)]
mod sequence_tests {
    use assert_approx_eq::assert_approx_eq;

    use super::{hamming_fraction, Sequence, Track};

    fn seq(track: &Track, name: &str, s: &str) -> Sequence {
        Sequence::new(track, name.to_string(), s, None).unwrap()
    }

    #[test]
    fn test_track_digitization_round_trip() {
        let track = Track::dna();
        let s = seq(&track, "q0", "ACGTN");
        assert_eq!(s.len(), 5);
        assert_eq!(s.at(0), 0);
        assert_eq!(s.at(3), 3);
        assert_eq!(Some(s.at(4)), track.ambiguous_index());
        let redigitized: String =
            (0..s.len()).map(|i| track.symbol(s.at(i))).collect();
        assert_eq!(&redigitized, s.undigitized());
    }

    #[test]
    fn test_track_rejects_foreign_symbols() {
        let track = Track::dna();
        assert!(Sequence::new(&track, "q0".to_string(), "ACGU", None).is_err());
    }

    #[test]
    fn test_hamming_fraction_basic() {
        let track = Track::dna();
        let a = seq(&track, "a", "ACGTACGT");
        let b = seq(&track, "b", "ACGTACGG");
        assert_approx_eq!(
            hamming_fraction(&a, &b, &track).unwrap(),
            1f64 / 8f64
        );
    }

    #[test]
    fn test_hamming_ignores_ambiguous_positions() {
        let track = Track::dna();
        let a = seq(&track, "a", "ACGT");
        let b = seq(&track, "b", "ACGG");
        let without = hamming_fraction(&a, &b, &track).unwrap();
        // an N column on either side should leave the fraction unchanged
        // relative to dropping that column entirely
        let a_n = seq(&track, "a", "ACNGT");
        let b_n = seq(&track, "b", "ACAGG");
        assert_approx_eq!(
            hamming_fraction(&a_n, &b_n, &track).unwrap(),
            without
        );
        let b_n2 = seq(&track, "b", "ACGNG");
        let a_n2 = seq(&track, "a", "ACGTT");
        assert_approx_eq!(
            hamming_fraction(&a_n2, &b_n2, &track).unwrap(),
            hamming_fraction(
                &seq(&track, "a", "ACGT"),
                &seq(&track, "b", "ACGG"),
                &track
            )
            .unwrap()
        );
    }

    #[test]
    fn test_hamming_fraction_length_mismatch_is_fatal() {
        let track = Track::dna();
        let a = seq(&track, "a", "ACGT");
        let b = seq(&track, "b", "ACG");
        assert!(hamming_fraction(&a, &b, &track).is_err());
    }

    #[test]
    fn test_hamming_fraction_all_ambiguous_is_fatal() {
        let track = Track::dna();
        let a = seq(&track, "a", "NNNN");
        let b = seq(&track, "b", "ACGT");
        assert!(hamming_fraction(&a, &b, &track).is_err());
    }
}
