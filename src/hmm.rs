use log::debug;

use crate::errs::{GlomError, GlomResult};
use crate::kbounds::KBounds;
use crate::sequence::{Sequence, Track};

/// One rearrangement event decoded from a cluster of reads.
#[derive(Debug, Clone)]
pub struct HmmEvent {
    pub naive_seq: String,
    pub cyst_position: Option<usize>,
}

/// What a single engine run produced. Viterbi-flavored engines populate
/// `events`; forward-flavored engines populate `total_score`. Either flavor
/// may report that its optimum sat on the edge of the kbounds rectangle
/// (`boundary_error`) along with a widened rectangle to retry with, or that
/// the rectangle cannot widen any further (`could_not_expand`).
#[derive(Debug, Clone)]
pub struct HmmOutput {
    pub events: Vec<HmmEvent>,
    pub total_score: f64,
    pub better_kbounds: KBounds,
    pub boundary_error: bool,
    pub could_not_expand: bool,
}

impl HmmOutput {
    pub fn converged(
        events: Vec<HmmEvent>,
        total_score: f64,
        kbounds: KBounds,
    ) -> Self {
        Self {
            events,
            total_score,
            better_kbounds: kbounds,
            boundary_error: false,
            could_not_expand: false,
        }
    }
}

pub trait ViterbiEngine {
    /// Decode the most likely rearrangement for `seqs` within `kbounds`,
    /// restricted to `only_genes`, at the given mean mutation frequency.
    fn run(
        &mut self,
        seqs: &[Sequence],
        kbounds: KBounds,
        only_genes: &[String],
        mean_mute_freq: f64,
    ) -> GlomResult<HmmOutput>;
}

pub trait ForwardEngine {
    /// Total log-probability of `seqs` summed over rearrangements within
    /// `kbounds`, restricted to `only_genes`.
    fn run(
        &mut self,
        seqs: &[Sequence],
        kbounds: KBounds,
        only_genes: &[String],
        mean_mute_freq: f64,
    ) -> GlomResult<HmmOutput>;
}

/// Rerun the engine, widening the kbounds rectangle, until the optimum is
/// off the boundary or the rectangle cannot expand. Returns the final output
/// together with the kbounds it was produced under.
pub(crate) fn run_refined(
    mut run: impl FnMut(KBounds) -> GlomResult<HmmOutput>,
    mut kbounds: KBounds,
) -> GlomResult<(HmmOutput, KBounds)> {
    loop {
        let result = run(kbounds)?;
        kbounds = result.better_kbounds;
        if !result.boundary_error || result.could_not_expand {
            return Ok((result, kbounds));
        }
        debug!("boundary hit, expanding to {kbounds} and rerunning");
    }
}

/// Stands in for full Viterbi decoding when only distance-based clustering
/// is needed: the naive sequence is the column-wise plurality symbol of the
/// cluster, with ties broken toward the lower symbol index and all-ambiguous
/// columns left ambiguous. Never reports a boundary error.
#[derive(Debug, Default)]
pub struct ConsensusEngine {
    track: Track,
}

impl ConsensusEngine {
    pub fn new(track: Track) -> Self {
        Self { track }
    }
}

impl ViterbiEngine for ConsensusEngine {
    fn run(
        &mut self,
        seqs: &[Sequence],
        kbounds: KBounds,
        _only_genes: &[String],
        _mean_mute_freq: f64,
    ) -> GlomResult<HmmOutput> {
        let Some(first) = seqs.first() else {
            return Err(GlomError::Data(
                "consensus of an empty sequence vector".to_string(),
            ));
        };
        if seqs.iter().any(|s| s.len() != first.len()) {
            return Err(GlomError::Data(format!(
                "unequal-length sequences in consensus for {}",
                first.name()
            )));
        }
        let ambiguous = self.track.ambiguous_index();
        let mut naive_seq = String::with_capacity(first.len());
        for ic in 0..first.len() {
            let mut counts = vec![0usize; self.track.alphabet_size()];
            for seq in seqs {
                let ch = seq.at(ic);
                if Some(ch) == ambiguous {
                    continue;
                }
                counts[ch as usize] += 1;
            }
            let (winner, count) = counts
                .iter()
                .enumerate()
                .max_by_key(|(i, c)| (**c, std::cmp::Reverse(*i)))
                .expect("alphabet should be non-empty");
            let symbol = if *count == 0 {
                let ambiguous =
                    ambiguous.expect("track has no ambiguous symbol");
                self.track.symbol(ambiguous)
            } else {
                self.track.symbol(winner as u8)
            };
            naive_seq.push(symbol);
        }
        let event =
            HmmEvent { naive_seq, cyst_position: first.cyst_position() };
        Ok(HmmOutput::converged(vec![event], f64::NEG_INFINITY, kbounds))
    }
}

/// Used where a real forward HMM would be linked in: every score is expected
/// to come from the warm cache, so being asked to run at all is a
/// configuration error.
#[derive(Debug, Default)]
pub struct CacheOnlyEngine;

impl ForwardEngine for CacheOnlyEngine {
    fn run(
        &mut self,
        seqs: &[Sequence],
        _kbounds: KBounds,
        _only_genes: &[String],
        _mean_mute_freq: f64,
    ) -> GlomResult<HmmOutput> {
        let names =
            seqs.iter().map(|s| s.name()).collect::<Vec<&str>>().join(":");
        Err(GlomError::Config(format!(
            "no forward engine is configured and {names} is not cached; \
             supply a warm cache file or run with --no-fwd"
        )))
    }
}
