use std::path::PathBuf;

use indexmap::IndexMap;
use log::{debug, info};
use prettytable::row;
use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::ScoreCache;
use crate::cluster_path::{ClusterPath, Partition};
use crate::errs::{GlomError, GlomResult};
use crate::hmm::{run_refined, ForwardEngine, ViterbiEngine};
use crate::inputs::QueryRecord;
use crate::kbounds::KBounds;
use crate::sequence::{hamming_fraction, Sequence, Track};
use crate::util::{add_with_minus_infinities, merge_ticker};

/// Minimum log likelihood ratio a merge must reach, gated on the size of the
/// merged cluster. Sizes without an entry are unrestricted.
#[derive(Debug, Clone)]
pub struct MergeRatioGate {
    thresholds: Vec<(usize, f64)>,
}

impl Default for MergeRatioGate {
    fn default() -> Self {
        Self {
            thresholds: vec![(2, 20.0), (3, 15.0), (4, 10.0), (5, 5.0)],
        }
    }
}

impl MergeRatioGate {
    pub fn new(thresholds: Vec<(usize, f64)>) -> Self {
        Self { thresholds }
    }

    /// Parse repeated `SIZE:MIN` options; an empty list means the defaults.
    pub fn parse(raw: &[String]) -> GlomResult<Self> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let thresholds = raw
            .iter()
            .map(|r| {
                let parts = r.split(':').collect::<Vec<&str>>();
                if parts.len() != 2 {
                    return Err(GlomError::Config(format!(
                        "illegal merge ratio threshold {r}, should be \
                         SIZE:MIN e.g. 2:20"
                    )));
                }
                let size = parts[0].parse::<usize>().map_err(|e| {
                    GlomError::Config(format!("bad size in {r}, {e}"))
                })?;
                let min_ratio = parts[1].parse::<f64>().map_err(|e| {
                    GlomError::Config(format!("bad ratio in {r}, {e}"))
                })?;
                Ok((size, min_ratio))
            })
            .collect::<GlomResult<Vec<(usize, f64)>>>()?;
        Ok(Self { thresholds })
    }

    pub fn min_ratio(&self, merged_size: usize) -> Option<f64> {
        self.thresholds
            .iter()
            .find(|(size, _)| *size == merged_size)
            .map(|(_, min_ratio)| *min_ratio)
    }
}

#[derive(Debug, Clone)]
pub struct GlomConfig {
    pub cachefile: Option<PathBuf>,
    pub smc_particles: usize,
    pub hamming_fraction_bound_lo: f64,
    pub hamming_fraction_bound_hi: f64,
    pub no_fwd: bool,
    pub max_logprob_drop: f64,
    pub dont_write_naive_hfracs: bool,
    pub debug: bool,
    pub ratio_gate: MergeRatioGate,
}

impl Default for GlomConfig {
    fn default() -> Self {
        Self {
            cachefile: None,
            smc_particles: 1,
            hamming_fraction_bound_lo: 0.0,
            hamming_fraction_bound_hi: 0.08,
            no_fwd: false,
            max_logprob_drop: 5.0,
            dont_write_naive_hfracs: false,
            debug: false,
            ratio_gate: MergeRatioGate::default(),
        }
    }
}

/// A proposed merge of two clusters, built without touching engine state.
#[derive(Debug, Clone)]
pub struct Query {
    pub name: String,
    pub seqs: Vec<Sequence>,
    pub kbounds: KBounds,
    pub only_genes: Vec<String>,
    pub mean_mute_freq: f64,
    pub parents: (String, String),
}

#[derive(Debug, Default)]
pub struct GlomCounts {
    pub n_vtb_cached: usize,
    pub n_vtb_calculated: usize,
    pub n_fwd_cached: usize,
    pub n_fwd_calculated: usize,
    pub n_hfrac_calculated: usize,
    pub n_hamming_merged: usize,
}

impl GlomCounts {
    pub(crate) fn to_table(&self) -> prettytable::Table {
        let mut tab = prettytable::Table::new();
        tab.set_format(
            *prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE,
        );
        tab.set_titles(row!["calculation", "cached", "calculated"]);
        tab.add_row(row!["viterbi", self.n_vtb_cached, self.n_vtb_calculated]);
        tab.add_row(row!["forward", self.n_fwd_cached, self.n_fwd_calculated]);
        tab.add_row(row!["naive hfrac", "", self.n_hfrac_calculated]);
        tab.add_row(row!["hamming merges", "", self.n_hamming_merged]);
        tab
    }
}

/// The glomeration engine: owns the per-cluster metadata, the memoizing
/// caches, and the initial partitions, and drives the agglomerative loop.
pub struct Glomerator<V: ViterbiEngine, F: ForwardEngine> {
    pub(crate) track: Track,
    pub(crate) config: GlomConfig,
    vtb: V,
    fwd: F,
    pub(crate) seq_info: IndexMap<String, Vec<Sequence>>,
    pub(crate) only_genes: FxHashMap<String, Vec<String>>,
    pub(crate) kbinfo: FxHashMap<String, KBounds>,
    pub(crate) mute_freqs: FxHashMap<String, f64>,
    pub(crate) cache: ScoreCache,
    // symmetric per-pair memo keyed under both "a-b" and "b-a"
    naive_hamming_fractions: FxHashMap<String, f64>,
    // per-member memo used by the divvy
    pub(crate) hamming_fractions: FxHashMap<String, f64>,
    initial_partitions: Vec<Partition>,
    initial_logprobs: Vec<f64>,
    initial_logweights: Vec<f64>,
    i_initial_partition: usize,
    pub(crate) counts: GlomCounts,
}

impl<V: ViterbiEngine, F: ForwardEngine> Glomerator<V, F> {
    pub fn new(
        track: Track,
        config: GlomConfig,
        records: &[QueryRecord],
        vtb: V,
        fwd: F,
    ) -> GlomResult<Self> {
        let mut this = Self {
            track,
            config,
            vtb,
            fwd,
            seq_info: IndexMap::new(),
            only_genes: FxHashMap::default(),
            kbinfo: FxHashMap::default(),
            mute_freqs: FxHashMap::default(),
            cache: ScoreCache::default(),
            naive_hamming_fractions: FxHashMap::default(),
            hamming_fractions: FxHashMap::default(),
            initial_partitions: Vec::new(),
            initial_logprobs: Vec::new(),
            initial_logweights: Vec::new(),
            i_initial_partition: 0,
            counts: GlomCounts::default(),
        };
        if let Some(cachefile) = this.config.cachefile.clone() {
            this.cache.read(&cachefile, &this.track)?;
        }

        let mut tmp_partition = Partition::new();
        let mut last_ipath = 0usize;
        let mut last_logweight = 0.0f64;
        for record in records {
            let key = record.key();
            if record.path_index != last_ipath {
                if !tmp_partition.is_empty() {
                    // every row of a group carries the same logweight, so
                    // the row that opens the next group stands in for the
                    // group being closed
                    this.push_initial_partition(
                        std::mem::take(&mut tmp_partition),
                        record.logweight,
                    )?;
                }
                last_ipath = record.path_index;
            }
            last_logweight = record.logweight;
            tmp_partition.insert(key.clone());

            // a cluster on several paths only needs indexing once
            if this.seq_info.contains_key(&key) {
                continue;
            }
            let seqs = record
                .names
                .iter()
                .zip(record.seqs.iter())
                .map(|(name, seq)| {
                    Sequence::new(&this.track, name.clone(), seq, None)
                })
                .collect::<GlomResult<Vec<Sequence>>>()?;
            this.seq_info.insert(key.clone(), seqs);
            this.only_genes.insert(key.clone(), record.only_genes.clone());
            this.kbinfo.insert(key.clone(), record.kbounds);
            this.mute_freqs.insert(key, record.mean_mute_freq());
        }
        if tmp_partition.is_empty() {
            return Err(GlomError::Config(
                "no input clusters to glomerate".to_string(),
            ));
        }
        this.push_initial_partition(tmp_partition, last_logweight)?;

        // the first pass only ever hands us one partition, so an ensemble
        // starts from copies of it
        if this.initial_partitions.len() == 1 && this.config.smc_particles > 1
        {
            for _ in 1..this.config.smc_particles {
                this.initial_partitions
                    .push(this.initial_partitions[0].clone());
                this.initial_logprobs.push(this.initial_logprobs[0]);
                this.initial_logweights.push(this.initial_logweights[0]);
            }
        }
        if this.initial_partitions.len() != this.config.smc_particles {
            return Err(GlomError::Config(format!(
                "{} initial partitions for {} particles",
                this.initial_partitions.len(),
                this.config.smc_particles
            )));
        }
        if this.config.debug {
            for i in 0..this.initial_partitions.len() {
                let partition = this.initial_partitions[i].clone();
                this.print_partition(&partition, "initial")?;
            }
        }
        Ok(this)
    }

    fn push_initial_partition(
        &mut self,
        partition: Partition,
        logweight: f64,
    ) -> GlomResult<()> {
        let logprob = self.log_prob_of_partition(&partition)?;
        self.initial_partitions.push(partition);
        self.initial_logprobs.push(logprob);
        self.initial_logweights.push(logweight);
        Ok(())
    }

    pub fn counts(&self) -> &GlomCounts {
        &self.counts
    }

    pub fn cached_naive_seq(&self, key: &str) -> Option<&Sequence> {
        self.cache.naive_seq(key)
    }

    /// Sorts the two operands but does not re-sort within them: reaching
    /// the same member set along a different merge order can in principle
    /// produce a different key (and a cache miss), but merges are never
    /// undone, so a member set is only ever assembled one way per path.
    pub fn join_names(name_a: &str, name_b: &str) -> String {
        let mut names = [name_a, name_b];
        names.sort_unstable();
        format!("{}:{}", names[0], names[1])
    }

    /// Total log-probability of a partition, summing the per-cluster
    /// forward scores with minus infinity absorbing. Under `no_fwd` the
    /// partition trajectory is driven purely by hamming merges and every
    /// partition scores minus infinity.
    pub fn log_prob_of_partition(
        &mut self,
        partition: &Partition,
    ) -> GlomResult<f64> {
        if self.config.no_fwd {
            return Ok(f64::NEG_INFINITY);
        }
        let mut total = 0.0f64;
        for key in partition {
            let logprob = self.log_prob_for_key(key)?;
            total = add_with_minus_infinities(total, logprob);
        }
        Ok(total)
    }

    fn log_prob_for_key(&mut self, key: &str) -> GlomResult<f64> {
        if let Some(logprob) = self.cache.log_prob(key) {
            self.counts.n_fwd_cached += 1;
            return Ok(logprob);
        }
        let seqs = self.cluster_seqs(key)?.to_vec();
        let kbounds = self.cluster_kbounds(key)?;
        let only_genes =
            self.only_genes.get(key).cloned().unwrap_or_default();
        let mean_mute_freq =
            self.mute_freqs.get(key).copied().unwrap_or_default();
        self.get_log_prob(key, &seqs, kbounds, &only_genes, mean_mute_freq)
    }

    /// Memoized forward score for `name`. Kbounds widened during the
    /// refinement loop are cheap to rediscover and are not written back to
    /// the cluster metadata.
    pub fn get_log_prob(
        &mut self,
        name: &str,
        seqs: &[Sequence],
        kbounds: KBounds,
        only_genes: &[String],
        mean_mute_freq: f64,
    ) -> GlomResult<f64> {
        if let Some(logprob) = self.cache.log_prob(name) {
            self.counts.n_fwd_cached += 1;
            return Ok(logprob);
        }
        self.counts.n_fwd_calculated += 1;
        let fwd = &mut self.fwd;
        let (result, _kbounds) = run_refined(
            |kb| fwd.run(seqs, kb, only_genes, mean_mute_freq),
            kbounds,
        )?;
        self.cache.set_log_prob(name, result.total_score);
        if result.boundary_error && !result.could_not_expand {
            self.cache.tag_error(name, "boundary");
        }
        Ok(result.total_score)
    }

    /// Memoized naive-sequence inference for the cluster `key`. The
    /// refinement loop's final kbounds are kept: they only ever widen.
    pub fn get_naive_seq(&mut self, key: &str) -> GlomResult<()> {
        if self.cache.naive_seq(key).is_some() {
            self.counts.n_vtb_cached += 1;
            return Ok(());
        }
        self.counts.n_vtb_calculated += 1;
        let seqs = self.cluster_seqs(key)?.to_vec();
        let kbounds = self.cluster_kbounds(key)?;
        let only_genes =
            self.only_genes.get(key).cloned().unwrap_or_default();
        let mean_mute_freq =
            self.mute_freqs.get(key).copied().unwrap_or_default();
        let vtb = &mut self.vtb;
        let (result, final_kbounds) = run_refined(
            |kb| vtb.run(&seqs, kb, &only_genes, mean_mute_freq),
            kbounds,
        )?;
        self.kbinfo.insert(key.to_owned(), final_kbounds);
        let Some(event) = result.events.first() else {
            return Err(GlomError::Data(format!("no events for {key}")));
        };
        let naive = Sequence::new(
            &self.track,
            key.to_owned(),
            &event.naive_seq,
            event.cyst_position,
        )?;
        self.cache.set_naive_seq(key, naive);
        if result.boundary_error {
            self.cache.tag_error(key, "boundary");
        }
        Ok(())
    }

    /// Hamming fraction between the naive sequences of two clusters,
    /// memoized under both key orderings.
    pub fn naive_hamming_fraction(
        &mut self,
        key_a: &str,
        key_b: &str,
    ) -> GlomResult<f64> {
        if let Some(hfrac) =
            self.naive_hamming_fractions.get(&format!("{key_a}-{key_b}"))
        {
            return Ok(*hfrac);
        }
        self.get_naive_seq(key_a)?;
        self.get_naive_seq(key_b)?;
        let naive_a = self.cached_naive_seq_cloned(key_a)?;
        let naive_b = self.cached_naive_seq_cloned(key_b)?;
        let hfrac = self.hamming_fraction_memoized(&naive_a, &naive_b)?;
        self.naive_hamming_fractions
            .insert(format!("{key_a}-{key_b}"), hfrac);
        self.naive_hamming_fractions
            .insert(format!("{key_b}-{key_a}"), hfrac);
        Ok(hfrac)
    }

    fn cached_naive_seq_cloned(&self, key: &str) -> GlomResult<Sequence> {
        self.cache.naive_seq(key).cloned().ok_or_else(|| {
            GlomError::Data(format!("no naive sequence for {key}"))
        })
    }

    fn hamming_fraction_memoized(
        &mut self,
        seq_a: &Sequence,
        seq_b: &Sequence,
    ) -> GlomResult<f64> {
        let joint_key = Self::join_names(seq_a.name(), seq_b.name());
        if let Some(hfrac) = self.cache.naive_hfrac(&joint_key) {
            return Ok(hfrac);
        }
        self.counts.n_hfrac_calculated += 1;
        let hfrac = hamming_fraction(seq_a, seq_b, &self.track)?;
        self.cache.set_naive_hfrac(&joint_key, hfrac);
        Ok(hfrac)
    }

    fn cluster_seqs(&self, key: &str) -> GlomResult<&[Sequence]> {
        self.seq_info.get(key).map(|seqs| seqs.as_slice()).ok_or_else(|| {
            GlomError::Data(format!("no sequence info for {key}"))
        })
    }

    fn cluster_kbounds(&self, key: &str) -> GlomResult<KBounds> {
        self.kbinfo.get(key).copied().ok_or_else(|| {
            GlomError::Data(format!("no kbounds for {key}"))
        })
    }

    fn merge_seq_vectors(
        &self,
        name_a: &str,
        name_b: &str,
    ) -> GlomResult<Vec<Sequence>> {
        let mut merged = self.cluster_seqs(name_a)?.to_vec();
        merged.extend(self.cluster_seqs(name_b)?.iter().cloned());
        let mut all_names = FxHashSet::default();
        for seq in &merged {
            if !all_names.insert(seq.name().to_owned()) {
                return Err(GlomError::Data(format!(
                    "tried to merge sequence {} twice ({name_a} with \
                     {name_b})",
                    seq.name()
                )));
            }
        }
        Ok(merged)
    }

    /// Build the proposed merge of `name_a` and `name_b` without mutating
    /// any engine state.
    pub fn get_merged_query(
        &self,
        name_a: &str,
        name_b: &str,
    ) -> GlomResult<Query> {
        let seqs = self.merge_seq_vectors(name_a, name_b)?;
        let kbounds = self
            .cluster_kbounds(name_a)?
            .logical_or(&self.cluster_kbounds(name_b)?);
        // duplicates in the gene list are harmless
        let mut only_genes =
            self.only_genes.get(name_a).cloned().unwrap_or_default();
        if let Some(genes_b) = self.only_genes.get(name_b) {
            only_genes.extend(genes_b.iter().cloned());
        }
        let size_a = self.cluster_seqs(name_a)?.len() as f64;
        let size_b = self.cluster_seqs(name_b)?.len() as f64;
        let mute_a = self.mute_freqs.get(name_a).copied().unwrap_or_default();
        let mute_b = self.mute_freqs.get(name_b).copied().unwrap_or_default();
        let mean_mute_freq =
            (size_a * mute_a + size_b * mute_b) / (size_a + size_b);
        Ok(Query {
            name: Self::join_names(name_a, name_b),
            seqs,
            kbounds,
            only_genes,
            mean_mute_freq,
            parents: (name_a.to_owned(), name_b.to_owned()),
        })
    }

    /// Pick the next merge for `path`, returning the chosen query and the
    /// scalar used to accept it, or `None` after flagging the path
    /// finished. Hamming-shortcut merges preempt every likelihood
    /// evaluation and report minus infinity. With a single particle the
    /// argmax likelihood ratio wins; an ensemble samples proportionally to
    /// the exponentiated ratios and reports the absolute log-probability of
    /// the sampled merged cluster, NOT its ratio, so the two branches are
    /// not directly comparable.
    pub fn choose_merge(
        &mut self,
        path: &mut ClusterPath,
        rng: &mut StdRng,
    ) -> GlomResult<Option<(Query, f64)>> {
        let keys = path
            .current_partition()
            .iter()
            .cloned()
            .collect::<Vec<String>>();
        let mut potential_merges: Vec<(f64, Query)> = Vec::new();
        let mut max_lratio = f64::NEG_INFINITY;
        let mut imax: Option<usize> = None;
        let mut min_hamming_fraction = f64::INFINITY;
        let mut min_hamming_merge: Option<Query> = None;
        let mut n_total_pairs = 0usize;
        let mut n_skipped_hamming = 0usize;
        let mut n_inf_factors = 0usize;

        for ia in 0..keys.len() {
            for ib in (ia + 1)..keys.len() {
                let (key_a, key_b) = (&keys[ia], &keys[ib]);
                n_total_pairs += 1;

                let hfrac = self.naive_hamming_fraction(key_a, key_b)?;
                if hfrac > self.config.hamming_fraction_bound_hi {
                    n_skipped_hamming += 1;
                    continue;
                }

                let qmerged = self.get_merged_query(key_a, key_b)?;

                if self.config.hamming_fraction_bound_lo > 0.0
                    && hfrac < self.config.hamming_fraction_bound_lo
                {
                    // close enough to merge without consulting the hmm
                    if hfrac < min_hamming_fraction {
                        min_hamming_fraction = hfrac;
                        min_hamming_merge = Some(qmerged);
                    }
                    continue;
                }
                if min_hamming_merge.is_some() {
                    // a pending hamming merge preempts any hmm evaluation
                    continue;
                }

                let seqs_a = self.cluster_seqs(key_a)?.to_vec();
                let seqs_b = self.cluster_seqs(key_b)?.to_vec();
                let mute_a =
                    self.mute_freqs.get(key_a).copied().unwrap_or_default();
                let mute_b =
                    self.mute_freqs.get(key_b).copied().unwrap_or_default();
                let lp_a = self.get_log_prob(
                    key_a,
                    &seqs_a,
                    qmerged.kbounds,
                    &qmerged.only_genes,
                    mute_a,
                )?;
                let lp_b = self.get_log_prob(
                    key_b,
                    &seqs_b,
                    qmerged.kbounds,
                    &qmerged.only_genes,
                    mute_b,
                )?;
                let lp_ab = self.get_log_prob(
                    &qmerged.name,
                    &qmerged.seqs,
                    qmerged.kbounds,
                    &qmerged.only_genes,
                    qmerged.mean_mute_freq,
                )?;
                let lratio = lp_ab - lp_a - lp_b;
                debug!(
                    "{lratio:8.3} = {lp_ab:8.2} - {lp_a:8.2} - {lp_b:8.2}  \
                     ({key_a} and {key_b})"
                );

                if let Some(min_ratio) =
                    self.config.ratio_gate.min_ratio(qmerged.seqs.len())
                {
                    if lratio < min_ratio {
                        continue;
                    }
                }

                if lratio == f64::NEG_INFINITY {
                    n_inf_factors += 1;
                }
                potential_merges.push((lratio, qmerged));
                if lratio > max_lratio {
                    max_lratio = lratio;
                    imax = Some(potential_merges.len() - 1);
                }
            }
        }

        if let Some(qmerge) = min_hamming_merge {
            self.counts.n_hamming_merged += 1;
            return Ok(Some((qmerge, f64::NEG_INFINITY)));
        }

        debug!("hamming skipped {n_skipped_hamming} / {n_total_pairs}");

        if max_lratio == f64::NEG_INFINITY {
            if keys.len() == 1 {
                info!("stopping with a partition of size one");
            } else if n_skipped_hamming == n_total_pairs {
                info!(
                    "stopping with all {n_skipped_hamming} / {n_total_pairs} \
                     hamming fractions above {}",
                    self.config.hamming_fraction_bound_hi
                );
            } else if n_inf_factors == n_total_pairs {
                info!(
                    "stopping with all {n_inf_factors} / {n_total_pairs} \
                     likelihood ratios -inf"
                );
            } else {
                info!(
                    "stopping with -inf: {n_inf_factors}   hamming skipped: \
                     {n_skipped_hamming}   total: {n_total_pairs}"
                );
            }
            path.finished = true;
            return Ok(None);
        }

        if self.config.smc_particles == 1 {
            let i = imax.expect("a finite maximum implies a candidate");
            let (lratio, qmerged) = potential_merges.swap_remove(i);
            return Ok(Some((qmerged, lratio)));
        }

        let qmerged = Self::choose_random_merge(&potential_merges, rng)?;
        let chosen_lratio =
            self.cache.log_prob(&qmerged.name).ok_or_else(|| {
                GlomError::Data(format!(
                    "no cached log prob for sampled merge {}",
                    qmerged.name
                ))
            })?;
        Ok(Some((qmerged, chosen_lratio)))
    }

    fn choose_random_merge(
        potential_merges: &[(f64, Query)],
        rng: &mut StdRng,
    ) -> GlomResult<Query> {
        let weights = potential_merges
            .iter()
            .map(|(lratio, _)| lratio.exp())
            .collect::<Vec<f64>>();
        let total = weights.iter().sum::<f64>();
        if !(total > 0.0) {
            return Err(GlomError::Data(
                "every merge weight vanished in sampling".to_string(),
            ));
        }
        let drawpoint = rng.gen::<f64>() * total;
        let mut sum = 0.0f64;
        for (weight, (_, qmerged)) in weights.iter().zip(potential_merges) {
            sum += weight;
            if sum > drawpoint {
                return Ok(qmerged.clone());
            }
        }
        // rounding in the running sum can leave the drawpoint uncovered
        Ok(potential_merges
            .last()
            .expect("a positive total implies candidates")
            .1
            .clone())
    }

    /// Perform one merge step on `path`: pick a pair, register the merged
    /// cluster (once, however many particles choose it), and append the new
    /// partition.
    pub fn merge(
        &mut self,
        path: &mut ClusterPath,
        rng: &mut StdRng,
    ) -> GlomResult<()> {
        if path.finished {
            return Ok(());
        }
        let Some((qmerge, chosen_lratio)) = self.choose_merge(path, rng)?
        else {
            return Ok(());
        };

        if !self.seq_info.contains_key(&qmerge.name) {
            self.seq_info.insert(qmerge.name.clone(), qmerge.seqs.clone());
            self.kbinfo.insert(qmerge.name.clone(), qmerge.kbounds);
            self.mute_freqs
                .insert(qmerge.name.clone(), qmerge.mean_mute_freq);
            self.only_genes
                .insert(qmerge.name.clone(), qmerge.only_genes.clone());
            self.get_naive_seq(&qmerge.name)?;
        }

        let last_partition = path.current_partition().clone();
        let last_logprob = self.log_prob_of_partition(&last_partition)?;
        let mut new_partition = last_partition;
        new_partition.remove(&qmerge.parents.0);
        new_partition.remove(&qmerge.parents.1);
        new_partition.insert(qmerge.name.clone());
        let logprob = self.log_prob_of_partition(&new_partition)?;

        if self.config.debug {
            let delta = logprob - last_logprob;
            if (delta - chosen_lratio).abs() > 1e-8 {
                debug!(
                    "merged {chosen_lratio:8.2} ({chosen_lratio:.15} != \
                     {delta:.15})   {} and {}",
                    qmerge.parents.0, qmerge.parents.1
                );
            } else {
                debug!(
                    "merged {chosen_lratio:8.2}   {} and {}",
                    qmerge.parents.0, qmerge.parents.1
                );
            }
            self.print_partition(&new_partition, "current")?;
        }

        path.add_partition(
            new_partition,
            logprob,
            self.config.max_logprob_drop,
        );
        Ok(())
    }

    /// Hand out the next initial partition together with its index and
    /// logweight.
    pub fn get_an_initial_partition(
        &mut self,
    ) -> GlomResult<(Partition, usize, f64)> {
        let i = self.i_initial_partition;
        if i >= self.initial_partitions.len() {
            return Err(GlomError::Config(format!(
                "initial partitions exhausted after {i}"
            )));
        }
        self.i_initial_partition += 1;
        Ok((
            self.initial_partitions[i].clone(),
            i,
            self.initial_logweights[i],
        ))
    }

    /// Run every path to completion and return the trajectories.
    pub fn cluster(&mut self, rng: &mut StdRng) -> GlomResult<Vec<ClusterPath>> {
        debug!("glomerating");
        let ticker = merge_ticker();
        let mut paths = Vec::with_capacity(self.config.smc_particles);
        for _ in 0..self.config.smc_particles {
            let (partition, initial_path_index, logweight) =
                self.get_an_initial_partition()?;
            ticker.set_message(format!("(path {initial_path_index})"));
            let logprob = self.initial_logprobs[initial_path_index];
            let mut path = ClusterPath::new(
                partition,
                logprob,
                logweight,
                initial_path_index,
            );
            while !path.finished {
                self.merge(&mut path, rng)?;
                ticker.inc(1);
            }
            paths.push(path);
        }
        ticker.finish_and_clear();
        Ok(paths)
    }

    /// Warm the cache with the naive sequence of every input cluster.
    pub fn cache_naive_seqs(&mut self) -> GlomResult<()> {
        let keys = self.seq_info.keys().cloned().collect::<Vec<String>>();
        for key in keys {
            self.get_naive_seq(&key)?;
        }
        Ok(())
    }

    fn print_partition(
        &mut self,
        partition: &Partition,
        extrastr: &str,
    ) -> GlomResult<()> {
        let logprob = self.log_prob_of_partition(partition)?;
        debug!("{logprob:8.2} {extrastr} partition");
        for key in partition {
            debug!("    {key}");
        }
        Ok(())
    }

    /// Report the run counters and persist the cache.
    pub fn finish(&self) -> GlomResult<()> {
        info!(
            "calculated   vtb {}   fwd {}   hamming merged {}   naive \
             hfracs {}",
            self.counts.n_vtb_calculated,
            self.counts.n_fwd_calculated,
            self.counts.n_hamming_merged,
            self.counts.n_hfrac_calculated
        );
        if self.config.debug {
            self.counts.to_table().printstd();
        }
        if let Some(cachefile) = &self.config.cachefile {
            self.cache
                .write(cachefile, self.config.dont_write_naive_hfracs)?;
            info!("wrote cache to {}", cachefile.to_string_lossy());
        }
        Ok(())
    }
}
