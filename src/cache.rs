use std::path::Path;

use itertools::Itertools;
use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errs::{GlomError, GlomResult};
use crate::sequence::{Sequence, Track};
use crate::util::fmt_float20;

pub(crate) const CACHE_FILE_HEADER: [&str; 6] = [
    "unique_ids",
    "logprob",
    "naive_seq",
    "naive_hfrac",
    "cyst_position",
    "errors",
];

/// Memoized per-cluster results, together with shadow sets recording which
/// entries were loaded from disk. Entries are append-only within a run, and
/// entries that were loaded are never written back out.
#[derive(Debug, Default)]
pub struct ScoreCache {
    log_probs: FxHashMap<String, f64>,
    naive_seqs: FxHashMap<String, Sequence>,
    naive_hfracs: FxHashMap<String, f64>,
    errors: FxHashMap<String, String>,
    initial_log_probs: FxHashSet<String>,
    initial_naive_seqs: FxHashSet<String>,
    initial_naive_hfracs: FxHashSet<String>,
}

impl ScoreCache {
    pub fn log_prob(&self, key: &str) -> Option<f64> {
        self.log_probs.get(key).copied()
    }

    /// Append-only: a key that already has a log-probability keeps it.
    pub fn set_log_prob(&mut self, key: &str, value: f64) {
        self.log_probs.entry(key.to_owned()).or_insert(value);
    }

    pub fn naive_seq(&self, key: &str) -> Option<&Sequence> {
        self.naive_seqs.get(key)
    }

    pub fn set_naive_seq(&mut self, key: &str, seq: Sequence) {
        self.naive_seqs.entry(key.to_owned()).or_insert(seq);
    }

    pub fn naive_hfrac(&self, key: &str) -> Option<f64> {
        self.naive_hfracs.get(key).copied()
    }

    pub fn set_naive_hfrac(&mut self, key: &str, value: f64) {
        self.naive_hfracs.entry(key.to_owned()).or_insert(value);
    }

    pub fn errors(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(|s| s.as_str())
    }

    /// Append `:tag` to the key's colon-separated error list.
    pub fn tag_error(&mut self, key: &str, tag: &str) {
        let tags = self.errors.entry(key.to_owned()).or_default();
        tags.push(':');
        tags.push_str(tag);
    }

    pub fn n_log_probs(&self) -> usize {
        self.log_probs.len()
    }

    pub fn n_naive_seqs(&self) -> usize {
        self.naive_seqs.len()
    }

    /// Load cached results written by a previous run. A missing or empty
    /// file just means there is nothing to start from. The same key may
    /// appear on several rows, each contributing whichever fields it has.
    pub fn read(&mut self, path: &Path, track: &Track) -> GlomResult<()> {
        if !path.exists() {
            info!("cache file {} does not exist yet", path.to_string_lossy());
            return Ok(());
        }
        if std::fs::metadata(path)?.len() == 0 {
            info!("empty cache file {}", path.to_string_lossy());
            return Ok(());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.len() != CACHE_FILE_HEADER.len()
            || headers.iter().zip(CACHE_FILE_HEADER).any(|(h, e)| h != e)
        {
            return Err(GlomError::Config(format!(
                "unexpected cache file header {headers:?} in {}",
                path.to_string_lossy()
            )));
        }
        for result in reader.records() {
            let record = result?;
            if record.len() != CACHE_FILE_HEADER.len() {
                return Err(GlomError::Config(format!(
                    "cache file row with {} fields, expected {}",
                    record.len(),
                    CACHE_FILE_HEADER.len()
                )));
            }
            let key = record[0].to_owned();

            let logprob_str = &record[1];
            if !logprob_str.is_empty() {
                let logprob = logprob_str.parse::<f64>().map_err(|e| {
                    GlomError::Config(format!(
                        "bad cached logprob {logprob_str} for {key}, {e}"
                    ))
                })?;
                self.log_probs.insert(key.clone(), logprob);
                self.initial_log_probs.insert(key.clone());
            }

            let naive_hfrac_str = &record[3];
            if !naive_hfrac_str.is_empty() {
                let hfrac = naive_hfrac_str.parse::<f64>().map_err(|e| {
                    GlomError::Config(format!(
                        "bad cached naive hfrac {naive_hfrac_str} for {key}, \
                         {e}"
                    ))
                })?;
                self.naive_hfracs.insert(key.clone(), hfrac);
                self.initial_naive_hfracs.insert(key.clone());
            }

            let naive_seq = &record[2];
            if !naive_seq.is_empty() {
                let cyst_position = record[4].parse::<usize>().ok();
                let seq = Sequence::new(
                    track,
                    key.clone(),
                    naive_seq,
                    cyst_position,
                )?;
                self.naive_seqs.insert(key.clone(), seq);
                self.initial_naive_seqs.insert(key);
            }
        }
        info!(
            "read {} cached logprobs and {} naive seqs",
            self.log_probs.len(),
            self.naive_seqs.len()
        );
        Ok(())
    }

    fn write_cache_line<W: std::io::Write>(
        &self,
        writer: &mut csv::Writer<W>,
        key: &str,
        write_naive_hfracs: bool,
    ) -> GlomResult<()> {
        let logprob = self
            .log_probs
            .get(key)
            .map(|lp| fmt_float20(*lp))
            .unwrap_or_default();
        let naive_seq = self
            .naive_seqs
            .get(key)
            .map(|s| s.undigitized().to_owned())
            .unwrap_or_default();
        let naive_hfrac = if write_naive_hfracs {
            self.naive_hfracs
                .get(key)
                .map(|h| fmt_float20(*h))
                .unwrap_or_default()
        } else {
            String::new()
        };
        let cyst_position = self
            .naive_seqs
            .get(key)
            .and_then(|s| s.cyst_position())
            .map(|c| c.to_string())
            .unwrap_or_default();
        let errors = self.errors.get(key).cloned().unwrap_or_default();
        writer.write_record([
            key,
            &logprob,
            &naive_seq,
            &naive_hfrac,
            &cyst_position,
            &errors,
        ])?;
        Ok(())
    }

    /// Persist every entry that was not loaded from disk: first keys with
    /// log-probabilities, then keys with only naive sequences, then (unless
    /// disabled) keys with only Hamming fractions. Keys are emitted in
    /// sorted order so reruns produce identical files.
    pub fn write(
        &self,
        path: &Path,
        dont_write_naive_hfracs: bool,
    ) -> GlomResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(CACHE_FILE_HEADER)?;

        for key in self.log_probs.keys().sorted() {
            if self.initial_log_probs.contains(key) {
                continue;
            }
            self.write_cache_line(&mut writer, key, !dont_write_naive_hfracs)?;
        }

        for key in self.naive_seqs.keys().sorted() {
            if self.log_probs.contains_key(key)
                && !self.initial_log_probs.contains(key)
            {
                continue; // already written above
            }
            if self.initial_naive_seqs.contains(key) {
                continue;
            }
            self.write_cache_line(&mut writer, key, !dont_write_naive_hfracs)?;
        }

        if !dont_write_naive_hfracs {
            for key in self.naive_hfracs.keys().sorted() {
                if self.log_probs.contains_key(key)
                    && !self.initial_log_probs.contains(key)
                {
                    continue;
                }
                if self.naive_seqs.contains_key(key)
                    && !self.initial_naive_seqs.contains(key)
                {
                    continue;
                }
                if self.initial_naive_hfracs.contains(key) {
                    continue;
                }
                self.write_cache_line(&mut writer, key, true)?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod cache_tests {
    use similar_asserts::assert_eq;

    use crate::sequence::{Sequence, Track};

    use super::ScoreCache;

    fn temp_cache_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn test_cache_round_trip() {
        let track = Track::dna();
        let mut cache = ScoreCache::default();
        cache.set_log_prob("a", -12.25);
        cache.set_log_prob("a:b", f64::NEG_INFINITY);
        cache.set_naive_seq(
            "a:b",
            Sequence::new(&track, "a:b".to_string(), "ACGT", Some(2)).unwrap(),
        );
        cache.set_naive_hfrac("a:b", 0.125);
        cache.tag_error("a:b", "boundary");

        let fp = temp_cache_path("glomkit_cache_round_trip.csv");
        cache.write(&fp, false).unwrap();

        let mut reread = ScoreCache::default();
        reread.read(&fp, &track).unwrap();
        assert_eq!(reread.log_prob("a"), Some(-12.25));
        assert_eq!(reread.log_prob("a:b"), Some(f64::NEG_INFINITY));
        let naive = reread.naive_seq("a:b").unwrap();
        assert_eq!(naive.undigitized(), "ACGT");
        assert_eq!(naive.cyst_position(), Some(2));
        assert_eq!(reread.naive_hfrac("a:b"), Some(0.125));
    }

    #[test]
    fn test_initial_entries_are_not_re_emitted() {
        let track = Track::dna();
        let mut cache = ScoreCache::default();
        cache.set_log_prob("a", -1.0);
        let first_fp = temp_cache_path("glomkit_cache_initial_1.csv");
        cache.write(&first_fp, false).unwrap();

        let mut reread = ScoreCache::default();
        reread.read(&first_fp, &track).unwrap();
        reread.set_log_prob("b", -2.0);
        let second_fp = temp_cache_path("glomkit_cache_initial_2.csv");
        reread.write(&second_fp, false).unwrap();

        let contents = std::fs::read_to_string(&second_fp).unwrap();
        let lines = contents.lines().collect::<Vec<&str>>();
        assert_eq!(lines.len(), 2, "header plus the one new key");
        assert!(lines[1].starts_with("b,"));
    }

    #[test]
    fn test_setters_are_append_only() {
        let mut cache = ScoreCache::default();
        cache.set_log_prob("a", -1.0);
        cache.set_log_prob("a", -99.0);
        assert_eq!(cache.log_prob("a"), Some(-1.0));
        cache.set_naive_hfrac("a-b", 0.5);
        cache.set_naive_hfrac("a-b", 0.9);
        assert_eq!(cache.naive_hfrac("a-b"), Some(0.5));
    }

    #[test]
    fn test_write_ordering_and_dedup() {
        let track = Track::dna();
        let mut cache = ScoreCache::default();
        // b has both a logprob and a naive seq: one row only, in the
        // logprob section; c has only a naive seq; a:d has only an hfrac
        cache.set_log_prob("b", -5.0);
        cache.set_naive_seq(
            "b",
            Sequence::new(&track, "b".to_string(), "ACGT", None).unwrap(),
        );
        cache.set_naive_seq(
            "c",
            Sequence::new(&track, "c".to_string(), "AACC", None).unwrap(),
        );
        cache.set_naive_hfrac("a:d", 0.25);

        let fp = temp_cache_path("glomkit_cache_ordering.csv");
        cache.write(&fp, false).unwrap();
        let contents = std::fs::read_to_string(&fp).unwrap();
        let keys = contents
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap().to_owned())
            .collect::<Vec<String>>();
        assert_eq!(keys, vec!["b", "c", "a:d"]);
    }

    #[test]
    fn test_dont_write_naive_hfracs_omits_hfrac_rows_and_fields() {
        let track = Track::dna();
        let mut cache = ScoreCache::default();
        cache.set_naive_seq(
            "b",
            Sequence::new(&track, "b".to_string(), "ACGT", None).unwrap(),
        );
        cache.set_naive_hfrac("b", 0.125);
        cache.set_naive_hfrac("a:d", 0.25);

        let fp = temp_cache_path("glomkit_cache_no_hfracs.csv");
        cache.write(&fp, true).unwrap();
        let contents = std::fs::read_to_string(&fp).unwrap();
        let lines = contents.lines().collect::<Vec<&str>>();
        assert_eq!(lines.len(), 2, "the hfrac-only row is dropped");
        assert!(lines[1].starts_with("b,"));
        let hfrac_field = lines[1].split(',').nth(3).unwrap();
        assert!(hfrac_field.is_empty());
    }

    #[test]
    fn test_read_tolerates_duplicate_and_sparse_rows() {
        let track = Track::dna();
        let fp = temp_cache_path("glomkit_cache_sparse.csv");
        std::fs::write(
            &fp,
            "unique_ids,logprob,naive_seq,naive_hfrac,cyst_position,errors\r\n\
             a,-1.5e0,,,,\r\n\
             a,,ACGT,,3,:boundary\r\n",
        )
        .unwrap();
        let mut cache = ScoreCache::default();
        cache.read(&fp, &track).unwrap();
        assert_eq!(cache.log_prob("a"), Some(-1.5));
        let naive = cache.naive_seq("a").unwrap();
        assert_eq!(naive.undigitized(), "ACGT");
        assert_eq!(naive.cyst_position(), Some(3));
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let track = Track::dna();
        let fp = temp_cache_path("glomkit_cache_bad_header.csv");
        std::fs::write(&fp, "id,lp,ns,hf,cp,er\na,,,,,\n").unwrap();
        let mut cache = ScoreCache::default();
        assert!(cache.read(&fp, &track).is_err());
    }
}
