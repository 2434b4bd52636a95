use std::path::Path;

use derive_new::new;
use log::info;

use crate::errs::{GlomError, GlomResult};
use crate::kbounds::KBounds;

pub(crate) const QUERY_FILE_HEADER: [&str; 10] = [
    "names",
    "seqs",
    "k_v_min",
    "k_v_max",
    "k_d_min",
    "k_d_max",
    "mute_freqs",
    "only_genes",
    "path_index",
    "logweight",
];

/// One input cluster: the colon-separated fields unpacked, ready for the
/// glomerator to digitize and index.
#[derive(Debug, Clone, new)]
pub struct QueryRecord {
    pub names: Vec<String>,
    pub seqs: Vec<String>,
    pub kbounds: KBounds,
    pub mute_freqs: Vec<f64>,
    pub only_genes: Vec<String>,
    pub path_index: usize,
    pub logweight: f64,
}

impl QueryRecord {
    pub fn key(&self) -> String {
        self.names.join(":")
    }

    pub fn mean_mute_freq(&self) -> f64 {
        if self.mute_freqs.is_empty() {
            0.0
        } else {
            self.mute_freqs.iter().sum::<f64>() / self.mute_freqs.len() as f64
        }
    }
}

fn split_colon_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        Vec::new()
    } else {
        raw.split(':').map(|s| s.to_owned()).collect()
    }
}

fn parse_field<T: std::str::FromStr>(
    raw: &str,
    column: &str,
) -> GlomResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| {
        GlomError::Config(format!("bad {column} field {raw}, {e}"))
    })
}

/// Read the query file: one row per input cluster, `names`, `seqs`,
/// `mute_freqs`, and `only_genes` colon-separated within their fields.
pub fn read_query_file(path: &Path) -> GlomResult<Vec<QueryRecord>> {
    let mut reader =
        csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() != QUERY_FILE_HEADER.len()
        || headers.iter().zip(QUERY_FILE_HEADER).any(|(h, e)| h != e)
    {
        return Err(GlomError::Config(format!(
            "unexpected query file header {headers:?} in {}",
            path.to_string_lossy()
        )));
    }
    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let names = split_colon_list(&record[0]);
        let seqs = split_colon_list(&record[1]);
        if names.is_empty() || names.len() != seqs.len() {
            return Err(GlomError::Data(format!(
                "{} names but {} seqs in query row {}",
                names.len(),
                seqs.len(),
                &record[0]
            )));
        }
        let kbounds = KBounds::new(
            parse_field(&record[2], "k_v_min")?,
            parse_field(&record[3], "k_v_max")?,
            parse_field(&record[4], "k_d_min")?,
            parse_field(&record[5], "k_d_max")?,
        );
        let mute_freqs = split_colon_list(&record[6])
            .iter()
            .map(|raw| parse_field(raw, "mute_freqs"))
            .collect::<GlomResult<Vec<f64>>>()?;
        let only_genes = split_colon_list(&record[7]);
        let path_index = parse_field(&record[8], "path_index")?;
        let logweight = parse_field(&record[9], "logweight")?;
        records.push(QueryRecord::new(
            names, seqs, kbounds, mute_freqs, only_genes, path_index,
            logweight,
        ));
    }
    if records.is_empty() {
        return Err(GlomError::Config(format!(
            "no query rows in {}",
            path.to_string_lossy()
        )));
    }
    info!("read {} query clusters", records.len());
    Ok(records)
}
