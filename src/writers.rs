use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use itertools::Itertools;

use crate::cluster_path::ClusterPath;
use crate::util::{ensure_parent_dir, fmt_float20};

pub trait OutWriter<T> {
    fn write(&mut self, item: T) -> anyhow::Result<u64>;
}

/// Writes partition trajectories, one row per partition visited on a path,
/// with cluster keys joined by `;`.
pub struct PartitionWriter {
    buf_writer: BufWriter<File>,
}

impl PartitionWriter {
    fn header() -> String {
        "path_index,initial_path_index,partition,logprob,logweight\n"
            .to_string()
    }

    pub fn new_file(out_fp: &Path) -> anyhow::Result<Self> {
        ensure_parent_dir(out_fp)?;
        let fh = File::create(out_fp).with_context(|| {
            format!("failed to create {}", out_fp.to_string_lossy())
        })?;
        let mut buf_writer = BufWriter::new(fh);
        buf_writer.write_all(Self::header().as_bytes())?;
        Ok(Self { buf_writer })
    }
}

impl OutWriter<&[ClusterPath]> for PartitionWriter {
    fn write(&mut self, paths: &[ClusterPath]) -> anyhow::Result<u64> {
        let mut rows_written = 0u64;
        for (ipath, path) in paths.iter().enumerate() {
            for (ipart, partition) in path.partitions().iter().enumerate() {
                let clusters = partition.iter().join(";");
                let row = format!(
                    "{ipath},{},{clusters},{},{}\n",
                    path.initial_path_index,
                    fmt_float20(path.logprobs()[ipart]),
                    fmt_float20(path.logweights()[ipart]),
                );
                self.buf_writer.write_all(row.as_bytes())?;
                rows_written += 1;
            }
        }
        self.buf_writer.flush()?;
        Ok(rows_written)
    }
}

/// Writes the naive-seq divvy: a single line of clusters joined by `|`,
/// members joined by `;`.
pub struct DivvyWriter {
    buf_writer: BufWriter<File>,
}

impl DivvyWriter {
    pub fn new_file(out_fp: &Path) -> anyhow::Result<Self> {
        ensure_parent_dir(out_fp)?;
        let fh = File::create(out_fp).with_context(|| {
            format!("failed to create {}", out_fp.to_string_lossy())
        })?;
        let mut buf_writer = BufWriter::new(fh);
        buf_writer.write_all("partition\n".as_bytes())?;
        Ok(Self { buf_writer })
    }
}

impl OutWriter<&[Vec<String>]> for DivvyWriter {
    fn write(&mut self, clusters: &[Vec<String>]) -> anyhow::Result<u64> {
        let line = clusters
            .iter()
            .map(|cluster| cluster.iter().join(";"))
            .join("|");
        self.buf_writer.write_all(line.as_bytes())?;
        self.buf_writer.write_all(b"\n")?;
        self.buf_writer.flush()?;
        Ok(1)
    }
}

#[cfg(test)]
mod writers_tests {
    use std::collections::BTreeSet;

    use crate::cluster_path::ClusterPath;

    use super::{DivvyWriter, OutWriter, PartitionWriter};

    #[test]
    fn test_partition_writer_rows() {
        let initial = ["a", "b"]
            .iter()
            .map(|k| k.to_string())
            .collect::<BTreeSet<String>>();
        let merged = ["a:b"]
            .iter()
            .map(|k| k.to_string())
            .collect::<BTreeSet<String>>();
        let mut path = ClusterPath::new(initial, -20.0, 0.0, 0);
        path.add_partition(merged, f64::NEG_INFINITY, 100.0);

        let fp = std::env::temp_dir().join("glomkit_partition_writer.csv");
        let mut writer = PartitionWriter::new_file(&fp).unwrap();
        let rows = writer.write(&[path]).unwrap();
        assert_eq!(rows, 2);
        let contents = std::fs::read_to_string(&fp).unwrap();
        let lines = contents.lines().collect::<Vec<&str>>();
        assert_eq!(
            lines[0],
            "path_index,initial_path_index,partition,logprob,logweight"
        );
        assert!(lines[1].starts_with("0,0,a;b,"));
        let fields = lines[2].split(',').collect::<Vec<&str>>();
        assert_eq!(fields[2], "a:b");
        assert_eq!(fields[3], "-inf");
    }

    #[test]
    fn test_divvy_writer_single_line() {
        let clusters = vec![
            vec!["q0".to_string(), "q1".to_string()],
            vec!["q2".to_string()],
        ];
        let fp = std::env::temp_dir().join("glomkit_divvy_writer.csv");
        let mut writer = DivvyWriter::new_file(&fp).unwrap();
        writer.write(&clusters).unwrap();
        let contents = std::fs::read_to_string(&fp).unwrap();
        assert_eq!(contents, "partition\nq0;q1|q2\n");
    }
}
