use std::collections::BTreeSet;

use log::info;

/// A set of cluster keys covering all input sequence names disjointly.
/// Ordered so that pair enumeration (and therefore tie-breaking) does not
/// depend on insertion history.
pub type Partition = BTreeSet<String>;

/// Append-only record of the partitions visited along one glomeration
/// trajectory, with parallel log-probabilities and log-weights.
#[derive(Debug, Clone)]
pub struct ClusterPath {
    partitions: Vec<Partition>,
    logprobs: Vec<f64>,
    logweights: Vec<f64>,
    pub initial_path_index: usize,
    pub finished: bool,
    max_logprob: f64,
}

impl ClusterPath {
    pub fn new(
        initial_partition: Partition,
        initial_logprob: f64,
        initial_logweight: f64,
        initial_path_index: usize,
    ) -> Self {
        Self {
            partitions: vec![initial_partition],
            logprobs: vec![initial_logprob],
            logweights: vec![initial_logweight],
            initial_path_index,
            finished: false,
            max_logprob: initial_logprob,
        }
    }

    /// Append the next partition. The path finishes itself when the
    /// log-probability has dropped more than `max_logprob_drop` below the
    /// running maximum (all-minus-infinity trajectories never trip this).
    pub fn add_partition(
        &mut self,
        partition: Partition,
        logprob: f64,
        max_logprob_drop: f64,
    ) {
        self.partitions.push(partition);
        self.logprobs.push(logprob);
        self.logweights.push(self.current_logweight());
        if logprob > self.max_logprob {
            self.max_logprob = logprob;
        } else if self.max_logprob - logprob > max_logprob_drop {
            info!(
                "stopping path {}: logprob dropped {:.2} below the maximum",
                self.initial_path_index,
                self.max_logprob - logprob
            );
            self.finished = true;
        }
    }

    pub fn current_partition(&self) -> &Partition {
        self.partitions.last().expect("a path always has a partition")
    }

    pub fn current_logweight(&self) -> f64 {
        *self.logweights.last().expect("a path always has a logweight")
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn logprobs(&self) -> &[f64] {
        &self.logprobs
    }

    pub fn logweights(&self) -> &[f64] {
        &self.logweights
    }
}

#[cfg(test)]
mod cluster_path_tests {
    use std::collections::BTreeSet;

    use super::{ClusterPath, Partition};

    fn partition(keys: &[&str]) -> Partition {
        keys.iter().map(|k| k.to_string()).collect::<BTreeSet<String>>()
    }

    #[test]
    fn test_path_grows_and_tracks_current() {
        let mut path =
            ClusterPath::new(partition(&["a", "b", "c"]), -30.0, 0.0, 0);
        path.add_partition(partition(&["a:b", "c"]), -25.0, 20.0);
        assert!(!path.finished);
        assert_eq!(path.partitions().len(), 2);
        assert_eq!(path.current_partition(), &partition(&["a:b", "c"]));
        assert_eq!(path.logprobs(), &[-30.0, -25.0]);
    }

    #[test]
    fn test_path_finishes_on_logprob_collapse() {
        let mut path =
            ClusterPath::new(partition(&["a", "b", "c"]), -30.0, 0.0, 0);
        path.add_partition(partition(&["a:b", "c"]), -25.0, 20.0);
        path.add_partition(partition(&["a:b:c"]), -46.0, 20.0);
        assert!(path.finished, "drop of 21 exceeds the allowed 20");
    }

    #[test]
    fn test_minus_infinity_trajectories_never_collapse() {
        let ninf = f64::NEG_INFINITY;
        let mut path = ClusterPath::new(partition(&["a", "b"]), ninf, 0.0, 0);
        path.add_partition(partition(&["a:b"]), ninf, 20.0);
        assert!(!path.finished);
    }
}
