use std::collections::BTreeSet;

use log::debug;

use crate::errs::{GlomError, GlomResult};
use crate::glomerator::Glomerator;
use crate::hmm::{ForwardEngine, ViterbiEngine};

// clusters here are member-name lists, not colon-joined keys
type MemberCluster = Vec<String>;

impl<V: ViterbiEngine, F: ForwardEngine> Glomerator<V, F> {
    /// Divide the input clusters into `n_clusters` groups of roughly equal
    /// size using only naive-sequence Hamming distance: repeatedly merge
    /// the closest pair of groups that fits under the size cap (relaxing
    /// the cap when nothing fits), then shuffle members from the biggest
    /// group into the smallest until they are balanced.
    pub fn naive_seq_glomerate(
        &mut self,
        n_clusters: usize,
    ) -> GlomResult<Vec<MemberCluster>> {
        if n_clusters == 0 {
            return Err(GlomError::Config(
                "cannot divvy into zero clusters".to_string(),
            ));
        }
        let seqs_per_cluster =
            self.seq_info.len() as f64 / n_clusters as f64;
        let max_per_cluster = seqs_per_cluster.ceil() as usize;
        debug!(
            "making {n_clusters} clusters (max {max_per_cluster} per \
             cluster)"
        );

        let mut clusters = self
            .seq_info
            .keys()
            .map(|key| vec![key.clone()])
            .collect::<BTreeSet<MemberCluster>>();

        let mut merge_whatever_you_got = false;
        while clusters.len() > n_clusters {
            match self.get_clusters_to_merge(
                &clusters,
                max_per_cluster,
                merge_whatever_you_got,
            )? {
                None => {
                    // nothing fits under the cap, so relax it
                    merge_whatever_you_got = true;
                }
                Some((clust_a, clust_b)) => {
                    let mut new_cluster = clust_a.clone();
                    new_cluster.extend(clust_b.iter().cloned());
                    clusters.remove(&clust_a);
                    clusters.remove(&clust_b);
                    clusters.insert(new_cluster);
                }
            }
        }

        let mut itries = 0usize;
        loop {
            let Some((mut small, mut big)) =
                Self::get_small_big_clusters(&clusters)
            else {
                break;
            };
            if !(big.len() as f64 > 1.1 * small.len() as f64
                && big.len() - small.len() > 3)
            {
                break;
            }
            debug!("homogenizing {} and {}", small.len(), big.len());
            let n_to_keep_in_biggest =
                ((small.len() + big.len()) as f64 / 2.0).ceil() as usize;
            clusters.remove(&small);
            clusters.remove(&big);
            small.extend(big.drain(n_to_keep_in_biggest..));
            clusters.insert(small);
            clusters.insert(big);
            itries += 1;
            if itries > clusters.len() {
                debug!("too many homogenization tries");
                break;
            }
        }

        Ok(clusters.into_iter().collect())
    }

    /// The pair of groups with the smallest min-pairwise naive Hamming
    /// distance whose merged size fits under the cap, or `None` when no
    /// pair fits.
    fn get_clusters_to_merge(
        &mut self,
        clusters: &BTreeSet<MemberCluster>,
        max_per_cluster: usize,
        merge_whatever_you_got: bool,
    ) -> GlomResult<Option<(MemberCluster, MemberCluster)>> {
        let mut smallest_min_distance = f64::INFINITY;
        let mut clusters_to_merge: Option<(MemberCluster, MemberCluster)> =
            None;
        let cluster_list = clusters.iter().collect::<Vec<&MemberCluster>>();
        for ia in 0..cluster_list.len() {
            for ib in (ia + 1)..cluster_list.len() {
                let (clust_a, clust_b) = (cluster_list[ia], cluster_list[ib]);
                if !merge_whatever_you_got
                    && clust_a.len() + clust_b.len() > max_per_cluster
                {
                    continue;
                }
                let mut min_distance = f64::INFINITY;
                for query_a in clust_a {
                    for query_b in clust_b {
                        let hfrac =
                            self.member_hamming_fraction(query_a, query_b)?;
                        if hfrac < min_distance {
                            min_distance = hfrac;
                        }
                    }
                }
                if min_distance < smallest_min_distance {
                    smallest_min_distance = min_distance;
                    clusters_to_merge =
                        Some((clust_a.clone(), clust_b.clone()));
                }
            }
        }
        Ok(clusters_to_merge)
    }

    fn member_hamming_fraction(
        &mut self,
        query_a: &str,
        query_b: &str,
    ) -> GlomResult<f64> {
        if let Some(hfrac) =
            self.hamming_fractions.get(&format!("{query_a}-{query_b}"))
        {
            return Ok(*hfrac);
        }
        let hfrac = self.naive_hamming_fraction(query_a, query_b)?;
        self.hamming_fractions
            .insert(format!("{query_a}-{query_b}"), hfrac);
        self.hamming_fractions
            .insert(format!("{query_b}-{query_a}"), hfrac);
        Ok(hfrac)
    }

    fn get_small_big_clusters(
        clusters: &BTreeSet<MemberCluster>,
    ) -> Option<(MemberCluster, MemberCluster)> {
        let mut small: Option<&MemberCluster> = None;
        let mut big: Option<&MemberCluster> = None;
        for clust in clusters {
            if small.map_or(true, |s| clust.len() < s.len()) {
                small = Some(clust);
            }
            if big.map_or(true, |b| clust.len() > b.len()) {
                big = Some(clust);
            }
        }
        Some((small?.clone(), big?.clone()))
    }
}
