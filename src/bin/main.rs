use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use glom_kit::glomerator::{GlomConfig, Glomerator, MergeRatioGate};
use glom_kit::hmm::{CacheOnlyEngine, ConsensusEngine};
use glom_kit::inputs::read_query_file;
use glom_kit::logging::init_logging;
use glom_kit::sequence::Track;
use glom_kit::writers::{DivvyWriter, OutWriter, PartitionWriter};

#[derive(Parser)]
#[command(
    name = "glomkit",
    version,
    about = "Agglomerative clustering of antibody reads scored by HMM \
             likelihood ratios"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agglomeratively cluster the input queries, writing the partition
    /// trajectory of each path.
    Cluster(ClusterArgs),
    /// Split the input queries into a fixed number of roughly equal groups
    /// by naive-sequence Hamming distance.
    Divvy(DivvyArgs),
    /// Compute and cache the naive sequence of every input cluster.
    CacheNaiveSeqs(CacheNaiveSeqsArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the input query CSV.
    #[arg(short = 'i', long)]
    infile: PathBuf,
    /// Path to read cached results from and write them back to; omitting it
    /// disables persistence.
    #[arg(long)]
    cachefile: Option<PathBuf>,
    /// Path to file to write run log.
    #[arg(long, alias = "log")]
    log_filepath: Option<PathBuf>,
    /// Emit per-merge progress lines.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Args)]
struct ClusterArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Path to write the partition trajectories to.
    #[arg(short = 'o', long)]
    outfile: PathBuf,
    /// Number of sequential-Monte-Carlo particles (independent paths);
    /// merge selection samples instead of taking the argmax when more than
    /// one.
    #[arg(long, default_value_t = 1)]
    smc_particles: usize,
    /// Skip any pair whose naive hamming fraction is above this.
    #[arg(long, default_value_t = 0.08)]
    hamming_fraction_bound_hi: f64,
    /// Merge the closest pair below this naive hamming fraction without
    /// consulting the HMM; 0 disables the shortcut.
    #[arg(long, default_value_t = 0.0)]
    hamming_fraction_bound_lo: f64,
    /// Do not calculate forward probabilities; the trajectory is driven
    /// purely by hamming merges.
    #[arg(long, default_value_t = false)]
    no_fwd: bool,
    /// Finish a path when its log probability drops this far below the
    /// running maximum.
    #[arg(long, default_value_t = 5.0)]
    max_logprob_drop: f64,
    /// Omit naive hamming fraction rows when persisting the cache.
    #[arg(long, default_value_t = false)]
    dont_write_naive_hfracs: bool,
    /// Minimum log likelihood ratio for a merge at a given merged-cluster
    /// size, as SIZE:MIN (e.g. 2:20); repeat for several sizes.
    #[arg(long = "merge-ratio-threshold")]
    merge_ratio_thresholds: Vec<String>,
    /// Seed for the random number generator used by particle sampling.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Args)]
struct DivvyArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Path to write the single-line divvied partition to.
    #[arg(short = 'o', long)]
    outfile: PathBuf,
    /// Number of groups to produce.
    #[arg(short = 'n', long)]
    n_clusters: usize,
}

#[derive(Args)]
struct CacheNaiveSeqsArgs {
    #[command(flatten)]
    common: CommonArgs,
}

fn build_glomerator(
    common: &CommonArgs,
    config: GlomConfig,
) -> anyhow::Result<Glomerator<ConsensusEngine, CacheOnlyEngine>> {
    let records = read_query_file(&common.infile)?;
    let track = Track::dna();
    let glomerator = Glomerator::new(
        track.clone(),
        config,
        &records,
        ConsensusEngine::new(track),
        CacheOnlyEngine,
    )?;
    Ok(glomerator)
}

fn run_cluster(args: ClusterArgs) -> anyhow::Result<()> {
    let config = GlomConfig {
        cachefile: args.common.cachefile.clone(),
        smc_particles: args.smc_particles,
        hamming_fraction_bound_lo: args.hamming_fraction_bound_lo,
        hamming_fraction_bound_hi: args.hamming_fraction_bound_hi,
        no_fwd: args.no_fwd,
        max_logprob_drop: args.max_logprob_drop,
        dont_write_naive_hfracs: args.dont_write_naive_hfracs,
        debug: args.common.debug,
        ratio_gate: MergeRatioGate::parse(&args.merge_ratio_thresholds)?,
    };
    let mut glomerator = build_glomerator(&args.common, config)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let paths = glomerator.cluster(&mut rng)?;
    let mut writer = PartitionWriter::new_file(&args.outfile)?;
    let rows_written = writer.write(&paths)?;
    info!(
        "wrote {rows_written} partition rows to {}",
        args.outfile.to_string_lossy()
    );
    glomerator.finish()?;
    Ok(())
}

fn run_divvy(args: DivvyArgs) -> anyhow::Result<()> {
    let config = GlomConfig {
        cachefile: args.common.cachefile.clone(),
        no_fwd: true,
        debug: args.common.debug,
        ..Default::default()
    };
    let mut glomerator = build_glomerator(&args.common, config)?;
    let clusters = glomerator.naive_seq_glomerate(args.n_clusters)?;
    let mut writer = DivvyWriter::new_file(&args.outfile)?;
    writer.write(&clusters)?;
    info!(
        "divvied {} clusters into {} groups",
        clusters.iter().map(|c| c.len()).sum::<usize>(),
        clusters.len()
    );
    glomerator.finish()?;
    Ok(())
}

fn run_cache_naive_seqs(args: CacheNaiveSeqsArgs) -> anyhow::Result<()> {
    if args.common.cachefile.is_none() {
        bail!("--cachefile is required to persist naive sequences");
    }
    let config = GlomConfig {
        cachefile: args.common.cachefile.clone(),
        no_fwd: true,
        debug: args.common.debug,
        ..Default::default()
    };
    let mut glomerator = build_glomerator(&args.common, config)?;
    glomerator.cache_naive_seqs()?;
    glomerator.finish()?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let common = match &cli.command {
        Commands::Cluster(args) => &args.common,
        Commands::Divvy(args) => &args.common,
        Commands::CacheNaiveSeqs(args) => &args.common,
    };
    let _handle =
        init_logging(common.log_filepath.as_deref(), common.debug);

    let result = match cli.command {
        Commands::Cluster(args) => run_cluster(args),
        Commands::Divvy(args) => run_divvy(args),
        Commands::CacheNaiveSeqs(args) => run_cache_naive_seqs(args),
    };
    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}
