pub mod cache;
pub mod cluster_path;
pub mod divvy;
pub mod errs;
pub mod glomerator;
pub mod hmm;
pub mod inputs;
pub mod kbounds;
pub mod logging;
pub mod sequence;
pub mod util;
pub mod writers;
