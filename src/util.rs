use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

/// Make sure the directory an output file lands in exists before the file
/// handle is opened.
pub(crate) fn ensure_parent_dir<P: AsRef<Path>>(
    out_fp: P,
) -> anyhow::Result<()> {
    match out_fp.as_ref().parent() {
        Some(parent)
            if !parent.as_os_str().is_empty() && !parent.exists() =>
        {
            debug!(
                "creating output directory {}",
                parent.to_string_lossy()
            );
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Spinner counting merge steps across the glomeration paths.
pub(crate) fn merge_ticker() -> ProgressBar {
    let ticker = ProgressBar::new_spinner();
    ticker.set_style(
        ProgressStyle::with_template("{spinner} {pos} merges {msg}")
            .expect("merge ticker template is valid"),
    );
    ticker
}

/// Floats destined for the cache and output files are printed with 20
/// significant digits so that re-reading them reproduces the run exactly.
/// `-inf`, `inf`, and `NaN` print in a form `f64::from_str` accepts.
pub(crate) fn fmt_float20(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.19e}")
    } else {
        format!("{value}")
    }
}

/// Sum where minus infinity is absorbing. Avoids the NaN that a plain sum
/// would produce when both operands are minus infinity.
pub(crate) fn add_with_minus_infinities(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY || b == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        a + b
    }
}
