use std::path::Path;
use std::process::Output;

use anyhow::anyhow;

pub fn run_glomkit(args: &[&str]) -> anyhow::Result<Output> {
    let exe = Path::new(env!("CARGO_BIN_EXE_glomkit"));
    assert!(exe.exists());

    let output = std::process::Command::new(exe)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?
        .wait_with_output()?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(anyhow!("failed to run {:?}", args.join(" ")))
    }
}

pub const QUERY_FILE_HEADER: &str = "names,seqs,k_v_min,k_v_max,k_d_min,\
                                     k_d_max,mute_freqs,only_genes,\
                                     path_index,logweight";

/// Write a query file of singleton clusters sharing one set of kbounds.
pub fn write_query_file(fp: &Path, rows: &[(&str, &str)]) {
    let mut contents = String::from(QUERY_FILE_HEADER);
    contents.push('\n');
    for (name, seq) in rows {
        contents.push_str(&format!(
            "{name},{seq},5,10,1,4,0.01,IGHV1-2*02,0,0\n"
        ));
    }
    std::fs::write(fp, contents).unwrap();
}

pub const CACHE_FILE_HEADER: &str =
    "unique_ids,logprob,naive_seq,naive_hfrac,cyst_position,errors";

/// Write a cache file holding only forward log-probabilities.
pub fn write_logprob_cache(fp: &Path, rows: &[(&str, f64)]) {
    let mut contents = String::from(CACHE_FILE_HEADER);
    contents.push('\n');
    for (key, logprob) in rows {
        contents.push_str(&format!("{key},{logprob},,,,\n"));
    }
    std::fs::write(fp, contents).unwrap();
}
