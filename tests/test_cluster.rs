use common::{run_glomkit, write_logprob_cache, write_query_file};

mod common;

#[test]
fn test_cluster_helps() {
    let _ = run_glomkit(&["cluster", "--help"])
        .expect("failed to run glomkit cluster help");
    let _ = run_glomkit(&["divvy", "--help"])
        .expect("failed to run glomkit divvy help");
    let _ = run_glomkit(&["cache-naive-seqs", "--help"])
        .expect("failed to run glomkit cache-naive-seqs help");
}

#[test]
fn test_cluster_no_fwd_low_hamming_merges_everything() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("queries.csv");
    let outfile = dir.path().join("partitions.csv");
    let seq = "ACGTACGTACGTACGTACGT";
    write_query_file(&infile, &[("q0", seq), ("q1", seq), ("q2", seq)]);

    let _ = run_glomkit(&[
        "cluster",
        "-i",
        infile.to_str().unwrap(),
        "-o",
        outfile.to_str().unwrap(),
        "--no-fwd",
        "--hamming-fraction-bound-lo",
        "0.01",
    ])
    .expect("failed to run glomkit cluster");

    let contents = std::fs::read_to_string(&outfile).unwrap();
    let lines = contents.lines().collect::<Vec<&str>>();
    assert_eq!(
        lines[0],
        "path_index,initial_path_index,partition,logprob,logweight"
    );
    assert_eq!(lines.len(), 4, "initial partition plus two merges");
    let last = lines[3].split(',').collect::<Vec<&str>>();
    assert_eq!(last[2], "q0:q1:q2");
    assert_eq!(last[3], "-inf");
}

#[test]
fn test_cluster_all_pairs_pruned_leaves_partition_alone() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("queries.csv");
    let outfile = dir.path().join("partitions.csv");
    write_query_file(
        &infile,
        &[("q0", "AAAAAAAAAAAAAAAAAAAA"), ("q1", "CCCCCCCCCCCCCCCCCCCC")],
    );

    let _ = run_glomkit(&[
        "cluster",
        "-i",
        infile.to_str().unwrap(),
        "-o",
        outfile.to_str().unwrap(),
        "--no-fwd",
    ])
    .expect("failed to run glomkit cluster");

    let contents = std::fs::read_to_string(&outfile).unwrap();
    let lines = contents.lines().collect::<Vec<&str>>();
    assert_eq!(lines.len(), 2, "no merge was acceptable");
    let fields = lines[1].split(',').collect::<Vec<&str>>();
    assert_eq!(fields[2], "q0;q1");
}

#[test]
fn test_cluster_without_forward_scores_or_no_fwd_fails() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("queries.csv");
    let outfile = dir.path().join("partitions.csv");
    write_query_file(
        &infile,
        &[("q0", "ACGTACGTACGTACGTACGT"), ("q1", "ACGTACGTACGTACGTACGG")],
    );

    let result = run_glomkit(&[
        "cluster",
        "-i",
        infile.to_str().unwrap(),
        "-o",
        outfile.to_str().unwrap(),
    ]);
    assert!(result.is_err(), "forward scores have no engine and no cache");
}

#[test]
fn test_cluster_ratio_gate_with_cached_forward_scores() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("queries.csv");
    let seq_a = "ACGTACGTACGTACGTACGT";
    let seq_b = "ACGTACGTACGTACGTACGG"; // hamming fraction 0.05
    write_query_file(&infile, &[("q0", seq_a), ("q1", seq_b)]);

    // a likelihood ratio of 5 stays below the size-2 threshold of 20
    let weak_cache = dir.path().join("weak_cache.csv");
    write_logprob_cache(
        &weak_cache,
        &[("q0", -100.0), ("q1", -100.0), ("q0:q1", -195.0)],
    );
    let outfile = dir.path().join("partitions_weak.csv");
    let _ = run_glomkit(&[
        "cluster",
        "-i",
        infile.to_str().unwrap(),
        "-o",
        outfile.to_str().unwrap(),
        "--cachefile",
        weak_cache.to_str().unwrap(),
        "--hamming-fraction-bound-hi",
        "0.1",
    ])
    .expect("failed to run glomkit cluster");
    let contents = std::fs::read_to_string(&outfile).unwrap();
    assert_eq!(contents.lines().count(), 2, "the merge was rejected");

    // a ratio of 50 clears it and the trajectory gains a partition
    let strong_cache = dir.path().join("strong_cache.csv");
    write_logprob_cache(
        &strong_cache,
        &[("q0", -100.0), ("q1", -100.0), ("q0:q1", -150.0)],
    );
    let outfile = dir.path().join("partitions_strong.csv");
    let _ = run_glomkit(&[
        "cluster",
        "-i",
        infile.to_str().unwrap(),
        "-o",
        outfile.to_str().unwrap(),
        "--cachefile",
        strong_cache.to_str().unwrap(),
        "--hamming-fraction-bound-hi",
        "0.1",
    ])
    .expect("failed to run glomkit cluster");
    let contents = std::fs::read_to_string(&outfile).unwrap();
    let lines = contents.lines().collect::<Vec<&str>>();
    assert_eq!(lines.len(), 3);
    let last = lines[2].split(',').collect::<Vec<&str>>();
    assert_eq!(last[2], "q0:q1");
    assert_eq!(last[3].parse::<f64>().unwrap(), -150.0);
}

#[test]
fn test_cluster_cache_replay_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let infile = dir.path().join("queries.csv");
    let cachefile = dir.path().join("cache.csv");
    let seq = "ACGTACGTACGTACGTACGT";
    write_query_file(&infile, &[("q0", seq), ("q1", seq), ("q2", seq)]);

    let run = |outfile: &std::path::Path| {
        run_glomkit(&[
            "cluster",
            "-i",
            infile.to_str().unwrap(),
            "-o",
            outfile.to_str().unwrap(),
            "--cachefile",
            cachefile.to_str().unwrap(),
            "--no-fwd",
            "--hamming-fraction-bound-lo",
            "0.01",
        ])
        .expect("failed to run glomkit cluster");
    };

    let first_out = dir.path().join("partitions_1.csv");
    run(&first_out);
    assert!(cachefile.exists());
    let second_out = dir.path().join("partitions_2.csv");
    run(&second_out);

    let first = std::fs::read(&first_out).unwrap();
    let second = std::fs::read(&second_out).unwrap();
    assert_eq!(first, second);

    // everything the second run needed was loaded from disk, so its cache
    // rewrite holds nothing but the header
    let cache_contents = std::fs::read_to_string(&cachefile).unwrap();
    assert_eq!(cache_contents.lines().count(), 1);
}
