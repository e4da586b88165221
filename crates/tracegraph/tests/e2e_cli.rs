use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use serial_test::serial;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_tracegraph")
}

/// A command isolated from the caller's config file and environment.
fn tracegraph(temp: &Path) -> Command {
    let mut cmd = Command::new(bin());
    cmd.env("TRACEGRAPH_CONFIG", temp.join("absent.toml"));
    for key in [
        "TRACEGRAPH_OUTPUT_DIR",
        "TRACEGRAPH_NORMAL_DIRS",
        "TRACEGRAPH_ABNORMAL_DIRS",
        "TRACEGRAPH_SAMPLES_PER_CLASS",
        "TRACEGRAPH_SEED",
        "TRACEGRAPH_WORKERS",
        "TRACEGRAPH_DATASET_PATH",
        "TRACEGRAPH_LOG_FORMAT",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn run_ok(cmd: &mut Command) -> Output {
    let out = cmd.output().unwrap();
    assert!(
        out.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    out
}

fn stdout_json(out: &Output) -> Value {
    serde_json::from_slice(&out.stdout).unwrap()
}

#[test]
#[serial]
fn sequence_then_annotate_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("traces.json");
    let traces = vec![testkit::sample_trace("t-1"), testkit::cyclic_trace("t-2")];
    fs::write(&input, serde_json::to_string(&traces).unwrap()).unwrap();
    let out_dir = temp.path().join("seq");

    let out = run_ok(
        tracegraph(temp.path())
            .arg("--json")
            .arg("sequence")
            .arg(&input)
            .arg("--out-dir")
            .arg(&out_dir)
            .arg("--workers")
            .arg("2"),
    );
    let report = stdout_json(&out);
    let written = report["written"].as_array().unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0]["trace_id"], "t-1");
    assert_eq!(written[0]["edges"], 4);
    assert!(written[0]["cycle"].is_null());
    assert_eq!(written[1]["cycle"], serde_json::json!(["x", "y"]));

    let seq_file = out_dir.join("t-1.txt");
    let body = fs::read_to_string(&seq_file).unwrap();
    assert!(body.starts_with("Trace ID is t-1\n<Trace Sequence>\n"));
    assert!(body.contains("Source is Client, Destination is frontend, Type is HTTP"));
    assert!(body.contains("Source is orders, Destination is postgres, Type is DATABASE"));
    assert!(body.contains("Source is frontend, Destination is redis, Type is RPC"));
    assert!(body.ends_with(&format!("</Trace Sequence>\n{}\n", "=".repeat(80))));

    let out = run_ok(tracegraph(temp.path()).arg("annotate").arg(&seq_file));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.starts_with("# 统计特征\nnum_edges=4\ntotal_latency_ms=1800\n"));
    assert!(text.contains("bottleneck_index="));
    assert!(text.contains(", duration=1800 ms]."));
    assert!(text.contains("Trace ID is t-1"));

    let out = run_ok(
        tracegraph(temp.path())
            .arg("--json")
            .arg("annotate")
            .arg(&seq_file),
    );
    let annotation = stdout_json(&out);
    assert_eq!(annotation["features"]["max_edge_latency_ms"], 1800);
    assert_eq!(annotation["durations"].as_array().unwrap().len(), 4);
}

#[test]
#[serial]
fn flat_input_and_broken_traces() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("spans.jsonl");
    let mut lines: Vec<String> = testkit::flat_spans("flat-1")
        .iter()
        .map(|v| v.to_string())
        .collect();
    let mut dup = testkit::flat_spans("dup");
    dup.push(dup[0].clone());
    lines.extend(dup.iter().map(|v| v.to_string()));
    fs::write(&input, lines.join("\n")).unwrap();
    let out_dir = temp.path().join("seq");

    let out = run_ok(
        tracegraph(temp.path())
            .arg("--json")
            .arg("sequence")
            .arg(&input)
            .arg("--format")
            .arg("flat")
            .arg("--out-dir")
            .arg(&out_dir),
    );
    let report = stdout_json(&out);
    assert_eq!(report["written"].as_array().unwrap().len(), 1);
    assert_eq!(report["failed_traces"][0]["id"], "dup");
    assert!(out_dir.join("flat-1.txt").exists());
    assert!(!out_dir.join("dup.txt").exists());

    let out = run_ok(
        tracegraph(temp.path())
            .arg("--json")
            .arg("status")
            .arg("--out-dir")
            .arg(&out_dir),
    );
    assert_eq!(stdout_json(&out)["trace_files"], 1);
}

#[test]
#[serial]
fn show_prints_tree_and_sequence() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("trace.json");
    fs::write(
        &input,
        serde_json::to_string(&testkit::sample_trace("t-9")).unwrap(),
    )
    .unwrap();

    let out = run_ok(tracegraph(temp.path()).arg("show").arg(&input));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("TRACE t-9"));
    assert!(text.contains("spans=4"));
    assert!(text.contains("    postgres"));

    let missing = tracegraph(temp.path())
        .arg("show")
        .arg(&input)
        .arg("--trace")
        .arg("nope")
        .output()
        .unwrap();
    assert!(!missing.status.success());
}

#[test]
#[serial]
fn dataset_builds_balanced_predict_records() {
    let temp = tempfile::tempdir().unwrap();
    let normal = temp.path().join("normal");
    let abnormal = temp.path().join("abnormal");
    fs::create_dir_all(&normal).unwrap();
    fs::create_dir_all(&abnormal).unwrap();
    let line = "[Edge ID is 1, Source is Client, Destination is a, Type is HTTP, \
                Communication starts at 0 ms, Communication finishes at 40 ms].";
    for (dir, n) in [(&normal, 3), (&abnormal, 2)] {
        for i in 0..n {
            fs::write(dir.join(format!("trace-{i}.txt")), line).unwrap();
        }
    }
    let out_path = temp.path().join("cooked/dataset.jsonl");

    let out = run_ok(
        tracegraph(temp.path())
            .arg("--json")
            .arg("dataset")
            .arg("--normal-dir")
            .arg(&normal)
            .arg("--abnormal-dir")
            .arg(&abnormal)
            .arg("--samples-per-class")
            .arg("2")
            .arg("--seed")
            .arg("7")
            .arg("--out")
            .arg(&out_path),
    );
    let summary = stdout_json(&out);
    assert_eq!(summary["normal"], 2);
    assert_eq!(summary["abnormal"], 2);

    let body = fs::read_to_string(&out_path).unwrap();
    let records: Vec<Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 4);
    assert!(
        records
            .iter()
            .all(|r| r["input"].as_str().unwrap().contains("duration=40 ms"))
    );
}

#[test]
#[serial]
fn config_reads_file_then_env() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("config.toml");
    fs::write(&config, "samples_per_class = 10\nseed = 9\n").unwrap();

    let out = run_ok(
        tracegraph(temp.path())
            .env("TRACEGRAPH_CONFIG", &config)
            .env("TRACEGRAPH_SEED", "11")
            .arg("--json")
            .arg("config"),
    );
    let cfg = stdout_json(&out);
    assert_eq!(cfg["samples_per_class"], 10);
    assert_eq!(cfg["seed"], 11);
    assert_eq!(cfg["config_file"], config.display().to_string());

    let bad = tracegraph(temp.path())
        .env("TRACEGRAPH_WORKERS", "0")
        .arg("config")
        .output()
        .unwrap();
    assert!(!bad.status.success());
}
