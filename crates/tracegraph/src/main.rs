mod dataset;
mod output;
mod telemetry;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracegraph_core::annotate::{Annotation, annotate};
use tracegraph_core::config::{Config, config_file_path};
use tracegraph_core::graph::DependencyGraph;
use tracegraph_core::sequence::{Sequence, serialize};
use tracegraph_core::tree::SpanArena;
use tracegraph_ingest::decode::{InputFormat, load_traces};
use tracegraph_ingest::pipeline::{BatchReport, Pipeline, PipelineConfig};
use tracegraph_store::Store;
use tracegraph_store::discover::discover;
use tracegraph_store::layout::StoreStatus;
use tracegraph_store::read::read_text;

use crate::dataset::{DatasetOptions, DatasetStyle, DatasetSummary};
use crate::output::{
    print_config_human, print_dataset_human, print_features_human, print_report_human,
    print_status_human, print_trace_human,
};
use crate::telemetry::init_cli_tracing;

#[derive(Parser, Debug)]
#[command(name = "tracegraph")]
#[command(about = "Turn span trees into call-edge sequences annotated with latency features")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Write one edge-sequence file per trace")]
    Sequence {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value = "tree")]
        format: String,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
    },
    #[command(about = "Prefix an edge sequence with its statistics header")]
    Annotate {
        file: PathBuf,
        #[arg(long, help = "Print only the statistics header")]
        features: bool,
    },
    #[command(about = "Print span trees and their edge sequences")]
    Show {
        input: PathBuf,
        #[arg(long, default_value = "tree")]
        format: String,
        #[arg(long)]
        trace: Option<String>,
    },
    #[command(about = "Build a labelled training dataset from sequence files")]
    Dataset {
        #[arg(long, default_value = "predict")]
        style: String,
        #[arg(long = "normal-dir")]
        normal_dirs: Vec<PathBuf>,
        #[arg(long = "abnormal-dir")]
        abnormal_dirs: Vec<PathBuf>,
        #[arg(long)]
        samples_per_class: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    #[command(about = "Print the effective configuration")]
    Config,
    #[command(about = "Summarize an output directory")]
    Status {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Response {
    Report(BatchReport),
    Annotation(Annotation),
    Dataset(DatasetSummary),
    Config {
        config_file: String,
        #[serde(flatten)]
        config: Config,
    },
    Status(StoreStatus),
}

#[derive(Debug, Serialize)]
struct TraceView {
    trace_id: String,
    spans: usize,
    lines: Vec<String>,
    cycle: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing();
    let cfg = Config::load().context("load configuration")?;

    match cli.command {
        Commands::Sequence {
            inputs,
            format,
            out_dir,
            workers,
        } => {
            let format = InputFormat::from_str(&format)?;
            let out_dir = out_dir.unwrap_or(cfg.output_dir);
            let store = Store::open(&out_dir)
                .with_context(|| format!("open output dir {}", out_dir.display()))?;
            let pipeline = Pipeline::new(
                store,
                PipelineConfig {
                    workers: workers.unwrap_or(cfg.workers),
                    format,
                },
            );
            let report = pipeline.run_files(&expand_inputs(&inputs)).await;
            print_response(Response::Report(report), cli.json, "")
        }
        Commands::Annotate { file, features } => {
            let raw = read_text(&file).with_context(|| format!("read {}", file.display()))?;
            let annotation = annotate(raw.trim());
            if features && !cli.json {
                print_features_human(&annotation.features);
                return Ok(());
            }
            print_response(Response::Annotation(annotation), cli.json, "")
        }
        Commands::Show {
            input,
            format,
            trace,
        } => show(&input, InputFormat::from_str(&format)?, trace.as_deref(), cli.json),
        Commands::Dataset {
            style,
            normal_dirs,
            abnormal_dirs,
            samples_per_class,
            seed,
            out,
        } => {
            let opts = DatasetOptions {
                style: DatasetStyle::from_str(&style)?,
                normal_dirs: or_default(normal_dirs, cfg.normal_dirs),
                abnormal_dirs: or_default(abnormal_dirs, cfg.abnormal_dirs),
                samples_per_class: samples_per_class.unwrap_or(cfg.samples_per_class),
                seed: seed.unwrap_or(cfg.seed),
                output: out.unwrap_or(cfg.dataset_path),
            };
            let summary = dataset::build(&opts)?;
            print_response(Response::Dataset(summary), cli.json, "")
        }
        Commands::Config => {
            let path = config_file_path();
            let source = if path.exists() {
                path.display().to_string()
            } else {
                format!("{} (not found, defaults)", path.display())
            };
            print_response(
                Response::Config {
                    config_file: path.display().to_string(),
                    config: cfg,
                },
                cli.json,
                &source,
            )
        }
        Commands::Status { out_dir } => {
            let out_dir = out_dir.unwrap_or(cfg.output_dir);
            let status = Store::open(&out_dir)?.status()?;
            print_response(Response::Status(status), cli.json, "")
        }
    }
}

fn show(input: &Path, format: InputFormat, only: Option<&str>, json: bool) -> anyhow::Result<()> {
    let traces = load_traces(input, format).with_context(|| format!("read {}", input.display()))?;
    let mut views = Vec::new();
    let mut matched = false;

    for (trace_id, trace) in traces {
        if only.is_some_and(|id| id != trace_id) {
            continue;
        }
        matched = true;
        let trace = trace.with_context(|| format!("trace {trace_id}"))?;
        let arena = SpanArena::from_trace(&trace)?;
        let sequence: Sequence = serialize(&DependencyGraph::build(arena.spans()));
        if json {
            views.push(TraceView {
                trace_id,
                spans: arena.len(),
                lines: sequence.lines(),
                cycle: sequence.cycle.map(|c| c.span_ids),
            });
        } else {
            print_trace_human(&trace_id, &arena, &sequence);
            println!();
        }
    }

    if let Some(id) = only
        && !matched
    {
        anyhow::bail!("trace {id} not found in {}", input.display());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    }
    Ok(())
}

/// Directories expand to the trace files directly inside them.
fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let dirs = [input.clone()];
            let mut found: Vec<PathBuf> = ["json", "jsonl", "gz"]
                .iter()
                .flat_map(|ext| discover(&dirs, ext))
                .collect();
            found.sort();
            out.extend(found);
        } else {
            out.push(input.clone());
        }
    }
    out
}

fn or_default(given: Vec<PathBuf>, fallback: Vec<PathBuf>) -> Vec<PathBuf> {
    if given.is_empty() { fallback } else { given }
}

fn print_response(response: Response, json: bool, source: &str) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        Response::Report(v) => print_report_human(&v),
        Response::Annotation(v) => println!("{}", v.text),
        Response::Dataset(v) => print_dataset_human(&v),
        Response::Config { config, .. } => print_config_human(&config, source),
        Response::Status(v) => print_status_human(&v),
    }
    Ok(())
}
