use owo_colors::OwoColorize;
use tracegraph_core::config::Config;
use tracegraph_core::model::features::FeatureSet;
use tracegraph_core::sequence::Sequence;
use tracegraph_core::tree::SpanArena;
use tracegraph_ingest::pipeline::BatchReport;
use tracegraph_store::layout::StoreStatus;

use crate::dataset::DatasetSummary;

pub fn print_report_human(v: &BatchReport) {
    for item in &v.written {
        match &item.cycle {
            Some(ids) => println!(
                "trace={} edges={} path={} {} {}",
                item.trace_id,
                item.edges,
                item.path.display(),
                "cycle".yellow(),
                ids.join(",")
            ),
            None => println!(
                "trace={} edges={} path={}",
                item.trace_id,
                item.edges,
                item.path.display()
            ),
        }
    }
    for item in &v.failed_traces {
        println!("trace={} {} | {}", item.id, "failed".red(), item.error);
    }
    for item in &v.skipped_files {
        println!("file={} {} | {}", item.id, "skipped".red(), item.error);
    }
    println!(
        "-- {} written ({} cyclic, {} failed, {} files skipped) --",
        v.written.len(),
        v.cyclic().count(),
        v.failed_traces.len(),
        v.skipped_files.len()
    );
}

pub fn print_features_human(v: &FeatureSet) {
    print!("{}", v.header());
}

pub fn print_trace_human(trace_id: &str, arena: &SpanArena<'_>, sequence: &Sequence) {
    let duration_ms = match (
        arena.spans().iter().map(|s| s.start_ms()).min(),
        arena.spans().iter().map(|s| s.finish_ms()).max(),
    ) {
        (Some(first), Some(last)) => last - first,
        _ => 0,
    };
    let errors = arena
        .spans()
        .iter()
        .filter(|s| s.status_code.as_deref().is_some_and(is_error_status))
        .count();
    println!(
        "TRACE {} duration={}ms spans={} errors={}",
        trace_id,
        duration_ms,
        arena.len(),
        errors
    );

    print_span_tree(arena);

    if let Some(cycle) = &sequence.cycle {
        println!(
            "{} graph not acyclic; insertion order used (spans: {})",
            "warning:".yellow(),
            cycle.span_ids.join(",")
        );
    }
    for line in sequence.lines() {
        println!("{line}");
    }
}

pub fn print_status_human(v: &StoreStatus) {
    println!("root={}", v.root);
    println!("trace_files={}", v.trace_files);
    println!("total_bytes={}", v.total_bytes);
}

pub fn print_config_human(v: &Config, source: &str) {
    println!("config_file={source}");
    println!("output_dir={}", v.output_dir.display());
    println!("normal_dirs={}", join_paths(&v.normal_dirs));
    println!("abnormal_dirs={}", join_paths(&v.abnormal_dirs));
    println!("samples_per_class={}", v.samples_per_class);
    println!("seed={}", v.seed);
    println!("workers={}", v.workers);
    println!("dataset_path={}", v.dataset_path.display());
}

pub fn print_dataset_human(v: &DatasetSummary) {
    println!("normal={} abnormal={}", v.normal, v.abnormal);
    for path in &v.skipped {
        println!("{} {path}", "skipped".red());
    }
    for path in &v.outputs {
        println!("wrote {}", path.display());
    }
    if v.well_formed > 0 {
        println!("well_formed={}/{}", v.well_formed, v.normal + v.abnormal);
    }
}

fn is_error_status(code: &str) -> bool {
    code.eq_ignore_ascii_case("error") || code.parse::<u16>().is_ok_and(|c| c >= 500)
}

fn join_paths(paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn print_span_tree(arena: &SpanArena<'_>) {
    for (idx, span) in arena.spans().iter().enumerate() {
        let indent = "  ".repeat(arena.depth_of(idx));
        println!(
            "{}{} {} ({}ms) {}",
            indent,
            span.service_name,
            span.operation_name.as_deref().unwrap_or("-"),
            span.duration,
            span.status_code.as_deref().unwrap_or("-")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_variants() {
        assert!(is_error_status("ERROR"));
        assert!(is_error_status("503"));
        assert!(!is_error_status("200"));
        assert!(!is_error_status("OK"));
    }
}
