//! Labeled training and evaluation records built from annotated trace files.
//!
//! Two layouts are produced. `predict` wraps the annotated text in a fixed
//! rule prompt with an empty answer slot, one JSON object per line. `evol`
//! emits ShareGPT-style conversations whose assistant turn is a short
//! analysis derived from the latency features and the known label.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracegraph_core::annotate::{Annotation, annotate};
use tracegraph_core::model::features::FeatureSet;
use tracegraph_store::discover::{Sampler, discover, file_id};
use tracegraph_store::read::read_text;
use tracegraph_store::write::{write_json_pretty, write_jsonl};
use tracing::{info, warn};

pub const CONCLUSION_MARKER: &str = "====结论====";

pub const PREDICT_SYSTEM_PROMPT: &str = "你是一个专家级调用链分析师。请根据给定的 Trace 统计数据，逻辑推理并判断其是“正常”还是“异常”。\n\n\
【判断标准】\n\
1. **完整性检查**：正常的 Trace 必须包含完整的调用链路（num_edges >= 9）。如果 num_edges < 9，属于链路中断（异常）。\n\
2. **时延检查**：正常的业务处理耗时通常在 **500ms 到 2000ms** 之间。\n   \
- 如果 total_latency_ms < 500ms：通常意味着请求未完成即报错返回（异常）。\n   \
- 如果 total_latency_ms > 2000ms：通常意味着系统严重超时（异常）。\n\n\
【输出要求】\n\
请一步步思考，将数据的数值与上述标准进行比对，最后输出结论。\n\
结论行必须严格为：“====结论====\n正常” 或 “====结论====\n异常”。";

const PREDICT_QUESTION: &str =
    "请根据 System Prompt 中的标准，分析上述数据的 num_edges 和 total_latency_ms，并给出结论。";

pub const EVOL_SYSTEM_PROMPT: &str =
    "你是一个专家级调用链分析师。请先分析Trace的特征，最后给出“正常”或“异常”的结论。";

/// Phrasings rotated across evol records; the expected answer never changes.
pub const QUESTION_POOL: &[&str] = &[
    "请判断该调用链是否异常，只输出“正常”或“异常”。",
    "根据统计特征与调用序列，判断该请求是否异常（仅输出两个字）。",
    "请依据瓶颈与延迟特征，判断是否异常（正常/异常）。",
    "只输出分类结果：正常 或 异常。",
    "判断：正常 还是 异常？（不要输出其它内容）",
];

const SHORT_CHAIN_MAX_EDGES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "正常")]
    Normal,
    #[serde(rename = "异常")]
    Abnormal,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "正常",
            Self::Abnormal => "异常",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStyle {
    Predict,
    Evol,
}

impl FromStr for DatasetStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "predict" => Ok(Self::Predict),
            "evol" | "sharegpt" => Ok(Self::Evol),
            other => anyhow::bail!("invalid dataset style: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictRecord {
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub label: Label,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub from: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareGptRecord {
    pub conversations: Vec<Turn>,
}

impl ShareGptRecord {
    pub fn has_conclusion(&self) -> bool {
        self.conversations.last().is_some_and(|turn| {
            [Label::Normal, Label::Abnormal]
                .iter()
                .any(|l| turn.value.contains(&format!("{CONCLUSION_MARKER}\n{}", l.as_str())))
        })
    }
}

pub fn predict_record(annotation: &Annotation, label: Label, id: String) -> PredictRecord {
    let input = format!(
        "=== Trace Data Start ===\n{}\n=== Trace Data End ===\n\n{PREDICT_QUESTION}",
        annotation.text
    );
    PredictRecord {
        instruction: PREDICT_SYSTEM_PROMPT.to_string(),
        input,
        output: String::new(),
        label,
        id,
    }
}

pub fn evol_record(annotation: &Annotation, label: Label, question: &str) -> ShareGptRecord {
    let turn = |from: &str, value: String| Turn {
        from: from.to_string(),
        value,
    };
    ShareGptRecord {
        conversations: vec![
            turn("system", EVOL_SYSTEM_PROMPT.to_string()),
            turn("user", format!("{}\n{question}", annotation.text)),
            turn("assistant", analysis(&annotation.features, label)),
        ],
    }
}

/// Rule-based explanation; it states what the features show and then the label.
pub fn analysis(features: &FeatureSet, label: Label) -> String {
    let n = features.num_edges;
    let length = if n <= SHORT_CHAIN_MAX_EDGES {
        format!("链路节点数 num_edges={n}，链路过短。")
    } else {
        format!("链路节点数 num_edges={n}，结构完整。")
    };

    let ratio = features.max_edge_ratio;
    let bottleneck = if ratio > 0.9 {
        format!(
            "发现第 {} 条调用耗时占比高达 {:.1}%，存在显著的单点耗时。",
            features.bottleneck_index,
            ratio * 100.0
        )
    } else if ratio > 0.5 {
        format!("存在主要耗时节点，占比 {:.1}%。", ratio * 100.0)
    } else {
        "各节点耗时分布相对均匀。".to_string()
    };

    let reason = match label {
        Label::Abnormal if n <= SHORT_CHAIN_MAX_EDGES => "结合极短链路特征，判定为异常中断。",
        Label::Abnormal => "尽管链路完整，但结合高延迟与瓶颈特征，判定为性能异常。",
        Label::Normal => "该长耗时节点属于核心业务逻辑，符合预期，整体链路正常。",
    };

    format!(
        "分析：\n1. {length}\n2. {bottleneck}\n3. {reason}\n{CONCLUSION_MARKER}\n{}",
        label.as_str()
    )
}

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub style: DatasetStyle,
    pub normal_dirs: Vec<PathBuf>,
    pub abnormal_dirs: Vec<PathBuf>,
    pub samples_per_class: usize,
    pub seed: u64,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetSummary {
    pub normal: usize,
    pub abnormal: usize,
    pub skipped: Vec<String>,
    pub outputs: Vec<PathBuf>,
    /// Evol records whose answer ends in a well-formed conclusion.
    pub well_formed: usize,
}

pub fn build(opts: &DatasetOptions) -> anyhow::Result<DatasetSummary> {
    let mut sampler = Sampler::new(opts.seed);
    let mut summary = DatasetSummary::default();
    let mut predict = Vec::new();
    let mut evol = Vec::new();

    for (label, dirs) in [
        (Label::Normal, &opts.normal_dirs),
        (Label::Abnormal, &opts.abnormal_dirs),
    ] {
        let candidates = discover(dirs, "txt");
        let selected = sampler.sample(&candidates, opts.samples_per_class);
        let mut kept = 0;

        for path in selected {
            let raw = match read_text(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping trace file");
                    summary.skipped.push(path.display().to_string());
                    continue;
                }
            };
            let annotation = annotate(raw.trim());
            match opts.style {
                DatasetStyle::Predict => {
                    predict.push(predict_record(&annotation, label, file_id(&path)));
                }
                DatasetStyle::Evol => {
                    let question = sampler.choose(QUESTION_POOL).copied().unwrap_or_default();
                    evol.push(evol_record(&annotation, label, question));
                }
            }
            kept += 1;
        }

        match label {
            Label::Normal => summary.normal = kept,
            Label::Abnormal => summary.abnormal = kept,
        }
    }

    match opts.style {
        DatasetStyle::Predict => {
            sampler.shuffle(&mut predict);
            write_jsonl(&opts.output, &predict)
                .with_context(|| format!("write {}", opts.output.display()))?;
            summary.outputs.push(opts.output.clone());
        }
        DatasetStyle::Evol => {
            sampler.shuffle(&mut evol);
            summary.well_formed = evol.iter().filter(|r| r.has_conclusion()).count();
            let json_path = opts.output.with_extension("json");
            let jsonl_path = opts.output.with_extension("jsonl");
            write_json_pretty(&json_path, &evol)
                .with_context(|| format!("write {}", json_path.display()))?;
            write_jsonl(&jsonl_path, &evol)
                .with_context(|| format!("write {}", jsonl_path.display()))?;
            summary.outputs.extend([json_path, jsonl_path]);
        }
    }

    info!(
        normal = summary.normal,
        abnormal = summary.abnormal,
        skipped = summary.skipped.len(),
        "dataset written"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn count_jsonl(path: &Path) -> anyhow::Result<usize> {
        let raw = fs::read_to_string(path)?;
        Ok(raw.lines().filter(|l| !l.trim().is_empty()).count())
    }

    const EDGES: &str = "Trace ID is t1\n<Trace Sequence>\n\
        [Edge ID is a, Source is Client, Destination is api, Type is HTTP, Communication starts at 0 ms, Communication finishes at 100 ms].\n\
        [Edge ID is b, Source is api, Destination is db, Type is DATABASE, Communication starts at 10 ms, Communication finishes at 95 ms].\n\
        </Trace Sequence>";

    #[test]
    fn predict_record_wraps_annotated_text() {
        let record = predict_record(&annotate(EDGES), Label::Abnormal, "t1.txt".into());
        assert!(record.input.starts_with("=== Trace Data Start ===\n# 统计特征\nnum_edges=2\n"));
        assert!(record.input.contains("duration=85 ms]."));
        assert!(record.input.ends_with(PREDICT_QUESTION));
        assert_eq!(record.output, "");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["label"], "异常");
        assert_eq!(json["id"], "t1.txt");
    }

    #[test]
    fn analysis_reflects_features_and_label() {
        let features = FeatureSet {
            num_edges: 2,
            total_latency_ms: 100,
            max_edge_latency_ms: 95,
            mean_edge_latency_ms: 50,
            p95_edge_latency_ms: 95,
            max_edge_ratio: 0.95,
            bottleneck_index: 1,
        };
        let text = analysis(&features, Label::Abnormal);
        assert!(text.contains("链路过短"));
        assert!(text.contains("第 1 条调用耗时占比高达 95.0%"));
        assert!(text.contains("异常中断"));
        assert!(text.ends_with("====结论====\n异常"));

        let even = FeatureSet {
            num_edges: 12,
            max_edge_ratio: 0.2,
            ..features
        };
        let text = analysis(&even, Label::Normal);
        assert!(text.contains("结构完整"));
        assert!(text.contains("相对均匀"));
        assert!(text.ends_with("====结论====\n正常"));
    }

    #[test]
    fn evol_record_has_three_turns() {
        let record = evol_record(&annotate(EDGES), Label::Normal, QUESTION_POOL[0]);
        assert_eq!(record.conversations.len(), 3);
        assert_eq!(record.conversations[0].from, "system");
        assert!(record.conversations[1].value.ends_with(QUESTION_POOL[0]));
        assert!(record.has_conclusion());
    }

    #[test]
    fn builds_balanced_predict_dataset() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let normal = temp.path().join("normal");
        let abnormal = temp.path().join("abnormal");
        fs::create_dir_all(&normal)?;
        fs::create_dir_all(&abnormal)?;
        for i in 0..5 {
            fs::write(normal.join(format!("n{i}.txt")), EDGES)?;
        }
        fs::write(abnormal.join("a0.txt"), EDGES)?;

        let output = temp.path().join("out/predict.jsonl");
        let summary = build(&DatasetOptions {
            style: DatasetStyle::Predict,
            normal_dirs: vec![normal],
            abnormal_dirs: vec![abnormal, temp.path().join("missing")],
            samples_per_class: 3,
            seed: 42,
            output: output.clone(),
        })?;

        assert_eq!(summary.normal, 3);
        assert_eq!(summary.abnormal, 1);
        assert_eq!(count_jsonl(&output)?, 4);
        Ok(())
    }

    #[test]
    fn builds_evol_json_and_jsonl() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let normal = temp.path().join("normal");
        fs::create_dir_all(&normal)?;
        fs::write(normal.join("n0.txt"), EDGES)?;

        let summary = build(&DatasetOptions {
            style: DatasetStyle::Evol,
            normal_dirs: vec![normal],
            abnormal_dirs: vec![],
            samples_per_class: 10,
            seed: 2025,
            output: temp.path().join("evol"),
        })?;

        assert_eq!(summary.well_formed, 1);
        let json: Vec<ShareGptRecord> =
            serde_json::from_str(&fs::read_to_string(temp.path().join("evol.json"))?)?;
        assert_eq!(json.len(), 1);
        assert_eq!(count_jsonl(&temp.path().join("evol.jsonl"))?, 1);
        Ok(())
    }

    #[test]
    fn parses_style() {
        assert_eq!("predict".parse::<DatasetStyle>().unwrap(), DatasetStyle::Predict);
        assert_eq!("sharegpt".parse::<DatasetStyle>().unwrap(), DatasetStyle::Evol);
        assert!("csv".parse::<DatasetStyle>().is_err());
    }
}
