use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceGraphError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Where per-trace sequence files are written.
    pub output_dir: PathBuf,
    pub normal_dirs: Vec<PathBuf>,
    pub abnormal_dirs: Vec<PathBuf>,
    pub samples_per_class: usize,
    pub seed: u64,
    pub workers: usize,
    pub dataset_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_root = PathBuf::from("data");
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            output_dir: data_root.join("sequences"),
            normal_dirs: vec![data_root.join("raw/normal")],
            abnormal_dirs: vec![data_root.join("raw/abnormal")],
            samples_per_class: 500,
            seed: 42,
            workers,
            dataset_path: data_root.join("cooked/dataset.jsonl"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    output_dir: Option<PathBuf>,
    normal_dirs: Option<Vec<PathBuf>>,
    abnormal_dirs: Option<Vec<PathBuf>>,
    samples_per_class: Option<usize>,
    seed: Option<u64>,
    workers: Option<usize>,
    dataset_path: Option<PathBuf>,
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRACEGRAPH_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("tracegraph/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TraceGraphError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TraceGraphError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        output_dir: env::var("TRACEGRAPH_OUTPUT_DIR").ok().map(PathBuf::from),
        normal_dirs: env::var("TRACEGRAPH_NORMAL_DIRS").ok().map(|v| parse_dir_list(&v)),
        abnormal_dirs: env::var("TRACEGRAPH_ABNORMAL_DIRS")
            .ok()
            .map(|v| parse_dir_list(&v)),
        samples_per_class: parse_env_number("TRACEGRAPH_SAMPLES_PER_CLASS")?,
        seed: parse_env_number("TRACEGRAPH_SEED")?,
        workers: parse_env_number("TRACEGRAPH_WORKERS")?,
        dataset_path: env::var("TRACEGRAPH_DATASET_PATH").ok().map(PathBuf::from),
    })
}

fn parse_env_number<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TraceGraphError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.output_dir {
        cfg.output_dir = v;
    }
    if let Some(v) = overrides.normal_dirs {
        cfg.normal_dirs = v;
    }
    if let Some(v) = overrides.abnormal_dirs {
        cfg.abnormal_dirs = v;
    }
    if let Some(v) = overrides.samples_per_class {
        cfg.samples_per_class = v;
    }
    if let Some(v) = overrides.seed {
        cfg.seed = v;
    }
    if let Some(v) = overrides.workers {
        if v == 0 {
            return Err(TraceGraphError::Config(format!(
                "workers must be at least 1 in {source}"
            )));
        }
        cfg.workers = v;
    }
    if let Some(v) = overrides.dataset_path {
        cfg.dataset_path = v;
    }
    Ok(())
}

fn parse_dir_list(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
