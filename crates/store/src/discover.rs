use std::path::{Path, PathBuf};

use glob::Pattern;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;

/// Files directly under each directory whose name ends in `.<extension>`,
/// sorted per directory. Missing directories are logged and skipped.
pub fn discover(dirs: &[PathBuf], extension: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "input directory missing; skipping");
            continue;
        }
        let pattern = format!(
            "{}/*.{}",
            Pattern::escape(&dir.to_string_lossy()),
            Pattern::escape(extension)
        );
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "bad discovery pattern; skipping");
                continue;
            }
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!(error = %err, "unreadable directory entry; skipping");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        found.sort();
        out.extend(found);
    }
    out
}

/// Seeded sampling so the same seed always selects the same files.
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Up to `cap` paths chosen at random; `cap == 0` means no cap.
    pub fn sample(&mut self, paths: &[PathBuf], cap: usize) -> Vec<PathBuf> {
        if cap == 0 || paths.len() <= cap {
            return paths.to_vec();
        }
        paths
            .choose_multiple(&mut self.rng, cap)
            .cloned()
            .collect()
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }
}

/// File name used as the record id.
pub fn file_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
