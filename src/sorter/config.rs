use crate::sorter::paths::SorterPaths;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

const MAX_WORKERS: usize = 64;
const MAX_SETTLE_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub workers: usize,
    pub settle_ms: u64,
    pub recursive: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            settle_ms: 500,
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub ignore_suffixes: Vec<String>,
    pub exclude_names: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            ignore_suffixes: [".tmp", ".part", ".crdownload", "~"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            exclude_names: vec!["MANIFEST.jsonl".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SorterConfig {
    pub watcher: WatcherConfig,
    pub intake: IntakeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSorterConfig {
    watcher: Option<WatcherConfig>,
    intake: Option<IntakeConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

pub fn validate(cfg: &SorterConfig) -> Result<()> {
    if cfg.watcher.workers == 0 || cfg.watcher.workers > MAX_WORKERS {
        return Err(anyhow!(
            "invalid watcher workers: require 1 <= workers <= {MAX_WORKERS}"
        ));
    }
    if cfg.watcher.settle_ms > MAX_SETTLE_MS {
        return Err(anyhow!(
            "invalid watcher settle_ms: must be <= {MAX_SETTLE_MS}"
        ));
    }
    if cfg.intake.ignore_suffixes.iter().any(|s| s.is_empty()) {
        return Err(anyhow!("invalid intake ignore suffix: cannot be empty"));
    }
    Ok(())
}

pub fn config_path(paths: &SorterPaths) -> PathBuf {
    match env::var("SORTER_CONFIG_PATH") {
        Ok(custom) if !custom.trim().is_empty() => PathBuf::from(custom.trim()),
        _ => paths.home.join("sorter.toml"),
    }
}

fn merge_file_config(paths: &SorterPaths, base: &mut SorterConfig) -> Result<()> {
    let path = config_path(paths);
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialSorterConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse sorter config {}: {err}", path.display()))?;
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    if let Some(intake) = parsed.intake {
        base.intake = intake;
    }
    Ok(())
}

pub fn load_config(paths: &SorterPaths) -> Result<SorterConfig> {
    let mut cfg = SorterConfig::default();
    merge_file_config(paths, &mut cfg)?;

    cfg.watcher.workers = env_or_usize("SORTER_WORKERS", cfg.watcher.workers);
    cfg.watcher.settle_ms = env_or_u64("SORTER_SETTLE_MS", cfg.watcher.settle_ms);
    cfg.watcher.recursive = env_or_bool("SORTER_RECURSIVE", cfg.watcher.recursive);
    cfg.intake.ignore_suffixes = env_or_csv("SORTER_IGNORE_SUFFIXES", &cfg.intake.ignore_suffixes);
    cfg.intake.exclude_names = env_or_csv("SORTER_EXCLUDE_NAMES", &cfg.intake.exclude_names);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let cfg = SorterConfig::default();
        validate(&cfg).expect("defaults are valid");
        assert_eq!(cfg.watcher.workers, 4);
        assert!(cfg.intake.exclude_names.contains(&"MANIFEST.jsonl".to_string()));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = SorterConfig::default();
        cfg.watcher.workers = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_toml_keeps_missing_fields_at_default() {
        let parsed: PartialSorterConfig =
            toml::from_str("[watcher]\nworkers = 2\n").expect("parse toml");
        let watcher = parsed.watcher.expect("watcher section");
        assert_eq!(watcher.workers, 2);
        assert_eq!(watcher.settle_ms, 500);
        assert!(parsed.intake.is_none());
    }
}
