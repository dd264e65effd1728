use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::AppError;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn ensure_directory(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path).map_err(|e| AppError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = fs::read(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| AppError::json(path, e))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut data = serde_json::to_vec_pretty(value).map_err(|e| AppError::json(path, e))?;
    data.push(b'\n');
    fs::write(path, data).map_err(|e| AppError::io(path, e))
}

/// Lists the run directories under `root` (names starting with `run`), sorted.
pub fn list_run_dirs(root: &Path) -> Result<Vec<String>, AppError> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| AppError::io(root, e))? {
        let entry = entry.map_err(|e| AppError::io(root, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.path().is_dir() && name.starts_with("run") {
            runs.push(name);
        }
    }
    runs.sort_by_key(|name| (run_number(name), name.clone()));
    Ok(runs)
}

/// Resolves a run selector against `root`. A bare number matches `run<n>` or `run_<n>`;
/// anything else is taken as a directory name. Returns `None` when nothing exists.
pub fn resolve_run_dir(root: &Path, selector: &str) -> Option<(String, PathBuf)> {
    let selector = selector.trim();
    let candidates: Vec<String> = if selector.chars().all(|c| c.is_ascii_digit()) && !selector.is_empty() {
        vec![format!("run{selector}"), format!("run_{selector}"), selector.to_string()]
    } else {
        vec![selector.to_string()]
    };
    candidates
        .into_iter()
        .map(|name| {
            let path = root.join(&name);
            (name, path)
        })
        .find(|(_, path)| path.is_dir())
}

fn run_number(name: &str) -> u64 {
    name.chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(u64::MAX)
}
