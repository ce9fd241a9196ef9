//! Flat-file output: the JSON case artifact, its backups, markup snapshots
//! and the diagnostic error log.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::Record;

const BACKUPS_DIR: &str = "backups";
const SNAPSHOTS_DIR: &str = "snapshots";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write the JSON artifact after each run.
    #[serde(default = "default_flat_file")]
    pub flat_file: bool,
    #[serde(default = "default_artifact")]
    pub artifact: String,
    /// Previous artifacts to keep under `backups/`.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Save fetched markup under `snapshots/`.
    #[serde(default)]
    pub snapshots: bool,
}

fn default_flat_file() -> bool {
    true
}

fn default_artifact() -> String {
    "cases.json".to_string()
}

fn default_max_backups() -> usize {
    5
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            flat_file: default_flat_file(),
            artifact: default_artifact(),
            max_backups: default_max_backups(),
            snapshots: false,
        }
    }
}

/// Writes run output under one directory.
pub struct ArtifactWriter {
    dir: PathBuf,
    config: OutputConfig,
}

impl ArtifactWriter {
    pub fn new(dir: &Path, config: OutputConfig) -> Self {
        Self {
            dir: dir.to_path_buf(),
            config,
        }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(&self.config.artifact)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.dir.join(BACKUPS_DIR)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.dir.join(SNAPSHOTS_DIR)
    }

    /// Atomically replace the artifact with `records`. An empty slice writes `[]`.
    pub fn write_records(&self, records: &[Record]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.artifact_path();

        if path.exists() && self.config.max_backups > 0 {
            if let Err(e) = self.backup(&path) {
                warn!("Could not back up {}: {}", path.display(), e);
            }
        }

        let json = serde_json::to_string_pretty(records).map_err(io::Error::other)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        info!("Wrote {} records to {}", records.len(), path.display());
        Ok(path)
    }

    fn backup(&self, path: &Path) -> io::Result<PathBuf> {
        let backups = self.backups_dir();
        fs::create_dir_all(&backups)?;

        let stem = self.artifact_stem();
        let name = format!("{}_{}.json", stem, Local::now().format("%Y%m%d_%H%M%S"));
        let target = backups.join(name);
        fs::copy(path, &target)?;
        debug!("Backed up artifact to {}", target.display());

        self.prune_backups(&stem)?;
        Ok(target)
    }

    fn artifact_stem(&self) -> String {
        Path::new(&self.config.artifact)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cases".to_string())
    }

    /// Keep only the newest `max_backups` backups. Names sort by timestamp.
    fn prune_backups(&self, stem: &str) -> io::Result<()> {
        let prefix = format!("{}_", stem);
        let mut backups: Vec<PathBuf> = fs::read_dir(self.backups_dir())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
            })
            .collect();
        backups.sort();

        let excess = backups.len().saturating_sub(self.config.max_backups);
        for old in backups.into_iter().take(excess) {
            debug!("Removing old backup {}", old.display());
            fs::remove_file(old)?;
        }
        Ok(())
    }

    /// Save fetched markup as `snapshots/<source>.html`.
    pub fn save_snapshot(&self, source: &str, markup: &str) -> io::Result<PathBuf> {
        let dir = self.snapshots_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.html", sanitize_name(source)));
        fs::write(&path, markup)?;
        debug!("Saved snapshot {}", path.display());
        Ok(path)
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so a source name is a safe file name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "source".to_string()
    } else {
        cleaned
    }
}

/// Append a timestamped entry to the diagnostic error log.
pub fn append_error_log(path: &Path, message: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "[{}] {}", Utc::now().to_rfc3339(), message)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn writer(dir: &Path, max_backups: usize) -> ArtifactWriter {
        ArtifactWriter::new(
            dir,
            OutputConfig {
                max_backups,
                ..OutputConfig::default()
            },
        )
    }

    #[test]
    fn test_empty_run_writes_empty_array() {
        let dir = tempdir().unwrap();
        let path = writer(dir.path(), 5).write_records(&[]).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.trim(), "[]");
    }

    #[test]
    fn test_artifact_keeps_non_ascii_and_round_trips() {
        let dir = tempdir().unwrap();
        let record = Record::new("113-05-01", "臺北市", "假投資", "加入投資群組");
        let path = writer(dir.path(), 5)
            .write_records(std::slice::from_ref(&record))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("臺北市"));
        let parsed: Vec<Record> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![record]);
    }

    #[test]
    fn test_backups_are_rotated() {
        let dir = tempdir().unwrap();
        let writer = writer(dir.path(), 2);
        let backups = writer.backups_dir();
        fs::create_dir_all(&backups).unwrap();
        for stamp in ["20240101_000000", "20240102_000000", "20240103_000000"] {
            fs::write(backups.join(format!("cases_{}.json", stamp)), "[]").unwrap();
        }
        fs::write(backups.join("unrelated.txt"), "keep").unwrap();

        writer.write_records(&[]).unwrap();
        writer.write_records(&[]).unwrap();

        let mut names: Vec<String> = fs::read_dir(&backups)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".json"))
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(!names.contains(&"cases_20240101_000000.json".to_string()));
        assert!(backups.join("unrelated.txt").exists());
    }

    #[test]
    fn test_snapshot_and_error_log() {
        let dir = tempdir().unwrap();
        let writer = writer(dir.path(), 5);
        let snap = writer.save_snapshot("165 city/cases", "<html></html>").unwrap();
        assert_eq!(snap.file_name().unwrap(), "165_city_cases.html");

        let log = dir.path().join("crawler_error.log");
        append_error_log(&log, "first").unwrap();
        append_error_log(&log, "second").unwrap();
        let text = fs::read_to_string(log).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("second"));
    }
}
