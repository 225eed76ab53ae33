//! # Flight Log
//!
//! Records telemetry snapshots to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting each snapshot as one JSON line with a UTC timestamp
//! - Starting a new file every `max_records_per_file` records
//! - Retaining only the newest `max_files_to_keep` files

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::telemetry::TelemetryState;
use crate::config::FlightLogConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "flight_";
const FILE_EXTENSION: &str = "jsonl";

/// One line of the flight log
#[derive(Debug, Clone, Serialize)]
pub struct FlightRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub flying_time_ms: u64,
    pub return_home: bool,
    pub distance_home_m: f64,
    pub telemetry: &'a TelemetryState,
}

impl<'a> FlightRecord<'a> {
    /// Record stamped with the current wall-clock time
    pub fn now(telemetry: &'a TelemetryState) -> Self {
        Self {
            timestamp: Utc::now(),
            flying_time_ms: 0,
            return_home: false,
            distance_home_m: 0.0,
            telemetry,
        }
    }
}

/// Rotating JSONL writer
pub struct FlightRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    files_opened: u32,
}

impl std::fmt::Debug for FlightRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightRecorder")
            .field("dir", &self.dir)
            .field("current_path", &self.current_path)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl FlightRecorder {
    /// Create the log directory if needed; the first file opens on the first record
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn new(config: &FlightLogConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;
        info!("Flight log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    /// File currently written, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Append one record, rotating first when the current file is full
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be serialized or written.
    pub fn record(&mut self, record: &FlightRecord<'_>) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate(record.timestamp)?;
        }

        let line = serde_json::to_string(record)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.flush()?;

        self.files_opened += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            at.format("%Y%m%d_%H%M%S"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let file = File::create(&path)?;
        debug!("Opened flight log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut logs: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_flight_log(path))
            .collect();

        if logs.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names start with the UTC time so lexical order is age order
        logs.sort();
        let excess = logs.len() - self.max_files_to_keep;
        for path in logs.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed old flight log {}", path.display()),
                Err(e) => warn!("Failed to remove old flight log {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

impl Drop for FlightRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush flight log: {}", e);
        }
    }
}

fn is_flight_log(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(FILE_PREFIX));
    named && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}
