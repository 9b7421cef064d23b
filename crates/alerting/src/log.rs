//! Append-only alert log

use chrono::{DateTime, Local};
use dms::{FatigueAlert, TimePeriod, Weather};
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::AlertError;

/// One fired alert
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Local>,
    /// 1-based index within the session
    pub index: u32,
    pub kind: FatigueAlert,
    pub ear: Option<f64>,
    pub mar: Option<f64>,
    pub speed_kmh: f64,
    pub weather: Weather,
    pub time_period: TimePeriod,
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "--".to_string(), |v| format!("{:.3}", v))
}

impl fmt::Display for AlertRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | ALERT #{} | {} | EAR={} | MAR={} | Speed={} km/h | Weather={} | Time={}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.index,
            self.kind,
            ratio(self.ear),
            ratio(self.mar),
            self.speed_kmh as i64,
            self.weather,
            self.time_period
        )
    }
}

/// Human-readable alert log, one line per fired alert
pub struct AlertLog {
    path: Option<PathBuf>,
}

impl AlertLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        if let Some(p) = &path {
            info!("Alert log at {}", p.display());
        }
        Self { path }
    }

    /// Append one record; the file is created on first use
    pub fn append(&self, record: &AlertRecord) -> Result<(), AlertError> {
        info!(target: "fatigue_alert", "{}", record);

        if let Some(path) = &self.path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(index: u32) -> AlertRecord {
        AlertRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 9, 22, 15, 4).unwrap(),
            index,
            kind: FatigueAlert::Drowsiness,
            ear: Some(0.1512),
            mar: None,
            speed_kmh: 92.7,
            weather: Weather::Rain,
            time_period: TimePeriod::Night,
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            record(3).to_string(),
            "2024-03-09 22:15:04 | ALERT #3 | DROWSINESS | EAR=0.151 | MAR=-- | Speed=92 km/h | Weather=Rain | Time=Night"
        );
    }

    #[test]
    fn test_append_creates_and_extends_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fatigue_log.txt");
        let log = AlertLog::new(Some(path.clone()));

        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("ALERT #1"));
        assert!(lines[1].contains("ALERT #2"));
    }

    #[test]
    fn test_unwritable_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let log = AlertLog::new(Some(dir.path().to_path_buf()));
        assert!(matches!(log.append(&record(1)), Err(AlertError::Log(_))));
    }
}
