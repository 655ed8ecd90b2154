//! Session summaries exported as JSON for CI artifacts.
//!
//! A report records how a harness run ended: how many clients joined, the
//! traffic the hub carried and where every peer stood.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Top-level report of one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Test or run identifier
    pub test_name: String,

    /// When the report was built (RFC 3339)
    pub timestamp: String,

    /// Overall result
    pub result: TestResult,

    /// Session and per-peer state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionMetrics>,

    /// Run length
    pub execution: ExecutionMetrics,
}

/// Overall result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Every client joined
    Pass,
    /// At least one client did not join
    Fail,
    /// Not run
    Skip,
}

/// Session-wide counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// World seed
    pub seed: u64,

    /// Chunks per world side
    pub world_size: u16,

    /// Clients connected over the run
    pub clients: usize,

    /// Clients that completed the join
    pub clients_joined: usize,

    /// Bytes handed to the hub
    pub bytes_sent: u64,

    /// Unreliable messages lost to the drop rate
    pub messages_dropped: u64,

    /// Host game clock at the end of the run
    pub game_time: f64,

    /// One entry per peer, host first
    pub peers: Vec<PeerMetrics>,
}

/// State of one peer at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMetrics {
    /// Peer id
    pub peer: u64,

    /// `host`, `client` or `solo`
    pub role: String,

    /// Local player's location
    pub location: String,

    /// Remote players in this peer's roster
    pub known_players: usize,

    /// Chunk requests still waiting on the host
    pub outstanding_chunk_requests: usize,

    /// Chunks held, loaded or stored, over all planets
    pub resident_chunks: usize,
}

/// Run length
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Frames stepped
    pub frames: u64,

    /// Session time covered by those frames (seconds)
    pub simulated_seconds: f64,

    /// Wall-clock time spent (seconds)
    pub wall_seconds: f64,
}

/// Builder for [`SessionReport`]
pub struct SessionReportBuilder {
    report: SessionReport,
}

impl SessionReportBuilder {
    /// Start a passing report named `test_name`
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            report: SessionReport {
                test_name: test_name.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                result: TestResult::Pass,
                session: None,
                execution: ExecutionMetrics {
                    frames: 0,
                    simulated_seconds: 0.0,
                    wall_seconds: 0.0,
                },
            },
        }
    }

    /// Set the result
    pub fn result(mut self, result: TestResult) -> Self {
        self.report.result = result;
        self
    }

    /// Set the session metrics
    pub fn session(mut self, metrics: SessionMetrics) -> Self {
        self.report.session = Some(metrics);
        self
    }

    /// Set the run length
    pub fn execution(mut self, metrics: ExecutionMetrics) -> Self {
        self.report.execution = metrics;
        self
    }

    /// Finish the report
    pub fn build(self) -> SessionReport {
        self.report
    }
}

/// Writes reports as pretty JSON
pub struct ReportSink {
    path: PathBuf,
}

impl ReportSink {
    /// Create a sink at `path`, creating parent directories if needed
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    /// Write `report`, replacing any earlier one
    pub fn write(&self, report: &SessionReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        let mut file =
            File::create(&self.path).with_context(|| format!("Failed to create {}", self.path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn sample() -> SessionReport {
        SessionReportBuilder::new("two_clients")
            .session(SessionMetrics {
                seed: 7,
                world_size: 16,
                clients: 2,
                clients_joined: 2,
                bytes_sent: 4096,
                messages_dropped: 0,
                game_time: 12.5,
                peers: vec![PeerMetrics {
                    peer: 1,
                    role: "host".into(),
                    location: "planet 0".into(),
                    known_players: 2,
                    outstanding_chunk_requests: 0,
                    resident_chunks: 25,
                }],
            })
            .execution(ExecutionMetrics {
                frames: 40,
                simulated_seconds: 2.0,
                wall_seconds: 0.1,
            })
            .build()
    }

    #[test]
    fn report_survives_json() {
        let json = serde_json::to_string_pretty(&sample()).unwrap();
        let parsed: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.test_name, "two_clients");
        assert_eq!(parsed.result, TestResult::Pass);
        assert_eq!(parsed.session.as_ref().unwrap().peers[0].role, "host");
    }

    #[test]
    fn sink_writes_file() {
        let path = std::env::temp_dir().join(format!(
            "starhaven-report-{}/report.json",
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos()
        ));
        let sink = ReportSink::create(&path).unwrap();
        sink.write(&sample()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("two_clients"));
        assert!(contents.contains("\"result\": \"pass\""));
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
