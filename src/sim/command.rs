//! External-process simulation runner.
//!
//! Each `compute()` spawns the configured command once. The pending roughness
//! assignments are written to its stdin as JSON:
//!
//! ```json
//! {"assignments": [{"river": "Main", "reach": "Upper", "value": 0.035}]}
//! ```
//!
//! and the command must print a CSV table on stdout with the headers
//! `station,profile,stage` plus optional `velocity`, `river` and `reach`
//! columns. Profiles are 1-based. Anything printed on stderr is kept for the
//! error message when the command fails.

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Location, SeriesKind};
use crate::sim::runner::{RunnerError, RunnerResult, SimulationRunner, WHOLE_REACH};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Assignment {
    river: String,
    reach: String,
    value: f64,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    assignments: &'a [Assignment],
}

/// One row of simulator output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputRow {
    pub station: String,
    pub profile: usize,
    pub stage: f64,
    #[serde(default)]
    pub velocity: Option<f64>,
    #[serde(default)]
    pub river: Option<String>,
    #[serde(default)]
    pub reach: Option<String>,
}

impl OutputRow {
    /// `WHOLE_REACH` matches every reach of the river.
    fn at(&self, location: &Location) -> bool {
        self.river.as_deref().is_none_or(|r| r == location.river)
            && self
                .reach
                .as_deref()
                .is_none_or(|r| location.reach == WHOLE_REACH || r == location.reach)
    }
}

/// Runs an external command per simulation.
#[derive(Debug)]
pub struct CommandRunner {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    pending: Vec<Assignment>,
    last_output: Option<Vec<OutputRow>>,
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            pending: Vec::new(),
            last_output: None,
        }
    }

    fn spawn(&self) -> RunnerResult<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RunnerError::Failed(format!(
                    "could not start '{}': {e}",
                    self.program.display()
                ))
            })
    }
}

impl SimulationRunner for CommandRunner {
    fn set_parameter(&mut self, location: &Location, value: f64) -> RunnerResult<()> {
        match self
            .pending
            .iter_mut()
            .find(|a| a.river == location.river && a.reach == location.reach)
        {
            Some(existing) => existing.value = value,
            None => self.pending.push(Assignment {
                river: location.river.clone(),
                reach: location.reach.clone(),
                value,
            }),
        }
        Ok(())
    }

    fn compute(&mut self) -> RunnerResult<()> {
        self.last_output = None;
        let mut child = self.spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            let request = RunRequest {
                assignments: &self.pending,
            };
            let written = serde_json::to_writer(&mut stdin, &request)
                .map_err(std::io::Error::from)
                .and_then(|()| stdin.write_all(b"\n"));
            match written {
                Ok(()) => {}
                // The command may legitimately ignore its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
        }

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                warn!(program = %self.program.display(), "simulation timed out; killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunnerError::Timeout {
                    seconds: self.timeout.as_secs_f64(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = join(stdout)?;
        let stderr = join(stderr)?;
        if !status.success() {
            let detail = stderr.trim();
            return Err(RunnerError::Failed(if detail.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {detail}")
            }));
        }

        let rows = parse_output(&stdout)?;
        debug!(rows = rows.len(), "simulator output parsed");
        self.last_output = Some(rows);
        Ok(())
    }

    fn retrieve_series(
        &mut self,
        location: &Location,
        station: Option<&str>,
        kind: SeriesKind,
        profile_count: usize,
    ) -> RunnerResult<Vec<f64>> {
        let rows = self
            .last_output
            .as_deref()
            .ok_or_else(|| RunnerError::Failed("no completed run to read from".to_string()))?;
        select_series(rows, location, station, kind, profile_count)
    }
}

pub(crate) fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<std::io::Result<String>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            pipe.read_to_string(&mut buf)?;
            Ok(buf)
        })
    })
}

pub(crate) fn join(handle: Option<JoinHandle<std::io::Result<String>>>) -> RunnerResult<String> {
    match handle {
        None => Ok(String::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| RunnerError::Failed("output reader thread panicked".to_string()))?
            .map_err(RunnerError::from),
    }
}

/// Parse the simulator's CSV output.
pub fn parse_output(text: &str) -> RunnerResult<Vec<OutputRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<OutputRow>().enumerate() {
        let row = record
            .map_err(|e| RunnerError::MalformedOutput(format!("row {}: {e}", idx + 1)))?;
        if row.profile == 0 {
            return Err(RunnerError::MalformedOutput(format!(
                "row {}: profiles are numbered from 1",
                idx + 1
            )));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Pick one station's series, in profile order.
pub fn select_series(
    rows: &[OutputRow],
    location: &Location,
    station: Option<&str>,
    kind: SeriesKind,
    profile_count: usize,
) -> RunnerResult<Vec<f64>> {
    let here: Vec<&OutputRow> = rows.iter().filter(|r| r.at(location)).collect();

    let station = match station {
        Some(s) => s.to_string(),
        None => {
            let mut names: Vec<&str> = here.iter().map(|r| r.station.as_str()).collect();
            names.sort_unstable();
            names.dedup();
            match names.as_slice() {
                [only] => only.to_string(),
                [] => String::new(),
                _ => {
                    return Err(RunnerError::MalformedOutput(format!(
                        "{} stations reported for {location}; name one explicitly",
                        names.len()
                    )));
                }
            }
        }
    };

    let missing = || RunnerError::MissingSeries {
        location: location.to_string(),
        station: station.clone(),
        kind: kind.column(),
    };

    let mut values = vec![None; profile_count];
    for row in here.iter().filter(|r| r.station == station) {
        if row.profile > profile_count {
            continue;
        }
        let value = match kind {
            SeriesKind::Stage => row.stage,
            SeriesKind::Velocity => row.velocity.ok_or_else(missing)?,
        };
        let slot = &mut values[row.profile - 1];
        if slot.is_some() {
            return Err(RunnerError::MalformedOutput(format!(
                "station {station} reported profile {} more than once for {location}",
                row.profile
            )));
        }
        *slot = Some(value);
    }

    values.into_iter().map(|v| v.ok_or_else(missing)).collect()
}
