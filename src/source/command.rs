use crate::metric::RawRecord;
use crate::source::{Collector, ScrapeError};
use crate::util::truncate;
use serde_json::Value;
use std::process;

/// Longest piece of a failing program's stderr carried into the error.
const STDERR_LIMIT: usize = 500;

/// Configuration for the `Command` collector.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandConfig {
    /// Program to run.
    pub program: String,
    /// Arguments passed to it.
    pub args: Vec<String>,
}

/// Command collector
///
/// Runs a program once per tick and reads its stdout as one JSON object. Any
/// sensor script that prints its readings this way plugs in without code.
#[derive(Debug)]
pub struct Command {
    name: String,
    config: CommandConfig,
}

impl Command {
    /// Create a new Command collector
    pub fn new(config: CommandConfig) -> Command {
        Command {
            name: format!("command:{}", config.program),
            config,
        }
    }
}

impl Collector for Command {
    fn name(&self) -> &str {
        &self.name
    }

    fn scrape(&mut self) -> Result<RawRecord, ScrapeError> {
        let output = process::Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(process::Stdio::null())
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScrapeError::Failed(format!(
                "{}: {}",
                output.status,
                truncate(stderr.trim(), STDERR_LIMIT)
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Err(ScrapeError::NoData);
        }
        let value: Value = serde_json::from_str(stdout)?;
        RawRecord::from_value(value).ok_or(ScrapeError::NotAnObject)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn sh(script: &str) -> Command {
        Command::new(CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    #[test]
    fn stdout_object_is_the_record() {
        let mut cmd = sh(r#"echo '{"timestamp": "2025-01-01T00:00:00", "core": 12.5}'"#);
        assert_eq!("command:sh", cmd.name());
        let rec = cmd.scrape().unwrap();
        assert_eq!(Some(&json!(12.5)), rec.get("core"));
        assert_eq!(Some(&json!("2025-01-01T00:00:00")), rec.get("timestamp"));
    }

    #[test]
    fn failures_are_scrape_errors() {
        match sh("echo boom >&2; exit 3").scrape() {
            Err(ScrapeError::Failed(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected {:?}", other),
        }
        match sh("echo '[1, 2]'").scrape() {
            Err(ScrapeError::NotAnObject) => {}
            other => panic!("unexpected {:?}", other),
        }
        match sh("echo not json").scrape() {
            Err(ScrapeError::Json(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match sh("true").scrape() {
            Err(ScrapeError::NoData) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_io_error() {
        let mut cmd = Command::new(CommandConfig {
            program: "/nonexistent/powerpush-sensor".to_string(),
            args: vec![],
        });
        match cmd.scrape() {
            Err(ScrapeError::Io(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
