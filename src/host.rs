//! External test-host adapter.
//!
//! `CommandTestPlatform` drives a test-host command over a small protocol:
//! the settings document travels as JSON in the `SHARP_MUTANT_SETTINGS`
//! environment variable, the mode (`discover` or `run`) is the last argument,
//! and the host answers with one JSON object per stdout line
//! (`TestDescription` rows for discovery, `TestResult` rows for runs).
//!
//! A host that blows its deadline is killed; the missing result rows make
//! the scheduler classify the affected mutants as timeouts. A host that
//! cannot be spawned or talks garbage is retried once with a fresh process
//! before the engine gives up.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::platform::{RunSettings, TestDescription, TestPlatform, TestResult, TestRun};

/// Environment variable the settings document is carried in.
pub const SETTINGS_ENV: &str = "SHARP_MUTANT_SETTINGS";

/// Extra wall-clock granted beyond the per-test timeouts before the host is
/// killed.
const GRACE_MS: u64 = 2000;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Test platform backed by an external host command.
#[derive(Debug)]
pub struct CommandTestPlatform {
    cmd: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    /// Discovered suite size; sizes the deadline for unfiltered runs.
    suite_size: AtomicUsize,
}

impl CommandTestPlatform {
    pub fn new(cmd: impl Into<String>, args: Vec<String>) -> CommandTestPlatform {
        CommandTestPlatform {
            cmd: cmd.into(),
            args,
            cwd: None,
            suite_size: AtomicUsize::new(0),
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> CommandTestPlatform {
        self.cwd = Some(cwd);
        self
    }

    fn deadline_for(&self, settings: &RunSettings) -> Option<Duration> {
        let per_test = settings.timeout_ms?;
        let tests = settings
            .test_filter
            .as_ref()
            .map(|f| f.len())
            .unwrap_or_else(|| self.suite_size.load(Ordering::SeqCst))
            .max(1) as u64;
        Some(Duration::from_millis(per_test.saturating_mul(tests) + GRACE_MS))
    }

    fn invoke(&self, mode: &str, settings: &RunSettings) -> Result<HostOutput, String> {
        let payload = serde_json::to_string(settings).map_err(|e| e.to_string())?;

        let mut command = Command::new(&self.cmd);
        command
            .args(&self.args)
            .arg(mode)
            .env(SETTINGS_ENV, payload)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let child = command
            .spawn()
            .map_err(|e| format!("failed to spawn `{}`: {e}", self.cmd))?;

        wait_with_deadline(child, self.deadline_for(settings))
    }

    fn parse_lines<T: serde::de::DeserializeOwned>(output: &HostOutput) -> Result<Vec<T>, String> {
        output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|line| {
                serde_json::from_str::<T>(line)
                    .map_err(|e| format!("malformed host line {line:?}: {e}"))
            })
            .collect()
    }

    /// Run `f`, once more on failure with a fresh host process, then fail
    /// with `TestHostUnreachable`.
    fn with_retry<T>(&self, f: impl Fn() -> Result<T, String>) -> Result<T, EngineError> {
        match f() {
            Ok(v) => Ok(v),
            Err(first) => f().map_err(|second| {
                EngineError::TestHostUnreachable(format!("{first}; retry failed: {second}"))
            }),
        }
    }
}

impl TestPlatform for CommandTestPlatform {
    fn discover(&self, settings: &RunSettings) -> Result<Vec<TestDescription>, EngineError> {
        let tests = self.with_retry(|| {
            let output = self.invoke("discover", settings)?;
            if output.killed {
                return Err("host exceeded its deadline during discovery".to_string());
            }
            Self::parse_lines::<TestDescription>(&output)
        })?;

        self.suite_size.store(tests.len(), Ordering::SeqCst);
        Ok(tests)
    }

    fn run(&self, settings: &RunSettings) -> Result<TestRun, EngineError> {
        let results = self.with_retry(|| {
            let output = self.invoke("run", settings)?;
            // A killed host still yields its partial rows; the scheduler
            // reads missing rows as timeouts.
            Self::parse_lines::<TestResult>(&output)
        })?;

        Ok(TestRun { results })
    }
}

#[derive(Debug)]
struct HostOutput {
    stdout: String,
    #[allow(dead_code)]
    stderr: String,
    killed: bool,
}

fn wait_with_deadline(mut child: Child, deadline: Option<Duration>) -> Result<HostOutput, String> {
    use std::io::Read;

    // Drain pipes on threads so a chatty host cannot deadlock on a full pipe.
    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout_pipe.read_to_string(&mut buf);
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr_pipe.read_to_string(&mut buf);
        buf
    });

    let started = Instant::now();
    let mut killed = false;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if let Some(limit) = deadline {
                    if started.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        killed = true;
                        break;
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(format!("failed to wait for host: {e}")),
        }
    }

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(HostOutput {
        stdout,
        stderr,
        killed,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::TestOutcome;

    fn sh(script: &str) -> CommandTestPlatform {
        CommandTestPlatform::new("sh", vec!["-c".to_string(), script.to_string(), "sh".to_string()])
    }

    fn coverage_settings() -> RunSettings {
        RunSettings::coverage_run(1, "SharpMutant.Runtime")
    }

    #[test]
    fn run_parses_result_lines() {
        let platform = sh(
            r#"echo '{"test":"t1","outcome":"passed","duration_ms":12}'
echo '{"test":"t2","outcome":"failed","duration_ms":3}'"#,
        );

        let run = platform.run(&coverage_settings()).expect("host run");
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.results[0].outcome, TestOutcome::Passed);
        assert_eq!(run.results[1].outcome, TestOutcome::Failed);
    }

    #[test]
    fn discover_records_suite_size() {
        let platform = sh(
            r#"echo '{"id":"t1","name":"T.One","source_path":"tests/T.dll"}'
echo '{"id":"t2","name":"T.Two","source_path":"tests/T.dll"}'"#,
        );

        let tests = platform.discover(&coverage_settings()).expect("discovery");
        assert_eq!(tests.len(), 2);
        assert_eq!(platform.suite_size.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_command_is_unreachable_after_retry() {
        let platform = CommandTestPlatform::new("definitely-not-a-real-host-cmd", Vec::new());
        let err = platform
            .run(&coverage_settings())
            .expect_err("spawn must fail");
        assert!(matches!(err, EngineError::TestHostUnreachable(_)));
        let text = err.to_string();
        assert!(text.contains("retry failed"), "both attempts surfaced: {text}");
    }

    #[test]
    fn garbage_protocol_is_unreachable() {
        let platform = sh("echo 'this is not json'");
        let err = platform
            .run(&coverage_settings())
            .expect_err("garbage must fail");
        assert!(matches!(err, EngineError::TestHostUnreachable(_)));
    }

    #[test]
    fn overdue_host_is_killed_and_partial_rows_survive() {
        let platform = sh(
            r#"echo '{"test":"t1","outcome":"passed","duration_ms":5}'
exec sleep 30"#,
        );

        let mut settings = coverage_settings();
        settings.timeout_ms = Some(50);
        settings.test_filter = Some(vec![crate::platform::TestId::new("t1")]);

        let started = Instant::now();
        let run = platform.run(&settings).expect("killed host still reports");
        assert!(started.elapsed() < Duration::from_secs(20), "host was killed");
        assert_eq!(run.results.len(), 1);
    }
}
