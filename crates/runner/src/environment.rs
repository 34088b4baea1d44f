//! Execution Environments
//!
//! An environment accepts test source and a repetition count and reports the
//! exit code, combined output, and coverage totals of running it. The local
//! environment runs the configured test command under `coverage` in a
//! subprocess with a hard timeout.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;

use assertflip_core::CoverageTotals;

use crate::error::{ExecutionError, ExecutionResult};

/// Raw result of one environment invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub output: Vec<u8>,
    pub coverage: Option<CoverageTotals>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `run` can repeat the test itself in a single invocation.
    fn supports_inline_repeat(&self) -> bool {
        false
    }

    /// Run `test_source` once, repeating it `repetitions` times inside the
    /// invocation when inline repetition is supported.
    async fn run(&self, test_source: &str, repetitions: u32) -> ExecutionResult<RunOutput>;
}

// ============================================================================
// Local subprocess environment
// ============================================================================

#[derive(Debug, Clone)]
pub struct LocalEnvironmentConfig {
    /// Python interpreter
    pub python: String,
    /// Test command: a module such as `pytest`, or a script path ending in `.py`
    pub test_cmd: String,
    /// Extra arguments, passed only to pytest
    pub pytest_args: Vec<String>,
    /// Where throwaway candidate files are written
    pub tests_dir: PathBuf,
    /// Working directory of every command; coverage data lands here
    pub working_dir: PathBuf,
    /// Hard timeout for the test command
    pub timeout: Duration,
    /// Pass the candidate's module name instead of its path (Django runner)
    pub pass_module_name: bool,
    /// Run under `coverage` and require a coverage artifact
    pub coverage: bool,
    pub env: HashMap<String, String>,
}

impl Default for LocalEnvironmentConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            test_cmd: "pytest".to_string(),
            pytest_args: Vec::new(),
            tests_dir: PathBuf::from("tests"),
            working_dir: PathBuf::from("."),
            timeout: Duration::from_secs(120),
            pass_module_name: false,
            coverage: true,
            env: HashMap::new(),
        }
    }
}

/// Removes `.coverage*` data files from a directory when dropped.
struct CoverageArtifacts {
    dir: PathBuf,
}

impl CoverageArtifacts {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && is_coverage_data(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn present(&self) -> bool {
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return false;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && is_coverage_data(&entry.path()) {
                return true;
            }
        }
        false
    }
}

fn is_coverage_data(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(".coverage"))
}

impl Drop for CoverageArtifacts {
    fn drop(&mut self) {
        for path in self.files() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!("[runner] failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

pub struct LocalEnvironment {
    config: LocalEnvironmentConfig,
}

impl LocalEnvironment {
    pub fn new(config: LocalEnvironmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocalEnvironmentConfig {
        &self.config
    }

    fn cmd_parts(&self) -> Vec<String> {
        self.config
            .test_cmd
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// `pytest` is run as a module; `*.py` commands are scripts.
    fn is_module(&self) -> bool {
        self.cmd_parts()
            .first()
            .is_some_and(|first| !first.ends_with(".py"))
    }

    fn uses_pytest(&self) -> bool {
        self.config.test_cmd.contains("pytest")
    }

    /// Argument naming the candidate for the test runner.
    fn target_for(&self, candidate: &Path) -> String {
        if self.config.pass_module_name {
            candidate
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            candidate.to_string_lossy().into_owned()
        }
    }

    /// Full argv of the test command for `target`.
    pub fn test_command(&self, target: &str, repetitions: u32) -> Vec<String> {
        let mut argv = vec![self.config.python.clone()];
        if self.config.coverage {
            argv.extend(["-m", "coverage", "run"].map(String::from));
        }
        if self.is_module() {
            argv.push("-m".to_string());
        }
        argv.extend(self.cmd_parts());
        if self.uses_pytest() {
            if repetitions > 1 {
                argv.push(format!("--count={}", repetitions));
            }
            argv.extend(self.config.pytest_args.iter().cloned());
        }
        argv.push(target.to_string());
        argv
    }

    fn coverage_command(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.config.python.clone(), "-m".into(), "coverage".into()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    /// Script runners import sibling modules from their own directory.
    fn script_env(&self) -> Vec<(String, String)> {
        if self.uses_pytest() {
            return Vec::new();
        }
        let script_dir = self
            .cmd_parts()
            .first()
            .and_then(|first| Path::new(first).parent().map(Path::to_path_buf))
            .unwrap_or_default();
        vec![(
            "PYTHONPATH".to_string(),
            self.config
                .working_dir
                .join(script_dir)
                .to_string_lossy()
                .into_owned(),
        )]
    }

    async fn exec(
        &self,
        argv: &[String],
        extra_env: &[(String, String)],
    ) -> ExecutionResult<std::process::Output> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecutionError::Spawn("empty command line".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        tracing::debug!("[runner] exec {}", argv.join(" "));
        match timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecutionError::Spawn(format!("{}: {}", program, e))),
            Err(_) => Err(ExecutionError::Timeout {
                secs: self.config.timeout.as_secs(),
            }),
        }
    }

    async fn collect_coverage(&self) -> ExecutionResult<CoverageTotals> {
        let combine = self.exec(&self.coverage_command(&["combine"]), &[]).await?;
        if !combine.status.success() {
            tracing::debug!(
                "[runner] coverage combine exited {:?}",
                combine.status.code()
            );
        }

        let report = tempfile::Builder::new()
            .prefix("assertflip_cov_")
            .suffix(".json")
            .tempfile()?;
        let report_path = report.path().to_string_lossy().into_owned();
        let json = self
            .exec(&self.coverage_command(&["json", "-o", &report_path]), &[])
            .await?;
        if !json.status.success() {
            return Err(ExecutionError::Coverage(
                String::from_utf8_lossy(&json.stderr).into_owned(),
            ));
        }

        let raw = tokio::fs::read_to_string(report.path()).await?;
        parse_coverage_totals(&raw)
    }
}

/// Write the candidate into `dir`; the file is deleted when the handle drops.
async fn write_candidate(dir: PathBuf, source: String) -> ExecutionResult<NamedTempFile> {
    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut candidate = tempfile::Builder::new()
            .prefix("test_candidate_")
            .suffix(".py")
            .tempfile_in(&dir)?;
        candidate.write_all(source.as_bytes())?;
        candidate.flush()?;
        Ok(candidate)
    })
    .await
    .map_err(std::io::Error::other)?
    .map_err(Into::into)
}

fn combined_output(output: &std::process::Output) -> Vec<u8> {
    let mut combined = output.stdout.clone();
    combined.extend_from_slice(&output.stderr);
    combined
}

/// Extract the `totals` object of a `coverage json` report.
pub fn parse_coverage_totals(raw: &str) -> ExecutionResult<CoverageTotals> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ExecutionError::Coverage(e.to_string()))?;
    let totals = value
        .get("totals")
        .cloned()
        .ok_or_else(|| ExecutionError::Coverage("report has no totals".to_string()))?;
    serde_json::from_value(totals).map_err(|e| ExecutionError::Coverage(e.to_string()))
}

#[async_trait]
impl ExecutionEnvironment for LocalEnvironment {
    fn name(&self) -> &str {
        "local"
    }

    fn supports_inline_repeat(&self) -> bool {
        self.uses_pytest()
    }

    async fn run(&self, test_source: &str, repetitions: u32) -> ExecutionResult<RunOutput> {
        tokio::fs::create_dir_all(&self.config.tests_dir).await?;
        let candidate =
            write_candidate(self.config.tests_dir.clone(), test_source.to_string()).await?;

        let target = self.target_for(candidate.path());
        let argv = self.test_command(&target, repetitions);
        let env = self.script_env();

        if !self.config.coverage {
            let out = self.exec(&argv, &env).await?;
            return Ok(RunOutput {
                exit_code: out.status.code(),
                output: combined_output(&out),
                coverage: None,
            });
        }

        let artifacts = CoverageArtifacts::new(&self.config.working_dir);
        let erase = self.exec(&self.coverage_command(&["erase"]), &[]).await?;
        if !erase.status.success() {
            return Err(ExecutionError::Coverage(format!(
                "coverage erase failed: {}",
                String::from_utf8_lossy(&erase.stderr)
            )));
        }

        let out = self.exec(&argv, &env).await?;
        let output = combined_output(&out);
        if !artifacts.present().await {
            return Err(ExecutionError::MissingCoverage { output });
        }
        let coverage = self.collect_coverage().await?;

        Ok(RunOutput {
            exit_code: out.status.code(),
            output,
            coverage: Some(coverage),
        })
    }
}
