//! Output Store
//!
//! Persists accepted tests and attempt ledgers. A test file is created
//! exclusively: an existing file, or a `disabled_` twin of it, blocks the
//! write.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use assertflip_core::LedgerDocument;

use crate::models::config::SynthesisConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_dir, is_plain_file_component, ledger_path, test_file_path};

#[derive(Debug, Clone)]
pub struct OutputStore {
    tests_dir: PathBuf,
    results_dir: PathBuf,
    prefix: String,
}

impl OutputStore {
    pub fn new(
        tests_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            tests_dir: tests_dir.into(),
            results_dir: results_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(
            config.output_tests_dir(),
            config.results_dir(),
            config.output.prefix.clone(),
        )
    }

    pub fn test_path(&self, instance_id: &str) -> PathBuf {
        test_file_path(&self.tests_dir, &self.prefix, instance_id)
    }

    pub fn ledger_path(&self, instance_id: &str) -> PathBuf {
        ledger_path(&self.results_dir, instance_id)
    }

    fn disabled_twin(path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?.to_string_lossy();
        Some(path.with_file_name(format!("disabled_{}", name)))
    }

    /// Write an accepted test, refusing to replace anything already there.
    pub fn save_test(&self, instance_id: &str, test_code: &str) -> AppResult<PathBuf> {
        if !is_plain_file_component(instance_id) {
            return Err(AppError::validation(format!(
                "instance id {:?} is not a plain file name",
                instance_id
            )));
        }
        let path = self.test_path(instance_id);
        if Self::disabled_twin(&path).is_some_and(|p| p.exists()) {
            return Err(AppError::already_exists(format!(
                "{} is disabled",
                path.display()
            )));
        }
        ensure_dir(&self.tests_dir)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AppError::already_exists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        write_or_remove(&mut file, &path, test_code.as_bytes())?;
        tracing::info!("[output] saved test {}", path.display());
        Ok(path)
    }

    pub fn save_ledger(&self, document: &LedgerDocument) -> AppResult<PathBuf> {
        let path = self.ledger_path(&document.instance_id);
        document.write_json(&path)?;
        tracing::info!("[output] saved attempts to {}", path.display());
        Ok(path)
    }

    /// An instance counts as done once its ledger exists and is non-empty.
    pub fn has_ledger(&self, instance_id: &str) -> bool {
        std::fs::metadata(self.ledger_path(instance_id))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

/// Write `bytes`, removing the freshly created `path` if the write fails so a
/// later save is not blocked by a partial file.
fn write_or_remove<W: Write>(writer: &mut W, path: &Path, bytes: &[u8]) -> AppResult<()> {
    let written = writer.write_all(bytes).and_then(|_| writer.flush());
    if let Err(e) = written {
        if let Err(remove) = std::fs::remove_file(path) {
            tracing::warn!("[output] could not remove partial {}: {}", path.display(), remove);
        }
        return Err(e.into());
    }
    Ok(())
}
