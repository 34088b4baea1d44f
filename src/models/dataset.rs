//! Dataset
//!
//! Instances to synthesize tests for. A dataset file holds one JSON instance
//! object or an array of them.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use assertflip_core::{BugContext, Continuation, LocalizedFile};
use assertflip_llm::estimate_tokens;

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::is_plain_file_component;

/// Lines dropped per trimming step
const TRIM_STEP: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInstance {
    pub instance_id: String,
    pub problem_statement: String,
    pub localized_code: String,
    #[serde(default)]
    pub line_level_localization: Vec<LocalizedFile>,
    /// Seed continuation from an earlier run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<Continuation>,
}

impl DatasetInstance {
    /// Build the working context, trimming the code excerpt to `max_tokens`.
    pub fn into_context(self, max_tokens: usize) -> BugContext {
        let code = trim_localized_code(&self.localized_code, max_tokens);
        if code.len() != self.localized_code.len() {
            tracing::info!(
                "[dataset] {} localized code trimmed to {} lines",
                self.instance_id,
                code.lines().count()
            );
        }
        let ctx = BugContext::new(self.instance_id, self.problem_statement, code)
            .with_localization(self.line_level_localization);
        match self.continue_from {
            Some(continuation) => ctx.with_continuation(continuation),
            None => ctx,
        }
    }
}

/// Drop lines from the end, ten at a time, until the estimate fits.
pub fn trim_localized_code(code: &str, max_tokens: usize) -> String {
    let mut lines: Vec<&str> = code.split('\n').collect();
    let mut text = code.to_string();
    while estimate_tokens(&text) > max_tokens && !lines.is_empty() {
        let keep = lines.len().saturating_sub(TRIM_STEP);
        lines.truncate(keep);
        text = lines.join("\n");
    }
    text
}

/// Parse dataset JSON: a single instance or an array of instances.
pub fn parse_dataset(raw: &str) -> AppResult<Vec<DatasetInstance>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let instances: Vec<DatasetInstance> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(value)?],
        _ => {
            return Err(AppError::dataset(
                "expected an instance object or an array of instances",
            ))
        }
    };

    let mut seen = HashSet::new();
    for instance in &instances {
        if instance.instance_id.trim().is_empty() {
            return Err(AppError::dataset("instance_id must not be empty"));
        }
        if !is_plain_file_component(&instance.instance_id) {
            return Err(AppError::dataset(format!(
                "instance_id {:?} must not contain path separators",
                instance.instance_id
            )));
        }
        if !seen.insert(instance.instance_id.as_str()) {
            return Err(AppError::dataset(format!(
                "duplicate instance_id {}",
                instance.instance_id
            )));
        }
    }
    Ok(instances)
}

pub fn load_dataset(path: &Path) -> AppResult<Vec<DatasetInstance>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::dataset(format!("cannot read {}: {}", path.display(), e)))?;
    parse_dataset(&raw)
}
