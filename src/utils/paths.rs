//! Path Utilities
//!
//! Resolution of configured paths and of the files a run writes.

use std::path::{Path, PathBuf};

use crate::utils::error::AppResult;

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Instance ids become file-name components and must stay one component.
pub fn is_plain_file_component(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

/// `<tests_dir>/test_<prefix>_<instance_id>.py`
pub fn test_file_path(tests_dir: &Path, prefix: &str, instance_id: &str) -> PathBuf {
    tests_dir.join(format!("test_{}_{}.py", prefix, instance_id))
}

/// `<results_dir>/attempts_<instance_id>.json`
pub fn ledger_path(results_dir: &Path, instance_id: &str) -> PathBuf {
    results_dir.join(format!("attempts_{}.json", instance_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        assert_eq!(
            test_file_path(Path::new("tests"), "assertflip", "django__django-1"),
            PathBuf::from("tests/test_assertflip_django__django-1.py")
        );
        assert_eq!(
            ledger_path(Path::new("results"), "django__django-1"),
            PathBuf::from("results/attempts_django__django-1.json")
        );
    }

    #[test]
    fn test_plain_file_component() {
        assert!(is_plain_file_component("astropy__astropy-12907"));
        assert!(!is_plain_file_component("../escape"));
        assert!(!is_plain_file_component("a\\b"));
        assert!(!is_plain_file_component(".."));
        assert!(!is_plain_file_component(""));
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
        assert_eq!(expand_home(Path::new("rel/x")), PathBuf::from("rel/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/data")), home.join("data"));
        }
    }
}
