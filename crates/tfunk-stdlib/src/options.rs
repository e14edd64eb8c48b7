//! Run options shared by the context builder and the Terragrunt functions

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the configuration file looked up by default
pub const DEFAULT_CONFIG_NAME: &str = "terragrunt.hcl";

/// Error building run options
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("could not resolve working directory {path}: {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("working directory {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Settings for one evaluation, scoped to a working directory
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Absolute working directory; relative paths resolve against it
    pub working_dir: PathBuf,
    /// The configuration file currently being evaluated
    pub config_path: PathBuf,
    /// The configuration file the run started from
    pub original_config_path: PathBuf,
    /// Captured process environment
    pub env: HashMap<String, String>,
    /// Configuration files being read, outermost first
    pub(crate) reading: Vec<PathBuf>,
}

impl RunOptions {
    /// Create options for `working_dir`, which must be an existing directory
    pub fn new(working_dir: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let requested = working_dir.as_ref();
        let working_dir = requested
            .canonicalize()
            .map_err(|source| OptionsError::WorkingDir {
                path: requested.to_path_buf(),
                source,
            })?;
        if !working_dir.is_dir() {
            return Err(OptionsError::NotADirectory(working_dir));
        }

        let config_path = working_dir.join(DEFAULT_CONFIG_NAME);
        tracing::debug!(working_dir = %working_dir.display(), "created run options");
        Ok(Self {
            original_config_path: config_path.clone(),
            config_path,
            working_dir,
            env: HashMap::new(),
            reading: Vec::new(),
        })
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Directory containing the configuration file being evaluated
    pub fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or(&self.working_dir)
    }

    /// Resolve `path` against the working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Options for evaluating the nested configuration file at `config_path`
    pub fn for_config(&self, config_path: &Path) -> RunOptions {
        let working_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.working_dir.clone());
        let mut reading = self.reading.clone();
        reading.push(config_path.to_path_buf());
        RunOptions {
            working_dir,
            config_path: config_path.to_path_buf(),
            original_config_path: self.original_config_path.clone(),
            env: self.env.clone(),
            reading,
        }
    }

    /// Whether `config_path` is already being read further up the call chain
    pub fn is_reading(&self, config_path: &Path) -> bool {
        self.reading.iter().any(|p| p == config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_resolves_directory() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunOptions::new(dir.path()).unwrap();
        assert!(opts.working_dir.is_absolute());
        assert_eq!(opts.config_path, opts.working_dir.join("terragrunt.hcl"));
        assert_eq!(opts.config_dir(), opts.working_dir.as_path());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunOptions::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, OptionsError::WorkingDir { .. }));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            RunOptions::new(&file),
            Err(OptionsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_nested_options_track_reading() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunOptions::new(dir.path()).unwrap();
        let child_path = opts.working_dir.join("child/terragrunt.hcl");
        let child = opts.for_config(&child_path);
        assert_eq!(child.working_dir, opts.working_dir.join("child"));
        assert!(child.is_reading(&child_path));
        assert!(!opts.is_reading(&child_path));
        assert_eq!(child.original_config_path, opts.original_config_path);
    }
}
