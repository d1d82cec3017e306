use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DriverError;

/// Output name used when the caller does not pick one.
pub const DEFAULT_OUTPUT: &str = "a.out";

/// A validated build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub source_path: PathBuf,
    /// Full file contents with surrounding whitespace removed; passed to the
    /// front end as-is.
    pub source_text: String,
    pub output: Option<PathBuf>,
}

impl BuildRequest {
    pub fn from_file(
        source_path: impl Into<PathBuf>,
        output: Option<PathBuf>,
    ) -> Result<Self, DriverError> {
        let source_path = source_path.into();
        let contents = fs::read_to_string(&source_path).map_err(|source| {
            DriverError::InputRead {
                path: source_path.clone(),
                source,
            }
        })?;
        Ok(Self {
            source_text: contents.trim().to_string(),
            source_path,
            output,
        })
    }

    pub fn output_path(&self) -> &Path {
        self.output
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_OUTPUT))
    }
}
