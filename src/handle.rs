use flate2::read::GzDecoder;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{ExportError, Result};

/// A downloaded export artifact: a gzip-compressed CSV with a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportHandle {
    path: PathBuf,
    dataset: Option<String>,
}

impl ExportHandle {
    /// Handle for an artifact fetched from `dataset`.
    pub fn new(dataset: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dataset: Some(dataset.into()),
        }
    }

    /// Handle for an artifact already on disk whose dataset is unknown.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dataset: None,
        }
    }

    /// The file a reader should load.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    /// Opens the artifact as decompressed CSV text.
    pub fn open(&self) -> Result<BufReader<GzDecoder<File>>> {
        let file = File::open(&self.path).map_err(|e| ExportError::io(&self.path, e))?;
        Ok(BufReader::new(GzDecoder::new(file)))
    }

    /// Column names from the header row.
    pub fn columns(&self) -> Result<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(self.open()?);
        let headers = reader
            .headers()
            .map_err(|e| ExportError::io(&self.path, e.into()))?;
        Ok(headers.iter().map(|c| c.trim().to_string()).collect())
    }
}

impl fmt::Display for ExportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "export of {} at {}",
            self.dataset.as_deref().unwrap_or("<unknown dataset>"),
            self.path.display()
        )
    }
}
