use std::path::PathBuf;

use crate::util::guess_filename_from_url;

const FALLBACK_NAME: &str = "export.csv.gz";

/// Picks a destination when the caller did not name one.
pub trait DestinationResolver: Send + Sync {
    fn resolve(&self, dataset: &str, export_url: &str) -> PathBuf;
}

/// File name for an export: the last URL segment, else `<dataset>.csv.gz`.
pub(crate) fn file_name_for(dataset: &str, export_url: &str) -> String {
    guess_filename_from_url(export_url).unwrap_or_else(|| {
        if dataset.is_empty() {
            FALLBACK_NAME.to_string()
        } else {
            format!("{}.csv.gz", dataset)
        }
    })
}

/// Stores exports under `~/.exportapi/exports`, or the working directory when
/// no home directory is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomeDirResolver;

impl DestinationResolver for HomeDirResolver {
    fn resolve(&self, dataset: &str, export_url: &str) -> PathBuf {
        let name = file_name_for(dataset, export_url);
        match dirs::home_dir() {
            Some(home) => home.join(".exportapi").join("exports").join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Stores exports in a fixed directory.
#[derive(Debug, Clone)]
pub struct DirResolver(pub PathBuf);

impl DestinationResolver for DirResolver {
    fn resolve(&self, dataset: &str, export_url: &str) -> PathBuf {
        self.0.join(file_name_for(dataset, export_url))
    }
}
