//! Recursive document discovery.

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::DocumentRef;

/// Find every file under `root` whose extension matches one of
/// `extensions` (case-insensitive), sorted by path.
///
/// A missing or empty root yields an empty list; callers validate the
/// root beforehand when that should be an error.
pub fn discover(root: &Path, extensions: &[String]) -> Vec<DocumentRef> {
    let mut documents: Vec<DocumentRef> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), extensions))
        .map(|entry| DocumentRef::from(entry.into_path()))
        .collect();

    documents.sort();
    info!("Found {} documents under {}", documents.len(), root.display());
    documents
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|accepted| accepted.eq_ignore_ascii_case(ext))
}
