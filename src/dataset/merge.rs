//! Corpus merging

use std::fs;
use std::path::Path;

use crate::dataset::{CorpusEntry, CorpusItem, DatasetError};

/// Flattens every `*.json` corpus in `folder` into `output`, one item per
/// conversation entry, keeping only `system`, `input` and `output`.
///
/// `output` is skipped if it lives in `folder`. Files that do not parse as a
/// corpus are logged and skipped. Returns the number of items written.
pub fn merge_corpus(folder: &Path, output: &Path) -> Result<usize, DatasetError> {
    let pattern = format!("{}/*.json", glob::Pattern::escape(&folder.to_string_lossy()));
    let output_canonical = fs::canonicalize(output).ok();
    let is_output =
        |path: &Path| path == output || (output_canonical.is_some() && fs::canonicalize(path).ok() == output_canonical);

    let mut paths: Vec<_> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|path| !is_output(path.as_path()))
        .collect();
    paths.sort();

    let mut merged = Vec::new();
    for path in &paths {
        let items: Vec<CorpusItem> = match fs::read_to_string(path)
            .map_err(DatasetError::from)
            .and_then(|json| serde_json::from_str(&json).map_err(DatasetError::from))
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let before = merged.len();
        merged.extend(
            items
                .into_iter()
                .flat_map(|item| item.conversation)
                .map(|entry| CorpusItem {
                    conversation: vec![CorpusEntry {
                        src_input: None,
                        style_name: None,
                        ..entry
                    }],
                }),
        );
        tracing::debug!("Merged {} entries from {}", merged.len() - before, path.display());
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, serde_json::to_string_pretty(&merged)?)?;
    tracing::info!(
        "Merged {} entries from {} file(s) into {}",
        merged.len(),
        paths.len(),
        output.display()
    );
    Ok(merged.len())
}
