use std::path::Path;

use anyhow::Context;
use tellr_core::chunker::{Chunker, SourceDocument};
use tellr_core::domain::Passage;

use crate::commands::CommandResult;

/// Ingestion preview: the passages a document would contribute to the knowledge index.
pub fn run(path: &Path, category: Option<String>, source_id: Option<String>) -> CommandResult {
    match chunk_file(path, category, source_id) {
        Ok(passages) => match serde_json::to_string_pretty(&passages) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("chunk", "serialization", error.to_string(), 3),
        },
        Err(error) => CommandResult::failure("chunk", "document_read", format!("{error:#}"), 2),
    }
}

fn chunk_file(
    path: &Path,
    category: Option<String>,
    source_id: Option<String>,
) -> anyhow::Result<Vec<Passage>> {
    let mut document = SourceDocument::from_file(path, category)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    if let Some(source_id) = source_id {
        document.source_id = source_id;
    }
    Ok(Chunker::default().chunk(&document))
}
