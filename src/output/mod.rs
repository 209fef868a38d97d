// Output generation module
//
// The document tree and search index are the only things written to disk;
// rendering them is left to downstream consumers.

pub mod diagrams;
pub mod document;
pub mod search;

pub use diagrams::DiagramGenerator;
pub use document::{emit, emit_with, Document, FileDiagrams, FileNode, Overview, SymbolNode};
pub use search::{index, FileType, SearchIndex, SearchQuery, SearchRecord};

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DOCUMENT_FILE: &str = "document.json";
pub const SEARCH_INDEX_FILE: &str = "search_index.json";

/// Report of what was written
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub document_path: PathBuf,
    pub index_path: PathBuf,
    pub files_documented: usize,
    pub records_indexed: usize,
    pub diagnostics: usize,
}

impl GenerationReport {
    pub fn summary(&self) -> String {
        format!(
            "Documented {} files, indexed {} records, {} diagnostics",
            self.files_documented, self.records_indexed, self.diagnostics
        )
    }
}

/// Write the document and search index into `dir`, creating it if needed
pub fn write(document: &Document, index: &SearchIndex, dir: &Path, pretty: bool) -> Result<GenerationReport> {
    std::fs::create_dir_all(dir)?;

    let document_path = dir.join(DOCUMENT_FILE);
    std::fs::write(&document_path, document.to_json(pretty)?)?;

    let index_path = dir.join(SEARCH_INDEX_FILE);
    std::fs::write(&index_path, index.to_json(pretty)?)?;

    info!(dir = %dir.display(), files = document.files.len(), "output written");
    Ok(GenerationReport {
        document_path,
        index_path,
        files_documented: document.files.len(),
        records_indexed: index.len(),
        diagnostics: document.report.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_report_summary() {
        let report = GenerationReport {
            files_documented: 3,
            records_indexed: 3,
            diagnostics: 1,
            ..Default::default()
        };
        assert_eq!(report.summary(), "Documented 3 files, indexed 3 records, 1 diagnostics");
    }
}
