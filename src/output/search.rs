// Flat search index consumed by client-side filtering

use crate::error::Result;
use crate::output::document::{Document, FileNode};
use crate::parser::{file_extension, SymbolKind};
use serde::{Deserialize, Serialize};

const DESCRIPTION_CHARS: usize = 200;

/// Coarse file role used as an exact-match filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Header,
    Test,
    Source,
}

impl FileType {
    /// Classify by path conventions shared across the supported languages
    pub fn of(path: &str) -> Self {
        let ext = file_extension(path);
        if matches!(ext.as_str(), "h" | "hh" | "hpp" | "hxx") {
            return FileType::Header;
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        let stem = name.split('.').next().unwrap_or(name);
        let in_test_dir = path
            .split('/')
            .rev()
            .skip(1)
            .any(|dir| matches!(dir, "test" | "tests" | "__tests__" | "spec"));
        let test_name = stem.starts_with("test_")
            || stem.ends_with("_test")
            || stem.ends_with("_tests")
            || stem.ends_with("Test")
            || name.contains(".test.")
            || name.contains(".spec.");
        if in_test_dir || test_name {
            FileType::Test
        } else {
            FileType::Source
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Header => "header",
            FileType::Test => "test",
            FileType::Source => "source",
        }
    }
}

/// One searchable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub path: String,
    pub title: String,
    pub description: String,
    pub symbols: Vec<String>,
    pub language: String,
    pub file_type: FileType,
    /// Lowercase maximum security severity, empty when the file has none
    pub security_level: String,
}

impl SearchRecord {
    fn from_file(file: &FileNode) -> Self {
        let title = file.path.rsplit('/').next().unwrap_or(&file.path).to_string();
        let description = file
            .enrichment
            .as_ref()
            .map(|e| summary_line(e.text()))
            .unwrap_or_default();
        let symbols = file
            .symbols
            .iter()
            .filter(|s| s.symbol.kind != SymbolKind::Module)
            .map(|s| s.symbol.qualified_name.clone())
            .collect();
        Self {
            path: file.path.clone(),
            title,
            description,
            symbols,
            language: file.language.as_str().to_string(),
            file_type: FileType::of(&file.path),
            security_level: file
                .security_level
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.symbols.iter().any(|s| s.to_lowercase().contains(needle))
    }
}

/// Filters applied the way the generated site does it
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring over title, description and symbols
    pub text: Option<String>,
    pub language: Option<String>,
    pub file_type: Option<FileType>,
    pub security_level: Option<String>,
}

/// Records sorted by path; serialized as a bare JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchIndex {
    pub records: Vec<SearchRecord>,
}

impl SearchIndex {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&SearchRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<&SearchRecord> {
        let needle = query.text.as_ref().map(|t| t.to_lowercase());
        self.records
            .iter()
            .filter(|r| query.language.as_ref().map_or(true, |l| &r.language == l))
            .filter(|r| query.file_type.map_or(true, |t| r.file_type == t))
            .filter(|r| query.security_level.as_ref().map_or(true, |s| &r.security_level == s))
            .filter(|r| needle.as_ref().map_or(true, |n| r.matches_text(n)))
            .collect()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

/// Build the index from a document; one record per file node
pub fn index(document: &Document) -> SearchIndex {
    SearchIndex {
        records: document.files.iter().map(SearchRecord::from_file).collect(),
    }
}

/// First non-empty line of the text, cut at a character boundary
fn summary_line(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= DESCRIPTION_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(DESCRIPTION_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, language: &str, level: &str, symbols: &[&str]) -> SearchRecord {
        SearchRecord {
            path: path.to_string(),
            title: path.rsplit('/').next().unwrap().to_string(),
            description: format!("About {}", path),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            language: language.to_string(),
            file_type: FileType::of(path),
            security_level: level.to_string(),
        }
    }

    fn sample() -> SearchIndex {
        SearchIndex {
            records: vec![
                record("src/auth.py", "python", "high", &["login", "Session.close"]),
                record("src/util.h", "c", "", &["swap"]),
                record("tests/test_auth.py", "python", "", &["test_login"]),
            ],
        }
    }

    #[test]
    fn test_file_type() {
        assert_eq!(FileType::of("include/vec.hpp"), FileType::Header);
        assert_eq!(FileType::of("tests/helpers.py"), FileType::Test);
        assert_eq!(FileType::of("pkg/server_test.go"), FileType::Test);
        assert_eq!(FileType::of("web/app.spec.ts"), FileType::Test);
        assert_eq!(FileType::of("src/main/java/FooTest.java"), FileType::Test);
        assert_eq!(FileType::of("src/testing.rs"), FileType::Source);
        assert_eq!(FileType::of("src/lib.rs"), FileType::Source);
    }

    #[test]
    fn test_exact_filters() {
        let index = sample();
        let python: Vec<_> = index
            .search(&SearchQuery {
                language: Some("python".to_string()),
                ..Default::default()
            })
            .iter()
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(python, vec!["src/auth.py", "tests/test_auth.py"]);

        let high = index.search(&SearchQuery {
            security_level: Some("high".to_string()),
            ..Default::default()
        });
        assert_eq!(high.len(), 1);

        let headers = index.search(&SearchQuery {
            file_type: Some(FileType::Header),
            ..Default::default()
        });
        assert_eq!(headers[0].path, "src/util.h");
    }

    #[test]
    fn test_substring_over_symbols() {
        let index = sample();
        let hits = index.search(&SearchQuery {
            text: Some("session".to_string()),
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/auth.py");
    }

    #[test]
    fn test_serializes_as_array() {
        let json = sample().to_json(false).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"security_level\":\"\""));
        assert!(json.contains("\"file_type\":\"header\""));
        let back: SearchIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line("\n  First line.\nSecond"), "First line.");
        let long = "x".repeat(300);
        assert_eq!(summary_line(&long).chars().count(), DESCRIPTION_CHARS + 3);
    }
}
