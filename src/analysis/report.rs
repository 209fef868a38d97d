// Run-level report of recoverable failures

use crate::error::ErrorClass;
use crate::parser::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recoverable failure recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunDiagnostic {
    pub class: ErrorClass,
    /// File the failure belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Unit, symbol or edge id the failure is keyed by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
}

/// Append-only collection of recoverable failures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub diagnostics: Vec<RunDiagnostic>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: RunDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Record a parse or read failure for one file
    pub fn per_file(&mut self, diag: &Diagnostic) {
        self.push(RunDiagnostic {
            class: ErrorClass::RecoverablePerFile,
            path: Some(diag.path.clone()),
            line: (diag.line > 0).then_some(diag.line),
            key: None,
            message: diag.message.clone(),
        });
    }

    /// Record an enrichment fallback for one unit
    pub fn enrichment(&mut self, unit: impl Into<String>, reason: impl Into<String>) {
        self.push(RunDiagnostic {
            class: ErrorClass::RecoverableEnrichment,
            path: None,
            line: None,
            key: Some(unit.into()),
            message: reason.into(),
        });
    }

    /// Record an annotation whose key is not in the graph
    pub fn annotation(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.push(RunDiagnostic {
            class: ErrorClass::RecoverableAnnotation,
            path: None,
            line: None,
            key: Some(key.into()),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: RunReport) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of diagnostics of one class
    pub fn count(&self, class: ErrorClass) -> usize {
        self.diagnostics.iter().filter(|d| d.class == class).count()
    }

    /// Diagnostics recorded for one file
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a RunDiagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| d.path.as_deref() == Some(path))
    }

    /// Diagnostics grouped by file, for callers that visit every file
    pub fn by_path(&self) -> BTreeMap<&str, Vec<&RunDiagnostic>> {
        let mut groups: BTreeMap<&str, Vec<&RunDiagnostic>> = BTreeMap::new();
        for diag in &self.diagnostics {
            if let Some(path) = diag.path.as_deref() {
                groups.entry(path).or_default().push(diag);
            }
        }
        groups
    }

    /// Sort and drop exact duplicates so the report is order-independent
    pub fn normalize(&mut self) {
        self.diagnostics.sort();
        self.diagnostics.dedup();
    }
}
