// Symbol extraction: drive adapters over files and fold their output
//
// Parsing runs on a rayon pool with one task per file. The fold that follows
// is single-threaded and walks outputs in (timestamp, path) order, so a later
// parse of the same file replaces an earlier one no matter which task
// finished first.

use crate::analysis::report::RunReport;
use crate::error::{Error, Result};
use crate::parser::{
    AdapterRegistry, Diagnostic, FlowHint, Language, ParseBudget, ParseOutput, ParseStatus,
    Reference, SourceUnit, Symbol, SymbolId, SymbolKind,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const PARSE_STACK_BYTES: usize = 8 * 1024 * 1024;

/// Provenance of one parsed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: Language,
    pub status: ParseStatus,
    pub line_count: usize,
    pub timestamp: u64,
    /// The file's `Module` symbol, when the parse got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<SymbolId>,
    /// Symbols declared in this file, in declaration order
    pub symbols: Vec<SymbolId>,
    /// Raw text, kept for line-level analyzers and not serialized
    #[serde(skip)]
    pub text: String,
}

impl FileRecord {
    /// Source lines `start..=end` (1-based), clamped to the file
    pub fn lines(&self, start: usize, end: usize) -> Vec<&str> {
        let start = start.max(1);
        self.text
            .lines()
            .skip(start - 1)
            .take(end.saturating_sub(start) + 1)
            .collect()
    }
}

/// Every symbol, reference and flow hint of the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    pub symbols: BTreeMap<SymbolId, Symbol>,
    pub files: BTreeMap<String, FileRecord>,
    /// References sorted by source, kind and location
    pub references: Vec<Reference>,
    pub flows: BTreeMap<SymbolId, Vec<FlowHint>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Symbols declared in one file, in declaration order
    pub fn symbols_in<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.files
            .get(path)
            .map(|f| f.symbols.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.symbols.get(id))
    }

    /// Symbols with a given simple name, sorted by id
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.symbols.values().filter(move |s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Fold one adapter output into the table.
    ///
    /// A repeated path replaces the earlier file record, references and flows.
    /// Symbols are keyed by id, so a re-parse overwrites the ones it produced
    /// again and keeps the ones it did not.
    fn absorb(&mut self, unit: &SourceUnit, output: ParseOutput) {
        if self.files.contains_key(&unit.path) {
            debug!(path = %unit.path, "replacing earlier parse");
            self.references.retain(|r| r.location.path != unit.path);
        }

        let module = output
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Module)
            .map(|s| s.id.clone());
        let mut order: Vec<SymbolId> = self
            .files
            .remove(&unit.path)
            .map(|f| f.symbols)
            .unwrap_or_default();

        for symbol in output.symbols {
            if !order.contains(&symbol.id) {
                order.push(symbol.id.clone());
            }
            self.symbols.insert(symbol.id.clone(), symbol);
        }
        self.references.extend(output.references);
        for (id, hints) in output.flows {
            self.flows.insert(id, hints);
        }

        self.files.insert(
            unit.path.clone(),
            FileRecord {
                path: unit.path.clone(),
                language: unit.language,
                status: output.status,
                line_count: output.line_count,
                timestamp: unit.timestamp,
                module,
                symbols: order,
                text: unit.text.clone(),
            },
        );
    }

    fn finish(&mut self) {
        self.references.sort();
        self.references.dedup();
    }
}

/// Parse every unit and fold the results into one table.
///
/// Per-file failures never abort: they become `PartialError`/`Fatal` file
/// statuses and `RecoverablePerFile` entries in the returned report.
pub fn extract(
    units: &[SourceUnit],
    registry: &AdapterRegistry,
    budget: ParseBudget,
    threads: usize,
) -> Result<(SymbolTable, RunReport)> {
    if registry.is_empty() {
        return Err(Error::NoAdapters("any language".to_string()));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().stack_size(PARSE_STACK_BYTES);
    if threads > 0 {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|e| Error::Runtime(format!("failed to start parser pool: {}", e)))?;

    let outputs: Vec<ParseOutput> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| match registry.adapter_for(unit) {
                Some(adapter) => adapter.parse(unit, &budget),
                None => ParseOutput::fatal(unit, format!("no adapter for {}", unit.language)),
            })
            .collect()
    });

    let mut ordered: Vec<(&SourceUnit, ParseOutput)> = units.iter().zip(outputs).collect();
    ordered.sort_by(|(a, _), (b, _)| (a.timestamp, &a.path).cmp(&(b.timestamp, &b.path)));

    let mut table = SymbolTable::new();
    for (unit, output) in ordered {
        table.absorb(unit, output);
    }
    table.finish();

    let mut report = RunReport::new();
    for file in table.files.values() {
        let diagnostics: Vec<Diagnostic> = file.status.diagnostics();
        if !diagnostics.is_empty() {
            warn!(path = %file.path, status = file.status.label(), count = diagnostics.len(), "parse problems");
        }
        for diag in &diagnostics {
            report.per_file(diag);
        }
    }

    debug!(
        files = table.files.len(),
        symbols = table.symbols.len(),
        references = table.references.len(),
        "symbol extraction complete"
    );
    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{LanguageAdapter, Location, ReferenceKind};

    fn units() -> Vec<SourceUnit> {
        vec![
            SourceUnit::new("pkg/a.py", Language::Python, "from .b import run\n\ndef main():\n    run()\n"),
            SourceUnit::new("pkg/b.py", Language::Python, "def run():\n    pass\n"),
        ]
    }

    #[test]
    fn test_extract_collects_symbols_per_file() {
        let registry = AdapterRegistry::with_builtin();
        let (table, report) = extract(&units(), &registry, ParseBudget::default(), 2).unwrap();
        assert!(report.is_empty());
        assert_eq!(table.files.len(), 2);

        let names: Vec<_> = table.symbols_in("pkg/a.py").map(|s| s.qualified_name.clone()).collect();
        assert_eq!(names, vec!["pkg.a", "main"]);
        assert!(table.file("pkg/a.py").unwrap().module.is_some());
        assert_eq!(table.named("run").count(), 1);
    }

    #[test]
    fn test_extract_is_deterministic_across_thread_counts() {
        let registry = AdapterRegistry::with_builtin();
        let (one, _) = extract(&units(), &registry, ParseBudget::default(), 1).unwrap();
        let (four, _) = extract(&units(), &registry, ParseBudget::default(), 4).unwrap();
        assert_eq!(one, four);
    }

    #[test]
    fn test_partial_error_is_reported_not_raised() {
        let registry = AdapterRegistry::with_builtin();
        let broken = vec![SourceUnit::new("x.py", Language::Python, "def ok():\n    pass\n\ndef bad(:\n")];
        let (table, report) = extract(&broken, &registry, ParseBudget::default(), 1).unwrap();
        assert_eq!(table.file("x.py").unwrap().status.label(), "partial_error");
        assert!(!report.is_empty());
        assert!(table.named("ok").next().is_some());
    }

    #[test]
    fn test_later_timestamp_wins() {
        let registry = AdapterRegistry::with_builtin();
        let older = SourceUnit::new("m.py", Language::Python, "def old():\n    helper()\n").with_timestamp(10);
        let newer = SourceUnit::new("m.py", Language::Python, "def old():\n    pass\n\ndef new():\n    pass\n")
            .with_timestamp(20);
        // Input order must not matter
        let (table, _) = extract(&[newer, older], &registry, ParseBudget::default(), 2).unwrap();

        let file = table.file("m.py").unwrap();
        assert_eq!(file.timestamp, 20);
        assert!(table.named("new").next().is_some());
        assert_eq!(table.named("old").count(), 1);
        assert!(table.references.iter().all(|r| r.target_name != "helper"));
    }

    #[test]
    fn test_unknown_language_becomes_fatal_file() {
        struct PythonOnly;
        impl LanguageAdapter for PythonOnly {
            fn language(&self) -> Language {
                Language::Python
            }
            fn extensions(&self) -> &'static [&'static str] {
                &["py"]
            }
            fn parse(&self, unit: &SourceUnit, _budget: &ParseBudget) -> ParseOutput {
                let module = Symbol::new("m", "m", SymbolKind::Module, Language::Python, Location::new(&unit.path, 1, 1));
                let id = module.id.clone();
                ParseOutput {
                    status: ParseStatus::Ok,
                    symbols: vec![module],
                    references: vec![Reference::new(id, "os", ReferenceKind::Imports, Location::line(&unit.path, 1))],
                    flows: Vec::new(),
                    line_count: 1,
                }
            }
        }

        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(PythonOnly));
        let input = vec![
            SourceUnit::new("m.py", Language::Python, "import os\n"),
            SourceUnit::new("x.go", Language::Go, "package x\n"),
        ];
        let (table, report) = extract(&input, &registry, ParseBudget::default(), 1).unwrap();
        assert_eq!(table.file("x.go").unwrap().status.label(), "fatal");
        assert_eq!(report.len(), 1);
        assert_eq!(table.references.len(), 1);
    }

    #[test]
    fn test_empty_registry_is_fatal() {
        let err = extract(&units(), &AdapterRegistry::new(), ParseBudget::default(), 1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_file_record_lines() {
        let registry = AdapterRegistry::with_builtin();
        let (table, _) = extract(&units(), &registry, ParseBudget::default(), 1).unwrap();
        let file = table.file("pkg/a.py").unwrap();
        assert_eq!(file.lines(3, 4), vec!["def main():", "    run()"]);
        assert_eq!(file.lines(4, 99), vec!["    run()"]);
    }
}
