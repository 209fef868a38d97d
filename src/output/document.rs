// Normalized document tree handed to renderers
//
// Everything here is derived from an `Analysis` plus enrichment results and
// is ordered by path and declaration order, never by completion order.

use crate::analysis::{
    Analysis, Annotation, ControlFlowGraph, DependencyEdge, Edge, GraphStats, RunDiagnostic, RunReport,
    Severity,
};
use crate::error::Result;
use crate::explain::{EnrichmentResult, UnitId};
use crate::output::diagrams::DiagramGenerator;
use crate::parser::{Language, ParseStatus, ReferenceKind, Symbol, SymbolId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Project root of the document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub project: String,
    pub overview: Overview,
    /// One node per file, sorted by path
    pub files: Vec<FileNode>,
    /// Every recoverable problem of the run, sorted
    pub report: RunReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub stats: GraphStats,
    /// File count per language
    pub languages: BTreeMap<Language, usize>,
    pub dependencies: Vec<DependencyEdge>,
    /// Call cycles, each a sorted list of symbol ids
    pub cycles: Vec<Vec<SymbolId>>,
    pub dependency_diagram: String,
    /// Annotations whose key matched nothing in the graph
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unattached: Vec<Annotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub path: String,
    pub language: Language,
    pub status: ParseStatus,
    pub line_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<Severity>,
    /// Declaration order
    pub symbols: Vec<SymbolNode>,
    /// Edges leaving this file's symbols
    pub edges: Vec<Edge>,
    /// File-level dependencies in either direction
    pub dependencies: Vec<DependencyEdge>,
    /// Annotations keyed by one of `edges`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edge_annotations: Vec<Annotation>,
    pub diagrams: FileDiagrams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<RunDiagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolNode {
    #[serde(flatten)]
    pub symbol: Symbol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg: Option<ControlFlowGraph>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileDiagrams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    /// Flowchart per function, keyed by symbol id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub control_flow: BTreeMap<SymbolId, String>,
}

impl Document {
    pub fn file(&self, path: &str) -> Option<&FileNode> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.files[i])
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

/// Fold the analysis and enrichment results into one document with default diagrams.
///
/// Pure over its inputs; emitting twice gives equal documents.
pub fn emit(
    analysis: &Analysis,
    enrichments: &BTreeMap<UnitId, EnrichmentResult>,
    enrichment_report: &RunReport,
) -> Document {
    emit_with(analysis, enrichments, enrichment_report, &DiagramGenerator::new())
}

/// `emit` with the diagram layout taken from `diagrams`
pub fn emit_with(
    analysis: &Analysis,
    enrichments: &BTreeMap<UnitId, EnrichmentResult>,
    enrichment_report: &RunReport,
    diagrams: &DiagramGenerator,
) -> Document {
    let annotated = &analysis.graph;
    let graph = &annotated.graph;

    let mut languages: BTreeMap<Language, usize> = BTreeMap::new();
    for file in graph.files.values() {
        *languages.entry(file.language).or_default() += 1;
    }

    let overview = Overview {
        stats: graph.stats(),
        languages,
        dependencies: graph.dependencies.clone(),
        cycles: graph.cycles(),
        dependency_diagram: diagrams.dependency_graph(graph),
        unattached: annotated.annotations.overflow.clone(),
        enrichment: enrichments.get(&UnitId::Overview).cloned(),
    };

    let mut report = analysis.report.clone();
    report.extend(enrichment_report.clone());
    report.normalize();

    let diagnostics_by_path = report.by_path();

    // BTreeMap iteration keeps files in path order
    let files: Vec<FileNode> = graph
        .files
        .values()
        .map(|record| {
            let path = record.path.as_str();
            let ids = graph.symbols_in(path);

            let symbols: Vec<SymbolNode> = ids
                .iter()
                .filter_map(|id| graph.symbol(id))
                .map(|symbol| {
                    let cfg = graph.cfgs.get(&symbol.id).cloned();
                    SymbolNode {
                        complexity: cfg.as_ref().map(|c| c.cyclomatic_complexity()),
                        cfg,
                        annotations: annotated.for_symbol(&symbol.id).to_vec(),
                        enrichment: enrichments.get(&UnitId::Function(symbol.id.clone())).cloned(),
                        symbol: symbol.clone(),
                    }
                })
                .collect();

            let edges: Vec<Edge> = graph.edges_from_file(path).into_iter().cloned().collect();
            let edge_annotations: Vec<Annotation> = edges
                .iter()
                .flat_map(|e| annotated.annotations.for_key(&e.id))
                .cloned()
                .collect();

            let dependencies: Vec<DependencyEdge> = match &record.module {
                Some(module) => graph.dependencies_of(module).cloned().collect(),
                None => Vec::new(),
            };

            let has_calls = edges.iter().any(|e| e.kind == ReferenceKind::Calls);
            let file_diagrams = FileDiagrams {
                sequence: has_calls.then(|| diagrams.sequence_diagram(graph, path)),
                control_flow: symbols
                    .iter()
                    .filter_map(|s| s.cfg.as_ref())
                    .filter(|cfg| !cfg.approximate)
                    .map(|cfg| (cfg.function.clone(), diagrams.control_flow(cfg)))
                    .collect(),
            };

            FileNode {
                path: record.path.clone(),
                language: record.language,
                status: record.status.clone(),
                line_count: record.line_count,
                security_level: annotated.security_level(path),
                symbols,
                edges,
                dependencies,
                edge_annotations,
                diagrams: file_diagrams,
                enrichment: enrichments.get(&UnitId::File(record.path.clone())).cloned(),
                diagnostics: diagnostics_by_path
                    .get(path)
                    .map(|group| group.iter().map(|d| (*d).clone()).collect())
                    .unwrap_or_default(),
            }
        })
        .collect();

    debug!(files = files.len(), diagnostics = report.len(), "document emitted");
    Document {
        project: analysis.project.clone(),
        overview,
        files,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::annotations::{merge, AnnotationBatch};
    use crate::analysis::symbols::extract;
    use crate::analysis::{AnnotationKind, Graph};
    use crate::parser::{AdapterRegistry, ParseBudget, SourceUnit};

    fn analysis(batches: Vec<AnnotationBatch>) -> Analysis {
        let units = vec![
            SourceUnit::new("src/b.py", Language::Python, "def helper(x):\n    if x:\n        return 1\n    return 2\n"),
            SourceUnit::new("src/a.py", Language::Python, "from .b import helper\n\ndef main():\n    helper(1)\n"),
        ];
        let (table, report) = extract(&units, &AdapterRegistry::with_builtin(), ParseBudget::default(), 1).unwrap();
        let graph = Graph::build(&table, 1_000, &Default::default()).unwrap();
        let (graph, _) = merge(graph, batches);
        Analysis {
            project: "demo".to_string(),
            graph,
            report,
        }
    }

    #[test]
    fn test_files_sorted_by_path() {
        let doc = emit(&analysis(Vec::new()), &BTreeMap::new(), &RunReport::new());
        let paths: Vec<_> = doc.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.py", "src/b.py"]);
        assert_eq!(doc.overview.languages[&Language::Python], 2);
        assert!(doc.file("src/b.py").is_some());
        assert!(doc.file("src/c.py").is_none());
    }

    #[test]
    fn test_file_scoped_graphs() {
        let doc = emit(&analysis(Vec::new()), &BTreeMap::new(), &RunReport::new());
        let a = doc.file("src/a.py").unwrap();
        assert!(a.edges.iter().any(|e| e.kind == ReferenceKind::Calls && !e.is_unresolved()));
        assert_eq!(a.dependencies.len(), 1);
        assert!(a.diagrams.sequence.as_deref().unwrap().contains("helper()"));

        let b = doc.file("src/b.py").unwrap();
        assert!(b.diagrams.sequence.is_none());
        let helper = b.symbols.iter().find(|s| s.symbol.name == "helper").unwrap();
        assert_eq!(helper.complexity, Some(2));
        assert!(b.diagrams.control_flow.contains_key(&helper.symbol.id));
    }

    #[test]
    fn test_annotations_and_enrichment_attach() {
        let base = analysis(Vec::new());
        let helper = base.graph.graph.symbols.values().find(|s| s.name == "helper").unwrap().id.clone();
        let mut batch = AnnotationBatch::new("security");
        batch.push(Annotation::new(helper.as_str(), AnnotationKind::SecurityFinding, Severity::High, "security", "eval"));
        let analysis = analysis(vec![batch]);

        let mut enrichments = BTreeMap::new();
        enrichments.insert(
            UnitId::File("src/b.py".to_string()),
            EnrichmentResult::Fallback {
                text: "b".to_string(),
                reason: "timeout".to_string(),
            },
        );
        let mut report = RunReport::new();
        report.enrichment("file:src/b.py", "timeout");

        let doc = emit(&analysis, &enrichments, &report);
        let b = doc.file("src/b.py").unwrap();
        assert_eq!(b.security_level, Some(Severity::High));
        assert!(b.enrichment.as_ref().unwrap().is_fallback());
        assert_eq!(doc.file("src/a.py").unwrap().security_level, None);
        assert_eq!(doc.report.len(), 1);
        let node = b.symbols.iter().find(|s| s.symbol.id == helper).unwrap();
        assert_eq!(node.annotations.len(), 1);
    }

    #[test]
    fn test_configured_diagram_layout() {
        let config = crate::config::OutputConfig {
            diagram_direction: "TB".to_string(),
            ..Default::default()
        };
        let diagrams = DiagramGenerator::from_config(&config);
        let doc = emit_with(&analysis(Vec::new()), &BTreeMap::new(), &RunReport::new(), &diagrams);
        assert!(doc.overview.dependency_diagram.starts_with("graph TB"));

        let default = emit(&analysis(Vec::new()), &BTreeMap::new(), &RunReport::new());
        assert!(default.overview.dependency_diagram.starts_with("graph LR"));
        assert_eq!(doc.files, default.files);
    }

    #[test]
    fn test_emit_is_idempotent() {
        let analysis = analysis(Vec::new());
        let first = emit(&analysis, &BTreeMap::new(), &RunReport::new());
        let second = emit(&analysis, &BTreeMap::new(), &RunReport::new());
        assert_eq!(first, second);
        assert_eq!(first.to_json(true).unwrap(), second.to_json(true).unwrap());
    }
}
