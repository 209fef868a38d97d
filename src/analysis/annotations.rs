// Annotation overlay: analyzer findings attached to graph nodes and edges
//
// The merge is a multiset union followed by a total sort, so batch arrival
// order never shows in the result. The graph itself is never touched.

use crate::analysis::graph::Graph;
use crate::analysis::report::RunReport;
use crate::parser::{Location, SymbolId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// One step less severe, bottoming out at `Info`
    pub fn lowered(&self) -> Self {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium => Severity::Low,
            Severity::Low | Severity::Info => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationKind {
    SecurityFinding,
    QualityScore,
    RefactorSuggestion,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::SecurityFinding => "security-finding",
            AnnotationKind::QualityScore => "quality-score",
            AnnotationKind::RefactorSuggestion => "refactor-suggestion",
        }
    }
}

/// One analyzer record, keyed by symbol id or edge id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub kind: AnnotationKind,
    pub severity: Severity,
    /// Tag of the analyzer that produced this record
    pub analyzer: String,
    /// Human-readable payload
    pub message: String,
    /// Rule or category label, e.g. `A03:2021 Injection`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigations: Vec<String>,
}

impl Annotation {
    pub fn new(
        key: impl Into<String>,
        kind: AnnotationKind,
        severity: Severity,
        analyzer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            severity,
            analyzer: analyzer.into(),
            message: message.into(),
            category: None,
            location: None,
            mitigations: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_mitigations(mut self, mitigations: Vec<String>) -> Self {
        self.mitigations = mitigations;
        self
    }
}

/// Everything one analyzer produced in one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationBatch {
    pub analyzer: String,
    pub annotations: Vec<Annotation>,
}

impl AnnotationBatch {
    pub fn new(analyzer: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            annotations: Vec::new(),
        }
    }

    pub fn push(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

/// Merged annotations: known keys in `by_key`, the rest in `overflow`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub by_key: BTreeMap<String, Vec<Annotation>>,
    pub overflow: Vec<Annotation>,
}

impl AnnotationSet {
    /// Multiset union, the reduction step of the merge
    fn combine(mut self, other: AnnotationSet) -> AnnotationSet {
        for (key, mut annotations) in other.by_key {
            let slot = self.by_key.entry(key).or_default();
            slot.append(&mut annotations);
            slot.sort();
        }
        self.overflow.extend(other.overflow);
        self.overflow.sort();
        self
    }

    /// Annotations attached to one key, oldest-first by sort order
    pub fn for_key(&self, key: &str) -> &[Annotation] {
        self.by_key.get(key).map(|v| v.as_slice()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.by_key.values().flatten()
    }
}

/// The graph with the annotation overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedGraph {
    pub graph: Graph,
    pub annotations: AnnotationSet,
}

impl AnnotatedGraph {
    /// Annotations on a symbol
    pub fn for_symbol(&self, id: &SymbolId) -> &[Annotation] {
        self.annotations.for_key(id.as_str())
    }

    /// Annotations on the symbols of one file and on edges leaving them
    pub fn for_file(&self, path: &str) -> Vec<&Annotation> {
        let mut out: Vec<&Annotation> = self
            .graph
            .symbols_in(path)
            .iter()
            .flat_map(|id| self.annotations.for_key(id.as_str()))
            .collect();
        for edge in self.graph.edges_from_file(path) {
            out.extend(self.annotations.for_key(&edge.id));
        }
        out
    }

    /// Highest security-finding severity on any symbol of the file
    pub fn security_level(&self, path: &str) -> Option<Severity> {
        self.graph
            .symbols_in(path)
            .iter()
            .flat_map(|id| self.annotations.for_key(id.as_str()))
            .filter(|a| a.kind == AnnotationKind::SecurityFinding)
            .map(|a| a.severity)
            .max()
    }
}

/// Overlay analyzer batches onto the graph.
///
/// Commutative and associative over `batches`; keys that name neither a
/// symbol nor an edge land in the overflow list and in the returned report.
pub fn merge(graph: Graph, batches: Vec<AnnotationBatch>) -> (AnnotatedGraph, RunReport) {
    let known = |key: &str| {
        graph.symbols.contains_key(&SymbolId::from_key(key)) || graph.edge(key).is_some()
    };

    let annotations = batches
        .into_par_iter()
        .map(|batch| {
            let mut partial = AnnotationSet::default();
            for annotation in batch.annotations {
                if known(&annotation.key) {
                    partial.by_key.entry(annotation.key.clone()).or_default().push(annotation);
                } else {
                    partial.overflow.push(annotation);
                }
            }
            for slot in partial.by_key.values_mut() {
                slot.sort();
            }
            partial.overflow.sort();
            partial
        })
        .reduce(AnnotationSet::default, AnnotationSet::combine);

    let mut report = RunReport::new();
    for annotation in &annotations.overflow {
        warn!(key = %annotation.key, analyzer = %annotation.analyzer, "annotation for unknown key");
        report.annotation(
            &annotation.key,
            format!("{} from {} refers to no symbol or edge", annotation.kind.as_str(), annotation.analyzer),
        );
    }
    debug!(attached = annotations.len(), overflow = annotations.overflow.len(), "annotations merged");

    (AnnotatedGraph { graph, annotations }, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::symbols::extract;
    use crate::parser::{AdapterRegistry, Language, ParseBudget, SourceUnit};

    fn graph() -> Graph {
        let units = vec![SourceUnit::new(
            "svc.py",
            Language::Python,
            "def load():\n    run()\n\ndef run():\n    pass\n",
        )];
        let (table, _) = extract(&units, &AdapterRegistry::with_builtin(), ParseBudget::default(), 1).unwrap();
        Graph::build(&table, 1_000, &Default::default()).unwrap()
    }

    fn symbol(graph: &Graph, name: &str) -> SymbolId {
        graph.symbols.values().find(|s| s.name == name).unwrap().id.clone()
    }

    fn finding(key: &SymbolId, severity: Severity, analyzer: &str) -> Annotation {
        Annotation::new(key.as_str(), AnnotationKind::SecurityFinding, severity, analyzer, "issue")
    }

    #[test]
    fn test_severity_order_and_lowering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.lowered(), Severity::High);
        assert_eq!(Severity::Info.lowered(), Severity::Info);
    }

    #[test]
    fn test_merge_keeps_both_findings() {
        let g = graph();
        let load = symbol(&g, "load");
        let mut a = AnnotationBatch::new("alpha");
        a.push(finding(&load, Severity::Low, "alpha"));
        let mut b = AnnotationBatch::new("beta");
        b.push(finding(&load, Severity::High, "beta"));

        let (annotated, report) = merge(g, vec![a, b]);
        assert!(report.is_empty());
        assert_eq!(annotated.for_symbol(&load).len(), 2);
        assert_eq!(annotated.security_level("svc.py"), Some(Severity::High));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let g = graph();
        let load = symbol(&g, "load");
        let run = symbol(&g, "run");
        let edge = g.call_edges().next().unwrap().id.clone();

        let mut a = AnnotationBatch::new("alpha");
        a.push(finding(&load, Severity::Medium, "alpha"));
        a.push(finding(&run, Severity::Low, "alpha"));
        let mut b = AnnotationBatch::new("beta");
        b.push(Annotation::new(&edge, AnnotationKind::SecurityFinding, Severity::Low, "beta", "flows"));
        b.push(finding(&load, Severity::Medium, "beta"));
        let mut c = AnnotationBatch::new("gamma");
        c.push(Annotation::new("stale", AnnotationKind::QualityScore, Severity::Info, "gamma", "old"));

        let (first, _) = merge(g.clone(), vec![a.clone(), b.clone(), c.clone()]);
        let (second, _) = merge(g.clone(), vec![c.clone(), a.clone(), b.clone()]);
        let (third, _) = merge(g, vec![b, c, a]);
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(first.annotations.for_key(&edge).len(), 1);
    }

    #[test]
    fn test_unknown_key_goes_to_overflow() {
        let g = graph();
        let mut batch = AnnotationBatch::new("cache");
        batch.push(Annotation::new("0000000000000000", AnnotationKind::QualityScore, Severity::Info, "cache", "stale"));
        let (annotated, report) = merge(g, vec![batch]);
        assert!(annotated.annotations.is_empty());
        assert_eq!(annotated.annotations.overflow.len(), 1);
        assert_eq!(report.count(crate::error::ErrorClass::RecoverableAnnotation), 1);
    }

    #[test]
    fn test_security_level_ignores_other_kinds() {
        let g = graph();
        let load = symbol(&g, "load");
        let mut batch = AnnotationBatch::new("quality");
        batch.push(Annotation::new(load.as_str(), AnnotationKind::QualityScore, Severity::High, "quality", "complex"));
        let (annotated, _) = merge(g, vec![batch]);
        assert_eq!(annotated.security_level("svc.py"), None);
        assert_eq!(annotated.for_file("svc.py").len(), 1);
    }
}
