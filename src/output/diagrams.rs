// Mermaid diagram text for the document model
//
// Generates dependency overviews, per-file call sequences and per-function
// control-flow charts. Output is plain text; rendering happens elsewhere.

use crate::analysis::{BlockKind, CfgEdgeKind, ControlFlowGraph, Graph};
use crate::config::OutputConfig;
use crate::parser::{ReferenceKind, SymbolId, SymbolKind};
use std::collections::{BTreeMap, BTreeSet};

/// Diagram generator for creating Mermaid diagrams
pub struct DiagramGenerator {
    /// Maximum nodes to display before aggregating
    max_nodes: usize,
    /// Layout direction (TB, LR, BT, RL)
    direction: String,
}

impl DiagramGenerator {
    /// Create a new diagram generator
    pub fn new() -> Self {
        Self {
            max_nodes: 100,
            direction: "LR".to_string(),
        }
    }

    /// Generator using the `[output]` diagram settings
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new()
            .with_max_nodes(config.diagram_max_nodes)
            .with_direction(&config.diagram_direction)
    }

    /// Set maximum nodes before aggregation
    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    /// Set layout direction
    pub fn with_direction(mut self, dir: &str) -> Self {
        self.direction = dir.to_string();
        self
    }

    /// File-level dependency overview; aggregates by top directory past `max_nodes`
    pub fn dependency_graph(&self, graph: &Graph) -> String {
        if graph.files.len() > self.max_nodes {
            return self.directory_level_graph(graph);
        }

        let mut lines = vec![format!("graph {}", self.direction)];
        for path in graph.files.keys() {
            lines.push(format!("    {}[\"{}\"]{}", sanitize_id(path), path, node_style(path)));
        }

        let mut external = false;
        for dep in &graph.dependencies {
            let (Some(from), Some(to)) = (file_of(graph, &dep.source), file_of(graph, &dep.target)) else {
                continue;
            };
            external |= dep.target.is_external();
            lines.push(format!("    {} -->|{}| {}", sanitize_id(&from), dep.weight, sanitize_id(&to)));
        }
        if external {
            lines.push("    external((external))".to_string());
        }
        lines.join("\n")
    }

    /// Aggregated view: one node per top-level directory
    pub fn directory_level_graph(&self, graph: &Graph) -> String {
        let top = |path: &str| path.split('/').next().unwrap_or(path).to_string();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for path in graph.files.keys() {
            *counts.entry(top(path)).or_default() += 1;
        }

        let mut lines = vec![format!("graph {}", self.direction)];
        for (dir, n) in &counts {
            lines.push(format!("    {}[\"{}\\n({} files)\"]", sanitize_id(dir), dir, n));
        }

        let mut edges: BTreeSet<(String, String)> = BTreeSet::new();
        for dep in graph.dependencies.iter().filter(|d| !d.target.is_external()) {
            if let (Some(from), Some(to)) = (file_of(graph, &dep.source), file_of(graph, &dep.target)) {
                let (from, to) = (top(&from), top(&to));
                if from != to {
                    edges.insert((from, to));
                }
            }
        }
        for (from, to) in edges {
            lines.push(format!("    {} --> {}", sanitize_id(&from), sanitize_id(&to)));
        }
        lines.join("\n")
    }

    /// Calls made by the file's functions, in declaration then source order
    pub fn sequence_diagram(&self, graph: &Graph, path: &str) -> String {
        let callables: Vec<&SymbolId> = graph
            .symbols_in(path)
            .iter()
            .filter(|id| graph.symbol(id).map(|s| s.kind.is_callable()).unwrap_or(false))
            .collect();

        let mut participants: Vec<String> = Vec::new();
        let mut messages: Vec<String> = Vec::new();
        for id in callables {
            let caller = participant_name(graph, id);
            let mut calls: Vec<_> = graph
                .edges_from(id)
                .iter()
                .filter(|e| e.kind == ReferenceKind::Calls)
                .collect();
            calls.sort_by_key(|e| (e.location.start_line, e.target.clone()));
            for edge in calls {
                let (callee, label) = match &edge.unresolved {
                    Some(u) => ("external".to_string(), u.target_name.clone()),
                    None => (participant_name(graph, &edge.target), call_label(graph, &edge.target)),
                };
                push_unique(&mut participants, &caller);
                push_unique(&mut participants, &callee);
                messages.push(format!("    {}->>{}: {}", sanitize_id(&caller), sanitize_id(&callee), label));
            }
        }

        let mut lines = vec!["sequenceDiagram".to_string()];
        for name in &participants {
            lines.push(format!("    participant {} as {}", sanitize_id(name), name));
        }
        lines.extend(messages);
        lines.join("\n")
    }

    /// Block-level flowchart of one function
    pub fn control_flow(&self, cfg: &ControlFlowGraph) -> String {
        let mut lines = vec!["flowchart TB".to_string()];
        for block in &cfg.blocks {
            let label = if block.calls.is_empty() {
                block.label.clone()
            } else {
                format!("{}: {}", block.label, block.calls.join(", "))
            };
            let label = label.replace('"', "'");
            let node = match block.kind {
                BlockKind::Entry | BlockKind::Exit => format!("    B{}([\"{}\"])", block.id, label),
                BlockKind::Condition | BlockKind::LoopHead | BlockKind::Switch => {
                    format!("    B{}{{\"{}\"}}", block.id, label)
                }
                _ => format!("    B{}[\"{}\"]", block.id, label),
            };
            lines.push(node);
        }
        for edge in &cfg.edges {
            match edge.kind {
                CfgEdgeKind::Unconditional => lines.push(format!("    B{} --> B{}", edge.from, edge.to)),
                CfgEdgeKind::Exception => {
                    lines.push(format!("    B{} -.->|exception| B{}", edge.from, edge.to))
                }
                kind => lines.push(format!("    B{} -->|{}| B{}", edge.from, kind.as_str(), edge.to)),
            }
        }
        lines.join("\n")
    }
}

impl Default for DiagramGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Path of the file owning a module symbol; `external` for the sentinel
fn file_of(graph: &Graph, id: &SymbolId) -> Option<String> {
    if id.is_external() {
        return Some("external".to_string());
    }
    graph.symbol(id).map(|s| s.path().to_string())
}

/// Sequence participants are types for methods, files otherwise
fn participant_name(graph: &Graph, id: &SymbolId) -> String {
    let Some(symbol) = graph.symbol(id) else {
        return "external".to_string();
    };
    match symbol.parent.as_ref().and_then(|p| graph.symbol(p)) {
        Some(parent) if parent.kind != SymbolKind::Module => parent.qualified_name.clone(),
        _ => symbol.path().to_string(),
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn call_label(graph: &Graph, id: &SymbolId) -> String {
    graph
        .symbol(id)
        .map(|s| format!("{}()", s.name))
        .unwrap_or_else(|| id.to_string())
}

/// Node style based on path patterns
fn node_style(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.contains("test") {
        ":::test"
    } else if lower.contains("model") {
        ":::model"
    } else if lower.contains("util") || lower.contains("helper") {
        ":::util"
    } else if lower.contains("api") || lower.contains("route") {
        ":::api"
    } else if lower.contains("config") || lower.contains("setting") {
        ":::config"
    } else {
        ""
    }
}

/// Sanitize a string for use as a Mermaid node ID
fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
