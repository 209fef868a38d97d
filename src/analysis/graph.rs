// Dependency, call and control-flow graphs over the symbol-id node space
//
// Nodes live in one flat table keyed by `SymbolId`; edges only hold ids, so
// cycles need no special handling. Every edge endpoint is either a known
// symbol or the external sentinel.

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::report::RunReport;
use crate::analysis::resolve::{Resolution, Resolver};
use crate::analysis::symbols::{FileRecord, SymbolTable};
use crate::error::{Error, Result};
use crate::parser::{short_hash, Location, Reference, ReferenceKind, Symbol, SymbolId, SymbolKind};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Range;
use tracing::{debug, info};

/// A reference whose target could not be matched, kept with a best-effort label
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub target_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guess: Option<String>,
}

/// A resolved (or explicitly unresolved) symbol-level edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: SymbolId,
    pub target: SymbolId,
    pub kind: ReferenceKind,
    pub location: Location,
    /// Set on every candidate when the target was ambiguous
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ambiguous: bool,
    /// Present exactly when `target` is the external sentinel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<UnresolvedReference>,
}

impl Edge {
    fn new(reference: &Reference, target: SymbolId) -> Self {
        let line = reference.location.start_line.to_string();
        let id = short_hash(&[
            reference.source.as_str(),
            target.as_str(),
            reference.kind.as_str(),
            &reference.target_name,
            &reference.location.path,
            &line,
        ]);
        Self {
            id,
            source: reference.source.clone(),
            target,
            kind: reference.kind,
            location: reference.location.clone(),
            ambiguous: false,
            unresolved: None,
        }
    }

    fn unresolved(reference: &Reference, guess: Option<String>) -> Self {
        let mut edge = Self::new(reference, SymbolId::external());
        edge.unresolved = Some(UnresolvedReference {
            target_name: reference.target_name.clone(),
            guess,
        });
        edge
    }

    pub fn is_unresolved(&self) -> bool {
        self.unresolved.is_some()
    }
}

/// File-level edge: every symbol edge between two files collapsed into one
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: String,
    /// Module symbol of the depending file
    pub source: SymbolId,
    /// Module symbol of the file depended on, or the external sentinel
    pub target: SymbolId,
    pub kinds: BTreeSet<ReferenceKind>,
    /// Number of symbol edges collapsed into this one
    pub weight: usize,
}

/// All three graph overlays for one run
///
/// `edges` and `dependencies` are fixed once built; the lookup index is
/// computed from them in `build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    pub symbols: BTreeMap<SymbolId, Symbol>,
    pub files: BTreeMap<String, FileRecord>,
    /// Symbol-level edges (calls, imports, extends, reads, writes), sorted by source first
    pub edges: Vec<Edge>,
    pub dependencies: Vec<DependencyEdge>,
    pub cfgs: BTreeMap<SymbolId, ControlFlowGraph>,
    index: GraphIndex,
}

/// Positions into `Graph::edges` and `Graph::dependencies`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GraphIndex {
    edge_by_id: BTreeMap<String, usize>,
    /// Edges are sorted by source, so each source owns one contiguous run
    outgoing: BTreeMap<SymbolId, Range<usize>>,
    incoming: BTreeMap<SymbolId, Vec<usize>>,
    /// Dependencies touching a module symbol in either direction
    dependencies: BTreeMap<SymbolId, Vec<usize>>,
}

impl GraphIndex {
    fn new(edges: &[Edge], dependencies: &[DependencyEdge]) -> Self {
        let mut index = Self::default();
        for (i, edge) in edges.iter().enumerate() {
            index.edge_by_id.insert(edge.id.clone(), i);
            index
                .outgoing
                .entry(edge.source.clone())
                .and_modify(|run| run.end = i + 1)
                .or_insert(i..i + 1);
            index.incoming.entry(edge.target.clone()).or_default().push(i);
        }
        for (i, dep) in dependencies.iter().enumerate() {
            index.dependencies.entry(dep.source.clone()).or_default().push(i);
            if dep.target != dep.source {
                index.dependencies.entry(dep.target.clone()).or_default().push(i);
            }
        }
        index
    }
}

impl Graph {
    /// Resolve every reference and lay out the overlays.
    ///
    /// Fails only when the edge count passes `max_edges`; `report` holds the
    /// recoverable problems gathered so far and is carried into that error.
    pub fn build(table: &SymbolTable, max_edges: usize, report: &RunReport) -> Result<Self> {
        let mut resolver = Resolver::new(table);
        let mut edges: Vec<Edge> = Vec::new();
        let push = |edges: &mut Vec<Edge>, edge: Edge| -> Result<()> {
            if edges.len() >= max_edges {
                return Err(Error::exhausted("graph", format!("max_edges = {}", max_edges), report.clone()));
            }
            edges.push(edge);
            Ok(())
        };

        // Imports first: they open the imported-scope tier for everything else
        let mut imports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for reference in table.references.iter().filter(|r| r.kind == ReferenceKind::Imports) {
            let importer = &reference.location.path;
            let Some(file) = table.file(importer) else {
                continue;
            };
            let targets: Vec<SymbolId> = resolver
                .resolve_import(importer, file.language, &reference.target_name)
                .into_iter()
                .filter_map(|path| {
                    imports.entry(importer.clone()).or_default().insert(path.to_string());
                    table.file(path).and_then(|f| f.module.clone())
                })
                .collect();

            if targets.is_empty() {
                let top = reference.target_name.trim_start_matches("./").trim_start_matches("../");
                let top = top.split(['.', '/']).next().unwrap_or(top);
                push(&mut edges, Edge::unresolved(reference, Some(format!("external module {}", top))))?;
                continue;
            }
            let ambiguous = targets.len() > 1;
            for target in targets {
                let mut edge = Edge::new(reference, target);
                edge.ambiguous = ambiguous;
                push(&mut edges, edge)?;
            }
        }
        resolver.set_imports(imports);

        for reference in table.references.iter().filter(|r| r.kind != ReferenceKind::Imports) {
            match resolver.resolve(reference) {
                Resolution::Resolved(targets) => {
                    let ambiguous = targets.len() > 1;
                    for target in targets {
                        let mut edge = Edge::new(reference, target);
                        edge.ambiguous = ambiguous;
                        push(&mut edges, edge)?;
                    }
                }
                Resolution::Unresolved(guess) => push(&mut edges, Edge::unresolved(reference, guess))?,
            }
        }

        edges.sort_by(|a, b| {
            (&a.source, &a.target, a.kind, &a.location, &a.id).cmp(&(&b.source, &b.target, b.kind, &b.location, &b.id))
        });
        edges.dedup_by(|a, b| a.id == b.id);

        let dependencies = collapse_dependencies(table, &edges);

        let cfgs: BTreeMap<SymbolId, ControlFlowGraph> = table
            .symbols
            .values()
            .filter(|s| s.kind.is_callable())
            .map(|s| {
                let hints = table.flows.get(&s.id).map(|h| h.as_slice());
                (s.id.clone(), ControlFlowGraph::build(&s.id, hints, &s.location))
            })
            .collect();

        let index = GraphIndex::new(&edges, &dependencies);
        let graph = Self {
            symbols: table.symbols.clone(),
            files: table.files.clone(),
            edges,
            dependencies,
            cfgs,
            index,
        };
        let stats = graph.stats();
        info!(
            symbols = stats.symbols,
            edges = stats.edges,
            unresolved = stats.unresolved,
            ambiguous = stats.ambiguous,
            "graph built"
        );
        Ok(graph)
    }

    /// Whether `id` names a node (the external sentinel counts)
    pub fn contains(&self, id: &SymbolId) -> bool {
        id.is_external() || self.symbols.contains_key(id)
    }

    pub fn symbol(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    /// Ids of the symbols declared in one file, in declaration order
    pub fn symbols_in(&self, path: &str) -> &[SymbolId] {
        self.files.get(path).map(|f| f.symbols.as_slice()).unwrap_or_default()
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.index.edge_by_id.get(id).map(|&i| &self.edges[i])
    }

    /// Edges leaving one symbol, in edge order
    pub fn edges_from(&self, id: &SymbolId) -> &[Edge] {
        self.index
            .outgoing
            .get(id)
            .map(|run| &self.edges[run.clone()])
            .unwrap_or_default()
    }

    /// Edges arriving at one symbol (or the external sentinel), in edge order
    pub fn edges_to<'a>(&'a self, id: &SymbolId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.index
            .incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Edges leaving any symbol declared in one file, in edge order
    pub fn edges_from_file(&self, path: &str) -> Vec<&Edge> {
        let mut runs: Vec<&Range<usize>> = self
            .symbols_in(path)
            .iter()
            .filter_map(|id| self.index.outgoing.get(id))
            .collect();
        runs.sort_by_key(|run| run.start);
        runs.dedup();
        runs.into_iter().flat_map(|run| &self.edges[run.clone()]).collect()
    }

    /// File-level dependencies with `module` on either end, in dependency order
    pub fn dependencies_of<'a>(&'a self, module: &SymbolId) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.index
            .dependencies
            .get(module)
            .into_iter()
            .flatten()
            .map(move |&i| &self.dependencies[i])
    }

    /// The call graph overlay
    pub fn call_edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(|e| e.kind == ReferenceKind::Calls)
    }

    pub fn unresolved_edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(|e| e.is_unresolved())
    }

    /// Resolved callers of a symbol, sorted
    pub fn callers_of(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut out: Vec<SymbolId> = self
            .edges_to(id)
            .filter(|e| e.kind == ReferenceKind::Calls)
            .map(|e| e.source.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Resolved callees of a symbol, sorted
    pub fn callees_of(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut out: Vec<SymbolId> = self
            .edges_from(id)
            .iter()
            .filter(|e| e.kind == ReferenceKind::Calls && !e.target.is_external())
            .map(|e| e.target.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Call-graph neighbours in either direction up to `depth` hops, with their distance
    pub fn neighbors_within(&self, id: &SymbolId, depth: usize) -> BTreeMap<SymbolId, usize> {
        let mut seen: BTreeMap<SymbolId, usize> = BTreeMap::new();
        let mut queue = VecDeque::from([(id.clone(), 0usize)]);
        while let Some((current, distance)) = queue.pop_front() {
            if distance == depth {
                continue;
            }
            let next = self
                .callers_of(&current)
                .into_iter()
                .chain(self.callees_of(&current));
            for neighbor in next {
                if &neighbor == id || seen.contains_key(&neighbor) {
                    continue;
                }
                seen.insert(neighbor.clone(), distance + 1);
                queue.push_back((neighbor, distance + 1));
            }
        }
        seen
    }

    /// Strongly connected call cycles (recursion included), each sorted, all sorted
    pub fn cycles(&self) -> Vec<Vec<SymbolId>> {
        let mut graph: DiGraph<SymbolId, ()> = DiGraph::new();
        let mut index: BTreeMap<&SymbolId, NodeIndex> = BTreeMap::new();
        let mut self_loops: BTreeSet<&SymbolId> = BTreeSet::new();

        for edge in self.call_edges().filter(|e| !e.target.is_external()) {
            for id in [&edge.source, &edge.target] {
                if !index.contains_key(id) {
                    let node = graph.add_node(id.clone());
                    index.insert(id, node);
                }
            }
            if edge.source == edge.target {
                self_loops.insert(&edge.source);
            }
            graph.add_edge(index[&edge.source], index[&edge.target], ());
        }

        let mut cycles: Vec<Vec<SymbolId>> = tarjan_scc(&graph)
            .into_iter()
            .filter_map(|component| {
                let mut ids: Vec<SymbolId> = component.into_iter().map(|n| graph[n].clone()).collect();
                let keep = ids.len() > 1 || ids.first().map(|id| self_loops.contains(id)).unwrap_or(false);
                ids.sort();
                keep.then_some(ids)
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Symbols of the same qualified name and kind declared in more than one file.
    ///
    /// Extraction never merges these; this query is the explicit place to do it.
    pub fn declaration_groups(&self) -> BTreeMap<(String, SymbolKind), Vec<SymbolId>> {
        let mut groups: BTreeMap<(String, SymbolKind), Vec<SymbolId>> = BTreeMap::new();
        for symbol in self.symbols.values().filter(|s| s.kind != SymbolKind::Module) {
            groups
                .entry((symbol.qualified_name.clone(), symbol.kind))
                .or_default()
                .push(symbol.id.clone());
        }
        groups.retain(|_, ids| {
            let files: BTreeSet<&str> = ids
                .iter()
                .filter_map(|id| self.symbols.get(id).map(|s| s.path()))
                .collect();
            files.len() > 1
        });
        groups
    }

    /// Problems with graph consistency; empty when every endpoint resolves
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !self.contains(end) {
                    problems.push(format!("edge {} has dangling endpoint {}", edge.id, end));
                }
            }
            if edge.target.is_external() != edge.is_unresolved() {
                problems.push(format!("edge {} external target and unresolved flag disagree", edge.id));
            }
        }
        for dep in &self.dependencies {
            for end in [&dep.source, &dep.target] {
                if !self.contains(end) {
                    problems.push(format!("dependency {} has dangling endpoint {}", dep.id, end));
                }
            }
        }
        for (id, cfg) in &self.cfgs {
            if !self.symbols.contains_key(id) {
                problems.push(format!("cfg for unknown symbol {}", id));
            }
            if !cfg.is_well_formed() {
                problems.push(format!("cfg for {} is malformed", id));
            }
        }
        problems
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            files: self.files.len(),
            symbols: self.symbols.len(),
            edges: self.edges.len(),
            call_edges: self.call_edges().count(),
            unresolved: self.unresolved_edges().count(),
            ambiguous: self.edges.iter().filter(|e| e.ambiguous).count(),
            dependencies: self.dependencies.len(),
        }
    }
}

fn collapse_dependencies(table: &SymbolTable, edges: &[Edge]) -> Vec<DependencyEdge> {
    let module_of = |id: &SymbolId| -> Option<SymbolId> {
        if id.is_external() {
            return Some(SymbolId::external());
        }
        let symbol = table.get(id)?;
        table.file(symbol.path())?.module.clone()
    };

    let mut collapsed: BTreeMap<(SymbolId, SymbolId), (BTreeSet<ReferenceKind>, usize)> = BTreeMap::new();
    for edge in edges {
        let (Some(source), Some(target)) = (module_of(&edge.source), module_of(&edge.target)) else {
            continue;
        };
        if source == target {
            continue;
        }
        let entry = collapsed.entry((source, target)).or_default();
        entry.0.insert(edge.kind);
        entry.1 += 1;
    }

    debug!(dependencies = collapsed.len(), "collapsed file dependencies");
    collapsed
        .into_iter()
        .map(|((source, target), (kinds, weight))| DependencyEdge {
            id: short_hash(&[source.as_str(), target.as_str(), "depends"]),
            source,
            target,
            kinds,
            weight,
        })
        .collect()
}

/// Statistics about the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub call_edges: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
    pub dependencies: usize,
}
