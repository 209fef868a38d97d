// Per-function control-flow graphs built from adapter flow hints

use crate::parser::{FlowHint, Location, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role of a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Entry,
    Exit,
    Body,
    Condition,
    LoopHead,
    Switch,
    Handler,
    Finally,
}

/// A straight-line run of statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: usize,
    pub kind: BlockKind,
    pub label: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Call targets in source order
    pub calls: Vec<String>,
}

/// How control leaves a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfgEdgeKind {
    True,
    False,
    Unconditional,
    Exception,
}

impl CfgEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CfgEdgeKind::True => "true",
            CfgEdgeKind::False => "false",
            CfgEdgeKind::Unconditional => "unconditional",
            CfgEdgeKind::Exception => "exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: usize,
    pub to: usize,
    pub kind: CfgEdgeKind,
}

/// Block graph of one function; blocks are indexed by position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub function: SymbolId,
    pub entry: usize,
    pub exit: usize,
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<CfgEdge>,
    /// True when no hints were available and the body is one block
    pub approximate: bool,
}

impl ControlFlowGraph {
    /// Lay out blocks for `hints`; without hints the body is one block with entry = exit
    pub fn build(function: &SymbolId, hints: Option<&[FlowHint]>, location: &Location) -> Self {
        match hints {
            Some(hints) if !hints.is_empty() => Builder::new(location).run(function, hints),
            _ => Self::single_block(function, location),
        }
    }

    pub fn single_block(function: &SymbolId, location: &Location) -> Self {
        Self {
            function: function.clone(),
            entry: 0,
            exit: 0,
            blocks: vec![BasicBlock {
                id: 0,
                kind: BlockKind::Body,
                label: "body".to_string(),
                start_line: location.start_line,
                end_line: location.end_line,
                calls: Vec::new(),
            }],
            edges: Vec::new(),
            approximate: true,
        }
    }

    pub fn successors(&self, block: usize) -> impl Iterator<Item = &CfgEdge> + '_ {
        self.edges.iter().filter(move |e| e.from == block)
    }

    /// Blocks with more than one normal successor
    pub fn decision_points(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .filter(|b| self.branch_degree(b.id) > 1)
            .map(|b| b.id)
            .collect()
    }

    /// McCabe complexity: one plus the extra ways out of every decision
    pub fn cyclomatic_complexity(&self) -> usize {
        1 + self
            .blocks
            .iter()
            .map(|b| self.branch_degree(b.id).saturating_sub(1))
            .sum::<usize>()
    }

    /// Every call in the function, in source order
    pub fn call_sequence(&self) -> Vec<(usize, String)> {
        let mut blocks: Vec<&BasicBlock> = self.blocks.iter().collect();
        blocks.sort_by_key(|b| (b.start_line, b.id));
        blocks
            .into_iter()
            .flat_map(|b| b.calls.iter().map(move |c| (b.start_line, c.clone())))
            .collect()
    }

    /// Edges must stay inside the block arena
    pub fn is_well_formed(&self) -> bool {
        let n = self.blocks.len();
        self.entry < n
            && self.exit < n
            && self.blocks.iter().enumerate().all(|(i, b)| b.id == i)
            && self.edges.iter().all(|e| e.from < n && e.to < n)
    }

    fn branch_degree(&self, block: usize) -> usize {
        self.successors(block)
            .filter(|e| e.kind != CfgEdgeKind::Exception)
            .count()
    }
}

struct Builder {
    blocks: Vec<BasicBlock>,
    edges: Vec<CfgEdge>,
    seen: BTreeSet<CfgEdge>,
    /// Body blocks that have not received a statement yet
    fresh: BTreeSet<usize>,
    breaks: Vec<usize>,
    continues: Vec<usize>,
    handlers: Vec<Vec<usize>>,
    exit: usize,
}

impl Builder {
    fn new(location: &Location) -> Self {
        let mut builder = Self {
            blocks: Vec::new(),
            edges: Vec::new(),
            seen: BTreeSet::new(),
            fresh: BTreeSet::new(),
            breaks: Vec::new(),
            continues: Vec::new(),
            handlers: Vec::new(),
            exit: 1,
        };
        builder.block(BlockKind::Entry, "entry", location.start_line);
        builder.exit = builder.block(BlockKind::Exit, "exit", location.end_line);
        builder
    }

    fn run(mut self, function: &SymbolId, hints: &[FlowHint]) -> ControlFlowGraph {
        if let Some(end) = self.seq(hints, Some(0)) {
            self.edge(end, self.exit, CfgEdgeKind::Unconditional);
        }
        ControlFlowGraph {
            function: function.clone(),
            entry: 0,
            exit: self.exit,
            blocks: self.blocks,
            edges: self.edges,
            approximate: false,
        }
    }

    fn block(&mut self, kind: BlockKind, label: impl Into<String>, line: usize) -> usize {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock {
            id,
            kind,
            label: label.into(),
            start_line: line,
            end_line: line,
            calls: Vec::new(),
        });
        if kind == BlockKind::Body {
            self.fresh.insert(id);
        }
        id
    }

    fn edge(&mut self, from: usize, to: usize, kind: CfgEdgeKind) {
        let edge = CfgEdge { from, to, kind };
        if self.seen.insert(edge) {
            self.edges.push(edge);
        }
    }

    /// A block that accepts plain statements, opening one after `current` if needed
    fn body(&mut self, current: Option<usize>, line: usize) -> usize {
        match current {
            Some(id) if self.blocks[id].kind == BlockKind::Body => id,
            Some(id) => {
                let next = self.block(BlockKind::Body, "block", line);
                self.edge(id, next, CfgEdgeKind::Unconditional);
                next
            }
            // unreachable code still gets a block
            None => self.block(BlockKind::Body, "block", line),
        }
    }

    fn append(&mut self, block: usize, line: usize, calls: &[String]) {
        let b = &mut self.blocks[block];
        if self.fresh.remove(&block) {
            b.start_line = line;
            b.end_line = line;
        }
        b.start_line = b.start_line.min(line);
        b.end_line = b.end_line.max(line);
        b.calls.extend(calls.iter().cloned());
    }

    /// Open a block reached from `from` over `kind` and lay out `hints` in it
    fn arm(&mut self, from: usize, kind: CfgEdgeKind, hints: &[FlowHint], line: usize) -> Option<usize> {
        let start = self.block(BlockKind::Body, "block", hints.first().map(|h| h.line()).unwrap_or(line));
        self.edge(from, start, kind);
        self.seq(hints, Some(start))
    }

    /// Returns the block control falls out of, or `None` if it never does
    fn seq(&mut self, hints: &[FlowHint], mut current: Option<usize>) -> Option<usize> {
        for hint in hints {
            current = self.step(hint, current);
        }
        current
    }

    fn step(&mut self, hint: &FlowHint, current: Option<usize>) -> Option<usize> {
        match hint {
            FlowHint::Statement { line, calls } => {
                let block = self.body(current, *line);
                self.append(block, *line, calls);
                Some(block)
            }
            FlowHint::Branch { line, label, then, otherwise } => {
                let cond = self.block(BlockKind::Condition, label.clone(), *line);
                if let Some(prev) = current {
                    self.edge(prev, cond, CfgEdgeKind::Unconditional);
                }
                let then_end = self.arm(cond, CfgEdgeKind::True, then, *line);
                let else_end = if otherwise.is_empty() {
                    Some(cond)
                } else {
                    self.arm(cond, CfgEdgeKind::False, otherwise, *line)
                };
                if then_end.is_none() && else_end.is_none() {
                    return None;
                }
                let join = self.block(BlockKind::Body, "block", *line);
                if let Some(end) = then_end {
                    self.edge(end, join, CfgEdgeKind::Unconditional);
                }
                if let Some(end) = else_end {
                    let kind = if end == cond { CfgEdgeKind::False } else { CfgEdgeKind::Unconditional };
                    self.edge(end, join, kind);
                }
                Some(join)
            }
            FlowHint::Loop { line, label, body } => {
                let head = self.block(BlockKind::LoopHead, label.clone(), *line);
                if let Some(prev) = current {
                    self.edge(prev, head, CfgEdgeKind::Unconditional);
                }
                let after = self.block(BlockKind::Body, "block", *line);
                self.breaks.push(after);
                self.continues.push(head);
                if let Some(end) = self.arm(head, CfgEdgeKind::True, body, *line) {
                    self.edge(end, head, CfgEdgeKind::Unconditional);
                }
                self.breaks.pop();
                self.continues.pop();
                self.edge(head, after, CfgEdgeKind::False);
                Some(after)
            }
            FlowHint::Switch { line, label, arms } => {
                let switch = self.block(BlockKind::Switch, label.clone(), *line);
                if let Some(prev) = current {
                    self.edge(prev, switch, CfgEdgeKind::Unconditional);
                }
                let after = self.block(BlockKind::Body, "block", *line);
                self.breaks.push(after);
                for arm in arms {
                    if let Some(end) = self.arm(switch, CfgEdgeKind::True, arm, *line) {
                        self.edge(end, after, CfgEdgeKind::Unconditional);
                    }
                }
                self.breaks.pop();
                if arms.is_empty() {
                    self.edge(switch, after, CfgEdgeKind::Unconditional);
                }
                Some(after)
            }
            FlowHint::Try { line, body, handlers, finally } => self.try_block(*line, body, handlers, finally.as_deref(), current),
            FlowHint::Return { line, calls } => {
                let block = self.body(current, *line);
                self.append(block, *line, calls);
                self.edge(block, self.exit, CfgEdgeKind::Unconditional);
                None
            }
            FlowHint::Throw { line, calls } => {
                let block = self.body(current, *line);
                self.append(block, *line, calls);
                let targets = self.handlers.last().cloned().unwrap_or_else(|| vec![self.exit]);
                for target in targets {
                    self.edge(block, target, CfgEdgeKind::Exception);
                }
                None
            }
            FlowHint::Break { line } => self.jump(self.breaks.last().copied(), current, *line),
            FlowHint::Continue { line } => self.jump(self.continues.last().copied(), current, *line),
        }
    }

    fn jump(&mut self, target: Option<usize>, current: Option<usize>, line: usize) -> Option<usize> {
        let block = self.body(current, line);
        self.append(block, line, &[]);
        match target {
            Some(target) => {
                self.edge(block, target, CfgEdgeKind::Unconditional);
                None
            }
            // stray jump outside any loop: keep going
            None => Some(block),
        }
    }

    fn try_block(
        &mut self,
        line: usize,
        body: &[FlowHint],
        handlers: &[Vec<FlowHint>],
        finally: Option<&[FlowHint]>,
        current: Option<usize>,
    ) -> Option<usize> {
        let handler_blocks: Vec<usize> = handlers
            .iter()
            .map(|h| {
                let start = h.first().map(|x| x.line()).unwrap_or(line);
                self.block(BlockKind::Handler, "catch", start)
            })
            .collect();

        let start = self.block(BlockKind::Body, "try", line);
        if let Some(prev) = current {
            self.edge(prev, start, CfgEdgeKind::Unconditional);
        }
        self.handlers.push(handler_blocks.clone());
        let body_end = self.seq(body, Some(start));
        self.handlers.pop();

        // anything in the protected region that calls out may raise
        let protected: Vec<usize> = (start..self.blocks.len())
            .filter(|&b| b == start || !self.blocks[b].calls.is_empty())
            .collect();
        for block in protected {
            for &handler in &handler_blocks {
                self.edge(block, handler, CfgEdgeKind::Exception);
            }
        }

        let mut ends: Vec<usize> = body_end.into_iter().collect();
        for (handler, hints) in handler_blocks.iter().zip(handlers) {
            if let Some(end) = self.seq(hints, Some(*handler)) {
                ends.push(end);
            }
        }

        match finally {
            Some(hints) => {
                let start = hints.first().map(|h| h.line()).unwrap_or(line);
                let block = self.block(BlockKind::Finally, "finally", start);
                for end in ends {
                    self.edge(end, block, CfgEdgeKind::Unconditional);
                }
                self.seq(hints, Some(block))
            }
            None if ends.is_empty() => None,
            None => {
                let join = self.block(BlockKind::Body, "block", line);
                for end in ends {
                    self.edge(end, join, CfgEdgeKind::Unconditional);
                }
                Some(join)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> SymbolId {
        SymbolId::new("a.py", "f", crate::parser::SymbolKind::Function)
    }

    fn loc() -> Location {
        Location::new("a.py", 1, 20)
    }

    fn stmt(line: usize, calls: &[&str]) -> FlowHint {
        FlowHint::Statement {
            line,
            calls: calls.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_no_hints_gives_single_block() {
        let cfg = ControlFlowGraph::build(&id(), None, &loc());
        assert!(cfg.approximate);
        assert_eq!(cfg.blocks.len(), 1);
        assert_eq!(cfg.entry, cfg.exit);
        assert_eq!(cfg.cyclomatic_complexity(), 1);
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_straight_line_is_one_path() {
        let hints = vec![stmt(2, &["a"]), stmt(3, &["b"])];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        assert!(!cfg.approximate);
        assert_eq!(cfg.cyclomatic_complexity(), 1);
        let body: Vec<_> = cfg.blocks.iter().filter(|b| b.kind == BlockKind::Body).collect();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].calls, vec!["a", "b"]);
    }

    #[test]
    fn test_if_else_has_true_and_false_edges() {
        let hints = vec![FlowHint::Branch {
            line: 2,
            label: "x > 1".to_string(),
            then: vec![stmt(3, &["a"])],
            otherwise: vec![stmt(5, &["b"])],
        }];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        let cond = cfg.blocks.iter().find(|b| b.kind == BlockKind::Condition).unwrap();
        let kinds: BTreeSet<_> = cfg.successors(cond.id).map(|e| e.kind).collect();
        assert!(kinds.contains(&CfgEdgeKind::True));
        assert!(kinds.contains(&CfgEdgeKind::False));
        assert_eq!(cfg.cyclomatic_complexity(), 2);
        assert_eq!(cfg.decision_points(), vec![cond.id]);
    }

    #[test]
    fn test_if_without_else_falls_through_on_false() {
        let hints = vec![
            FlowHint::Branch {
                line: 2,
                label: "ok".to_string(),
                then: vec![FlowHint::Return { line: 3, calls: vec![] }],
                otherwise: vec![],
            },
            stmt(4, &["next"]),
        ];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        assert_eq!(cfg.cyclomatic_complexity(), 2);
        assert!(cfg.edges.iter().any(|e| e.to == cfg.exit));
        assert!(cfg.is_well_formed());
    }

    #[test]
    fn test_loop_back_edge_and_break() {
        let hints = vec![FlowHint::Loop {
            line: 2,
            label: "for x in xs".to_string(),
            body: vec![
                FlowHint::Branch {
                    line: 3,
                    label: "x".to_string(),
                    then: vec![FlowHint::Break { line: 4 }],
                    otherwise: vec![],
                },
                stmt(5, &["use"]),
            ],
        }];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        let head = cfg.blocks.iter().find(|b| b.kind == BlockKind::LoopHead).unwrap().id;
        assert!(cfg.edges.iter().any(|e| e.to == head && e.from > head));
        assert_eq!(cfg.cyclomatic_complexity(), 3);
    }

    #[test]
    fn test_switch_arms() {
        let hints = vec![FlowHint::Switch {
            line: 2,
            label: "kind".to_string(),
            arms: vec![vec![stmt(3, &["a"])], vec![stmt(4, &["b"])], vec![stmt(5, &["c"])]],
        }];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        assert_eq!(cfg.cyclomatic_complexity(), 3);
    }

    #[test]
    fn test_try_adds_exception_edges() {
        let hints = vec![FlowHint::Try {
            line: 2,
            body: vec![stmt(3, &["save"])],
            handlers: vec![vec![stmt(5, &["log"])]],
            finally: Some(vec![stmt(7, &["close"])]),
        }];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        let handler = cfg.blocks.iter().find(|b| b.kind == BlockKind::Handler).unwrap().id;
        assert!(cfg
            .edges
            .iter()
            .any(|e| e.to == handler && e.kind == CfgEdgeKind::Exception));
        assert!(cfg.blocks.iter().any(|b| b.kind == BlockKind::Finally));
        // exception edges are not decisions
        assert_eq!(cfg.cyclomatic_complexity(), 1);
    }

    #[test]
    fn test_throw_outside_try_goes_to_exit() {
        let hints = vec![FlowHint::Throw { line: 2, calls: vec!["Error".to_string()] }];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        assert!(cfg
            .edges
            .iter()
            .any(|e| e.to == cfg.exit && e.kind == CfgEdgeKind::Exception));
    }

    #[test]
    fn test_call_sequence_follows_lines() {
        let hints = vec![
            FlowHint::Branch {
                line: 2,
                label: "c".to_string(),
                then: vec![stmt(3, &["first"])],
                otherwise: vec![],
            },
            stmt(5, &["second", "third"]),
        ];
        let cfg = ControlFlowGraph::build(&id(), Some(&hints), &loc());
        let calls: Vec<_> = cfg.call_sequence().into_iter().map(|(_, c)| c).collect();
        assert_eq!(calls, vec!["first", "second", "third"]);
    }
}
