// Table-driven adapter shared by every tree-sitter grammar
//
// Each language contributes a `LanguageSpec` naming the node kinds and fields
// that matter. The walker below turns any grammar described that way into
// symbols, references and block-level flow hints.

use crate::parser::ast::*;
use crate::parser::{c, go, java, javascript, python, rust};
use crate::parser::{LanguageAdapter, ParseBudget};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tree_sitter::{Node, Parser};

const MAX_DIAGNOSTICS: usize = 25;
const MAX_SIGNATURE_CHARS: usize = 160;
const MAX_LABEL_CHARS: usize = 48;
const MAX_DOC_CHARS: usize = 400;

/// Node kinds whose named children are statements of the same block
const BLOCK_KINDS: &[&str] = &[
    "block",
    "statement_block",
    "compound_statement",
    "constructor_body",
    "else_clause",
    "expression_statement",
    "unsafe_block",
];

/// Call node kind, field holding the callee, optional receiver field
pub type CallRule = (&'static str, &'static str, Option<&'static str>);

/// Binding node kind, name field, value field, declared symbol kind
pub type BindingRule = (&'static str, &'static str, &'static str, SymbolKind);

/// Grammar description consumed by [`TreeSitterAdapter`]
pub struct LanguageSpec {
    pub language: Language,
    pub extensions: &'static [&'static str],
    /// Grammar for a given extension (TSX and TypeScript differ)
    pub grammar: fn(&str) -> tree_sitter::Language,

    pub functions: &'static [&'static str],
    pub types: &'static [(&'static str, SymbolKind)],
    /// C-family forward declarations reuse the type kinds without a body
    pub type_requires_body: bool,
    /// Blocks that add methods to a type declared elsewhere (`impl`)
    pub impl_blocks: &'static [&'static str],
    /// Field on a function holding its receiver (Go methods)
    pub receiver_field: Option<&'static str>,
    /// Fields or child kinds of a type node that list its bases
    pub bases: &'static [&'static str],
    pub bindings: &'static [BindingRule],
    pub calls: &'static [CallRule],
    pub imports: &'static [&'static str],
    pub import_targets: fn(Node<'_>, &[u8]) -> Vec<String>,
    pub assignments: &'static [&'static str],
    pub docstrings: bool,

    pub branches: &'static [&'static str],
    pub loops: &'static [&'static str],
    pub switches: &'static [&'static str],
    pub arms: &'static [&'static str],
    pub arm_skip_fields: &'static [&'static str],
    pub arm_skip_kinds: &'static [&'static str],
    pub tries: &'static [&'static str],
    pub catches: &'static [&'static str],
    pub finallies: &'static [&'static str],
    pub returns: &'static [&'static str],
    pub throws: &'static [&'static str],
    pub breaks: &'static [&'static str],
    pub continues: &'static [&'static str],

    pub visibility: fn(Node<'_>, &str, &[u8]) -> Visibility,
}

impl LanguageSpec {
    fn type_kind(&self, kind: &str) -> Option<SymbolKind> {
        self.types.iter().find(|(k, _)| *k == kind).map(|(_, s)| *s)
    }

    fn binding_rule(&self, kind: &str) -> Option<&'static BindingRule> {
        self.bindings.iter().find(|rule| rule.0 == kind)
    }

    fn call_rule(&self, kind: &str) -> Option<&'static CallRule> {
        self.calls.iter().find(|rule| rule.0 == kind)
    }

    fn is_definition(&self, kind: &str) -> bool {
        self.functions.contains(&kind) || self.type_kind(kind).is_some()
    }
}

/// Every built-in grammar
pub fn builtin_specs() -> Vec<&'static LanguageSpec> {
    vec![
        &rust::SPEC,
        &python::SPEC,
        &javascript::JAVASCRIPT,
        &javascript::TYPESCRIPT,
        &go::SPEC,
        &java::SPEC,
        &c::C,
        &c::CPP,
    ]
}

/// Adapter driven by a [`LanguageSpec`]
pub struct TreeSitterAdapter {
    spec: &'static LanguageSpec,
}

impl TreeSitterAdapter {
    pub fn new(spec: &'static LanguageSpec) -> Self {
        Self { spec }
    }
}

impl LanguageAdapter for TreeSitterAdapter {
    fn language(&self) -> Language {
        self.spec.language
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.spec.extensions
    }

    fn parse(&self, unit: &SourceUnit, budget: &ParseBudget) -> ParseOutput {
        let mut parser = Parser::new();
        let grammar = (self.spec.grammar)(&unit.extension());
        if let Err(e) = parser.set_language(&grammar) {
            return ParseOutput::fatal(unit, format!("grammar unavailable: {}", e));
        }
        parser.set_timeout_micros(budget.timeout.as_micros().min(u64::MAX as u128) as u64);

        let Some(tree) = parser.parse(&unit.text, None) else {
            return ParseOutput::fatal(
                unit,
                format!("parse exceeded {} ms budget", budget.timeout.as_millis()),
            );
        };

        let root = tree.root_node();
        let src = unit.text.as_bytes();
        let line_count = unit.text.lines().count().max(1);

        let key = module_key(&unit.path);
        let qualified = if key.is_empty() { unit.path.clone() } else { key };
        let name = qualified.rsplit('.').next().unwrap_or(&qualified).to_string();
        let mut module = Symbol::new(
            name,
            qualified,
            SymbolKind::Module,
            self.spec.language,
            Location::new(&unit.path, 1, line_count),
        );
        if self.spec.docstrings {
            module.doc = docstring(root, src);
        }

        let mut walker = Walker::new(self.spec, &unit.path, src, module.id.clone());
        walker.symbols.push(module);
        walker.visit_children(root, &Scope::default());

        let status = if root.has_error() {
            let mut diags = syntax_diagnostics(root, &unit.path, src);
            if diags.is_empty() {
                diags.push(Diagnostic::new(&unit.path, 1, "syntax error"));
            }
            ParseStatus::PartialError(diags)
        } else {
            ParseStatus::Ok
        };

        walker.finish(status, line_count)
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    /// Qualified-name prefix for declarations in this scope
    prefix: String,
    /// Enclosing type (or impl target) and its id
    owner: Option<(String, SymbolId)>,
    /// Innermost enclosing callable
    function: Option<SymbolId>,
}

struct Access {
    source: SymbolId,
    name: String,
    line: usize,
    write: bool,
}

struct Walker<'a> {
    spec: &'static LanguageSpec,
    path: &'a str,
    src: &'a [u8],
    module_id: SymbolId,
    symbols: Vec<Symbol>,
    references: Vec<Reference>,
    flows: Vec<(SymbolId, Vec<FlowHint>)>,
    accesses: Vec<Access>,
    seen: BTreeMap<(String, SymbolKind), usize>,
}

impl<'a> Walker<'a> {
    fn new(spec: &'static LanguageSpec, path: &'a str, src: &'a [u8], module_id: SymbolId) -> Self {
        Self {
            spec,
            path,
            src,
            module_id,
            symbols: Vec::new(),
            references: Vec::new(),
            flows: Vec::new(),
            accesses: Vec::new(),
            seen: BTreeMap::new(),
        }
    }

    fn visit_children(&mut self, node: Node<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, scope);
        }
    }

    fn visit(&mut self, node: Node<'_>, scope: &Scope) {
        let kind = node.kind();

        if self.spec.functions.contains(&kind) {
            match function_name(node, self.src) {
                Some(name) => self.define_callable(node, node, &name, scope),
                None => self.visit_children(node, scope),
            }
            return;
        }

        if let Some(symbol_kind) = self.spec.type_kind(kind) {
            if self.define_type(node, symbol_kind, scope) {
                return;
            }
        }

        if self.spec.impl_blocks.contains(&kind) {
            self.define_impl(node, scope);
            return;
        }

        if let Some(rule) = self.spec.binding_rule(kind) {
            if self.define_binding(node, rule, scope) {
                return;
            }
        }

        let line = node.start_position().row + 1;

        if self.spec.imports.contains(&kind) {
            for target in (self.spec.import_targets)(node, self.src) {
                self.references.push(Reference::new(
                    self.module_id.clone(),
                    target,
                    ReferenceKind::Imports,
                    Location::line(self.path, line),
                ));
            }
        }

        if let Some(target) = call_name(self.spec, node, self.src) {
            let source = scope.function.clone().unwrap_or_else(|| self.module_id.clone());
            self.references.push(Reference::new(
                source,
                target,
                ReferenceKind::Calls,
                Location::line(self.path, line),
            ));
        }

        if kind == "identifier" {
            if let Some(function) = &scope.function {
                self.accesses.push(Access {
                    source: function.clone(),
                    name: node_text(node, self.src).to_string(),
                    line,
                    write: self.is_write_target(node),
                });
            }
        }

        self.visit_children(node, scope);
    }

    fn is_write_target(&self, node: Node<'_>) -> bool {
        let Some(parent) = node.parent() else {
            return false;
        };
        if !self.spec.assignments.contains(&parent.kind()) {
            return false;
        }
        parent
            .child_by_field_name("left")
            .map(|left| left.start_byte() <= node.start_byte() && node.end_byte() <= left.end_byte())
            .unwrap_or(false)
    }

    /// Allocate a qualified name, suffixing repeats so ids stay unique
    fn unique(&mut self, qualified: String, kind: SymbolKind) -> String {
        let count = self.seen.entry((qualified.clone(), kind)).or_insert(0);
        *count += 1;
        if *count == 1 {
            qualified
        } else {
            format!("{}#{}", qualified, count)
        }
    }

    fn location(&self, node: Node<'_>) -> Location {
        Location::new(
            self.path,
            node.start_position().row + 1,
            node.end_position().row + 1,
        )
    }

    /// Declare a function or method. `decl` positions the symbol, `callable`
    /// owns the parameters and body (they differ for `f = lambda: ...`).
    fn define_callable(&mut self, decl: Node<'_>, callable: Node<'_>, raw_name: &str, scope: &Scope) {
        let explicit_owner = match raw_name.rsplit_once('.') {
            Some((owner, _)) => Some(owner.to_string()),
            None => receiver_owner(self.spec, callable, self.src),
        };
        let name = raw_name.rsplit('.').next().unwrap_or(raw_name).to_string();

        let (owner, base) = match explicit_owner {
            Some(owner) => {
                let id = SymbolId::new(self.path, &owner, SymbolKind::Type);
                let base = join(&owner, &name);
                (Some((owner, id)), base)
            }
            None => {
                let owner = if scope.function.is_none() { scope.owner.clone() } else { None };
                (owner, join(&scope.prefix, &name))
            }
        };

        let kind = if owner.is_some() { SymbolKind::Method } else { SymbolKind::Function };
        let visibility = if scope.function.is_some() {
            Visibility::Private
        } else {
            (self.spec.visibility)(decl, &name, self.src)
        };

        let qualified = self.unique(base, kind);
        let body = callable.child_by_field_name("body");
        let mut symbol = Symbol::new(&name, &qualified, kind, self.spec.language, self.location(decl))
            .with_visibility(visibility);
        symbol.signature = Some(header_text(decl, body, self.src));
        symbol.doc = self.doc_of(decl, body);
        symbol.parent = owner.map(|(_, id)| id).or_else(|| scope.function.clone());

        let id = symbol.id.clone();
        self.symbols.push(symbol);

        if let Some(body) = body {
            let hints = self.hints_of(body);
            self.flows.push((id.clone(), hints));
        }

        let inner = Scope {
            prefix: qualified,
            owner: None,
            function: Some(id),
        };
        self.visit_children(callable, &inner);
    }

    fn define_type(&mut self, node: Node<'_>, declared: SymbolKind, scope: &Scope) -> bool {
        if self.spec.type_requires_body && node.child_by_field_name("body").is_none() {
            return false;
        }
        let Some(name) = node
            .child_by_field_name("name")
            .and_then(|n| normalize_dotted(node_text(n, self.src)))
        else {
            return false;
        };

        let is_interface = node
            .child_by_field_name("type")
            .map(|t| t.kind().contains("interface"))
            .unwrap_or(false);
        let kind = if is_interface { SymbolKind::Interface } else { declared };

        let visibility = if scope.function.is_some() {
            Visibility::Private
        } else {
            (self.spec.visibility)(node, &name, self.src)
        };

        let qualified = self.unique(join(&scope.prefix, &name), kind);
        let body = node.child_by_field_name("body");
        let mut symbol = Symbol::new(&name, &qualified, kind, self.spec.language, self.location(node))
            .with_visibility(visibility);
        symbol.signature = Some(header_text(node, body, self.src));
        symbol.doc = self.doc_of(node, body);
        symbol.parent = scope
            .owner
            .as_ref()
            .map(|(_, id)| id.clone())
            .or_else(|| scope.function.clone());

        let id = symbol.id.clone();
        self.symbols.push(symbol);

        let line = node.start_position().row + 1;
        for base in self.base_names(node) {
            self.references.push(Reference::new(
                id.clone(),
                base,
                ReferenceKind::Extends,
                Location::line(self.path, line),
            ));
        }

        let inner = Scope {
            prefix: qualified.clone(),
            owner: Some((qualified, id)),
            function: None,
        };
        self.visit_children(node, &inner);
        true
    }

    fn define_impl(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(owner) = node
            .child_by_field_name("type")
            .and_then(|t| type_head(t, self.src))
        else {
            self.visit_children(node, scope);
            return;
        };

        let owner_id = SymbolId::new(self.path, &owner, SymbolKind::Type);
        if let Some(interface) = node
            .child_by_field_name("trait")
            .and_then(|t| type_head(t, self.src))
        {
            self.references.push(Reference::new(
                owner_id.clone(),
                interface,
                ReferenceKind::Extends,
                Location::line(self.path, node.start_position().row + 1),
            ));
        }

        let inner = Scope {
            prefix: owner.clone(),
            owner: Some((owner, owner_id)),
            function: None,
        };
        self.visit_children(node, &inner);
    }

    fn define_binding(&mut self, node: Node<'_>, rule: &BindingRule, scope: &Scope) -> bool {
        let (_, name_field, value_field, declared) = *rule;
        let Some(name_node) = node.child_by_field_name(name_field) else {
            return false;
        };
        if name_node.kind() != "identifier" {
            return false;
        }
        let name = node_text(name_node, self.src).to_string();
        let value = node.child_by_field_name(value_field);

        if let Some(callable) = value.filter(|v| self.spec.functions.contains(&v.kind())) {
            self.define_callable(node, callable, &name, scope);
            return true;
        }

        if scope.function.is_some() || scope.owner.is_some() {
            return false;
        }

        let kind = if declared == SymbolKind::Constant || is_screaming_case(&name) {
            SymbolKind::Constant
        } else {
            declared
        };
        let qualified = self.unique(join(&scope.prefix, &name), kind);
        let mut symbol = Symbol::new(&name, &qualified, kind, self.spec.language, self.location(node))
            .with_visibility((self.spec.visibility)(node, &name, self.src));
        symbol.signature = Some(compact(first_line(node_text(node, self.src)), MAX_SIGNATURE_CHARS));
        symbol.doc = self.doc_of(node, None);
        self.symbols.push(symbol);

        self.visit_children(node, scope);
        true
    }

    fn base_names(&self, node: Node<'_>) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        if !cursor.goto_first_child() {
            return names;
        }
        loop {
            let child = cursor.node();
            let by_field = cursor
                .field_name()
                .map(|f| self.spec.bases.contains(&f))
                .unwrap_or(false);
            if child.is_named() && (by_field || self.spec.bases.contains(&child.kind())) {
                collect_type_names(child, self.src, &mut names);
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        names.dedup();
        names
    }

    fn doc_of(&self, decl: Node<'_>, body: Option<Node<'_>>) -> Option<String> {
        if self.spec.docstrings {
            if let Some(doc) = body.and_then(|b| docstring(b, self.src)) {
                return Some(doc);
            }
        }

        let mut anchor = decl;
        while let Some(parent) = anchor.parent() {
            let wraps = matches!(
                parent.kind(),
                "export_statement"
                    | "decorated_definition"
                    | "template_declaration"
                    | "lexical_declaration"
                    | "variable_declaration"
                    | "const_declaration"
                    | "var_declaration"
                    | "declaration"
                    | "expression_statement"
            );
            if !wraps {
                break;
            }
            anchor = parent;
        }
        leading_comment(anchor, self.src)
    }

    // Flow hints

    fn hints_of(&self, node: Node<'_>) -> Vec<FlowHint> {
        if BLOCK_KINDS.contains(&node.kind()) {
            let mut out = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                out.extend(self.hints_of(child));
            }
            out
        } else {
            self.statement_hint(node).into_iter().collect()
        }
    }

    fn statement_hint(&self, node: Node<'_>) -> Option<FlowHint> {
        let kind = node.kind();
        let line = node.start_position().row + 1;
        let spec = self.spec;

        if kind.contains("comment") || spec.is_definition(kind) {
            return None;
        }

        if spec.branches.contains(&kind) {
            return Some(FlowHint::Branch {
                line,
                label: self.condition_label(node),
                then: self.field_hints(node, "consequence"),
                otherwise: self.alternative_hints(node),
            });
        }

        if spec.loops.contains(&kind) {
            let body = node
                .child_by_field_name("body")
                .or_else(|| last_named_child(node));
            return Some(FlowHint::Loop {
                line,
                label: compact(&header_text(node, body, self.src), MAX_LABEL_CHARS),
                body: body.map(|b| self.hints_of(b)).unwrap_or_default(),
            });
        }

        if spec.switches.contains(&kind) {
            let container = node.child_by_field_name("body").unwrap_or(node);
            let mut cursor = container.walk();
            let arms = container
                .named_children(&mut cursor)
                .filter(|arm| spec.arms.contains(&arm.kind()))
                .map(|arm| self.arm_hints(arm))
                .collect();
            let label = ["value", "condition", "subject"]
                .iter()
                .find_map(|f| node.child_by_field_name(f))
                .map(|n| compact(node_text(n, self.src), MAX_LABEL_CHARS))
                .unwrap_or_else(|| kind.to_string());
            return Some(FlowHint::Switch { line, label, arms });
        }

        if spec.tries.contains(&kind) {
            let mut handlers = Vec::new();
            let mut finally = None;
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if spec.catches.contains(&child.kind()) {
                    handlers.push(self.clause_hints(child));
                } else if spec.finallies.contains(&child.kind()) {
                    finally = Some(self.clause_hints(child));
                }
            }
            return Some(FlowHint::Try {
                line,
                body: self.field_hints(node, "body"),
                handlers,
                finally,
            });
        }

        if spec.returns.contains(&kind) {
            return Some(FlowHint::Return {
                line,
                calls: self.calls_in(node),
            });
        }
        if spec.throws.contains(&kind) {
            return Some(FlowHint::Throw {
                line,
                calls: self.calls_in(node),
            });
        }
        if spec.breaks.contains(&kind) {
            return Some(FlowHint::Break { line });
        }
        if spec.continues.contains(&kind) {
            return Some(FlowHint::Continue { line });
        }

        Some(FlowHint::Statement {
            line,
            calls: self.calls_in(node),
        })
    }

    fn field_hints(&self, node: Node<'_>, field: &str) -> Vec<FlowHint> {
        node.child_by_field_name(field)
            .map(|n| self.hints_of(n))
            .unwrap_or_default()
    }

    fn clause_hints(&self, clause: Node<'_>) -> Vec<FlowHint> {
        clause
            .child_by_field_name("body")
            .or_else(|| last_named_child(clause))
            .map(|b| self.hints_of(b))
            .unwrap_or_default()
    }

    fn condition_label(&self, node: Node<'_>) -> String {
        node.child_by_field_name("condition")
            .map(|c| compact(node_text(c, self.src), MAX_LABEL_CHARS))
            .unwrap_or_else(|| node.kind().to_string())
    }

    /// `else` chains fold from the right so `elif` nests inside `otherwise`
    fn alternative_hints(&self, node: Node<'_>) -> Vec<FlowHint> {
        let mut cursor = node.walk();
        let alternatives: Vec<Node<'_>> = node.children_by_field_name("alternative", &mut cursor).collect();

        let mut acc = Vec::new();
        for alt in alternatives.into_iter().rev() {
            let is_elif = !self.spec.branches.contains(&alt.kind())
                && alt.child_by_field_name("condition").is_some();
            acc = if is_elif {
                vec![FlowHint::Branch {
                    line: alt.start_position().row + 1,
                    label: self.condition_label(alt),
                    then: self.field_hints(alt, "consequence"),
                    otherwise: acc,
                }]
            } else {
                self.hints_of(alt)
            };
        }
        acc
    }

    fn arm_hints(&self, arm: Node<'_>) -> Vec<FlowHint> {
        let mut out = Vec::new();
        let mut cursor = arm.walk();
        if !cursor.goto_first_child() {
            return out;
        }
        loop {
            let child = cursor.node();
            let skipped_field = cursor
                .field_name()
                .map(|f| self.spec.arm_skip_fields.contains(&f))
                .unwrap_or(false);
            if child.is_named() && !skipped_field && !self.spec.arm_skip_kinds.contains(&child.kind()) {
                out.extend(self.hints_of(child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        out
    }

    /// Call targets in source order, not descending into nested definitions
    fn calls_in(&self, node: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_calls(node, &mut out);
        out
    }

    fn collect_calls(&self, node: Node<'_>, out: &mut Vec<String>) {
        if let Some(name) = call_name(self.spec, node, self.src) {
            out.push(name);
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if !self.spec.is_definition(child.kind()) {
                self.collect_calls(child, out);
            }
        }
    }

    fn finish(self, status: ParseStatus, line_count: usize) -> ParseOutput {
        let Walker {
            path,
            module_id,
            mut symbols,
            mut references,
            flows,
            accesses,
            ..
        } = self;

        let ids: HashSet<SymbolId> = symbols.iter().map(|s| s.id.clone()).collect();
        for symbol in &mut symbols {
            if symbol.parent.as_ref().map(|p| !ids.contains(p)).unwrap_or(false) {
                symbol.parent = None;
            }
        }
        for reference in &mut references {
            if !ids.contains(&reference.source) {
                reference.source = module_id.clone();
            }
        }

        // Module-level bindings touched from function bodies
        let bindings: BTreeSet<String> = symbols
            .iter()
            .filter(|s| matches!(s.kind, SymbolKind::Constant | SymbolKind::Variable))
            .filter(|s| s.parent.is_none())
            .map(|s| s.name.clone())
            .collect();
        let mut recorded = BTreeSet::new();
        for access in accesses {
            if !bindings.contains(&access.name) {
                continue;
            }
            let kind = if access.write { ReferenceKind::Writes } else { ReferenceKind::Reads };
            if recorded.insert((access.source.clone(), access.name.clone(), kind)) {
                references.push(Reference::new(
                    access.source,
                    access.name,
                    kind,
                    Location::line(path, access.line),
                ));
            }
        }

        ParseOutput {
            status,
            symbols,
            references,
            flows,
            line_count,
        }
    }
}

// Free helpers shared with the per-language tables

pub(crate) fn node_text<'s>(node: Node<'_>, src: &'s [u8]) -> &'s str {
    node.utf8_text(src).unwrap_or("")
}

fn last_named_child(node: Node<'_>) -> Option<Node<'_>> {
    let count = node.named_child_count();
    if count == 0 {
        None
    } else {
        node.named_child(count - 1)
    }
}

pub(crate) fn find_descendant<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    if node.kind() == kind {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(|child| find_descendant(child, kind))
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn is_screaming_case(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Collapse whitespace and cap at `max` characters
pub(crate) fn compact(text: &str, max: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.chars().count() > max {
        let mut out: String = joined.chars().take(max).collect();
        out.push('…');
        out
    } else {
        joined
    }
}

/// Declaration text up to its body, or its first line when bodiless
fn header_text(node: Node<'_>, body: Option<Node<'_>>, src: &[u8]) -> String {
    let raw = match body {
        Some(body) if body.start_byte() > node.start_byte() => {
            String::from_utf8_lossy(&src[node.start_byte()..body.start_byte()]).into_owned()
        }
        _ => first_line(node_text(node, src)).to_string(),
    };
    let header = compact(&raw, MAX_SIGNATURE_CHARS);
    header
        .trim_end_matches(|c: char| c == ':' || c == '{' || c == '=' || c.is_whitespace())
        .to_string()
}

/// Normalize a callee or path expression to dotted form.
///
/// Generic arguments are dropped and `::`, `->`, `?.` become dots. Anything
/// that is not a plain path (calls on call results, subscripts) yields `None`.
pub(crate) fn normalize_dotted(text: &str) -> Option<String> {
    let mut stripped = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut prev = '\0';
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 && prev != '-' => depth -= 1,
            _ if depth > 0 => {}
            c if c.is_whitespace() => {}
            c => stripped.push(c),
        }
        prev = c;
    }
    let replaced = stripped.replace("::", ".").replace("->", ".").replace("?.", ".");
    let segments: Vec<&str> = replaced.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }
    let valid = segments.iter().all(|seg| {
        let body = seg.strip_prefix('#').unwrap_or(seg);
        !body.is_empty()
            && !body.starts_with(|c: char| c.is_ascii_digit())
            && body.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    });
    valid.then(|| segments.join("."))
}

fn call_name(spec: &LanguageSpec, node: Node<'_>, src: &[u8]) -> Option<String> {
    let &(_, callee_field, receiver_field) = spec.call_rule(node.kind())?;
    let callee = node.child_by_field_name(callee_field)?;
    let name = normalize_dotted(node_text(callee, src))?;
    match receiver_field.and_then(|f| node.child_by_field_name(f)) {
        Some(receiver) => match normalize_dotted(node_text(receiver, src)) {
            Some(prefix) => Some(format!("{}.{}", prefix, name)),
            None => Some(name),
        },
        None => Some(name),
    }
}

/// Function name from a `name` field or, for C declarators, the innermost declarator
fn function_name(node: Node<'_>, src: &[u8]) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return normalize_dotted(node_text(name, src));
    }
    let mut current = node.child_by_field_name("declarator")?;
    while let Some(inner) = current.child_by_field_name("declarator") {
        current = inner;
    }
    normalize_dotted(node_text(current, src))
}

fn receiver_owner(spec: &LanguageSpec, node: Node<'_>, src: &[u8]) -> Option<String> {
    let receiver = node.child_by_field_name(spec.receiver_field?)?;
    let ty = find_descendant(receiver, "type_identifier")?;
    Some(node_text(ty, src).to_string())
}

/// Leading type name of a possibly generic or scoped type
fn type_head(node: Node<'_>, src: &[u8]) -> Option<String> {
    let head = if node.kind() == "type_identifier" {
        node
    } else {
        find_descendant(node, "type_identifier")?
    };
    Some(node_text(head, src).to_string())
}

fn collect_type_names(node: Node<'_>, src: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier"
        | "type_identifier"
        | "attribute"
        | "member_expression"
        | "scoped_type_identifier"
        | "scoped_identifier"
        | "qualified_identifier"
        | "nested_type_identifier" => {
            if let Some(name) = normalize_dotted(node_text(node, src)) {
                out.push(name);
            }
        }
        "keyword_argument" | "type_arguments" | "type_parameters" | "template_argument_list"
        | "access_specifier" => {}
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_type_names(child, src, out);
            }
        }
    }
}

/// Leading string literal of a block (Python docstrings)
fn docstring(block: Node<'_>, src: &[u8]) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let text = node_text(literal, src);
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| text.strip_prefix(q).map(|rest| rest.strip_suffix(q).unwrap_or(rest)))
        .unwrap_or(text);
    let doc = inner.trim();
    (!doc.is_empty()).then(|| truncate(doc, MAX_DOC_CHARS))
}

/// Contiguous comment lines directly above a declaration
fn leading_comment(anchor: Node<'_>, src: &[u8]) -> Option<String> {
    let mut chunks = Vec::new();
    let mut expected_row = anchor.start_position().row;
    let mut current = anchor.prev_sibling();
    while let Some(node) = current {
        if !node.kind().contains("comment") || node.end_position().row + 1 < expected_row {
            break;
        }
        chunks.push(strip_comment(node_text(node, src)));
        expected_row = node.start_position().row;
        current = node.prev_sibling();
    }
    chunks.reverse();
    let doc = chunks
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!doc.is_empty()).then(|| truncate(&doc, MAX_DOC_CHARS))
}

fn strip_comment(text: &str) -> String {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = ["///", "//!", "//", "/**", "/*", "#", "*"]
                .iter()
                .find_map(|p| line.strip_prefix(p))
                .unwrap_or(line);
            line.trim_end_matches("*/").trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn syntax_diagnostics(root: Node<'_>, path: &str, src: &[u8]) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if out.len() >= MAX_DIAGNOSTICS {
            break;
        }
        let line = node.start_position().row + 1;
        if node.is_missing() {
            out.push(Diagnostic::new(path, line, format!("missing `{}`", node.kind())));
            continue;
        }
        if node.is_error() {
            let snippet = compact(first_line(node_text(node, src)), 40);
            out.push(Diagnostic::new(path, line, format!("syntax error near `{}`", snippet)));
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    out.sort();
    out
}
