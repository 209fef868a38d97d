// Go grammar table

use crate::parser::ast::{Language, SymbolKind, Visibility};
use crate::parser::treesitter::{node_text, LanguageSpec};
use tree_sitter::Node;

pub(crate) static SPEC: LanguageSpec = LanguageSpec {
    language: Language::Go,
    extensions: &["go"],
    grammar,
    functions: &["function_declaration", "method_declaration", "func_literal"],
    types: &[("type_spec", SymbolKind::Type)],
    type_requires_body: false,
    impl_blocks: &[],
    receiver_field: Some("receiver"),
    bases: &[],
    bindings: &[
        ("const_spec", "name", "value", SymbolKind::Constant),
        ("var_spec", "name", "value", SymbolKind::Variable),
    ],
    calls: &[("call_expression", "function", None)],
    imports: &["import_spec"],
    import_targets,
    assignments: &["assignment_statement"],
    docstrings: false,
    branches: &["if_statement"],
    loops: &["for_statement"],
    switches: &["expression_switch_statement", "type_switch_statement", "select_statement"],
    arms: &["expression_case", "type_case", "communication_case", "default_case"],
    arm_skip_fields: &["value", "type", "communication"],
    arm_skip_kinds: &[],
    tries: &[],
    catches: &[],
    finallies: &[],
    returns: &["return_statement"],
    throws: &[],
    breaks: &["break_statement"],
    continues: &["continue_statement"],
    visibility,
};

fn grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_go::language()
}

/// Exported identifiers start with an uppercase letter; the rest are package-wide
fn visibility(_node: Node<'_>, name: &str, _src: &[u8]) -> Visibility {
    if name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
        Visibility::Public
    } else {
        Visibility::Internal
    }
}

/// Import paths become dotted so their last segments line up with directories
fn import_targets(node: Node<'_>, src: &[u8]) -> Vec<String> {
    node.child_by_field_name("path")
        .map(|p| node_text(p, src).trim_matches(|c| c == '"' || c == '`').replace('/', "."))
        .filter(|p| !p.is_empty())
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::{LanguageAdapter, ParseBudget, TreeSitterAdapter};

    const SAMPLE: &str = r#"package server

import (
	"fmt"
	"example.com/app/store"
)

const maxConns = 4

type Handler interface {
	Serve() error
}

type Server struct {
	conns int
}

func (s *Server) Start() error {
	for i := 0; i < maxConns; i++ {
		if err := store.Open(i); err != nil {
			return err
		}
	}
	switch s.conns {
	case 0:
		fmt.Println("idle")
	default:
		s.log()
	}
	return nil
}

func helper() {}
"#;

    fn parse() -> ParseOutput {
        let unit = SourceUnit::new("server/server.go", Language::Go, SAMPLE);
        TreeSitterAdapter::new(&super::SPEC).parse(&unit, &ParseBudget::default())
    }

    fn symbol<'a>(out: &'a ParseOutput, qualified: &str) -> &'a Symbol {
        out.symbols
            .iter()
            .find(|s| s.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing symbol {}", qualified))
    }

    #[test]
    fn test_symbols() {
        let out = parse();
        assert!(out.status.is_ok());
        assert_eq!(symbol(&out, "Handler").kind, SymbolKind::Interface);
        assert_eq!(symbol(&out, "Server").kind, SymbolKind::Type);
        assert_eq!(symbol(&out, "maxConns").kind, SymbolKind::Constant);

        let start = symbol(&out, "Server.Start");
        assert_eq!(start.kind, SymbolKind::Method);
        assert_eq!(start.visibility, Visibility::Public);
        assert_eq!(start.parent.as_ref(), Some(&symbol(&out, "Server").id));

        assert_eq!(symbol(&out, "helper").visibility, Visibility::Internal);
    }

    #[test]
    fn test_references() {
        let out = parse();
        let imports: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Imports)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(imports, vec!["fmt", "example.com.app.store"]);

        let start = symbol(&out, "Server.Start").id.clone();
        let calls: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.source == start && r.kind == ReferenceKind::Calls)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(calls, vec!["store.Open", "fmt.Println", "s.log"]);
        assert!(out
            .references
            .iter()
            .any(|r| r.source == start && r.kind == ReferenceKind::Reads && r.target_name == "maxConns"));
    }

    #[test]
    fn test_flow() {
        let out = parse();
        let start = symbol(&out, "Server.Start").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == start).unwrap();
        assert!(matches!(hints[0], FlowHint::Loop { .. }));
        match &hints[1] {
            FlowHint::Switch { arms, .. } => assert_eq!(arms.len(), 2),
            other => panic!("expected switch, got {:?}", other),
        }
        assert!(matches!(hints[2], FlowHint::Return { .. }));
    }
}
