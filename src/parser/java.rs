// Java grammar table

use crate::parser::ast::{Language, SymbolKind, Visibility};
use crate::parser::treesitter::{node_text, LanguageSpec};
use tree_sitter::Node;

pub(crate) static SPEC: LanguageSpec = LanguageSpec {
    language: Language::Java,
    extensions: &["java"],
    grammar,
    functions: &["method_declaration", "constructor_declaration", "lambda_expression"],
    types: &[
        ("class_declaration", SymbolKind::Type),
        ("interface_declaration", SymbolKind::Interface),
        ("enum_declaration", SymbolKind::Type),
        ("record_declaration", SymbolKind::Type),
        ("annotation_type_declaration", SymbolKind::Interface),
    ],
    type_requires_body: false,
    impl_blocks: &[],
    receiver_field: None,
    bases: &["superclass", "interfaces", "extends_interfaces", "super_interfaces"],
    bindings: &[],
    calls: &[
        ("method_invocation", "name", Some("object")),
        ("object_creation_expression", "type", None),
    ],
    imports: &["import_declaration"],
    import_targets,
    assignments: &["assignment_expression"],
    docstrings: false,
    branches: &["if_statement"],
    loops: &["for_statement", "enhanced_for_statement", "while_statement", "do_statement"],
    switches: &["switch_expression", "switch_statement"],
    arms: &["switch_block_statement_group", "switch_rule"],
    arm_skip_fields: &[],
    arm_skip_kinds: &["switch_label"],
    tries: &["try_statement", "try_with_resources_statement"],
    catches: &["catch_clause"],
    finallies: &["finally_clause"],
    returns: &["return_statement"],
    throws: &["throw_statement"],
    breaks: &["break_statement"],
    continues: &["continue_statement"],
    visibility,
};

fn grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_java::language()
}

/// Explicit modifiers win; members without one are package-private
fn visibility(node: Node<'_>, _name: &str, src: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    let modifiers = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "modifiers")
        .map(|m| node_text(m, src))
        .unwrap_or("");
    let words: Vec<&str> = modifiers.split_whitespace().collect();
    if words.contains(&"public") {
        Visibility::Public
    } else if words.contains(&"private") {
        Visibility::Private
    } else if words.contains(&"protected") {
        Visibility::Protected
    } else if in_interface(node) {
        Visibility::Public
    } else {
        Visibility::Internal
    }
}

fn in_interface(node: Node<'_>) -> bool {
    node.parent()
        .map(|p| p.kind() == "interface_body")
        .unwrap_or(false)
}

/// `import a.b.C;` targets `a.b.C`; static and wildcard imports name their class
fn import_targets(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let text = node_text(node, src);
    let path = text
        .trim()
        .trim_start_matches("import")
        .trim()
        .trim_start_matches("static ")
        .trim()
        .trim_end_matches(';')
        .trim()
        .trim_end_matches(".*");
    let path: String = path.chars().filter(|c| !c.is_whitespace()).collect();
    if path.is_empty() {
        Vec::new()
    } else {
        vec![path]
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::{LanguageAdapter, ParseBudget, TreeSitterAdapter};

    const SAMPLE: &str = r#"package com.shop;

import java.util.List;
import com.shop.model.*;

/** Processes orders. */
public class OrderService extends BaseService implements Runnable {
    private final List<Order> orders;

    public OrderService(List<Order> orders) {
        this.orders = orders;
    }

    public void run() {
        for (Order o : orders) {
            try {
                validate(o);
            } catch (IllegalStateException e) {
                throw new RuntimeException(e);
            } finally {
                audit.record(o);
            }
        }
    }

    int status(int code) {
        switch (code) {
            case 1:
                return ok();
            default:
                return fail();
        }
    }
}

interface Auditor {
    void record(Order o);
}
"#;

    fn parse() -> ParseOutput {
        let unit = SourceUnit::new("src/com/shop/OrderService.java", Language::Java, SAMPLE);
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

        let service = symbol(&out, "OrderService");
        assert_eq!(service.kind, SymbolKind::Type);
        assert_eq!(service.visibility, Visibility::Public);
        assert_eq!(service.doc.as_deref(), Some("Processes orders."));

        let ctor = symbol(&out, "OrderService.OrderService");
        assert_eq!(ctor.kind, SymbolKind::Method);
        assert_eq!(ctor.parent.as_ref(), Some(&service.id));

        assert_eq!(symbol(&out, "OrderService.status").visibility, Visibility::Internal);
        assert_eq!(symbol(&out, "Auditor").kind, SymbolKind::Interface);
        assert_eq!(symbol(&out, "Auditor.record").visibility, Visibility::Public);
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
        assert_eq!(imports, vec!["java.util.List", "com.shop.model"]);

        let service = symbol(&out, "OrderService").id.clone();
        let mut bases: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.source == service && r.kind == ReferenceKind::Extends)
            .map(|r| r.target_name.as_str())
            .collect();
        bases.sort();
        assert_eq!(bases, vec!["BaseService", "Runnable"]);

        let run = symbol(&out, "OrderService.run").id.clone();
        let calls: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.source == run && r.kind == ReferenceKind::Calls)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(calls, vec!["validate", "RuntimeException", "audit.record"]);
    }

    #[test]
    fn test_flow() {
        let out = parse();
        let run = symbol(&out, "OrderService.run").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == run).unwrap();
        match &hints[0] {
            FlowHint::Loop { body, .. } => match &body[0] {
                FlowHint::Try { handlers, finally, .. } => {
                    assert_eq!(handlers.len(), 1);
                    assert!(matches!(handlers[0][0], FlowHint::Throw { .. }));
                    assert!(finally.is_some());
                }
                other => panic!("expected try, got {:?}", other),
            },
            other => panic!("expected loop, got {:?}", other),
        }

        let status = symbol(&out, "OrderService.status").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == status).unwrap();
        match &hints[0] {
            FlowHint::Switch { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert!(matches!(&arms[0][0], FlowHint::Return { calls, .. } if calls == &vec!["ok".to_string()]));
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }
}
