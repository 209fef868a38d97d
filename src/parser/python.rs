// Python grammar table

use crate::parser::ast::{Language, SymbolKind, Visibility};
use crate::parser::treesitter::{node_text, LanguageSpec};
use tree_sitter::Node;

pub(crate) static SPEC: LanguageSpec = LanguageSpec {
    language: Language::Python,
    extensions: &["py", "pyi"],
    grammar,
    functions: &["function_definition", "lambda"],
    types: &[("class_definition", SymbolKind::Type)],
    type_requires_body: false,
    impl_blocks: &[],
    receiver_field: None,
    bases: &["superclasses"],
    bindings: &[("assignment", "left", "right", SymbolKind::Variable)],
    calls: &[("call", "function", None)],
    imports: &["import_statement", "import_from_statement"],
    import_targets,
    assignments: &["assignment", "augmented_assignment"],
    docstrings: true,
    branches: &["if_statement"],
    loops: &["for_statement", "while_statement"],
    switches: &["match_statement"],
    arms: &["case_clause"],
    arm_skip_fields: &["guard"],
    arm_skip_kinds: &["case_pattern"],
    tries: &["try_statement"],
    catches: &["except_clause", "except_group_clause"],
    finallies: &["finally_clause"],
    returns: &["return_statement"],
    throws: &["raise_statement"],
    breaks: &["break_statement"],
    continues: &["continue_statement"],
    visibility,
};

fn grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_python::language()
}

/// `_name` is module-private by convention; dunders are public protocol
fn visibility(_node: Node<'_>, name: &str, _src: &[u8]) -> Visibility {
    if name.starts_with("__") && name.ends_with("__") {
        Visibility::Public
    } else if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

/// Relative imports become `./x` or `../x`; absolute ones stay dotted
fn import_targets(node: Node<'_>, src: &[u8]) -> Vec<String> {
    match node.kind() {
        "import_statement" => imported_names(node, src),
        "import_from_statement" => {
            let Some(module) = node.child_by_field_name("module_name") else {
                return Vec::new();
            };
            let raw = node_text(module, src);
            if module.kind() != "relative_import" {
                return vec![raw.to_string()];
            }

            let dots = raw.chars().take_while(|c| *c == '.').count();
            let rest = &raw[dots..];
            let prefix = if dots <= 1 {
                "./".to_string()
            } else {
                "../".repeat(dots - 1)
            };
            if rest.is_empty() {
                // `from . import a, b` names sibling modules
                imported_names(node, src)
                    .into_iter()
                    .map(|name| format!("{}{}", prefix, name.replace('.', "/")))
                    .collect()
            } else {
                vec![format!("{}{}", prefix, rest.replace('.', "/"))]
            }
        }
        _ => Vec::new(),
    }
}

fn imported_names(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .filter_map(|n| {
            let target = if n.kind() == "aliased_import" {
                n.child_by_field_name("name")?
            } else {
                n
            };
            Some(node_text(target, src).to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::{LanguageAdapter, ParseBudget, TreeSitterAdapter};

    const SAMPLE: &str = r#""""Order helpers."""
import os
from .models import Order

MAX_ITEMS = 10

class Cart(Base):
    """A cart."""

    def add(self, item):
        if len(self.items) > MAX_ITEMS:
            raise ValueError("full")
        self.items.append(item)
        return self.total()

    def total(self):
        return sum(self.items)

def checkout(cart):
    for item in cart.items:
        process(item)
    try:
        save(cart)
    except IOError:
        log("fail")
    finally:
        close()

def _internal():
    pass
"#;

    fn parse(path: &str, text: &str) -> ParseOutput {
        let unit = SourceUnit::new(path, Language::Python, text);
        TreeSitterAdapter::new(&super::SPEC).parse(&unit, &ParseBudget::default())
    }

    fn symbol<'a>(out: &'a ParseOutput, qualified: &str) -> &'a Symbol {
        out.symbols
            .iter()
            .find(|s| s.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing symbol {}", qualified))
    }

    fn targets(out: &ParseOutput, source: &SymbolId, kind: ReferenceKind) -> Vec<String> {
        out.references
            .iter()
            .filter(|r| &r.source == source && r.kind == kind)
            .map(|r| r.target_name.clone())
            .collect()
    }

    #[test]
    fn test_symbols_and_kinds() {
        let out = parse("shop/sample.py", SAMPLE);
        assert!(out.status.is_ok());

        let module = &out.symbols[0];
        assert_eq!(module.kind, SymbolKind::Module);
        assert_eq!(module.qualified_name, "shop.sample");
        assert_eq!(module.doc.as_deref(), Some("Order helpers."));

        let cart = symbol(&out, "Cart");
        assert_eq!(cart.kind, SymbolKind::Type);
        assert_eq!(cart.doc.as_deref(), Some("A cart."));

        let add = symbol(&out, "Cart.add");
        assert_eq!(add.kind, SymbolKind::Method);
        assert_eq!(add.parent.as_ref(), Some(&cart.id));
        assert_eq!(add.signature.as_deref(), Some("def add(self, item)"));

        assert_eq!(symbol(&out, "checkout").kind, SymbolKind::Function);
        assert_eq!(symbol(&out, "MAX_ITEMS").kind, SymbolKind::Constant);
        assert_eq!(symbol(&out, "_internal").visibility, Visibility::Private);
    }

    #[test]
    fn test_references() {
        let out = parse("shop/sample.py", SAMPLE);
        let module_id = out.symbols[0].id.clone();
        let imports = targets(&out, &module_id, ReferenceKind::Imports);
        assert_eq!(imports, vec!["os".to_string(), "./models".to_string()]);

        let cart = symbol(&out, "Cart").id.clone();
        assert_eq!(targets(&out, &cart, ReferenceKind::Extends), vec!["Base".to_string()]);

        let checkout = symbol(&out, "checkout").id.clone();
        let calls = targets(&out, &checkout, ReferenceKind::Calls);
        assert_eq!(calls, vec!["process", "save", "log", "close"]);

        let add = symbol(&out, "Cart.add").id.clone();
        let calls = targets(&out, &add, ReferenceKind::Calls);
        assert!(calls.contains(&"self.total".to_string()));
        assert!(calls.contains(&"self.items.append".to_string()));
        assert_eq!(targets(&out, &add, ReferenceKind::Reads), vec!["MAX_ITEMS".to_string()]);
    }

    #[test]
    fn test_flow_hints() {
        let out = parse("shop/sample.py", SAMPLE);
        let checkout = symbol(&out, "checkout").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == checkout).unwrap();
        assert!(matches!(hints[0], FlowHint::Loop { .. }));
        match &hints[1] {
            FlowHint::Try { handlers, finally, .. } => {
                assert_eq!(handlers.len(), 1);
                assert!(finally.is_some());
            }
            other => panic!("expected try, got {:?}", other),
        }

        let add = symbol(&out, "Cart.add").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == add).unwrap();
        match &hints[0] {
            FlowHint::Branch { then, otherwise, .. } => {
                assert!(matches!(then[0], FlowHint::Throw { .. }));
                assert!(otherwise.is_empty());
            }
            other => panic!("expected branch, got {:?}", other),
        }
        assert!(matches!(hints.last(), Some(FlowHint::Return { .. })));
    }

    #[test]
    fn test_elif_chain_nests() {
        let src = "def pick(x):\n    if x == 1:\n        a()\n    elif x == 2:\n        b()\n    else:\n        c()\n";
        let out = parse("pick.py", src);
        let pick = symbol(&out, "pick").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == pick).unwrap();
        match &hints[0] {
            FlowHint::Branch { otherwise, .. } => match &otherwise[0] {
                FlowHint::Branch { then, otherwise, .. } => {
                    assert!(matches!(&then[0], FlowHint::Statement { calls, .. } if calls == &vec!["b".to_string()]));
                    assert!(matches!(&otherwise[0], FlowHint::Statement { calls, .. } if calls == &vec!["c".to_string()]));
                }
                other => panic!("expected nested branch, got {:?}", other),
            },
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_from_dot_import() {
        let out = parse("pkg/a.py", "from . import b, c\nfrom ..core import util\n");
        let imports: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Imports)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(imports, vec!["./b", "./c", "../core"]);
    }

    #[test]
    fn test_syntax_error_keeps_earlier_symbols() {
        let src = "def run():\n    return 1\n\ndef broken(:\n    pass\n";
        let out = parse("b.py", src);
        assert_eq!(out.status.label(), "partial_error");
        assert!(!out.status.diagnostics().is_empty());
        assert!(out.symbols.iter().any(|s| s.name == "run"));
    }

    #[test]
    fn test_redefinition_gets_distinct_id() {
        let out = parse("dup.py", "def f():\n    pass\n\ndef f():\n    pass\n");
        let fs: Vec<_> = out.symbols.iter().filter(|s| s.name == "f").collect();
        assert_eq!(fs.len(), 2);
        assert_ne!(fs[0].id, fs[1].id);
        assert_eq!(fs[1].qualified_name, "f#2");
    }

    #[test]
    fn test_parse_is_deterministic() {
        let a = parse("shop/sample.py", SAMPLE);
        let b = parse("shop/sample.py", SAMPLE);
        assert_eq!(a, b);
    }
}
