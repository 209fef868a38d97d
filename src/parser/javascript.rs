// JavaScript and TypeScript grammar tables

use crate::parser::ast::{Language, SymbolKind, Visibility};
use crate::parser::treesitter::{node_text, BindingRule, CallRule, LanguageSpec};
use tree_sitter::Node;

const FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function",
    "function_expression",
    "generator_function",
    "arrow_function",
    "method_definition",
];

const TS_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function",
    "function_expression",
    "generator_function",
    "arrow_function",
    "method_definition",
    "method_signature",
    "abstract_method_signature",
];

const BINDINGS: &[BindingRule] = &[("variable_declarator", "name", "value", SymbolKind::Variable)];

const CALLS: &[CallRule] = &[
    ("call_expression", "function", None),
    ("new_expression", "constructor", None),
];

const ASSIGNMENTS: &[&str] = &["assignment_expression", "augmented_assignment_expression"];

pub(crate) static JAVASCRIPT: LanguageSpec = LanguageSpec {
    language: Language::JavaScript,
    extensions: &["js", "jsx", "mjs", "cjs"],
    grammar: javascript_grammar,
    functions: FUNCTIONS,
    types: &[("class_declaration", SymbolKind::Type), ("class", SymbolKind::Type)],
    type_requires_body: false,
    impl_blocks: &[],
    receiver_field: None,
    bases: &["class_heritage"],
    bindings: BINDINGS,
    calls: CALLS,
    imports: &["import_statement", "export_statement"],
    import_targets,
    assignments: ASSIGNMENTS,
    docstrings: false,
    branches: &["if_statement"],
    loops: &["for_statement", "for_in_statement", "while_statement", "do_statement"],
    switches: &["switch_statement"],
    arms: &["switch_case", "switch_default"],
    arm_skip_fields: &["value"],
    arm_skip_kinds: &[],
    tries: &["try_statement"],
    catches: &["catch_clause"],
    finallies: &["finally_clause"],
    returns: &["return_statement"],
    throws: &["throw_statement"],
    breaks: &["break_statement"],
    continues: &["continue_statement"],
    visibility,
};

pub(crate) static TYPESCRIPT: LanguageSpec = LanguageSpec {
    language: Language::TypeScript,
    extensions: &["ts", "tsx", "mts", "cts"],
    grammar: typescript_grammar,
    functions: TS_FUNCTIONS,
    types: &[
        ("class_declaration", SymbolKind::Type),
        ("abstract_class_declaration", SymbolKind::Type),
        ("class", SymbolKind::Type),
        ("interface_declaration", SymbolKind::Interface),
        ("enum_declaration", SymbolKind::Type),
        ("type_alias_declaration", SymbolKind::Type),
    ],
    type_requires_body: false,
    impl_blocks: &[],
    receiver_field: None,
    bases: &["class_heritage", "extends_type_clause"],
    bindings: BINDINGS,
    calls: CALLS,
    imports: &["import_statement", "export_statement"],
    import_targets,
    assignments: ASSIGNMENTS,
    docstrings: false,
    branches: &["if_statement"],
    loops: &["for_statement", "for_in_statement", "while_statement", "do_statement"],
    switches: &["switch_statement"],
    arms: &["switch_case", "switch_default"],
    arm_skip_fields: &["value"],
    arm_skip_kinds: &[],
    tries: &["try_statement"],
    catches: &["catch_clause"],
    finallies: &["finally_clause"],
    returns: &["return_statement"],
    throws: &["throw_statement"],
    breaks: &["break_statement"],
    continues: &["continue_statement"],
    visibility,
};

fn javascript_grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_javascript::language()
}

fn typescript_grammar(ext: &str) -> tree_sitter::Language {
    if ext == "tsx" {
        tree_sitter_typescript::language_tsx()
    } else {
        tree_sitter_typescript::language_typescript()
    }
}

/// Exported declarations are public, class members follow their modifiers,
/// anything else stays in its file
fn visibility(node: Node<'_>, name: &str, src: &[u8]) -> Visibility {
    if name.starts_with('#') {
        return Visibility::Private;
    }

    let mut cursor = node.walk();
    let modifier = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "accessibility_modifier")
        .map(|m| node_text(m, src));
    match modifier {
        Some("private") => return Visibility::Private,
        Some("protected") => return Visibility::Protected,
        Some(_) => return Visibility::Public,
        None => {}
    }

    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "export_statement" => return Visibility::Public,
            "class_body" | "interface_body" | "object_type" => return Visibility::Public,
            "lexical_declaration" | "variable_declaration" => current = parent.parent(),
            _ => break,
        }
    }
    Visibility::Private
}

/// Module specifiers with extensions dropped; relative ones keep their `./`
fn import_targets(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let Some(source) = node.child_by_field_name("source") else {
        return Vec::new();
    };
    let raw = node_text(source, src).trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if raw.is_empty() {
        return Vec::new();
    }
    vec![strip_script_extension(raw).to_string()]
}

fn strip_script_extension(spec: &str) -> &str {
    for ext in [".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"] {
        if let Some(stem) = spec.strip_suffix(ext) {
            return stem;
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::{LanguageAdapter, ParseBudget, TreeSitterAdapter};

    const JS: &str = r#"import { render } from "./view.js";
import fs from "fs";

// Shared limit
const LIMIT = 3;

export function load(path) {
  try {
    return fs.readFileSync(path);
  } catch (err) {
    report(err);
  } finally {
    cleanup();
  }
}

const format = (value) => render(value);

export class Widget extends Base {
  draw() {
    switch (this.kind) {
      case "a":
        paint();
        break;
      default:
        format(this);
    }
  }
}
"#;

    const TS: &str = r#"export interface Shape extends Named {
  area(): number;
}

export class Square implements Shape {
  private side: number = 1;
  area(): number {
    return compute(this.side);
  }
}

type Id = string;
"#;

    fn parse(path: &str, lang: Language, text: &str) -> ParseOutput {
        let unit = SourceUnit::new(path, lang, text);
        let spec = if lang == Language::TypeScript {
            &super::TYPESCRIPT
        } else {
            &super::JAVASCRIPT
        };
        TreeSitterAdapter::new(spec).parse(&unit, &ParseBudget::default())
    }

    fn symbol<'a>(out: &'a ParseOutput, qualified: &str) -> &'a Symbol {
        out.symbols
            .iter()
            .find(|s| s.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing symbol {}", qualified))
    }

    #[test]
    fn test_javascript_symbols() {
        let out = parse("web/app.js", Language::JavaScript, JS);
        assert!(out.status.is_ok());

        let load = symbol(&out, "load");
        assert_eq!(load.kind, SymbolKind::Function);
        assert_eq!(load.visibility, Visibility::Public);

        let format = symbol(&out, "format");
        assert_eq!(format.kind, SymbolKind::Function);
        assert_eq!(format.visibility, Visibility::Private);

        let limit = symbol(&out, "LIMIT");
        assert_eq!(limit.kind, SymbolKind::Constant);
        assert_eq!(limit.doc.as_deref(), Some("Shared limit"));

        let draw = symbol(&out, "Widget.draw");
        assert_eq!(draw.kind, SymbolKind::Method);
        assert_eq!(draw.parent.as_ref(), Some(&symbol(&out, "Widget").id));
    }

    #[test]
    fn test_javascript_references() {
        let out = parse("web/app.js", Language::JavaScript, JS);
        let imports: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Imports)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(imports, vec!["./view", "fs"]);

        let widget = symbol(&out, "Widget").id.clone();
        assert!(out
            .references
            .iter()
            .any(|r| r.source == widget && r.kind == ReferenceKind::Extends && r.target_name == "Base"));

        let format = symbol(&out, "format").id.clone();
        assert!(out
            .references
            .iter()
            .any(|r| r.source == format && r.target_name == "render"));
    }

    #[test]
    fn test_javascript_flow() {
        let out = parse("web/app.js", Language::JavaScript, JS);
        let load = symbol(&out, "load").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == load).unwrap();
        match &hints[0] {
            FlowHint::Try { body, handlers, finally, .. } => {
                assert!(matches!(body[0], FlowHint::Return { .. }));
                assert_eq!(handlers.len(), 1);
                assert!(finally.is_some());
            }
            other => panic!("expected try, got {:?}", other),
        }

        let draw = symbol(&out, "Widget.draw").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == draw).unwrap();
        match &hints[0] {
            FlowHint::Switch { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert!(matches!(arms[0].last(), Some(FlowHint::Break { .. })));
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_typescript_symbols() {
        let out = parse("src/shape.ts", Language::TypeScript, TS);
        assert!(out.status.is_ok());
        assert_eq!(symbol(&out, "Shape").kind, SymbolKind::Interface);
        assert_eq!(symbol(&out, "Shape.area").kind, SymbolKind::Method);
        assert_eq!(symbol(&out, "Square.area").kind, SymbolKind::Method);
        assert_eq!(symbol(&out, "Id").kind, SymbolKind::Type);

        let shape = symbol(&out, "Shape").id.clone();
        assert!(out
            .references
            .iter()
            .any(|r| r.source == shape && r.kind == ReferenceKind::Extends && r.target_name == "Named"));
    }

    #[test]
    fn test_tsx_parses_with_tsx_grammar() {
        let src = "export const App = () => <div>{title()}</div>;\n";
        let out = parse("src/App.tsx", Language::TypeScript, src);
        assert!(out.status.is_ok());
        let app = symbol(&out, "App");
        assert_eq!(app.kind, SymbolKind::Function);
        assert_eq!(app.visibility, Visibility::Public);
    }
}
