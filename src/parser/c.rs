// C and C++ grammar tables

use crate::parser::ast::{Language, SymbolKind, Visibility};
use crate::parser::treesitter::{node_text, LanguageSpec};
use tree_sitter::Node;

pub(crate) static C: LanguageSpec = LanguageSpec {
    language: Language::C,
    extensions: &["c", "h"],
    grammar: c_grammar,
    functions: &["function_definition"],
    types: &[
        ("struct_specifier", SymbolKind::Type),
        ("union_specifier", SymbolKind::Type),
        ("enum_specifier", SymbolKind::Type),
    ],
    type_requires_body: true,
    impl_blocks: &[],
    receiver_field: None,
    bases: &[],
    bindings: &[("init_declarator", "declarator", "value", SymbolKind::Variable)],
    calls: &[("call_expression", "function", None)],
    imports: &["preproc_include"],
    import_targets,
    assignments: &["assignment_expression"],
    docstrings: false,
    branches: &["if_statement"],
    loops: &["for_statement", "while_statement", "do_statement"],
    switches: &["switch_statement"],
    arms: &["case_statement"],
    arm_skip_fields: &["value"],
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

pub(crate) static CPP: LanguageSpec = LanguageSpec {
    language: Language::Cpp,
    extensions: &["cc", "cpp", "cxx", "hh", "hpp", "hxx"],
    grammar: cpp_grammar,
    functions: &["function_definition", "lambda_expression"],
    types: &[
        ("class_specifier", SymbolKind::Type),
        ("struct_specifier", SymbolKind::Type),
        ("union_specifier", SymbolKind::Type),
        ("enum_specifier", SymbolKind::Type),
    ],
    type_requires_body: true,
    impl_blocks: &[],
    receiver_field: None,
    bases: &["base_class_clause"],
    bindings: &[("init_declarator", "declarator", "value", SymbolKind::Variable)],
    calls: &[
        ("call_expression", "function", None),
        ("new_expression", "type", None),
    ],
    imports: &["preproc_include"],
    import_targets,
    assignments: &["assignment_expression"],
    docstrings: false,
    branches: &["if_statement"],
    loops: &["for_statement", "for_range_loop", "while_statement", "do_statement"],
    switches: &["switch_statement"],
    arms: &["case_statement"],
    arm_skip_fields: &["value"],
    arm_skip_kinds: &[],
    tries: &["try_statement"],
    catches: &["catch_clause"],
    finallies: &[],
    returns: &["return_statement"],
    throws: &["throw_statement"],
    breaks: &["break_statement"],
    continues: &["continue_statement"],
    visibility,
};

fn c_grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_c::language()
}

fn cpp_grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_cpp::language()
}

/// `static` keeps a symbol in its translation unit; class members follow the
/// nearest access specifier above them
fn visibility(node: Node<'_>, _name: &str, src: &[u8]) -> Visibility {
    if has_static_storage(node, src) {
        return Visibility::Private;
    }

    let Some(list) = node.parent().filter(|p| p.kind() == "field_declaration_list") else {
        return Visibility::Public;
    };
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        if sibling.kind() == "access_specifier" {
            let text = node_text(sibling, src);
            return if text.starts_with("private") {
                Visibility::Private
            } else if text.starts_with("protected") {
                Visibility::Protected
            } else {
                Visibility::Public
            };
        }
        current = sibling.prev_sibling();
    }
    match list.parent().map(|p| p.kind()) {
        Some("class_specifier") => Visibility::Private,
        _ => Visibility::Public,
    }
}

fn has_static_storage(node: Node<'_>, src: &[u8]) -> bool {
    // bindings sit one level below the declaration carrying the specifier
    let holder = if node.kind() == "init_declarator" {
        node.parent().unwrap_or(node)
    } else {
        node
    };
    let mut cursor = holder.walk();
    let found = holder
        .named_children(&mut cursor)
        .any(|c| c.kind() == "storage_class_specifier" && node_text(c, src) == "static");
    found
}

/// `"local.h"` resolves next to the includer, `<sys/x.h>` is a dotted path
fn import_targets(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let Some(path) = node.child_by_field_name("path") else {
        return Vec::new();
    };
    let raw = node_text(path, src);
    let (local, inner) = if path.kind() == "system_lib_string" {
        (false, raw.trim_start_matches('<').trim_end_matches('>'))
    } else {
        (true, raw.trim_matches('"'))
    };
    let stem = strip_header_extension(inner.trim());
    if stem.is_empty() {
        return Vec::new();
    }
    if local {
        if stem.starts_with("../") || stem.starts_with("./") {
            vec![stem.to_string()]
        } else {
            vec![format!("./{}", stem)]
        }
    } else {
        vec![stem.replace('/', ".")]
    }
}

fn strip_header_extension(path: &str) -> &str {
    for ext in [".h", ".hh", ".hpp", ".hxx", ".c", ".cc", ".cpp", ".inc"] {
        if let Some(stem) = path.strip_suffix(ext) {
            return stem;
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::{LanguageAdapter, ParseBudget, TreeSitterAdapter};

    const C_SAMPLE: &str = r#"#include <stdio.h>
#include "util/buffer.h"

static int retries = 3;
int LIMIT = 10;

struct point {
    int x;
    int y;
};

/* Reads one record */
static int read_one(FILE *f) {
    while (retries > 0) {
        if (fgets_line(f) == 0) {
            break;
        }
        retries = retries - 1;
    }
    switch (LIMIT) {
    case 1:
        return 1;
    default:
        report();
    }
    return 0;
}

int main(void) {
    return read_one(stdin);
}
"#;

    const CPP_SAMPLE: &str = r#"#include "shape.hpp"

class Circle : public Shape {
public:
    double area() const {
        return compute(radius);
    }
private:
    void reset() {
        radius = 0;
    }
    double radius;
};

void Circle::grow() {
    try {
        scale(2);
    } catch (const std::exception& e) {
        throw Error();
    }
}
"#;

    fn parse(path: &str, lang: Language, text: &str) -> ParseOutput {
        let unit = SourceUnit::new(path, lang, text);
        let spec = if lang == Language::Cpp { &super::CPP } else { &super::C };
        TreeSitterAdapter::new(spec).parse(&unit, &ParseBudget::default())
    }

    fn symbol<'a>(out: &'a ParseOutput, qualified: &str) -> &'a Symbol {
        out.symbols
            .iter()
            .find(|s| s.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing symbol {}", qualified))
    }

    #[test]
    fn test_c_symbols() {
        let out = parse("src/reader.c", Language::C, C_SAMPLE);
        assert!(out.status.is_ok());

        let read_one = symbol(&out, "read_one");
        assert_eq!(read_one.kind, SymbolKind::Function);
        assert_eq!(read_one.visibility, Visibility::Private);
        assert_eq!(read_one.doc.as_deref(), Some("Reads one record"));

        assert_eq!(symbol(&out, "main").visibility, Visibility::Public);
        assert_eq!(symbol(&out, "point").kind, SymbolKind::Type);
        assert_eq!(symbol(&out, "retries").visibility, Visibility::Private);
        assert_eq!(symbol(&out, "LIMIT").kind, SymbolKind::Constant);
    }

    #[test]
    fn test_c_references() {
        let out = parse("src/reader.c", Language::C, C_SAMPLE);
        let imports: Vec<_> = out
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Imports)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(imports, vec!["stdio", "./util/buffer"]);

        let read_one = symbol(&out, "read_one").id.clone();
        let refs: Vec<_> = out.references.iter().filter(|r| r.source == read_one).collect();
        assert!(refs
            .iter()
            .any(|r| r.kind == ReferenceKind::Writes && r.target_name == "retries"));
        assert!(refs
            .iter()
            .any(|r| r.kind == ReferenceKind::Reads && r.target_name == "LIMIT"));

        let main = symbol(&out, "main").id.clone();
        assert!(out
            .references
            .iter()
            .any(|r| r.source == main && r.kind == ReferenceKind::Calls && r.target_name == "read_one"));
    }

    #[test]
    fn test_c_flow() {
        let out = parse("src/reader.c", Language::C, C_SAMPLE);
        let read_one = symbol(&out, "read_one").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == read_one).unwrap();
        match &hints[0] {
            FlowHint::Loop { body, .. } => match &body[0] {
                FlowHint::Branch { then, .. } => assert!(matches!(then[0], FlowHint::Break { .. })),
                other => panic!("expected branch, got {:?}", other),
            },
            other => panic!("expected loop, got {:?}", other),
        }
        match &hints[1] {
            FlowHint::Switch { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert!(matches!(arms[0][0], FlowHint::Return { .. }));
            }
            other => panic!("expected switch, got {:?}", other),
        }
        assert!(matches!(hints[2], FlowHint::Return { .. }));
    }

    #[test]
    fn test_cpp_class_members() {
        let out = parse("src/circle.cpp", Language::Cpp, CPP_SAMPLE);
        assert!(out.status.is_ok());

        let circle = symbol(&out, "Circle");
        assert_eq!(circle.kind, SymbolKind::Type);

        let area = symbol(&out, "Circle.area");
        assert_eq!(area.kind, SymbolKind::Method);
        assert_eq!(area.visibility, Visibility::Public);
        assert_eq!(area.parent.as_ref(), Some(&circle.id));

        assert_eq!(symbol(&out, "Circle.reset").visibility, Visibility::Private);
        assert_eq!(symbol(&out, "Circle.grow").kind, SymbolKind::Method);

        let circle_id = circle.id.clone();
        assert!(out
            .references
            .iter()
            .any(|r| r.source == circle_id && r.kind == ReferenceKind::Extends && r.target_name == "Shape"));
    }

    #[test]
    fn test_cpp_try_catch() {
        let out = parse("src/circle.cpp", Language::Cpp, CPP_SAMPLE);
        let grow = symbol(&out, "Circle.grow").id.clone();
        let (_, hints) = out.flows.iter().find(|(id, _)| *id == grow).unwrap();
        match &hints[0] {
            FlowHint::Try { body, handlers, finally, .. } => {
                assert!(matches!(&body[0], FlowHint::Statement { calls, .. } if calls == &vec!["scale".to_string()]));
                assert_eq!(handlers.len(), 1);
                assert!(matches!(handlers[0][0], FlowHint::Throw { .. }));
                assert!(finally.is_none());
            }
            other => panic!("expected try, got {:?}", other),
        }
    }
}
