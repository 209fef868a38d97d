// Rust grammar table

use crate::parser::ast::{Language, SymbolKind, Visibility};
use crate::parser::treesitter::{node_text, LanguageSpec};
use tree_sitter::Node;

pub(crate) static SPEC: LanguageSpec = LanguageSpec {
    language: Language::Rust,
    extensions: &["rs"],
    grammar,
    functions: &["function_item", "function_signature_item"],
    types: &[
        ("struct_item", SymbolKind::Type),
        ("enum_item", SymbolKind::Type),
        ("union_item", SymbolKind::Type),
        ("trait_item", SymbolKind::Interface),
    ],
    type_requires_body: false,
    impl_blocks: &["impl_item"],
    receiver_field: None,
    bases: &["bounds"],
    bindings: &[
        ("const_item", "name", "value", SymbolKind::Constant),
        ("static_item", "name", "value", SymbolKind::Constant),
    ],
    calls: &[("call_expression", "function", None)],
    imports: &["use_declaration", "mod_item"],
    import_targets,
    assignments: &["assignment_expression", "compound_assignment_expr"],
    docstrings: false,
    branches: &["if_expression"],
    loops: &["loop_expression", "while_expression", "for_expression"],
    switches: &["match_expression"],
    arms: &["match_arm"],
    arm_skip_fields: &["pattern"],
    arm_skip_kinds: &["match_pattern"],
    tries: &[],
    catches: &[],
    finallies: &[],
    returns: &["return_expression"],
    throws: &[],
    breaks: &["break_expression"],
    continues: &["continue_expression"],
    visibility,
};

fn grammar(_ext: &str) -> tree_sitter::Language {
    tree_sitter_rust::language()
}

fn visibility(node: Node<'_>, _name: &str, src: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    let modifier = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "visibility_modifier");
    match modifier.map(|m| node_text(m, src)) {
        Some("pub") => Visibility::Public,
        Some(_) => Visibility::Internal,
        None => Visibility::Private,
    }
}

/// `use` trees expand to one dotted path per leaf; `mod x;` is a sibling file
fn import_targets(node: Node<'_>, src: &[u8]) -> Vec<String> {
    match node.kind() {
        "mod_item" => {
            if node.child_by_field_name("body").is_some() {
                return Vec::new();
            }
            node.child_by_field_name("name")
                .map(|n| vec![format!("./{}", node_text(n, src))])
                .unwrap_or_default()
        }
        "use_declaration" => node
            .child_by_field_name("argument")
            .map(|arg| expand_use(node_text(arg, src)))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn expand_use(text: &str) -> Vec<String> {
    // `@` marks an alias so whitespace can be dropped safely
    let compact = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" as ", "@")
        .replace(' ', "");
    let (prefix, leaves) = match compact.find("::{") {
        Some(pos) if compact.ends_with('}') => {
            let inner = &compact[pos + 3..compact.len() - 1];
            (compact[..pos].to_string(), split_top_level(inner))
        }
        _ => (String::new(), vec![compact.clone()]),
    };

    let mut out = Vec::new();
    for leaf in leaves {
        let leaf = leaf.split('@').next().unwrap_or_default();
        let leaf = match leaf.find("::{") {
            // nested groups keep their common prefix only
            Some(pos) => &leaf[..pos],
            None => leaf,
        };
        let path = match (prefix.is_empty(), leaf) {
            (true, l) => l.to_string(),
            (false, "self") | (false, "*") => prefix.clone(),
            (false, l) => format!("{}::{}", prefix, l),
        };
        if let Some(target) = rust_path_to_target(&path) {
            if !out.contains(&target) {
                out.push(target);
            }
        }
    }
    out
}

fn split_top_level(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn rust_path_to_target(path: &str) -> Option<String> {
    let path = path.trim_end_matches("::*");
    let mut segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
    let relative = match segments.first() {
        Some(&"crate") | Some(&"self") => {
            segments.remove(0);
            false
        }
        Some(&"super") => {
            segments.remove(0);
            true
        }
        _ => false,
    };
    if segments.is_empty() {
        return None;
    }
    if relative {
        Some(format!("./{}", segments.join("/")))
    } else {
        Some(segments.join("."))
    }
}
