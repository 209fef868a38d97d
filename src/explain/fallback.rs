// Templated summaries used when no provider text is available
//
// Rendering reads only the context payload, so the same payload always gives
// the same text.

use crate::error::Result;
use crate::explain::{ContextPayload, UnitId};
use std::collections::HashMap;
use tera::{Context, Tera, Value};
use tracing::warn;

const SECTIONS: &str = r#"{% for section in sections %}{% if section.lines %}
{{ section.heading }}:
{% for line in section.lines %}- {{ line }}
{% endfor %}{% endif %}{% endfor %}{% if dropped > 0 %}
{{ dropped }} further {{ dropped | pluralize(singular="fact", plural="facts") }} omitted to fit the context budget.
{% endif %}"#;

const OVERVIEW: &str = r#"Overview of {{ title }}.
{% include "sections.txt" %}"#;

const FILE: &str = r#"{{ title }} is a {{ language }} source file.
{% include "sections.txt" %}"#;

const FUNCTION: &str = r#"{{ title }} is a {{ language }} {{ kind }}{% if location %} declared at {{ location }}{% endif %}.
{% include "sections.txt" %}"#;

/// Tera wrapper with one template per unit kind
pub struct FallbackRenderer {
    tera: Tera,
}

impl FallbackRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("sections.txt", SECTIONS),
            ("overview.txt", OVERVIEW),
            ("file.txt", FILE),
            ("function.txt", FUNCTION),
        ])?;
        tera.register_filter("pluralize", pluralize);
        Ok(Self { tera })
    }

    /// Summary text for a payload; falls back to the plain prompt if a template fails
    pub fn render(&self, payload: &ContextPayload) -> String {
        let template = match payload.unit {
            UnitId::Overview => "overview.txt",
            UnitId::File(_) => "file.txt",
            UnitId::Function(_) => "function.txt",
        };
        let rendered = Context::from_serialize(payload).and_then(|context| self.tera.render(template, &context));
        match rendered {
            Ok(text) => tidy(&text),
            Err(e) => {
                warn!(unit = %payload.unit, error = %e, "fallback template failed");
                payload.render().trim().to_string()
            }
        }
    }
}

/// Collapse blank-line runs and trailing space left by template tags
fn tidy(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && out.last().map(|l| l.is_empty()).unwrap_or(true) {
            continue;
        }
        out.push(line);
    }
    while out.last().map(|l| l.is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

fn pluralize(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let n = value.as_u64().unwrap_or(0);
    let key = if n == 1 { "singular" } else { "plural" };
    match args.get(key) {
        Some(word) => Ok(word.clone()),
        None => Err(tera::Error::msg(format!("pluralize needs a `{}` argument", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::{ContextSection, Priority};
    use crate::parser::SymbolId;

    fn payload() -> ContextPayload {
        ContextPayload {
            unit: UnitId::Function(SymbolId::from_key("abc")),
            title: "Parser.parse".to_string(),
            kind: "method".to_string(),
            language: Some("python".to_string()),
            location: Some("src/parser.py:10-20".to_string()),
            sections: vec![
                ContextSection {
                    priority: Priority::Signature,
                    heading: Priority::Signature.heading(),
                    lines: vec!["def parse(self, text)".to_string()],
                },
                ContextSection {
                    priority: Priority::Neighbors,
                    heading: Priority::Neighbors.heading(),
                    lines: Vec::new(),
                },
            ],
            dropped: 1,
        }
    }

    #[test]
    fn test_function_summary() {
        let text = FallbackRenderer::new().unwrap().render(&payload());
        assert_eq!(
            text,
            "Parser.parse is a python method declared at src/parser.py:10-20.\n\n\
             Signature:\n\
             - def parse(self, text)\n\n\
             1 further fact omitted to fit the context budget."
        );
    }

    #[test]
    fn test_render_is_reproducible() {
        let renderer = FallbackRenderer::new().unwrap();
        assert_eq!(renderer.render(&payload()), renderer.render(&payload()));
    }

    #[test]
    fn test_tidy_collapses_blank_runs() {
        assert_eq!(tidy("a\n\n\n b  \n\n"), "a\n\n b");
    }
}
