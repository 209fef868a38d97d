// Language adapters: one parse capability, many grammars

pub mod ast;
mod c;
mod go;
mod java;
mod javascript;
mod python;
mod rust;
pub mod treesitter;

pub use ast::*;
pub use treesitter::{LanguageSpec, TreeSitterAdapter};

use std::time::Duration;

/// Per-file budget chosen by the caller
#[derive(Debug, Clone, Copy)]
pub struct ParseBudget {
    pub timeout: Duration,
}

impl ParseBudget {
    pub fn from_millis(ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(ms),
        }
    }
}

impl Default for ParseBudget {
    fn default() -> Self {
        Self::from_millis(5_000)
    }
}

/// Turns one language's source text into symbols and references.
///
/// Implementations must be pure for identical input and must return within
/// the budget they are handed: a parse that cannot finish yields a `Fatal`
/// status instead of blocking.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Extensions (lowercase, no dot) this adapter claims
    fn extensions(&self) -> &'static [&'static str];

    fn parse(&self, unit: &SourceUnit, budget: &ParseBudget) -> ParseOutput;
}

/// Dispatch table from files to adapters
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with every built-in tree-sitter adapter
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for spec in treesitter::builtin_specs() {
            registry.register(Box::new(TreeSitterAdapter::new(spec)));
        }
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn LanguageAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Languages with at least one adapter, sorted
    pub fn languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.adapters.iter().map(|a| a.language()).collect();
        langs.sort();
        langs.dedup();
        langs
    }

    /// Pick a language by extension, falling back to a shebang line
    pub fn detect(&self, path: &str, text: &str) -> Option<Language> {
        let ext = file_extension(path);
        if !ext.is_empty() {
            return self
                .adapters
                .iter()
                .find(|a| a.extensions().contains(&ext.as_str()))
                .map(|a| a.language());
        }

        let first_line = text.lines().next()?;
        let language = Language::from_shebang(first_line)?;
        self.adapters
            .iter()
            .any(|a| a.language() == language)
            .then_some(language)
    }

    /// Adapter for a unit: exact extension match first, then any adapter of its language
    pub fn adapter_for(&self, unit: &SourceUnit) -> Option<&dyn LanguageAdapter> {
        let ext = unit.extension();
        self.adapters
            .iter()
            .find(|a| a.language() == unit.language && a.extensions().contains(&ext.as_str()))
            .or_else(|| self.adapters.iter().find(|a| a.language() == unit.language))
            .map(|a| a.as_ref())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;

    impl LanguageAdapter for NullAdapter {
        fn language(&self) -> Language {
            Language::Python
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["py"]
        }

        fn parse(&self, unit: &SourceUnit, _budget: &ParseBudget) -> ParseOutput {
            ParseOutput::fatal(unit, "null adapter")
        }
    }

    #[test]
    fn test_builtin_registry_covers_languages() {
        let registry = AdapterRegistry::with_builtin();
        let langs = registry.languages();
        assert!(langs.contains(&Language::Rust));
        assert!(langs.contains(&Language::Python));
        assert!(langs.contains(&Language::TypeScript));
        assert!(langs.contains(&Language::Cpp));
        assert_eq!(langs.len(), 8);
    }

    #[test]
    fn test_detect_by_extension() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(registry.detect("src/main.rs", ""), Some(Language::Rust));
        assert_eq!(registry.detect("web/app.tsx", ""), Some(Language::TypeScript));
        assert_eq!(registry.detect("README.md", ""), None);
    }

    #[test]
    fn test_detect_by_shebang() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(
            registry.detect("bin/tool", "#!/usr/bin/env python3\nprint(1)\n"),
            Some(Language::Python)
        );
        assert_eq!(registry.detect("bin/run", "#!/bin/sh\necho hi\n"), None);
    }

    #[test]
    fn test_empty_registry_detects_nothing() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.detect("a.py", ""), None);
    }

    #[test]
    fn test_custom_adapter_dispatch() {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(NullAdapter));
        let unit = SourceUnit::new("a.py", Language::Python, "x = 1\n");
        let adapter = registry.adapter_for(&unit).unwrap();
        let out = adapter.parse(&unit, &ParseBudget::default());
        assert_eq!(out.status.label(), "fatal");
    }

    #[test]
    fn test_tsx_uses_typescript_adapter() {
        let registry = AdapterRegistry::with_builtin();
        let unit = SourceUnit::new("App.tsx", Language::TypeScript, "");
        let adapter = registry.adapter_for(&unit).unwrap();
        assert_eq!(adapter.language(), Language::TypeScript);
        assert!(adapter.extensions().contains(&"tsx"));
    }
}
