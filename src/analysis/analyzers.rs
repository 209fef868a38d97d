// Built-in analyzers producing annotation batches
//
// Each analyzer reads the finished graph and returns one batch. They share no
// state, so the pipeline runs them in parallel and leaves ordering to the merge.

use crate::analysis::annotations::{Annotation, AnnotationBatch, AnnotationKind, Severity};
use crate::analysis::graph::Graph;
use crate::config::AnalyzerConfig;
use crate::parser::{Language, Location, Symbol, SymbolId, SymbolKind};
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

/// A pass over the graph that emits annotations
pub trait Analyzer: Send + Sync {
    /// Tag recorded on every annotation
    fn name(&self) -> &'static str;

    fn analyze(&self, graph: &Graph) -> AnnotationBatch;
}

/// The analyzers switched on in the config
pub fn builtin(config: &AnalyzerConfig) -> Vec<Box<dyn Analyzer>> {
    let mut analyzers: Vec<Box<dyn Analyzer>> = Vec::new();
    if config.security {
        analyzers.push(Box::new(SecurityAnalyzer));
    }
    if config.quality {
        analyzers.push(Box::new(QualityAnalyzer));
    }
    if config.refactoring {
        analyzers.push(Box::new(RefactoringAnalyzer::default()));
    }
    analyzers
}

/// Run every analyzer concurrently; batch order is whatever finishes first
pub fn run_all(graph: &Graph, analyzers: &[Box<dyn Analyzer>]) -> Vec<AnnotationBatch> {
    analyzers
        .par_iter()
        .map(|analyzer| {
            let batch = analyzer.analyze(graph);
            debug!(analyzer = analyzer.name(), annotations = batch.len(), "analyzer finished");
            batch
        })
        .collect()
}

/// OWASP Top 10 (2021) categories the security rules map onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwaspCategory {
    BrokenAccessControl,
    CryptographicFailures,
    Injection,
    InsecureDesign,
    SecurityMisconfiguration,
    IntegrityFailures,
}

impl OwaspCategory {
    pub fn label(&self) -> &'static str {
        match self {
            OwaspCategory::BrokenAccessControl => "A01:2021 Broken Access Control",
            OwaspCategory::CryptographicFailures => "A02:2021 Cryptographic Failures",
            OwaspCategory::Injection => "A03:2021 Injection",
            OwaspCategory::InsecureDesign => "A04:2021 Insecure Design",
            OwaspCategory::SecurityMisconfiguration => "A05:2021 Security Misconfiguration",
            OwaspCategory::IntegrityFailures => "A08:2021 Software and Data Integrity Failures",
        }
    }

    fn mitigations(&self) -> &'static [&'static str] {
        match self {
            OwaspCategory::Injection => &[
                "Use parameterized queries or prepared statements",
                "Validate and sanitize all user inputs",
                "Avoid passing untrusted data to interpreters or shells",
            ],
            OwaspCategory::BrokenAccessControl => &[
                "Implement proper authorization checks",
                "Use role-based access control",
            ],
            OwaspCategory::CryptographicFailures => &[
                "Use strong, current algorithms (SHA-256 or better, AES-GCM)",
                "Keep keys and credentials out of source, load them from a secret store",
            ],
            OwaspCategory::InsecureDesign => &[
                "Keep unsafe regions small and document their invariants",
            ],
            OwaspCategory::SecurityMisconfiguration => &[
                "Keep certificate and host verification enabled",
                "Use secure defaults per environment",
            ],
            OwaspCategory::IntegrityFailures => &[
                "Never deserialize untrusted data with a general-purpose object loader",
                "Prefer data-only formats with schema validation",
            ],
        }
    }
}

struct SecurityRule {
    id: &'static str,
    title: &'static str,
    severity: Severity,
    category: OwaspCategory,
    /// Restrict to these languages; empty means all
    languages: &'static [Language],
    pattern: Regex,
}

const RULE_TABLE: &[(&str, &str, Severity, OwaspCategory, &[Language], &str)] = &[
    (
        "dynamic-eval",
        "Dynamic code execution",
        Severity::High,
        OwaspCategory::Injection,
        &[Language::Python, Language::JavaScript, Language::TypeScript],
        r"(?:^|[^\w.])(?:eval|exec|new\s+Function)\s*\(",
    ),
    (
        "shell-exec",
        "Shell command execution",
        Severity::High,
        OwaspCategory::Injection,
        &[],
        r"\b(?:os\.system|os\.popen|subprocess\.(?:call|run|Popen|check_output)|child_process\.exec\w*|execSync|exec\.Command|Runtime\.getRuntime\(\)\.exec|popen|system)\s*\(",
    ),
    (
        "sql-string-build",
        "SQL built from string concatenation or formatting",
        Severity::High,
        OwaspCategory::Injection,
        &[],
        r#"(?i)(?:["'`]\s*(?:select\s|insert\s+into|update\s+\w+\s+set|delete\s+from)[^"'`]*["'`]\s*(?:\+|%\s|\.format\()|\bf["']\s*(?:select\s|insert\s+into|update\s|delete\s+from)[^"']*\{|format!\(\s*"\s*(?:select\s|insert\s+into|update\s|delete\s+from)|Sprintf\(\s*"\s*(?:select\s|insert\s+into|update\s|delete\s+from))"#,
    ),
    (
        "hardcoded-secret",
        "Hard-coded credential",
        Severity::High,
        OwaspCategory::CryptographicFailures,
        &[],
        r#"(?i)\b(?:password|passwd|secret|api_?key|access_?token|private_?key)\w*\s*(?::=|[:=])\s*["'][^"'\s]{4,}["']"#,
    ),
    (
        "weak-hash",
        "Weak hash algorithm",
        Severity::Medium,
        OwaspCategory::CryptographicFailures,
        &[],
        r#"(?i)(?:hashlib\.(?:md5|sha1)\s*\(|createHash\(\s*["'](?:md5|sha1)["']|getInstance\(\s*"(?:md5|sha-?1)"|\bmd5::|\bMd5::new|\bmd5\.New\(|\bsha1\.New\(|\bMD5_Init\b)"#,
    ),
    (
        "unsafe-deserialization",
        "Deserialization of untrusted data",
        Severity::High,
        OwaspCategory::IntegrityFailures,
        &[],
        r"\b(?:pickle\.loads?|marshal\.loads?|yaml\.load|ObjectInputStream)\s*\(",
    ),
    (
        "tls-verification-off",
        "Certificate verification disabled",
        Severity::Medium,
        OwaspCategory::SecurityMisconfiguration,
        &[],
        r"(?:verify\s*=\s*False|InsecureSkipVerify:\s*true|danger_accept_invalid_certs\(\s*true\s*\)|rejectUnauthorized:\s*false)",
    ),
    (
        "unsafe-block",
        "Unsafe block",
        Severity::Low,
        OwaspCategory::InsecureDesign,
        &[Language::Rust],
        r"\bunsafe\s*\{",
    ),
];

static RULES: LazyLock<Vec<SecurityRule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .map(|&(id, title, severity, category, languages, pattern)| SecurityRule {
            id,
            title,
            severity,
            category,
            languages,
            pattern: Regex::new(pattern).expect("static rule pattern"),
        })
        .collect()
});

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    (trimmed.starts_with('#') && !trimmed.starts_with("#[") && !trimmed.starts_with("#include"))
        || trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
}

/// Innermost callable declared in `path` that spans `line`, else the module
fn owner_of<'g>(graph: &'g Graph, path: &str, line: usize) -> Option<&'g Symbol> {
    let symbols: Vec<&Symbol> = graph
        .symbols_in(path)
        .iter()
        .filter_map(|id| graph.symbol(id))
        .collect();
    symbols
        .iter()
        .filter(|s| s.kind.is_callable() && s.location.start_line <= line && line <= s.location.end_line)
        .min_by_key(|s| (s.location.span(), s.id.clone()))
        .or_else(|| symbols.iter().find(|s| s.kind == SymbolKind::Module))
        .copied()
}

/// Regex rule scan plus one-hop propagation along call edges
pub struct SecurityAnalyzer;

impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn analyze(&self, graph: &Graph) -> AnnotationBatch {
        let mut batch = AnnotationBatch::new(self.name());
        let mut worst: BTreeMap<SymbolId, (Severity, &'static str)> = BTreeMap::new();

        for file in graph.files.values() {
            for (index, line) in file.text.lines().enumerate() {
                if is_comment(line) {
                    continue;
                }
                let number = index + 1;
                for rule in RULES.iter() {
                    if !rule.languages.is_empty() && !rule.languages.contains(&file.language) {
                        continue;
                    }
                    if !rule.pattern.is_match(line) {
                        continue;
                    }
                    let Some(owner) = owner_of(graph, &file.path, number) else {
                        continue;
                    };

                    let mut mitigations: Vec<String> =
                        rule.category.mitigations().iter().map(|m| m.to_string()).collect();
                    if rule.severity >= Severity::High {
                        mitigations.push("Add a regression test that exercises the hostile input".to_string());
                    }
                    batch.push(
                        Annotation::new(
                            owner.id.as_str(),
                            AnnotationKind::SecurityFinding,
                            rule.severity,
                            self.name(),
                            format!("{} ({}) in {}", rule.title, rule.id, owner.qualified_name),
                        )
                        .with_category(rule.category.label())
                        .with_location(Location::line(&file.path, number))
                        .with_mitigations(mitigations),
                    );

                    let slot = worst.entry(owner.id.clone()).or_insert((rule.severity, rule.title));
                    if rule.severity > slot.0 {
                        *slot = (rule.severity, rule.title);
                    }
                }
            }
        }

        for edge in graph.call_edges().filter(|e| !e.target.is_external()) {
            let Some(&(severity, title)) = worst.get(&edge.target) else {
                continue;
            };
            if severity < Severity::High {
                continue;
            }
            let callee = graph
                .symbol(&edge.target)
                .map(|s| s.qualified_name.as_str())
                .unwrap_or_default();
            batch.push(
                Annotation::new(
                    edge.id.as_str(),
                    AnnotationKind::SecurityFinding,
                    severity.lowered(),
                    self.name(),
                    format!("Calls {} which contains: {}", callee, title),
                )
                .with_category("propagation")
                .with_location(edge.location.clone()),
            );
        }
        batch
    }
}

/// Complexity and length score per callable
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    fn grade(complexity: usize, lines: usize) -> Severity {
        if complexity >= 20 || lines >= 150 {
            Severity::High
        } else if complexity >= 10 || lines >= 80 {
            Severity::Medium
        } else if complexity >= 5 || lines >= 40 {
            Severity::Low
        } else {
            Severity::Info
        }
    }
}

impl Analyzer for QualityAnalyzer {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn analyze(&self, graph: &Graph) -> AnnotationBatch {
        let mut batch = AnnotationBatch::new(self.name());
        for (id, cfg) in &graph.cfgs {
            let Some(symbol) = graph.symbol(id) else {
                continue;
            };
            let complexity = cfg.cyclomatic_complexity();
            let lines = symbol.location.span();
            let mut message = format!("cyclomatic complexity {}, {} lines", complexity, lines);
            if cfg.approximate {
                message.push_str(" (approximate)");
            }
            batch.push(
                Annotation::new(id.as_str(), AnnotationKind::QualityScore, Self::grade(complexity, lines), self.name(), message)
                    .with_category("maintainability")
                    .with_location(symbol.location.clone()),
            );
        }
        batch
    }
}

/// Structural refactoring suggestions
pub struct RefactoringAnalyzer {
    pub long_function_lines: usize,
    pub max_complexity: usize,
    pub god_file_symbols: usize,
}

impl Default for RefactoringAnalyzer {
    fn default() -> Self {
        Self {
            long_function_lines: 60,
            max_complexity: 10,
            god_file_symbols: 40,
        }
    }
}

impl Analyzer for RefactoringAnalyzer {
    fn name(&self) -> &'static str {
        "refactoring"
    }

    fn analyze(&self, graph: &Graph) -> AnnotationBatch {
        let mut batch = AnnotationBatch::new(self.name());

        for (id, cfg) in &graph.cfgs {
            let Some(symbol) = graph.symbol(id) else {
                continue;
            };
            let lines = symbol.location.span();
            if lines > self.long_function_lines {
                let severity = if lines > self.long_function_lines * 2 { Severity::Medium } else { Severity::Low };
                batch.push(
                    Annotation::new(
                        id.as_str(),
                        AnnotationKind::RefactorSuggestion,
                        severity,
                        self.name(),
                        format!("{} spans {} lines; extract smaller functions", symbol.qualified_name, lines),
                    )
                    .with_category("long-function"),
                );
            }
            let decisions = cfg.decision_points().len();
            let complexity = cfg.cyclomatic_complexity();
            if complexity > self.max_complexity {
                batch.push(
                    Annotation::new(
                        id.as_str(),
                        AnnotationKind::RefactorSuggestion,
                        Severity::Medium,
                        self.name(),
                        format!(
                            "{} has {} decision points (complexity {}); flatten with early returns or split by case",
                            symbol.qualified_name, decisions, complexity
                        ),
                    )
                    .with_category("deep-branching"),
                );
            }
        }

        for file in graph.files.values() {
            let Some(module) = &file.module else {
                continue;
            };
            let declared = file.symbols.len().saturating_sub(1);
            if declared > self.god_file_symbols {
                batch.push(
                    Annotation::new(
                        module.as_str(),
                        AnnotationKind::RefactorSuggestion,
                        Severity::Low,
                        self.name(),
                        format!("{} declares {} symbols; split it by responsibility", file.path, declared),
                    )
                    .with_category("god-file"),
                );
            }
        }
        batch
    }
}
