//! AI context assembly and enrichment with a deterministic fallback.
//!
//! Each unit (the project, a file, optionally a function) gets a bounded
//! context payload built from the annotated graph. Providers turn payloads
//! into text; any timeout, failure or malformed answer falls back to a
//! templated summary of the same payload, so every requested unit ends up
//! with exactly one result.

pub mod fallback;
pub mod provider;

pub use fallback::FallbackRenderer;
pub use provider::{EnrichmentProvider, EnrichmentRequest, MockProvider, OllamaProvider, OpenAiProvider, ProviderError};

use crate::analysis::{AnnotatedGraph, Annotation, AnnotationKind, RunReport, Severity};
use crate::config::{EnrichmentConfig, EnrichmentUnits, ProviderKind};
use crate::error::Result;
use crate::parser::{ReferenceKind, SymbolId, SymbolKind};
use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What an enrichment result describes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitId {
    Overview,
    File(String),
    Function(SymbolId),
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Overview => f.write_str("overview"),
            UnitId::File(path) => write!(f, "file:{}", path),
            UnitId::Function(id) => write!(f, "function:{}", id),
        }
    }
}

impl Serialize for UnitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Context sections, most important first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Signature,
    Neighbors,
    Security,
    Transitive,
    Quality,
}

impl Priority {
    pub fn heading(&self) -> &'static str {
        match self {
            Priority::Signature => "Signature",
            Priority::Neighbors => "Callers and callees",
            Priority::Security => "Security findings",
            Priority::Transitive => "Wider neighbourhood",
            Priority::Quality => "Quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSection {
    pub priority: Priority,
    pub heading: &'static str,
    pub lines: Vec<String>,
}

/// Size-bounded context for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPayload {
    pub unit: UnitId,
    pub title: String,
    /// `project`, `file` or the symbol kind
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub sections: Vec<ContextSection>,
    /// Lines removed to fit the budget
    pub dropped: usize,
}

impl ContextPayload {
    fn new(unit: UnitId, title: impl Into<String>, kind: impl Into<String>) -> Self {
        let sections = [
            Priority::Signature,
            Priority::Neighbors,
            Priority::Security,
            Priority::Transitive,
            Priority::Quality,
        ]
        .into_iter()
        .map(|priority| ContextSection {
            priority,
            heading: priority.heading(),
            lines: Vec::new(),
        })
        .collect();
        Self {
            unit,
            title: title.into(),
            kind: kind.into(),
            language: None,
            location: None,
            sections,
            dropped: 0,
        }
    }

    fn section(&mut self, priority: Priority) -> &mut Vec<String> {
        // Sections are created in priority order
        &mut self.sections[priority as usize].lines
    }

    pub fn lines(&self, priority: Priority) -> &[String] {
        &self.sections[priority as usize].lines
    }

    /// Prompt text: title, then each non-empty section as a bullet list
    pub fn render(&self) -> String {
        let mut out = format!("# {}\n", self.title);
        for section in self.sections.iter().filter(|s| !s.lines.is_empty()) {
            out.push_str("## ");
            out.push_str(section.heading);
            out.push('\n');
            for line in &section.lines {
                out.push_str("- ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    pub fn size(&self) -> usize {
        self.render().chars().count()
    }

    /// Drop lines, lowest priority and last line first, until the render fits
    pub fn fit(&mut self, budget: usize) {
        while self.size() > budget {
            let victim = self
                .sections
                .iter_mut()
                .rev()
                .find(|s| s.priority != Priority::Signature && !s.lines.is_empty());
            if let Some(section) = victim {
                section.lines.pop();
                self.dropped += 1;
                continue;
            }

            let signature = self.section(Priority::Signature);
            if signature.len() > 1 {
                signature.pop();
                self.dropped += 1;
                continue;
            }

            // One signature line left and still too big: shorten it, then the title
            let excess = self.size() - budget;
            let signature = self.section(Priority::Signature);
            if let Some(line) = signature.first_mut() {
                let keep = line.chars().count().saturating_sub(excess + 3);
                if keep > 0 {
                    *line = format!("{}...", line.chars().take(keep).collect::<String>());
                    continue;
                }
                signature.clear();
                continue;
            }
            let keep = self.title.chars().count().saturating_sub(excess);
            self.title = self.title.chars().take(keep).collect();
            break;
        }
    }
}

fn annotation_line(annotation: &Annotation) -> String {
    match &annotation.category {
        Some(category) => format!("{}: {} [{}]", annotation.severity, annotation.message, category),
        None => format!("{}: {}", annotation.severity, annotation.message),
    }
}

/// Sort findings worst-first so truncation drops the mildest
fn ranked<'a>(annotations: impl Iterator<Item = &'a Annotation>) -> Vec<String> {
    let mut list: Vec<&Annotation> = annotations.collect();
    list.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.cmp(b)));
    list.into_iter().map(annotation_line).collect()
}

fn is_quality(annotation: &Annotation) -> bool {
    matches!(annotation.kind, AnnotationKind::QualityScore | AnnotationKind::RefactorSuggestion)
}

fn is_security(annotation: &Annotation) -> bool {
    annotation.kind == AnnotationKind::SecurityFinding
}

/// Every unit a run enriches, in order
pub fn units(graph: &AnnotatedGraph, granularity: EnrichmentUnits) -> Vec<UnitId> {
    let mut out = vec![UnitId::Overview];
    out.extend(graph.graph.files.keys().map(|p| UnitId::File(p.clone())));
    if granularity == EnrichmentUnits::Functions {
        out.extend(
            graph
                .graph
                .symbols
                .values()
                .filter(|s| s.kind.is_callable())
                .map(|s| UnitId::Function(s.id.clone())),
        );
    }
    out.sort();
    out
}

/// Build the bounded context for one unit; `None` if the unit is unknown
pub fn assemble(unit: &UnitId, graph: &AnnotatedGraph, project: &str, budget: usize) -> Option<ContextPayload> {
    let mut payload = match unit {
        UnitId::Overview => assemble_overview(graph, project),
        UnitId::File(path) => assemble_file(graph, path)?,
        UnitId::Function(id) => assemble_function(graph, id)?,
    };
    payload.fit(budget);
    Some(payload)
}

fn display_name(graph: &AnnotatedGraph, id: &SymbolId) -> String {
    match graph.graph.symbol(id) {
        Some(s) => format!("{} ({})", s.qualified_name, s.path()),
        None => id.to_string(),
    }
}

fn assemble_function(graph: &AnnotatedGraph, id: &SymbolId) -> Option<ContextPayload> {
    let g = &graph.graph;
    let symbol = g.symbol(id)?;
    let mut payload = ContextPayload::new(UnitId::Function(id.clone()), &symbol.qualified_name, symbol.kind.as_str());
    payload.language = Some(symbol.language.as_str().to_string());
    payload.location = Some(format!(
        "{}:{}-{}",
        symbol.path(),
        symbol.location.start_line,
        symbol.location.end_line
    ));

    let signature = payload.section(Priority::Signature);
    signature.push(
        symbol
            .signature
            .clone()
            .unwrap_or_else(|| format!("{} {}", symbol.kind.as_str(), symbol.qualified_name)),
    );
    if let Some(doc) = symbol.doc.as_deref().and_then(|d| d.lines().next()) {
        signature.push(doc.trim().to_string());
    }

    let callers = g.callers_of(id);
    let callees = g.callees_of(id);
    let mut neighbors: Vec<String> = callees
        .iter()
        .map(|c| format!("calls {}", display_name(graph, c)))
        .collect();
    neighbors.extend(callers.iter().map(|c| format!("called by {}", display_name(graph, c))));
    let external: BTreeSet<&str> = g
        .edges_from(id)
        .iter()
        .filter(|e| e.kind == ReferenceKind::Calls)
        .filter_map(|e| e.unresolved.as_ref().map(|u| u.target_name.as_str()))
        .collect();
    neighbors.extend(external.into_iter().map(|name| format!("calls {} (unresolved)", name)));
    *payload.section(Priority::Neighbors) = neighbors;

    *payload.section(Priority::Security) = ranked(graph.for_symbol(id).iter().filter(|a| is_security(a)));

    *payload.section(Priority::Transitive) = g
        .neighbors_within(id, 2)
        .into_iter()
        .filter(|(_, distance)| *distance == 2)
        .map(|(n, _)| format!("two calls away: {}", display_name(graph, &n)))
        .collect();

    *payload.section(Priority::Quality) = ranked(graph.for_symbol(id).iter().filter(|a| is_quality(a)));
    Some(payload)
}

fn assemble_file(graph: &AnnotatedGraph, path: &str) -> Option<ContextPayload> {
    let g = &graph.graph;
    let file = g.files.get(path)?;
    let mut payload = ContextPayload::new(UnitId::File(path.to_string()), path, "file");
    payload.language = Some(file.language.as_str().to_string());
    payload.location = Some(path.to_string());

    let signature = payload.section(Priority::Signature);
    signature.push(format!(
        "{} lines, parse status {}",
        file.line_count,
        file.status.label()
    ));
    for symbol in file.symbols.iter().filter_map(|id| g.symbol(id)) {
        if symbol.kind == SymbolKind::Module {
            continue;
        }
        signature.push(match &symbol.signature {
            Some(sig) => format!("{} (line {})", sig, symbol.location.start_line),
            None => format!("{} {} (line {})", symbol.kind.as_str(), symbol.qualified_name, symbol.location.start_line),
        });
    }

    let module = file.module.clone();
    let path_of = |id: &SymbolId| -> String {
        if id.is_external() {
            "external code".to_string()
        } else {
            g.symbol(id).map(|s| s.path().to_string()).unwrap_or_else(|| id.to_string())
        }
    };
    let mut direct: BTreeSet<SymbolId> = BTreeSet::new();
    let mut neighbors = Vec::new();
    if let Some(module) = &module {
        for dep in g.dependencies_of(module).filter(|d| &d.source == module) {
            direct.insert(dep.target.clone());
            let kinds: Vec<&str> = dep.kinds.iter().map(|k| k.as_str()).collect();
            neighbors.push(format!("depends on {} ({}, {} references)", path_of(&dep.target), kinds.join("/"), dep.weight));
        }
        for dep in g.dependencies_of(module).filter(|d| &d.target == module) {
            direct.insert(dep.source.clone());
            neighbors.push(format!("used by {}", path_of(&dep.source)));
        }
    }
    *payload.section(Priority::Neighbors) = neighbors;

    let annotations = graph.for_file(path);
    *payload.section(Priority::Security) = ranked(annotations.iter().copied().filter(|a| is_security(a)));

    let mut transitive: BTreeSet<String> = BTreeSet::new();
    for hop in direct.iter().filter(|id| !id.is_external()) {
        for dep in g.dependencies_of(hop).filter(|d| &d.source == hop && !d.target.is_external()) {
            if Some(&dep.target) != module.as_ref() && !direct.contains(&dep.target) {
                transitive.insert(format!("indirectly depends on {}", path_of(&dep.target)));
            }
        }
    }
    *payload.section(Priority::Transitive) = transitive.into_iter().collect();

    *payload.section(Priority::Quality) = ranked(annotations.iter().copied().filter(|a| is_quality(a)));
    Some(payload)
}

fn assemble_overview(graph: &AnnotatedGraph, project: &str) -> ContextPayload {
    let g = &graph.graph;
    let stats = g.stats();
    let mut payload = ContextPayload::new(UnitId::Overview, project, "project");

    let mut languages: BTreeMap<&str, usize> = BTreeMap::new();
    for file in g.files.values() {
        *languages.entry(file.language.as_str()).or_default() += 1;
    }
    let signature = payload.section(Priority::Signature);
    signature.push(format!("{} files, {} symbols", stats.files, stats.symbols));
    signature.extend(languages.iter().map(|(lang, n)| format!("{}: {} files", lang, n)));

    let mut incoming: BTreeMap<&SymbolId, usize> = BTreeMap::new();
    for dep in g.dependencies.iter().filter(|d| !d.target.is_external()) {
        *incoming.entry(&dep.target).or_default() += dep.weight;
    }
    let mut hubs: Vec<(&SymbolId, usize)> = incoming.into_iter().collect();
    hubs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    *payload.section(Priority::Neighbors) = hubs
        .into_iter()
        .take(10)
        .filter_map(|(id, weight)| g.symbol(id).map(|s| format!("{} is referenced {} times", s.path(), weight)))
        .collect();

    let mut severities: BTreeMap<Severity, usize> = BTreeMap::new();
    for annotation in graph.annotations.iter().filter(|a| is_security(a)) {
        *severities.entry(annotation.severity).or_default() += 1;
    }
    *payload.section(Priority::Security) = severities
        .into_iter()
        .rev()
        .map(|(severity, n)| format!("{} {} findings", n, severity))
        .collect();

    *payload.section(Priority::Transitive) = g
        .cycles()
        .into_iter()
        .map(|cycle| {
            let names: Vec<String> = cycle
                .iter()
                .filter_map(|id| g.symbol(id).map(|s| s.qualified_name.clone()))
                .collect();
            format!("call cycle: {}", names.join(" -> "))
        })
        .collect();

    *payload.section(Priority::Quality) = vec![
        format!("{} call edges", stats.call_edges),
        format!("{} unresolved references", stats.unresolved),
        format!("{} ambiguous edges", stats.ambiguous),
    ];
    payload
}

/// Outcome of enriching one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentResult {
    Generated { text: String, provider: String },
    Fallback { text: String, reason: String },
}

impl EnrichmentResult {
    pub fn text(&self) -> &str {
        match self {
            EnrichmentResult::Generated { text, .. } | EnrichmentResult::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EnrichmentResult::Fallback { .. })
    }
}

enum Backend {
    Disabled,
    Unavailable(ProviderError),
    Ready(Arc<dyn EnrichmentProvider>),
}

/// Runs enrichment for every unit with bounded concurrency
pub struct Enricher {
    backend: Backend,
    timeout: Duration,
    concurrency: usize,
    budget: usize,
    granularity: EnrichmentUnits,
    fallback: FallbackRenderer,
}

impl Enricher {
    /// Build the configured provider; a provider that cannot start makes every unit fall back
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let backend = if !config.enabled {
            Backend::Disabled
        } else {
            let timeout = Duration::from_millis(config.timeout_ms);
            let built: std::result::Result<Arc<dyn EnrichmentProvider>, ProviderError> = match config.provider {
                ProviderKind::Mock => Ok(Arc::new(MockProvider)),
                ProviderKind::Ollama => OllamaProvider::new(config.api_url.as_deref(), &config.model, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn EnrichmentProvider>),
                ProviderKind::OpenAI => {
                    OpenAiProvider::new(config.api_url.as_deref(), &config.model, config.api_key.clone(), timeout)
                        .map(|p| Arc::new(p) as Arc<dyn EnrichmentProvider>)
                }
            };
            match built {
                Ok(provider) => Backend::Ready(provider),
                Err(e) => {
                    warn!(error = %e, "enrichment provider unavailable, using templated summaries");
                    Backend::Unavailable(e)
                }
            }
        };
        Self::with_backend(config, backend)
    }

    /// Use a caller-supplied provider regardless of `enabled`
    pub fn with_provider(config: &EnrichmentConfig, provider: Arc<dyn EnrichmentProvider>) -> Result<Self> {
        Self::with_backend(config, Backend::Ready(provider))
    }

    fn with_backend(config: &EnrichmentConfig, backend: Backend) -> Result<Self> {
        Ok(Self {
            backend,
            timeout: Duration::from_millis(config.timeout_ms),
            concurrency: config.concurrency.max(1),
            budget: config.budget_chars,
            granularity: config.units,
            fallback: FallbackRenderer::new()?,
        })
    }

    /// Enrich one payload; never fails, at worst falls back
    pub async fn enrich(&self, payload: &ContextPayload) -> EnrichmentResult {
        let provider = match &self.backend {
            Backend::Disabled => return self.fall_back(payload, "enrichment disabled".to_string()),
            Backend::Unavailable(e) => return self.fall_back(payload, e.to_string()),
            Backend::Ready(provider) => provider,
        };

        let request = EnrichmentRequest {
            unit: payload.unit.to_string(),
            prompt: payload.render(),
        };
        let millis = self.timeout.as_millis() as u64;
        let outcome = match tokio::time::timeout(self.timeout, provider.generate(&request)).await {
            Err(_) => Err(ProviderError::Timeout(millis)),
            Ok(Err(ProviderError::Timeout(_))) => Err(ProviderError::Timeout(millis)),
            Ok(result) => result.and_then(validate),
        };

        match outcome {
            Ok(text) => EnrichmentResult::Generated {
                text,
                provider: provider.tag().to_string(),
            },
            Err(e) => {
                debug!(unit = %payload.unit, error = %e, "enrichment fell back");
                self.fall_back(payload, e.to_string())
            }
        }
    }

    fn fall_back(&self, payload: &ContextPayload, reason: String) -> EnrichmentResult {
        EnrichmentResult::Fallback {
            text: self.fallback.render(payload),
            reason,
        }
    }

    /// Enrich every unit of the graph; results are keyed and sorted by unit
    pub async fn enrich_all(
        &self,
        graph: &AnnotatedGraph,
        project: &str,
    ) -> (BTreeMap<UnitId, EnrichmentResult>, RunReport) {
        let payloads: Vec<ContextPayload> = units(graph, self.granularity)
            .iter()
            .filter_map(|unit| assemble(unit, graph, project, self.budget))
            .collect();
        info!(units = payloads.len(), concurrency = self.concurrency, "enriching units");

        let results: BTreeMap<UnitId, EnrichmentResult> = stream::iter(payloads)
            .map(|payload| async move {
                let result = self.enrich(&payload).await;
                (payload.unit, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RunReport::new();
        if matches!(self.backend, Backend::Disabled) {
            return (results, report);
        }
        for (unit, result) in &results {
            if let EnrichmentResult::Fallback { reason, .. } = result {
                report.enrichment(unit.to_string(), reason.clone());
            }
        }
        if !report.is_empty() {
            warn!(fallbacks = report.len(), "some units used templated summaries");
        }
        (results, report)
    }

    /// Blocking wrapper that owns a runtime for the duration of the call
    pub fn enrich_all_blocking(
        &self,
        graph: &AnnotatedGraph,
        project: &str,
    ) -> Result<(BTreeMap<UnitId, EnrichmentResult>, RunReport)> {
        let runtime = tokio::runtime::Runtime::new()?;
        Ok(runtime.block_on(self.enrich_all(graph, project)))
    }
}

/// Reject empty or control-character answers
fn validate(text: String) -> std::result::Result<String, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Malformed("empty response".to_string()));
    }
    if trimmed.chars().any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r') {
        return Err(ProviderError::Malformed("response contains control characters".to_string()));
    }
    Ok(trimmed.to_string())
}
