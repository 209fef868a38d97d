// Analysis pipeline: discovery, extraction, graph building and annotation

pub mod analyzers;
pub mod annotations;
pub mod cfg;
pub mod graph;
pub mod report;
pub mod resolve;
pub mod symbols;

pub use analyzers::{Analyzer, QualityAnalyzer, RefactoringAnalyzer, SecurityAnalyzer};
pub use annotations::{AnnotatedGraph, Annotation, AnnotationBatch, AnnotationKind, AnnotationSet, Severity};
pub use cfg::{BasicBlock, BlockKind, CfgEdge, CfgEdgeKind, ControlFlowGraph};
pub use graph::{DependencyEdge, Edge, Graph, GraphStats, UnresolvedReference};
pub use report::{RunDiagnostic, RunReport};
pub use symbols::{FileRecord, SymbolTable};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::{AdapterRegistry, Diagnostic, Language, ParseBudget, SourceUnit};
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into
const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    "target",
];

/// Everything the analysis half of a run produces
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Project name, from config or the root directory
    pub project: String,
    pub graph: AnnotatedGraph,
    /// Recoverable problems gathered so far, normalized
    pub report: RunReport,
}

/// Orchestrates discovery, parsing, resolution and analyzers
pub struct Pipeline {
    config: Config,
    registry: AdapterRegistry,
    analyzers: Vec<Box<dyn Analyzer>>,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    verbose: bool,
}

impl Pipeline {
    /// Create a pipeline with the built-in adapters and the configured analyzers
    pub fn new(config: Config) -> Result<Self> {
        let analyzers = analyzers::builtin(&config.analyzers);
        Self::with_parts(config, AdapterRegistry::with_builtin(), analyzers)
    }

    /// Create a pipeline from explicit parts
    pub fn with_parts(
        config: Config,
        registry: AdapterRegistry,
        analyzers: Vec<Box<dyn Analyzer>>,
    ) -> Result<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(Error::NoAdapters("any language".to_string()));
        }
        let include = compile(&config.analysis.include)?;
        let exclude = compile(&config.analysis.exclude)?;
        Ok(Self {
            config,
            registry,
            analyzers,
            include,
            exclude,
            verbose: false,
        })
    }

    /// Show a progress bar while reading files
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run everything up to and including the annotation merge
    pub fn analyze(&self, root: &Path) -> Result<Analysis> {
        let root = check_root(root)?;
        let project = self.project_name(&root);
        info!(root = %root.display(), project = %project, "starting analysis");

        let (units, mut report) = self.discover(&root)?;
        info!(files = units.len(), "discovered source files");

        let budget = ParseBudget::from_millis(self.config.analysis.parse_timeout_ms);
        let (table, parse_report) =
            symbols::extract(&units, &self.registry, budget, self.config.analysis.threads)?;
        report.extend(parse_report);

        let graph = Graph::build(&table, self.config.analysis.max_edges, &report)?;
        let problems = graph.validate();
        if !problems.is_empty() {
            return Err(Error::Runtime(format!("inconsistent graph: {}", problems.join("; "))));
        }

        let batches = analyzers::run_all(&graph, &self.analyzers);
        let (graph, merge_report) = annotations::merge(graph, batches);
        report.extend(merge_report);
        report.normalize();

        if !report.is_empty() {
            warn!(diagnostics = report.len(), "analysis finished with recoverable problems");
        }
        Ok(Analysis {
            project,
            graph,
            report,
        })
    }

    /// Walk `root` and read every file some adapter understands.
    ///
    /// Unreadable and oversized files become per-file diagnostics. Going past
    /// `max_files` is fatal.
    pub fn discover(&self, root: &Path) -> Result<(Vec<SourceUnit>, RunReport)> {
        let mut report = RunReport::new();
        let mut candidates: Vec<(PathBuf, String)> = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| relative(root, p)).unwrap_or_default();
                    report.per_file(&Diagnostic::new(path, 0, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative(root, entry.path());
            if self.should_exclude(&rel) {
                continue;
            }
            candidates.push((entry.into_path(), rel));
            if candidates.len() > self.config.analysis.max_files {
                return Err(Error::exhausted(
                    "discovery",
                    format!("max_files = {}", self.config.analysis.max_files),
                    report.clone(),
                ));
            }
        }

        let progress = self.verbose.then(|| progress_bar(candidates.len()));
        let mut units = Vec::new();
        for (path, rel) in candidates {
            if let Some(pb) = &progress {
                pb.set_message(rel.clone());
                pb.inc(1);
            }
            match self.read_unit(&path, &rel) {
                Ok(Some(unit)) => units.push(unit),
                Ok(None) => {}
                Err(message) => {
                    warn!(path = %rel, %message, "skipping file");
                    report.per_file(&Diagnostic::new(&rel, 0, message));
                }
            }
        }
        if let Some(pb) = progress {
            pb.finish_with_message("Reading complete");
        }

        Ok((units, report))
    }

    fn read_unit(&self, path: &Path, rel: &str) -> std::result::Result<Option<SourceUnit>, String> {
        // Known-but-unsupported extensions are skipped without reading
        let has_extension = !crate::parser::file_extension(rel).is_empty();
        if has_extension && self.registry.detect(rel, "").is_none() {
            return Ok(None);
        }

        let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
        if metadata.len() > self.config.analysis.max_file_bytes {
            return Err(format!(
                "file is {} bytes, over the {} byte limit",
                metadata.len(),
                self.config.analysis.max_file_bytes
            ));
        }

        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) if !has_extension => return Ok(None),
            Err(_) => return Err("file is not valid UTF-8".to_string()),
        };
        let Some(language) = self.registry.detect(rel, &text) else {
            return Ok(None);
        };

        let timestamp = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        debug!(path = %rel, language = %language, "read source unit");
        Ok(Some(SourceUnit::new(rel, language, text).with_timestamp(timestamp)))
    }

    /// Check a relative path against the include and exclude globs
    fn should_exclude(&self, rel: &str) -> bool {
        if !self.include.iter().any(|p| p.matches(rel)) {
            return true;
        }
        self.exclude.iter().any(|p| p.matches(rel))
    }

    fn project_name(&self, root: &Path) -> String {
        let name = &self.config.project.name;
        if !name.is_empty() && name != "Untitled Project" {
            return name.clone();
        }
        root.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Project")
            .to_string()
    }

    /// Languages the registry can parse
    pub fn languages(&self) -> Vec<Language> {
        self.registry.languages()
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(Error::from))
        .collect()
}

fn check_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }
    Ok(root.canonicalize()?)
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| DEFAULT_EXCLUDED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// `/`-separated path of `path` below `root`
fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.iter()
        .filter_map(|s| s.to_str())
        .collect::<Vec<_>>()
        .join("/")
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
