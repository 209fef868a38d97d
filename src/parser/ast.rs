// Language-neutral model produced by every adapter
//
// Adapters turn their grammar's native tree into these types. Everything here
// is plain data, serializable and ordered so downstream stages can sort it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Source languages understood by the built-in adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
}

impl Language {
    /// Detect language from a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "rs" => Some(Language::Rust),
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "c" | "h" => Some(Language::C),
            "cc" | "cpp" | "cxx" | "hh" | "hpp" | "hxx" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Detect language from a `#!` interpreter line
    pub fn from_shebang(first_line: &str) -> Option<Self> {
        let line = first_line.strip_prefix("#!")?;
        let interpreter = line
            .split_whitespace()
            .flat_map(|part| part.rsplit('/').next())
            .find(|part| *part != "env")?;

        if interpreter.starts_with("python") {
            Some(Language::Python)
        } else if interpreter == "node" || interpreter == "nodejs" || interpreter == "deno" {
            Some(Language::JavaScript)
        } else if interpreter == "ts-node" {
            Some(Language::TypeScript)
        } else {
            None
        }
    }

    /// Lowercase tag used in the document model and search index
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Languages that can import each other's files
    pub fn family(&self) -> &'static str {
        match self {
            Language::JavaScript | Language::TypeScript => "ecmascript",
            Language::C | Language::Cpp => "c",
            other => other.as_str(),
        }
    }

    /// Whether a package is a directory rather than a single file
    pub fn package_per_directory(&self) -> bool {
        matches!(self, Language::Go | Language::Java)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input file, immutable once read
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub language: Language,
    pub text: String,
    /// Modification time in milliseconds since the epoch
    pub timestamp: u64,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, language: Language, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            text: text.into(),
            timestamp: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Extension of the path, lowercased, or empty
    pub fn extension(&self) -> String {
        file_extension(&self.path)
    }
}

/// Extension of a `/`-separated path, lowercased, or empty
pub fn file_extension(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// A positioned message from an adapter
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Outcome of parsing a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "diagnostics", rename_all = "snake_case")]
pub enum ParseStatus {
    Ok,
    PartialError(Vec<Diagnostic>),
    Fatal(Diagnostic),
}

impl ParseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ParseStatus::Ok)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            ParseStatus::Ok => Vec::new(),
            ParseStatus::PartialError(diags) => diags.clone(),
            ParseStatus::Fatal(diag) => vec![diag.clone()],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParseStatus::Ok => "ok",
            ParseStatus::PartialError(_) => "partial_error",
            ParseStatus::Fatal(_) => "fatal",
        }
    }
}

/// Kind of a named code entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Module,
    Type,
    Interface,
    Function,
    Method,
    Constant,
    Variable,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Type => "type",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
        }
    }

    /// Kinds that own a body and a control-flow graph
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    /// Kinds a call expression may target (constructors resolve to types)
    pub fn is_call_target(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method | SymbolKind::Type)
    }
}

/// Visibility, normalized across languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible only inside the declaring file
    Private,
    /// Visible inside the declaring directory (Go/Java package)
    Internal,
    Protected,
    Public,
}

/// Stable symbol identifier: hash of path, qualified name and kind
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(String);

const EXTERNAL_ID: &str = "external";

impl SymbolId {
    pub fn new(path: &str, qualified_name: &str, kind: SymbolKind) -> Self {
        Self(short_hash(&[path, qualified_name, kind.as_str()]))
    }

    /// The sentinel node every unresolved reference points at
    pub fn external() -> Self {
        Self(EXTERNAL_ID.to_string())
    }

    pub fn is_external(&self) -> bool {
        self.0 == EXTERNAL_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild an id from its serialized form, e.g. an annotation key
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First 16 hex chars of the SHA-256 of NUL-joined parts
pub fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Declared location, lines are 1-based and inclusive
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl Location {
    pub fn new(path: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
        }
    }

    pub fn line(path: impl Into<String>, line: usize) -> Self {
        Self::new(path, line, line)
    }

    pub fn span(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A named code entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Name qualified within its file, e.g. `Parser.parse`
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub language: Language,
    pub visibility: Visibility,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<SymbolId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        kind: SymbolKind,
        language: Language,
        location: Location,
    ) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            id: SymbolId::new(&location.path, &qualified_name, kind),
            name: name.into(),
            qualified_name,
            kind,
            language,
            visibility: Visibility::Public,
            location,
            signature: None,
            parent: None,
            doc: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn path(&self) -> &str {
        &self.location.path
    }
}

/// Kind of a directed relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Calls,
    Imports,
    Extends,
    Reads,
    Writes,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Calls => "calls",
            ReferenceKind::Imports => "imports",
            ReferenceKind::Extends => "extends",
            ReferenceKind::Reads => "reads",
            ReferenceKind::Writes => "writes",
        }
    }
}

/// A reference as the adapter saw it: the target is still a name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub source: SymbolId,
    /// Dotted target as written, e.g. `self.save` or `b.run`
    pub target_name: String,
    pub kind: ReferenceKind,
    pub location: Location,
}

impl Reference {
    pub fn new(
        source: SymbolId,
        target_name: impl Into<String>,
        kind: ReferenceKind,
        location: Location,
    ) -> Self {
        Self {
            source,
            target_name: target_name.into(),
            kind,
            location,
        }
    }

    /// Last segment of the dotted target
    pub fn simple_name(&self) -> &str {
        self.target_name.rsplit('.').next().unwrap_or(&self.target_name)
    }

    /// Everything before the last segment
    pub fn qualifier(&self) -> Option<&str> {
        self.target_name.rsplit_once('.').map(|(q, _)| q)
    }
}

/// Block-level hint emitted for a function body
///
/// Hints mirror the statement structure closely enough for the graph builder
/// to lay out basic blocks. Adapters that cannot produce hints omit them and
/// the builder falls back to a single block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hint", rename_all = "snake_case")]
pub enum FlowHint {
    Statement {
        line: usize,
        calls: Vec<String>,
    },
    Branch {
        line: usize,
        label: String,
        then: Vec<FlowHint>,
        otherwise: Vec<FlowHint>,
    },
    Loop {
        line: usize,
        label: String,
        body: Vec<FlowHint>,
    },
    Switch {
        line: usize,
        label: String,
        arms: Vec<Vec<FlowHint>>,
    },
    Try {
        line: usize,
        body: Vec<FlowHint>,
        handlers: Vec<Vec<FlowHint>>,
        finally: Option<Vec<FlowHint>>,
    },
    Return {
        line: usize,
        calls: Vec<String>,
    },
    Throw {
        line: usize,
        calls: Vec<String>,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
}

impl FlowHint {
    pub fn line(&self) -> usize {
        match self {
            FlowHint::Statement { line, .. }
            | FlowHint::Branch { line, .. }
            | FlowHint::Loop { line, .. }
            | FlowHint::Switch { line, .. }
            | FlowHint::Try { line, .. }
            | FlowHint::Return { line, .. }
            | FlowHint::Throw { line, .. }
            | FlowHint::Break { line }
            | FlowHint::Continue { line } => *line,
        }
    }
}

/// Everything an adapter extracts from one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    pub status: ParseStatus,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    /// Block hints per callable symbol
    pub flows: Vec<(SymbolId, Vec<FlowHint>)>,
    pub line_count: usize,
}

impl ParseOutput {
    pub fn fatal(unit: &SourceUnit, message: impl Into<String>) -> Self {
        Self {
            status: ParseStatus::Fatal(Diagnostic::new(&unit.path, 0, message)),
            symbols: Vec::new(),
            references: Vec::new(),
            flows: Vec::new(),
            line_count: unit.text.lines().count(),
        }
    }
}

/// Module key for a path: extension dropped, separators become dots,
/// package entry files collapse onto their directory
pub fn module_key(path: &str) -> String {
    let without_ext = match path.rsplit_once('.') {
        Some((stem, _)) if !stem.ends_with('/') && !stem.is_empty() => stem,
        _ => path,
    };
    let mut segments: Vec<&str> = without_ext.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(last) = segments.last() {
        if matches!(*last, "__init__" | "mod" | "index" | "lib" | "main") && segments.len() > 1 {
            segments.pop();
        }
    }
    segments.join(".")
}

/// Dotted key of the directory holding `path`
pub fn directory_key(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("."),
        None => String::new(),
    }
}
