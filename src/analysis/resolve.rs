// Name resolution for references and imports
//
// Targets are matched in tiers, innermost scope first:
//   1. `self`/`this` members of the enclosing type
//   2. the same file
//   3. the same package directory (Go, Java)
//   4. files imported by the source file
//   5. qualified suffix match anywhere
//   6. public symbols anywhere (unqualified names only)
// The first tier with any candidate wins. More than one candidate in that
// tier means the reference is ambiguous and every candidate gets an edge.

use crate::analysis::symbols::SymbolTable;
use crate::parser::{
    directory_key, module_key, Language, Reference, ReferenceKind, Symbol, SymbolId, SymbolKind,
    Visibility,
};
use std::collections::{BTreeMap, BTreeSet};

const SELF_QUALIFIERS: &[&str] = &["self", "this", "Self", "cls"];

/// Outcome of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One or more candidates; more than one means ambiguous
    Resolved(Vec<SymbolId>),
    /// No candidate, with a best-effort label for what was meant
    Unresolved(Option<String>),
}

struct FileKey<'a> {
    path: &'a str,
    language: Language,
    module: String,
    directory: String,
}

/// Resolves reference targets against a complete symbol table
pub struct Resolver<'a> {
    table: &'a SymbolTable,
    by_name: BTreeMap<&'a str, Vec<&'a Symbol>>,
    files: Vec<FileKey<'a>>,
    imports: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        let mut by_name: BTreeMap<&'a str, Vec<&'a Symbol>> = BTreeMap::new();
        for symbol in table.symbols.values() {
            by_name.entry(symbol.name.as_str()).or_default().push(symbol);
        }
        let files = table
            .files
            .values()
            .map(|f| FileKey {
                path: f.path.as_str(),
                language: f.language,
                module: module_key(&f.path),
                directory: directory_key(&f.path),
            })
            .collect();
        Self {
            table,
            by_name,
            files,
            imports: BTreeMap::new(),
        }
    }

    /// Record which files each file imports; enables the imported-scope tier
    pub fn set_imports(&mut self, imports: BTreeMap<String, BTreeSet<String>>) {
        self.imports = imports;
    }

    /// Files an import target from `importer` refers to, sorted by path
    pub fn resolve_import(&self, importer: &str, language: Language, target: &str) -> Vec<&'a str> {
        let family = language.family();
        let eligible = |f: &&FileKey<'a>| f.path != importer && f.language.family() == family;

        if target.starts_with("./") || target.starts_with("../") {
            let Some(key) = join_relative(importer, target) else {
                return Vec::new();
            };
            return self
                .files
                .iter()
                .filter(|f| eligible(f))
                .filter(|f| f.module == key)
                .map(|f| f.path)
                .collect();
        }

        let segments: Vec<&str> = target.split('.').filter(|s| !s.is_empty()).collect();
        for len in (1..=segments.len()).rev() {
            let prefix = segments[..len].join(".");
            let mut found: Vec<&'a str> = self
                .files
                .iter()
                .filter(|f| eligible(f))
                .filter(|f| ends_with_segments(&f.module, &prefix))
                .map(|f| f.path)
                .collect();

            if found.is_empty() && language.package_per_directory() {
                found = self.package_files(&prefix, len == segments.len(), &eligible);
            }
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Package languages import directories: `a.b.pkg` names every file under `pkg/`
    fn package_files(
        &self,
        target: &str,
        allow_reverse: bool,
        eligible: &dyn Fn(&&FileKey<'a>) -> bool,
    ) -> Vec<&'a str> {
        let direct: Vec<&'a str> = self
            .files
            .iter()
            .filter(|f| eligible(f))
            .filter(|f| !f.directory.is_empty() && ends_with_segments(&f.directory, target))
            .map(|f| f.path)
            .collect();
        if !direct.is_empty() || !allow_reverse {
            return direct;
        }

        // module paths carry a host prefix the tree does not have
        let reverse: Vec<&FileKey<'a>> = self
            .files
            .iter()
            .filter(|f| eligible(f))
            .filter(|f| !f.directory.is_empty() && ends_with_segments(target, &f.directory))
            .collect();
        let deepest = reverse
            .iter()
            .map(|f| f.directory.split('.').count())
            .max()
            .unwrap_or(0);
        reverse
            .into_iter()
            .filter(|f| f.directory.split('.').count() == deepest)
            .map(|f| f.path)
            .collect()
    }

    /// Resolve a non-import reference
    pub fn resolve(&self, reference: &Reference) -> Resolution {
        let Some(source) = self.table.get(&reference.source) else {
            return Resolution::Unresolved(None);
        };
        let simple = reference.simple_name();
        let qualifier = reference.qualifier();
        let target = reference.target_name.as_str();
        let from = source.path();
        let family = source.language.family();
        let selfish = qualifier.map(|q| SELF_QUALIFIERS.contains(&q)).unwrap_or(false);

        let candidates: Vec<&'a Symbol> = self
            .by_name
            .get(simple)
            .map(|v| v.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|s| accepts(reference.kind, s.kind))
            .filter(|s| s.language.family() == family)
            .collect();

        let tiers: [&dyn Fn(&Symbol) -> bool; 6] = [
            // 1. members of the enclosing type
            &|s: &Symbol| {
                selfish
                    && owner_prefix(self.table, source)
                        .map(|owner| base_qualified(&s.qualified_name) == format!("{}.{}", owner, simple))
                        .unwrap_or(false)
            },
            // 2. same file
            &|s: &Symbol| {
                !selfish
                    && s.path() == from
                    && qualifier
                        .map(|_| ends_with_segments(base_qualified(&s.qualified_name), target))
                        .unwrap_or(true)
            },
            // 3. same package directory
            &|s: &Symbol| {
                !selfish
                    && source.language.package_per_directory()
                    && s.path() != from
                    && directory_key(s.path()) == directory_key(from)
                    && s.visibility >= Visibility::Internal
                    && self.qualifier_fits(qualifier, target, s)
            },
            // 4. imported files
            &|s: &Symbol| {
                !selfish
                    && self
                        .imports
                        .get(from)
                        .map(|set| set.contains(s.path()))
                        .unwrap_or(false)
                    && visible(s, from)
                    && self.qualifier_fits(qualifier, target, s)
            },
            // 5. qualified suffix anywhere
            &|s: &Symbol| {
                !selfish
                    && qualifier.is_some()
                    && visible(s, from)
                    && (ends_with_segments(base_qualified(&s.qualified_name), target)
                        || ends_with_segments(
                            &format!("{}.{}", module_key(s.path()), base_qualified(&s.qualified_name)),
                            target,
                        ))
            },
            // 6. public symbols anywhere
            &|s: &Symbol| {
                qualifier.is_none()
                    && s.kind != SymbolKind::Method
                    && s.visibility == Visibility::Public
            },
        ];

        for tier in tiers.iter() {
            let mut hits: Vec<SymbolId> = candidates
                .iter()
                .filter(|s| s.id != source.id && tier(s))
                .map(|s| s.id.clone())
                .collect();
            if hits.is_empty() {
                // recursion is legal: a function may name itself
                hits = candidates
                    .iter()
                    .filter(|s| s.id == source.id && tier(s))
                    .map(|s| s.id.clone())
                    .collect();
            }
            if !hits.is_empty() {
                hits.sort();
                hits.dedup();
                return Resolution::Resolved(hits);
            }
        }

        Resolution::Unresolved(self.guess(reference, family))
    }

    /// A qualified call into another file must name that file, its package or the owning type
    fn qualifier_fits(&self, qualifier: Option<&str>, target: &str, s: &Symbol) -> bool {
        let Some(qualifier) = qualifier else {
            return s.kind != SymbolKind::Method;
        };
        let last = qualifier.rsplit('.').next().unwrap_or(qualifier);
        let module = module_key(s.path());
        let directory = directory_key(s.path());
        let owner = base_qualified(&s.qualified_name)
            .rsplit_once('.')
            .map(|(o, _)| o.rsplit('.').next().unwrap_or(o).to_string());

        module.rsplit('.').next() == Some(last)
            || directory.rsplit('.').next() == Some(last)
            || owner.as_deref() == Some(last)
            || ends_with_segments(base_qualified(&s.qualified_name), target)
    }

    fn guess(&self, reference: &Reference, family: &str) -> Option<String> {
        let simple = reference.simple_name();
        let lowered = simple.to_lowercase();
        let near = self
            .table
            .symbols
            .values()
            .filter(|s| s.language.family() == family && accepts(reference.kind, s.kind))
            .find(|s| s.name.to_lowercase() == lowered);
        if let Some(symbol) = near {
            return Some(format!("{} in {}", base_qualified(&symbol.qualified_name), symbol.path()));
        }
        reference.qualifier().map(|q| q.to_string())
    }
}

/// Symbol kinds a reference of `kind` may land on
fn accepts(kind: ReferenceKind, target: SymbolKind) -> bool {
    match kind {
        ReferenceKind::Calls => target.is_call_target(),
        ReferenceKind::Extends => matches!(target, SymbolKind::Type | SymbolKind::Interface),
        ReferenceKind::Reads | ReferenceKind::Writes => {
            matches!(target, SymbolKind::Constant | SymbolKind::Variable)
        }
        ReferenceKind::Imports => target == SymbolKind::Module,
    }
}

/// Whether `symbol` may be referenced from a file at `from`
pub fn visible(symbol: &Symbol, from: &str) -> bool {
    match symbol.visibility {
        Visibility::Public | Visibility::Protected => true,
        Visibility::Internal => {
            !symbol.language.package_per_directory() || directory_key(symbol.path()) == directory_key(from)
        }
        Visibility::Private => symbol.path() == from,
    }
}

/// Qualified name without a `#n` redefinition suffix
pub fn base_qualified(qualified: &str) -> &str {
    match qualified.rsplit_once('#') {
        Some((base, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => base,
        _ => qualified,
    }
}

/// `a.b.c` ends with `b.c` on a segment boundary
pub fn ends_with_segments(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack == needle
        || (haystack.len() > needle.len()
            && haystack.ends_with(needle)
            && haystack.as_bytes()[haystack.len() - needle.len() - 1] == b'.')
}

/// Qualified name of the type enclosing a method, climbing out of nested functions
fn owner_prefix(table: &SymbolTable, source: &Symbol) -> Option<String> {
    let mut current = source;
    loop {
        match current.kind {
            SymbolKind::Method => {
                return base_qualified(&current.qualified_name)
                    .rsplit_once('.')
                    .map(|(owner, _)| owner.to_string());
            }
            SymbolKind::Function => {
                current = table.get(current.parent.as_ref()?)?;
            }
            _ => return None,
        }
    }
}

/// Apply `./` and `../` segments to the importer's directory, yielding a module key
fn join_relative(importer: &str, target: &str) -> Option<String> {
    let mut segments: Vec<&str> = match importer.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    let key = module_key(&format!("{}.x", joined));
    (!key.is_empty()).then_some(key)
}
