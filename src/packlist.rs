use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use crate::manifest::{Bin, MANIFEST_FILE};
use crate::util::json;

/// Source of the relative file paths a registry would include for a package
/// directory. Paths are `/`-separated and name files only.
pub trait FileLister {
    fn list(&self, package_dir: &Path) -> Result<Vec<String>>;
}

/// Walks a package directory applying npm's packing rules: the manifest's
/// `files` allow-list when present, otherwise root `.npmignore` (falling
/// back to root `.gitignore`), with npm's always-included and never-included
/// names applied on top. Output order is deterministic; symlinks are
/// skipped.
pub struct NpmPacklist;

/// Directory trees that never pack.
const PRUNED_DIRS: &[&str] = &[".git", ".svn", ".hg", "CVS", "node_modules"];

/// File names that never pack, at any depth.
const EXCLUDED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".npmrc",
    "npm-debug.log",
    ".DS_Store",
    ".gitignore",
    ".npmignore",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl FileLister for NpmPacklist {
    fn list(&self, package_dir: &Path) -> Result<Vec<String>> {
        let fields = read_pack_fields(package_dir)?;
        let filter = PackFilter::new(package_dir, &fields)?;

        let mut files = Vec::new();
        let walker = WalkDir::new(package_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_pruned(entry));
        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to walk {}", package_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(package_dir)
                .context("walk entry escaped the package directory")?;
            let rel = slash_path(rel);
            if filter.includes(&rel) {
                files.push(rel);
            }
        }
        Ok(files)
    }
}

/// The manifest fields that influence packing. Lenient on purpose: a
/// package without `files` packs everything its ignore rules allow.
#[derive(Debug, Default, Deserialize)]
struct PackFields {
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    bin: Option<Bin>,
}

fn read_pack_fields(package_dir: &Path) -> Result<PackFields> {
    let path = package_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(PackFields::default());
    }
    json::read_json(&path)
}

struct PackFilter {
    allow: Option<AllowList>,
    ignore: Vec<IgnoreRule>,
    pinned: Vec<String>,
}

impl PackFilter {
    fn new(package_dir: &Path, fields: &PackFields) -> Result<Self> {
        let allow = fields.files.as_deref().map(AllowList::new);
        let ignore = if allow.is_some() {
            // `files` wins; ignore files are not consulted.
            Vec::new()
        } else {
            load_ignore_rules(package_dir)?
        };
        Ok(Self {
            allow,
            ignore,
            pinned: pinned_targets(fields),
        })
    }

    fn includes(&self, rel: &str) -> bool {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        if EXCLUDED_FILES.contains(&name) {
            return false;
        }
        if rel == MANIFEST_FILE {
            return true;
        }
        if !rel.contains('/') && is_special_root_file(rel) {
            return true;
        }
        if self.pinned.iter().any(|target| target == rel) {
            return true;
        }
        match &self.allow {
            Some(allow) => allow.matches(rel),
            None => !is_ignored(&self.ignore, rel),
        }
    }
}

fn is_pruned(entry: &DirEntry) -> bool {
    // Name-based, so a `.git` worktree file is dropped like a `.git` tree.
    PRUNED_DIRS.iter().any(|dir| entry.file_name() == *dir)
}

/// Root-level files npm always includes, regardless of `files` or ignore
/// rules.
fn is_special_root_file(name: &str) -> bool {
    const SPECIAL_PREFIXES: &[&str] = &[
        "README",
        "LICENSE",
        "LICENCE",
        "CHANGELOG",
        "HISTORY",
        "NOTICE",
    ];
    let upper = name.to_ascii_uppercase();
    SPECIAL_PREFIXES
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

/// `main` and `bin` targets are packed even when ignore rules would drop
/// them.
fn pinned_targets(fields: &PackFields) -> Vec<String> {
    let mut targets = Vec::new();
    if let Some(main) = &fields.main {
        targets.push(normalize_entry(main));
    }
    match &fields.bin {
        Some(Bin::Single(path)) => targets.push(normalize_entry(path)),
        Some(Bin::Named(commands)) => {
            targets.extend(commands.values().map(|path| normalize_entry(path)));
        }
        None => {}
    }
    targets
}

struct AllowList {
    entries: Vec<AllowEntry>,
}

enum AllowEntry {
    /// An exact file, or a directory whose whole subtree is included.
    Path(String),
    Pattern(Pattern),
}

impl AllowList {
    fn new(entries: &[String]) -> Self {
        let entries = entries
            .iter()
            .map(|raw| {
                let cleaned = normalize_entry(raw);
                if has_glob_meta(&cleaned) {
                    match Pattern::new(&cleaned) {
                        Ok(pattern) => AllowEntry::Pattern(pattern),
                        // An unparseable glob degrades to a literal match.
                        Err(_) => AllowEntry::Path(cleaned),
                    }
                } else {
                    AllowEntry::Path(cleaned)
                }
            })
            .collect();
        Self { entries }
    }

    fn matches(&self, rel: &str) -> bool {
        self.entries.iter().any(|entry| entry.matches(rel))
    }
}

impl AllowEntry {
    fn matches(&self, rel: &str) -> bool {
        match self {
            AllowEntry::Path(path) => {
                rel == path
                    || rel
                        .strip_prefix(path.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            AllowEntry::Pattern(pattern) => {
                // A pattern that matches a directory includes its subtree.
                pattern.matches_with(rel, MATCH_OPTIONS)
                    || ancestor_dirs(rel).any(|dir| pattern.matches_with(dir, MATCH_OPTIONS))
            }
        }
    }
}

fn has_glob_meta(entry: &str) -> bool {
    entry.chars().any(|c| matches!(c, '*' | '?' | '['))
}

struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

impl IgnoreRule {
    fn hits(&self, rel: &str) -> bool {
        if self.dir_only {
            return ancestor_dirs(rel).any(|dir| self.matches_path(dir));
        }
        // A match on a parent directory covers everything below it.
        self.matches_path(rel) || ancestor_dirs(rel).any(|dir| self.matches_path(dir))
    }

    fn matches_path(&self, path: &str) -> bool {
        if self.anchored {
            self.pattern.matches_with(path, MATCH_OPTIONS)
        } else {
            // A pattern without a separator matches the base name at any
            // depth.
            let name = path.rsplit('/').next().unwrap_or(path);
            self.pattern.matches_with(name, MATCH_OPTIONS)
        }
    }
}

fn load_ignore_rules(package_dir: &Path) -> Result<Vec<IgnoreRule>> {
    for candidate in [".npmignore", ".gitignore"] {
        let path = package_dir.join(candidate);
        if !path.exists() {
            continue;
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(parse_ignore_lines(&raw));
    }
    Ok(Vec::new())
}

/// Parse the supported gitignore subset: comments, blank lines, `!`
/// negation, trailing-`/` directory patterns, leading-`/` anchoring, and
/// `*`/`?`/`**` globs.
fn parse_ignore_lines(raw: &str) -> Vec<IgnoreRule> {
    let mut rules = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, body) = match body.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        let (anchored, body) = match body.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (body.contains('/'), body),
        };
        let Ok(pattern) = Pattern::new(body) else {
            // git skips unparseable patterns; so do we
            continue;
        };
        rules.push(IgnoreRule {
            pattern,
            negated,
            dir_only,
            anchored,
        });
    }
    rules
}

/// Last matching rule wins; unmatched paths are included.
fn is_ignored(rules: &[IgnoreRule], rel: &str) -> bool {
    let mut ignored = false;
    for rule in rules {
        if rule.hits(rel) {
            ignored = !rule.negated;
        }
    }
    ignored
}

/// Proper ancestor directories of a `/`-separated relative path.
fn ancestor_dirs(rel: &str) -> impl Iterator<Item = &str> {
    rel.char_indices()
        .filter_map(|(idx, ch)| (ch == '/').then_some(&rel[..idx]))
}

fn normalize_entry(raw: &str) -> String {
    let cleaned = raw.trim();
    let cleaned = cleaned.strip_prefix("./").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix('/').unwrap_or(cleaned);
    cleaned.trim_end_matches('/').to_string()
}

fn slash_path(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}
