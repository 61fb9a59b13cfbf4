use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flatten::FlattenPrefix;
use crate::util::json;

pub const MANIFEST_FILE: &str = "package.json";

/// The subset of `package.json` the flattener rewrites, along with the full
/// parsed document. On write the rewritten values replace the originals at
/// the positions the author gave them; every other field is carried through
/// unchanged, in the order the author wrote it.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub files: Vec<String>,
    pub bin: Option<Bin>,
    pub main: Option<String>,
    document: Map<String, Value>,
}

/// `bin` is either a bare script path or a map of command name to path.
/// The shape is decided once at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    Single(String),
    Named(IndexMap<String, String>),
}

impl Manifest {
    /// Read a manifest. `files` is required: without the allow-list there is
    /// nothing to rewrite, and materializing one would silently change what
    /// npm packs.
    pub fn read(path: &Path) -> Result<Self> {
        let document: Map<String, Value> = json::read_json(path)?;
        Self::from_document(document)
            .with_context(|| format!("invalid manifest {}", path.display()))
    }

    fn from_document(document: Map<String, Value>) -> Result<Self> {
        let files = match document.get("files") {
            Some(value) => serde_json::from_value(value.clone())
                .context("`files` must be an array of strings")?,
            None => bail!("no `files` array"),
        };
        let bin = match document.get("bin") {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .context("`bin` must be a string or a map of command names to paths")?,
            ),
        };
        let main = match document.get("main") {
            Some(Value::Null) | None => None,
            Some(value) => {
                Some(serde_json::from_value(value.clone()).context("`main` must be a string")?)
            }
        };
        Ok(Self {
            files,
            bin,
            main,
            document,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut document = self.document.clone();
        document.insert("files".to_string(), serde_json::to_value(&self.files)?);
        if let Some(bin) = &self.bin {
            document.insert("bin".to_string(), serde_json::to_value(bin)?);
        }
        if let Some(main) = &self.main {
            document.insert("main".to_string(), Value::String(main.clone()));
        }
        json::write_json_pretty(path, &document)
    }

    /// Rewrite every field that references the flattened directory.
    ///
    /// `files` entries are prefix-stripped, the flattened destinations are
    /// appended, entries equal to the bare directory name are dropped, and
    /// the result is de-duplicated keeping first occurrences. `bin` and
    /// `main` values are prefix-stripped in place. Running the rewrite again
    /// over its own output changes nothing.
    pub fn rewrite(&mut self, prefix: &FlattenPrefix, flattened_destinations: &[String]) {
        let mut files: Vec<String> = self
            .files
            .iter()
            .map(|entry| prefix.strip_or_keep(entry))
            .collect();
        files.extend(flattened_destinations.iter().cloned());
        files.retain(|entry| entry != prefix.name());
        let mut seen = HashSet::new();
        files.retain(|entry| seen.insert(entry.clone()));
        self.files = files;

        match &mut self.bin {
            Some(Bin::Single(path)) => *path = prefix.strip_or_keep(path),
            Some(Bin::Named(commands)) => {
                for path in commands.values_mut() {
                    *path = prefix.strip_or_keep(path);
                }
            }
            None => {}
        }

        if let Some(main) = &mut self.main {
            *main = prefix.strip_or_keep(main);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn prefix(name: &str) -> FlattenPrefix {
        FlattenPrefix::new(name).unwrap()
    }

    fn manifest_from(value: Value) -> Manifest {
        let Value::Object(document) = value else {
            panic!("fixture must be a JSON object");
        };
        Manifest::from_document(document).unwrap()
    }

    fn fixture() -> Manifest {
        manifest_from(serde_json::json!({
            "name": "mypackage",
            "version": "1.0.0",
            "files": ["dist", "README.md"],
            "main": "dist/index.js",
            "bin": {"mytool": "dist/bin.js"},
        }))
    }

    #[test]
    fn rewrite_strips_appends_and_drops_the_bare_name() {
        let mut manifest = fixture();
        manifest.rewrite(
            &prefix("dist"),
            &["index.js".to_string(), "bin.js".to_string()],
        );
        assert_eq!(manifest.files, vec!["README.md", "index.js", "bin.js"]);
        assert_eq!(manifest.main.as_deref(), Some("index.js"));
        let Some(Bin::Named(commands)) = &manifest.bin else {
            panic!("expected named bin");
        };
        assert_eq!(commands.get("mytool").unwrap(), "bin.js");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let mut manifest = fixture();
        let destinations = vec!["index.js".to_string(), "bin.js".to_string()];
        manifest.rewrite(&prefix("dist"), &destinations);
        let first = manifest.clone();
        manifest.rewrite(&prefix("dist"), &destinations);
        assert_eq!(manifest.files, first.files);
        assert_eq!(manifest.main, first.main);
        assert_eq!(manifest.bin, first.bin);
    }

    #[test]
    fn rewrite_handles_a_single_string_bin() {
        let mut manifest = manifest_from(serde_json::json!({
            "files": ["dist"],
            "bin": "dist/cli.js",
        }));
        manifest.rewrite(&prefix("dist"), &["cli.js".to_string()]);
        assert_eq!(manifest.bin, Some(Bin::Single("cli.js".to_string())));
        assert_eq!(manifest.files, vec!["cli.js"]);
    }

    #[test]
    fn entries_merely_sharing_the_prefix_are_left_alone() {
        let mut manifest = manifest_from(serde_json::json!({
            "files": ["distros", "lib/dist/keep.js", "dist/drop.js"],
        }));
        manifest.rewrite(&prefix("dist"), &[]);
        assert_eq!(manifest.files, vec!["distros", "lib/dist/keep.js", "drop.js"]);
    }

    #[test]
    fn bare_directory_entry_with_trailing_slash_strips_to_empty() {
        let mut manifest = manifest_from(serde_json::json!({
            "files": ["dist/", "dist"],
        }));
        manifest.rewrite(&prefix("dist"), &[]);
        // `dist/` strips to the empty string and survives; only the exact
        // bare name is removed.
        assert_eq!(manifest.files, vec![""]);
    }

    #[test]
    fn unknown_fields_survive_a_read_rewrite_write_cycle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MANIFEST_FILE);
        fs::write(
            &path,
            r#"{
  "name": "mypackage",
  "version": "1.0.0",
  "files": ["dist"],
  "main": "dist/index.js",
  "repository": {"type": "git", "url": "https://example.invalid/repo.git"}
}
"#,
        )
        .unwrap();

        let mut manifest = Manifest::read(&path).unwrap();
        manifest.rewrite(&prefix("dist"), &["index.js".to_string()]);
        manifest.write(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("\n"));
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["name"], "mypackage");
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["repository"]["type"], "git");
        assert_eq!(value["main"], "index.js");
        assert_eq!(value["files"], serde_json::json!(["index.js"]));
    }

    #[test]
    fn rewrite_keeps_the_author_key_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MANIFEST_FILE);
        // `main` deliberately before `files`.
        fs::write(
            &path,
            r#"{
  "name": "mypackage",
  "version": "1.0.0",
  "description": "demo",
  "main": "dist/index.js",
  "files": ["dist"],
  "license": "MIT"
}
"#,
        )
        .unwrap();

        let mut manifest = Manifest::read(&path).unwrap();
        manifest.rewrite(&prefix("dist"), &["index.js".to_string()]);
        manifest.write(&path).unwrap();

        let written: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let keys: Vec<&str> = written.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["name", "version", "description", "main", "files", "license"]
        );
        assert_eq!(written["main"], "index.js");
        assert_eq!(written["files"], serde_json::json!(["index.js"]));
    }

    #[test]
    fn manifest_without_files_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MANIFEST_FILE);
        fs::write(&path, r#"{"name": "mypackage", "version": "1.0.0"}"#).unwrap();
        let error = Manifest::read(&path).unwrap_err();
        assert!(format!("{error:#}").contains("package.json"));
    }
}
