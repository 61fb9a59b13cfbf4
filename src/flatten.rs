use std::ffi::OsString;
use std::fs;
use std::path::{self, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::packlist::{FileLister, NpmPacklist};
use crate::util::process::{CommandRunner, CommandSpec, SystemRunner};

/// Options for one flatten-and-publish run.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Which directory to flatten (e.g. to move `dist/main.js` to `main.js`,
    /// use `dist`).
    pub dir_to_flatten: String,
    /// Where to stage the flattened tree; a fresh temp directory when absent.
    pub output_dir: Option<PathBuf>,
    pub package_dir: PathBuf,
    /// Arguments forwarded verbatim to `npm publish` / `yarn publish`.
    pub publish_arguments: Vec<String>,
    pub use_yarn: bool,
}

#[derive(Debug)]
pub enum FlattenError {
    InvalidFlattenDir(String),
    MissingManifest,
    PublishFailed { output: String },
}

impl std::fmt::Display for FlattenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlattenError::InvalidFlattenDir(raw) => {
                write!(f, "invalid flatten dir \"{raw}\" specified")
            }
            FlattenError::MissingManifest => {
                write!(f, "files don't include a \"{MANIFEST_FILE}\" file")
            }
            FlattenError::PublishFailed { output } => write!(f, "publish failed: {output}"),
        }
    }
}

impl std::error::Error for FlattenError {}

/// Matches relative paths that live inside the directory being flattened.
///
/// Matching is segment-based: a path is inside the directory iff its first
/// segment equals the directory name and a path separator follows, so
/// `distx/a.js` or `lib/dist/a.js` never match a `dist` prefix.
#[derive(Debug, Clone)]
pub struct FlattenPrefix {
    name: String,
}

impl FlattenPrefix {
    /// Normalize a raw directory name: trim whitespace, strip leading and
    /// trailing separators. Anything empty or still containing a separator
    /// is rejected.
    pub fn new(raw: &str) -> Result<Self, FlattenError> {
        let name = raw
            .trim()
            .trim_matches(|c: char| c == '/' || c == '\\');
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(FlattenError::InvalidFlattenDir(raw.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Strip the directory prefix, returning `None` for paths outside it.
    /// Any further leading separators on the remainder are dropped, so the
    /// result never joins as an absolute path.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.name.as_str())?;
        let mut chars = rest.chars();
        match chars.next() {
            Some('/' | '\\') => Some(chars.as_str().trim_start_matches(['/', '\\'])),
            _ => None,
        }
    }

    pub fn strip_or_keep(&self, path: &str) -> String {
        match self.strip(path) {
            Some(stripped) => stripped.to_string(),
            None => path.to_string(),
        }
    }

    pub fn classify(&self, path: &str) -> ClassifiedFile {
        match self.strip(path) {
            Some(stripped) => ClassifiedFile::Flattened {
                original: path.to_string(),
                stripped: stripped.to_string(),
            },
            None => ClassifiedFile::Normal(path.to_string()),
        }
    }
}

/// A packlist entry sorted by where it lands in the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedFile {
    /// Outside the flatten directory; copied to the same relative path.
    Normal(String),
    /// Inside the flatten directory; copied to the path with the directory
    /// prefix removed.
    Flattened { original: String, stripped: String },
}

/// Repackages a package directory so the contents of one build-output
/// directory land at the package root, with `package.json` rewritten to
/// match.
pub struct Flattener {
    package_dir: PathBuf,
    output_dir: Option<PathBuf>,
    publish_arguments: Vec<String>,
    use_yarn: bool,
    prefix: FlattenPrefix,
    lister: Box<dyn FileLister>,
    runner: Box<dyn CommandRunner>,
}

impl Flattener {
    pub fn new(options: FlattenOptions) -> Result<Self> {
        let package_dir = path::absolute(&options.package_dir).with_context(|| {
            format!(
                "failed to resolve package dir {}",
                options.package_dir.display()
            )
        })?;
        let output_dir = match options.output_dir {
            Some(dir) => Some(
                path::absolute(&dir)
                    .with_context(|| format!("failed to resolve output dir {}", dir.display()))?,
            ),
            None => None,
        };
        let prefix = FlattenPrefix::new(&options.dir_to_flatten)?;
        Ok(Self {
            package_dir,
            output_dir,
            publish_arguments: options.publish_arguments,
            use_yarn: options.use_yarn,
            prefix,
            lister: Box::new(NpmPacklist),
            runner: Box::new(SystemRunner),
        })
    }

    /// Swap out the packlist source (test seam).
    pub fn with_lister(mut self, lister: impl FileLister + 'static) -> Self {
        self.lister = Box::new(lister);
        self
    }

    /// Swap out the subprocess runner (test seam).
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Stage the publishable file set into the output directory with the
    /// flatten directory's contents promoted to the root.
    ///
    /// Returns `Ok(None)` when the packlist is empty; nothing is created or
    /// copied in that case. When a file outside the flatten directory and a
    /// flattened file map to the same destination, the flattened copy wins
    /// because the flattened pass runs second.
    pub fn build(&self) -> Result<Option<PathBuf>> {
        let files = self.lister.list(&self.package_dir)?;
        if files.is_empty() {
            info!("no files to publish");
            return Ok(None);
        }
        if !files.iter().any(|file| file == MANIFEST_FILE) {
            return Err(FlattenError::MissingManifest.into());
        }

        let classified: Vec<ClassifiedFile> = files
            .iter()
            .map(|file| self.prefix.classify(file))
            .collect();
        let flattened_destinations: Vec<String> = classified
            .iter()
            .filter_map(|file| match file {
                ClassifiedFile::Flattened { stripped, .. } => Some(stripped.clone()),
                ClassifiedFile::Normal(_) => None,
            })
            .collect();
        debug!(
            "classified {} normal and {} flattened files",
            classified.len() - flattened_destinations.len(),
            flattened_destinations.len()
        );

        let output_dir = match &self.output_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                // A copy onto its own source path truncates the file first;
                // canonicalize so `-o .` and symlinked spellings of the
                // package dir are caught before any copy runs.
                let staged = fs::canonicalize(dir)
                    .with_context(|| format!("failed to resolve {}", dir.display()))?;
                let source = fs::canonicalize(&self.package_dir).with_context(|| {
                    format!("failed to resolve {}", self.package_dir.display())
                })?;
                if staged == source {
                    bail!(
                        "output dir {} is the package directory itself",
                        dir.display()
                    );
                }
                dir.clone()
            }
            None => create_temp_dir()?,
        };

        for file in &classified {
            if let ClassifiedFile::Normal(relative) = file {
                self.copy_into(&output_dir, relative, relative)?;
            }
        }
        // Runs after the normal pass, so on a destination collision the
        // flattened file wins.
        for file in &classified {
            if let ClassifiedFile::Flattened { original, stripped } = file {
                self.copy_into(&output_dir, original, stripped)?;
            }
        }

        info!(
            "flattened {} files into {}",
            classified.len(),
            output_dir.display()
        );

        let manifest_path = output_dir.join(MANIFEST_FILE);
        let mut manifest = Manifest::read(&manifest_path)?;
        manifest.rewrite(&self.prefix, &flattened_destinations);
        manifest.write(&manifest_path)?;

        Ok(Some(output_dir))
    }

    /// Hand a staged directory to `npm publish` (or `yarn publish`).
    ///
    /// On success the staged directory is deleted, even when it was an
    /// explicitly configured output directory rather than a temp one. On
    /// failure it is left on disk for inspection and the captured
    /// diagnostics are surfaced as the error.
    pub fn publish(&self, output_dir: &Path) -> Result<()> {
        info!("publishing {} ...", self.package_dir.display());

        let executor = if self.use_yarn { "yarn" } else { "npm" };
        let mut spec = CommandSpec::new(executor);
        spec.args.push(OsString::from("publish"));
        spec.args.push(output_dir.as_os_str().to_os_string());
        spec.args
            .extend(self.publish_arguments.iter().map(OsString::from));

        info!("running `{executor} {}` ...", render_args(&spec.args));

        let output = self.runner.run(spec)?;
        if !output.success {
            let diagnostic = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Err(FlattenError::PublishFailed { output: diagnostic }.into());
        }
        if !output.stdout.trim().is_empty() {
            info!("{}", output.stdout.trim());
        }

        fs::remove_dir_all(output_dir)
            .with_context(|| format!("failed to remove {}", output_dir.display()))?;
        Ok(())
    }

    fn copy_into(&self, output_dir: &Path, source: &str, destination: &str) -> Result<()> {
        let src = self.package_dir.join(source);
        let dst = output_dir.join(destination);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&src, &dst).with_context(|| {
            format!("failed to copy {} to {}", src.display(), dst.display())
        })?;
        Ok(())
    }
}

fn create_temp_dir() -> Result<PathBuf> {
    let temp = tempfile::Builder::new()
        .prefix("publish-flat-")
        .tempdir()
        .context("failed to create temp output directory")?;
    Ok(temp.keep())
}

fn render_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
