//! # Spec discovery
//!
//! [`SuiteLoader`] walks the configured root paths, keeps files whose base name
//! matches the glob and loads them in lexicographic path order into one shared
//! root suite. What "loading a file" means is up to the [`SpecSource`]:
//!
//! - [`RegisteredSpecs`] runs the definitions registered with `kestrel::spec!`
//!   (collected at link time by `inventory`) for the files found on disk.
//! - [`Definitions`] is an in-memory map from file name to definition, handy for
//!   embedding and tests.
//!
//! ```text
//! root paths ──walkdir──► glob on base name ──► sort + dedup ──► SpecSource::define
//!                                                                   │
//!                                                  Scope bound to root suite
//! ```

use std::{
    collections::HashMap,
    fs::File,
    panic::{self, AssertUnwindSafe},
    path::{Component, Path, PathBuf},
    rc::Rc,
};
use tracing::*;
use walkdir::WalkDir;

use crate::{
    config::Config,
    error::DiscoveryError,
    suite::{Scope, SuiteTree},
};

/// Matches `name` against a pattern where `*` stands for any run of characters.
/// Every other character matches itself, case-sensitively.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return name == pattern;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if name.len() < first.len() + last.len() || !name.starts_with(first) || !name.ends_with(last)
    {
        return false;
    }

    // Middle parts must appear in order between the prefix and the suffix.
    let middle = &name[first.len()..name.len() - last.len()];
    let mut pos = 0;
    for part in &parts[1..parts.len() - 1] {
        match middle[pos..].find(*part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    true
}

/// Something able to populate a suite from a discovered spec file.
pub trait SpecSource {
    /// Registers the suites and tests defined by `path` on `scope`. Returns
    /// `Ok(false)` when nothing is known about the file.
    fn define(&self, path: &Path, scope: &mut Scope<'_>) -> eyre::Result<bool>;
}

/// A spec definition registered at link time. Created by `kestrel::spec!`.
pub struct SpecRegistration {
    /// Source file of the definition, usually `file!()`.
    pub file: &'static str,
    pub define: fn(&mut Scope<'_>),
}

impl SpecRegistration {
    pub const fn new(file: &'static str, define: fn(&mut Scope<'_>)) -> SpecRegistration {
        SpecRegistration { file, define }
    }

    /// Trailing part of `file` that is stable regardless of how the compiler was
    /// invoked: everything after the last `.` or `..` component.
    fn suffix(&self) -> PathBuf {
        let components: Vec<_> = Path::new(self.file).components().collect();
        let start = components
            .iter()
            .rposition(|c| !matches!(c, Component::Normal(_)))
            .map_or(0, |i| i + 1);
        components[start..].iter().collect()
    }

    /// Whether this registration was compiled from `path`.
    pub fn matches(&self, path: &Path) -> bool {
        let suffix = self.suffix();
        if suffix.as_os_str().is_empty() {
            return false;
        }
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        path.ends_with(&suffix)
    }
}

inventory::collect!(SpecRegistration);

/// Definitions registered with `kestrel::spec!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisteredSpecs;

impl SpecSource for RegisteredSpecs {
    fn define(&self, path: &Path, scope: &mut Scope<'_>) -> eyre::Result<bool> {
        let mut found = false;
        for registration in inventory::iter::<SpecRegistration> {
            if registration.matches(path) {
                (registration.define)(scope);
                found = true;
            }
        }
        Ok(found)
    }
}

type Definition = Rc<dyn Fn(&mut Scope<'_>)>;

/// In-memory definitions keyed by file name.
#[derive(Default, Clone)]
pub struct Definitions {
    by_name: HashMap<String, Vec<Definition>>,
}

impl Definitions {
    pub fn new() -> Definitions {
        Definitions::default()
    }

    /// Registers `define` for every discovered file whose base name is `file_name`.
    pub fn add(
        &mut self,
        file_name: impl Into<String>,
        define: impl Fn(&mut Scope<'_>) + 'static,
    ) -> &mut Definitions {
        self.by_name
            .entry(file_name.into())
            .or_default()
            .push(Rc::new(define));
        self
    }
}

impl SpecSource for Definitions {
    fn define(&self, path: &Path, scope: &mut Scope<'_>) -> eyre::Result<bool> {
        let Some(definitions) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.by_name.get(name))
        else {
            return Ok(false);
        };

        for define in definitions {
            define(scope);
        }
        Ok(true)
    }
}

/// Discovers spec files and loads them into a suite tree. Clones share the
/// same source.
#[derive(Clone)]
pub struct SuiteLoader {
    source: Rc<dyn SpecSource>,
}

impl Default for SuiteLoader {
    fn default() -> SuiteLoader {
        SuiteLoader::new(RegisteredSpecs)
    }
}

impl SuiteLoader {
    pub fn new(source: impl SpecSource + 'static) -> SuiteLoader {
        SuiteLoader {
            source: Rc::new(source),
        }
    }

    /// Files under `roots` whose base name matches `pattern`, sorted
    /// lexicographically by full path.
    pub fn discover(
        &self,
        pattern: &str,
        roots: &[PathBuf],
    ) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut files = Vec::new();

        for root in roots {
            if !root.exists() {
                return Err(DiscoveryError::MissingPath(root.clone()));
            }

            for entry in WalkDir::new(root).follow_links(true) {
                let entry = entry.map_err(|e| DiscoveryError::Walk {
                    root: root.clone(),
                    reason: e.to_string(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let matched = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| glob_match(pattern, name));
                if matched {
                    files.push(entry.into_path());
                }
            }
        }

        // Whole-path string order, so `a.spec.rs` sorts before `a/b.spec.rs`.
        files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        files.dedup();
        debug!("discovered {} spec file(s) matching \"{pattern}\"", files.len());

        Ok(files)
    }

    /// Builds one suite tree out of every spec file matching `pattern`.
    pub fn load(&self, pattern: &str, roots: &[PathBuf]) -> Result<SuiteTree, DiscoveryError> {
        let files = self.discover(pattern, roots)?;
        let mut tree = SuiteTree::new("");
        let root = tree.root();

        for path in files {
            File::open(&path).map_err(|e| DiscoveryError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?;

            let mut scope = tree.scope(root);
            let defined = panic::catch_unwind(AssertUnwindSafe(|| {
                self.source.define(&path, &mut scope)
            }));
            match defined {
                Ok(Ok(true)) => debug!("loaded {}", path.display()),
                Ok(Ok(false)) => warn!("no definitions registered for {}", path.display()),
                Ok(Err(e)) => {
                    return Err(DiscoveryError::Load {
                        path,
                        reason: format!("{e:#}"),
                    })
                }
                Err(_) => {
                    return Err(DiscoveryError::Load {
                        path,
                        reason: "definition panicked".to_string(),
                    })
                }
            }
        }

        Ok(tree)
    }

    pub fn load_config(&self, cfg: &Config) -> Result<SuiteTree, DiscoveryError> {
        self.load(&cfg.grep, &cfg.paths)
    }
}
