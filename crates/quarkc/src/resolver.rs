//! Import-name-to-file-path resolution (spec §4.8).
//!
//! Grounded on `ModuleResolver` (`examples/original_source/include/module_resolver.h`):
//! a one-time scan builds a registry of `module <name>` declarations found
//! under the compiler's `lib/` and the project's `modules/`, consulted
//! before the directory-convention fallbacks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CompileError, CompileResult};

/// Resolves `import` names to canonical `.k` file paths, in the five-step
/// order spec §4.8 lays out.
#[derive(Debug, Default)]
pub struct ModuleResolver {
    compiler_dir: PathBuf,
    project_dir: PathBuf,
    search_paths: Vec<PathBuf>,
    registry: HashMap<String, PathBuf>,
    registry_built: bool,
}

impl ModuleResolver {
    #[must_use]
    pub fn new(compiler_dir: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self { compiler_dir: compiler_dir.into(), project_dir: project_dir.into(), ..Default::default() }
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    #[must_use]
    pub fn modules_dir(&self) -> PathBuf {
        self.project_dir.join("modules")
    }

    /// One-time scan of `<compiler>/lib/` and `<project>/modules/`,
    /// registering every `.k` file whose first non-comment, non-BOM line
    /// declares `module <name>` (spec §4.8 step 1).
    pub fn build_module_registry(&mut self) {
        if self.registry_built {
            return;
        }
        self.scan_directory(&self.compiler_dir.join("lib"));
        self.scan_directory(&self.modules_dir());
        self.registry_built = true;
    }

    fn scan_directory(&mut self, dir: &Path) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_directory(&path);
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("k") {
                continue;
            }
            if let Some(name) = extract_module_name(&path) {
                self.registry.entry(name).or_insert(path);
            }
        }
    }

    /// Resolves `module_name` (e.g. `json`, `mymod/sub`, or a quoted
    /// `./local/file`), trying each step of spec §4.8 in order.
    pub fn resolve(&self, module_name: &str, current_file: Option<&Path>) -> CompileResult<PathBuf> {
        if let Some((parent, child)) = module_name.split_once('/') {
            if let Some(path) = self.resolve_submodule(parent, child) {
                return canonicalize(&path, module_name);
            }
        }

        if let Some(path) = self.registry.get(module_name) {
            return canonicalize(path, module_name);
        }

        let std_path = self.compiler_dir.join("lib").join(module_name).join(format!("{module_name}.k"));
        if std_path.is_file() {
            return canonicalize(&std_path, module_name);
        }

        for candidate in [
            self.modules_dir().join(module_name).join("mod.k"),
            self.modules_dir().join(module_name).join(format!("{module_name}.k")),
            self.modules_dir().join(module_name).join("src").join("mod.k"),
            self.modules_dir().join(module_name).join("src").join(format!("{module_name}.k")),
        ] {
            if candidate.is_file() {
                return canonicalize(&candidate, module_name);
            }
        }

        for search_path in &self.search_paths {
            let candidate = search_path.join(module_name).join(format!("{module_name}.k"));
            if candidate.is_file() {
                return canonicalize(&candidate, module_name);
            }
        }

        if is_quoted_relative(module_name) {
            if let Some(current_file) = current_file {
                let stripped = module_name.trim_start_matches("./");
                let candidate = current_file.parent().unwrap_or_else(|| Path::new(".")).join(stripped);
                let candidate = with_k_extension(candidate);
                if candidate.is_file() {
                    return canonicalize(&candidate, module_name);
                }
            }
        }

        Err(CompileError::Io { message: format!("cannot resolve import `{module_name}`") })
    }

    fn resolve_submodule(&self, parent: &str, child: &str) -> Option<PathBuf> {
        let parent_path = self.registry.get(parent)?;
        let parent_dir = parent_path.parent()?;
        let candidate = parent_dir.join(format!("{child}.k"));
        candidate.is_file().then_some(candidate)
    }
}

fn with_k_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some() { path } else { path.with_extension("k") }
}

fn is_quoted_relative(module_name: &str) -> bool {
    module_name.starts_with("./") || module_name.starts_with("../")
}

fn canonicalize(path: &Path, module_name: &str) -> CompileResult<PathBuf> {
    fs::canonicalize(path)
        .map_err(|err| CompileError::Io { message: format!("cannot resolve import `{module_name}`: {err}") })
}

/// Reads the first non-comment, non-BOM line of a `.k` file looking for a
/// `module <name>` declaration (spec §4.8, §6).
#[must_use]
pub fn extract_module_name(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        return line.strip_prefix("module ").map(|rest| rest.trim_end_matches(';').trim().to_owned());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn extracts_module_name_skipping_comments_and_blank_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("json.k");
        fs::write(&path, "// license header\n\nmodule json\nimport http;\n").expect("write");
        assert_eq!(extract_module_name(&path).as_deref(), Some("json"));
    }

    #[test]
    fn resolve_std_module_by_directory_convention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let compiler_dir = dir.path().join("compiler");
        let lib_dir = compiler_dir.join("lib").join("json");
        fs::create_dir_all(&lib_dir).expect("mkdir");
        fs::write(lib_dir.join("json.k"), "module json\n").expect("write");

        let resolver = ModuleResolver::new(&compiler_dir, dir.path());
        let resolved = resolver.resolve("json", None).expect("resolve");
        assert_eq!(resolved, fs::canonicalize(lib_dir.join("json.k")).expect("canon"));
    }

    #[test]
    fn resolve_unknown_module_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ModuleResolver::new(dir.path(), dir.path());
        assert!(resolver.resolve("nonexistent", None).is_err());
    }
}
