//! Compilation cache (spec §4.9).
//!
//! Grounded on `CompilationCache` (`examples/original_source/include/compilation_cache.h`):
//! a JSON manifest mapping a hex cache key (FNV-1a-64 of the source's
//! canonical path) to an entry recording the source hash, the bitcode path,
//! and the option fields that feed the fingerprint. A dirty flag avoids
//! rewriting the manifest when nothing changed.

use std::collections::HashMap;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::options::OptLevel;

const CACHE_VERSION: u32 = 1;
const MANIFEST_FILENAME: &str = "manifest.json";

/// One manifest row (spec §6 "Cache manifest format").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source_hash: String,
    pub llvm_bitcode_path: PathBuf,
    pub optimization_level: u8,
    pub freestanding: bool,
    pub dependencies: Vec<String>,
    pub cache_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheManifest {
    version: u32,
    compiler_version: String,
    entries: HashMap<String, CacheEntry>,
}

/// Outcome of a cache lookup.
pub enum CacheLookup {
    Hit(Vec<u8>),
    Miss,
}

/// Persistent, process-local store of compiled bitcode keyed by the hash of
/// a source file's canonical path (spec §4.9, §5 "the cache manifest is
/// process-local and accessed under a single owner").
pub struct CompilationCache {
    cache_dir: PathBuf,
    manifest_path: PathBuf,
    manifest: CacheManifest,
    enabled: bool,
    dirty: bool,
}

impl CompilationCache {
    /// Loads (or initializes) the manifest at `cache_dir/manifest.json`. A
    /// parse failure is treated as an empty cache, never an error
    /// (spec §7 "manifest parse failure treated as 'empty cache'").
    #[must_use]
    pub fn open(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let manifest_path = cache_dir.join(MANIFEST_FILENAME);
        let manifest = fs::read_to_string(&manifest_path)
            .ok()
            .and_then(|text| serde_json::from_str::<CacheManifest>(&text).ok())
            .filter(|manifest| manifest.version == CACHE_VERSION && manifest.compiler_version == env!("CARGO_PKG_VERSION"))
            .unwrap_or_else(|| CacheManifest { version: CACHE_VERSION, compiler_version: env!("CARGO_PKG_VERSION").to_owned(), entries: HashMap::new() });
        Self { cache_dir, manifest_path, manifest, enabled: true, dirty: false }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn cache_key(canonical_path: &Path) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(canonical_path.to_string_lossy().as_bytes());
        format!("{:016x}", hasher.finish())
    }

    #[must_use]
    pub fn source_hash(source: &[u8]) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(source);
        format!("{:016x}", hasher.finish())
    }

    /// Validity per spec §4.9: source hash, optimization level, and
    /// freestanding flag all match; every declared dependency still exists;
    /// the bitcode file on disk still exists. A missing bitcode file is a
    /// miss, not an error (spec §7 "bitcode read failure treated as a
    /// miss").
    pub fn lookup(&mut self, canonical_path: &Path, source: &[u8], optimization_level: OptLevel, freestanding: bool) -> CacheLookup {
        if !self.enabled {
            return CacheLookup::Miss;
        }
        let key = Self::cache_key(canonical_path);
        let Some(entry) = self.manifest.entries.get(&key) else {
            return CacheLookup::Miss;
        };
        let matches = entry.source_hash == Self::source_hash(source)
            && entry.optimization_level == optimization_level.as_u8()
            && entry.freestanding == freestanding
            && entry.dependencies.iter().all(|dep| Path::new(dep).exists());
        if !matches {
            return CacheLookup::Miss;
        }
        match fs::read(&entry.llvm_bitcode_path) {
            Ok(bytes) => CacheLookup::Hit(bytes),
            Err(_) => CacheLookup::Miss,
        }
    }

    /// Writes `bitcode` under the cache directory and records a fresh
    /// manifest entry (spec §4.9 "misses proceed normally and, on success,
    /// store the freshly produced bitcode").
    pub fn store(
        &mut self,
        canonical_path: &Path,
        source: &[u8],
        bitcode: &[u8],
        optimization_level: OptLevel,
        freestanding: bool,
        dependencies: Vec<String>,
    ) -> CompileResult<()> {
        if !self.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.cache_dir).map_err(|err| CompileError::Cache { message: err.to_string() })?;
        let key = Self::cache_key(canonical_path);
        let bitcode_path = self.cache_dir.join(format!("{key}.bc"));
        fs::write(&bitcode_path, bitcode).map_err(|err| CompileError::Cache { message: err.to_string() })?;
        self.manifest.entries.insert(
            key,
            CacheEntry {
                source_hash: Self::source_hash(source),
                llvm_bitcode_path: bitcode_path,
                optimization_level: optimization_level.as_u8(),
                freestanding,
                dependencies,
                cache_time: now_secs(),
            },
        );
        self.dirty = true;
        Ok(())
    }

    pub fn invalidate(&mut self, canonical_path: &Path) {
        let key = Self::cache_key(canonical_path);
        if self.manifest.entries.remove(&key).is_some() {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        self.manifest.entries.clear();
        let _ = fs::remove_dir_all(&self.cache_dir);
        self.dirty = true;
    }

    /// Evicts entries older than `max_age` (default seven days, spec §4.9).
    pub fn prune_old_entries(&mut self, max_age: Duration) {
        let cutoff = now_secs().saturating_sub(max_age.as_secs());
        let before = self.manifest.entries.len();
        self.manifest.entries.retain(|_, entry| entry.cache_time >= cutoff);
        if self.manifest.entries.len() != before {
            self.dirty = true;
        }
    }

    /// Evicts entries oldest-first by cache time until the manifest's total
    /// bitcode size is under `max_bytes` (spec §4.9).
    pub fn prune_by_size(&mut self, max_bytes: u64) {
        let mut total: u64 = self.manifest.entries.values().filter_map(|entry| fs::metadata(&entry.llvm_bitcode_path).ok()).map(|meta| meta.len()).sum();
        if total <= max_bytes {
            return;
        }
        let mut by_age: Vec<(String, u64)> = self.manifest.entries.iter().map(|(key, entry)| (key.clone(), entry.cache_time)).collect();
        by_age.sort_by_key(|(_, cache_time)| *cache_time);
        for (key, _) in by_age {
            if total <= max_bytes {
                break;
            }
            if let Some(entry) = self.manifest.entries.remove(&key) {
                let size = fs::metadata(&entry.llvm_bitcode_path).map(|meta| meta.len()).unwrap_or(0);
                let _ = fs::remove_file(&entry.llvm_bitcode_path);
                total = total.saturating_sub(size);
                self.dirty = true;
            }
        }
    }

    /// Writes the manifest if it has unsaved mutations (spec §4.9 "the
    /// manifest is written on cache mutation and at clean shutdown; a dirty
    /// flag prevents unnecessary writes").
    pub fn save(&mut self) -> CompileResult<()> {
        if !self.dirty {
            return Ok(());
        }
        fs::create_dir_all(&self.cache_dir).map_err(|err| CompileError::Cache { message: err.to_string() })?;
        let text = serde_json::to_string_pretty(&self.manifest).map_err(|err| CompileError::Cache { message: err.to_string() })?;
        fs::write(&self.manifest_path, text).map_err(|err| CompileError::Cache { message: err.to_string() })?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for CompilationCache {
    fn drop(&mut self) {
        let _ = self.save();
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|dur| dur.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_lookup_hits_with_matching_fingerprint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("main.k");
        std::fs::write(&source_path, "module main\n").expect("write");
        let canonical = std::fs::canonicalize(&source_path).expect("canon");

        let mut cache = CompilationCache::open(dir.path().join("cache"));
        let source = b"module main\n";
        assert!(matches!(cache.lookup(&canonical, source, OptLevel::O0, false), CacheLookup::Miss));
        cache.store(&canonical, source, b"bitcode-bytes", OptLevel::O0, false, Vec::new()).expect("store");
        match cache.lookup(&canonical, source, OptLevel::O0, false) {
            CacheLookup::Hit(bytes) => assert_eq!(bytes, b"bitcode-bytes"),
            CacheLookup::Miss => panic!("expected a hit"),
        }
    }

    #[test]
    fn mutated_source_invalidates_the_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("main.k");
        std::fs::write(&source_path, "module main\n").expect("write");
        let canonical = std::fs::canonicalize(&source_path).expect("canon");

        let mut cache = CompilationCache::open(dir.path().join("cache"));
        cache.store(&canonical, b"module main\n", b"bitcode", OptLevel::O0, false, Vec::new()).expect("store");
        assert!(matches!(cache.lookup(&canonical, b"module main\nimport x;\n", OptLevel::O0, false), CacheLookup::Miss));
    }

    #[test]
    fn mismatched_optimization_level_invalidates_the_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("main.k");
        std::fs::write(&source_path, "module main\n").expect("write");
        let canonical = std::fs::canonicalize(&source_path).expect("canon");

        let mut cache = CompilationCache::open(dir.path().join("cache"));
        let source = b"module main\n";
        cache.store(&canonical, source, b"bitcode", OptLevel::O0, false, Vec::new()).expect("store");
        assert!(matches!(cache.lookup(&canonical, source, OptLevel::O2, false), CacheLookup::Miss));
    }
}
