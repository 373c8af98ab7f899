//! Source file ownership (spec §3 "Source file", §4.1).
//!
//! A [`SourceFile`] owns the raw bytes of one `.k` file (or an in-memory
//! virtual file supplied through [`crate::Compiler::compile_source`]) plus a
//! line-start index used to turn byte offsets into 1-based line/column pairs
//! for diagnostics. Mirrors the role the teacher's `ouros_type_checking`
//! crate gives `SourceFile` (constructed once, shared by every later stage).

use std::{
    collections::HashMap,
    fmt,
    io,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::span::{LineCol, Span};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, #[source] source: io::Error },
    #[error("could not canonicalize {path}: {source}")]
    Canonicalize { path: PathBuf, #[source] source: io::Error },
}

/// One source file, identified by its canonical path for the lifetime of a
/// compilation. `virtual` files (from `compile_source`) use their supplied
/// name verbatim and are never canonicalized.
#[derive(Clone)]
pub struct SourceFile {
    canonical_path: PathBuf,
    text: String,
    line_starts: Vec<u32>,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("canonical_path", &self.canonical_path)
            .field("len", &self.text.len())
            .finish_non_exhaustive()
    }
}

impl SourceFile {
    /// Reads `path` from disk, canonicalizes it, strips a leading BOM, and
    /// builds the line-start index.
    pub fn read(path: &Path) -> Result<Self, SourceError> {
        let canonical_path = std::fs::canonicalize(path).map_err(|source| SourceError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes = std::fs::read(&canonical_path).map_err(|source| SourceError::Read {
            path: canonical_path.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Self::from_text(canonical_path, text))
    }

    /// Builds a `SourceFile` from text already in memory, used by
    /// `compile_source` and by resolved imports that were read eagerly.
    #[must_use]
    pub fn from_text(canonical_path: PathBuf, mut text: String) -> Self {
        if let Some(stripped) = text.strip_prefix('\u{feff}') {
            text = stripped.to_owned();
        }
        let line_starts = compute_line_starts(&text);
        Self { canonical_path, text, line_starts }
    }

    #[must_use]
    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn slice(&self, span: Span) -> &str {
        &self.text[span.start as usize..span.end as usize]
    }

    /// 1-based line/column for a byte offset, via binary search over
    /// `line_starts`.
    #[must_use]
    pub fn line_col(&self, offset: u32) -> LineCol {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert_at) => insert_at.saturating_sub(1),
        };
        let line_start = self.line_starts[line_index];
        LineCol {
            line: line_index as u32 + 1,
            column: offset - line_start + 1,
        }
    }

    /// The raw text of a single 1-based line, used by the diagnostic
    /// renderer's caret underline.
    #[must_use]
    pub fn line_text(&self, line: u32) -> &str {
        let index = line.saturating_sub(1) as usize;
        let start = self.line_starts[index] as usize;
        let end = self
            .line_starts
            .get(index + 1)
            .map_or(self.text.len(), |&s| s as usize)
            .min(self.text.len());
        self.text[start..end].trim_end_matches(['\n', '\r'])
    }
}

fn compute_line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (offset, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(offset as u32 + 1);
        }
    }
    starts
}

/// Shared ownership of every [`SourceFile`] touched by one compilation,
/// keyed by canonical path so the module resolver's cycle check and the
/// diagnostic renderer's lookup share one map.
#[derive(Debug, Default)]
pub struct SourceSet {
    files: HashMap<PathBuf, Rc<SourceFile>>,
}

impl SourceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: SourceFile) -> Rc<SourceFile> {
        let rc = Rc::new(file);
        self.files.insert(rc.canonical_path().to_path_buf(), Rc::clone(&rc));
        rc
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Rc<SourceFile>> {
        self.files.get(path).cloned()
    }

    /// Reads and inserts `path` if not already present, returning the
    /// existing entry otherwise (an import reached by two different paths
    /// that canonicalize the same is only read once).
    pub fn read_or_get(&mut self, path: &Path) -> Result<Rc<SourceFile>, SourceError> {
        let canonical = std::fs::canonicalize(path).map_err(|source| SourceError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(existing) = self.get(&canonical) {
            return Ok(existing);
        }
        Ok(self.insert(SourceFile::read(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_tracks_newlines() {
        let file = SourceFile::from_text(PathBuf::from("virtual.k"), "fn main() {\n  ret 0;\n}\n".to_owned());
        assert_eq!(file.line_col(0), LineCol { line: 1, column: 1 });
        let ret_offset = file.text().find("ret").unwrap() as u32;
        assert_eq!(file.line_col(ret_offset), LineCol { line: 2, column: 3 });
        assert_eq!(file.line_text(2), "  ret 0;");
    }

    #[test]
    fn strips_leading_bom() {
        let file = SourceFile::from_text(PathBuf::from("virtual.k"), "\u{feff}module foo".to_owned());
        assert_eq!(file.text(), "module foo");
    }
}
