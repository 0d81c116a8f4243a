//! Compiler diagnostics and source locations.

use std::fmt;
use std::path::{Path, PathBuf};

/// A position in one of the sources of a submission.
///
/// `file` indexes into the submission's [`SourceMap`]; index 0 is always the
/// submitted text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub file: u16,
    pub line: u32,
    pub col: u32,
}

/// A compilation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Error code (e.g., "SP0103")
    pub code: &'static str,
    pub message: String,
    pub pos: Pos,
    /// Resolved file path for diagnostics raised inside `#load`ed sources.
    pub file: Option<PathBuf>,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>, pos: Pos) -> Self {
        Self {
            code,
            message: message.into(),
            pos,
            file: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}", file.display())?;
        }
        write!(
            f,
            "({},{}): error {}: {}",
            self.pos.line, self.pos.col, self.code, self.message
        )
    }
}

/// The files that make up one submission (the submitted text plus every
/// `#load`ed file).
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<Option<PathBuf>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            files: vec![None],
        }
    }

    /// Register a loaded file, returning its index.
    pub fn add(&mut self, path: PathBuf) -> u16 {
        self.files.push(Some(path));
        (self.files.len() - 1) as u16
    }

    pub fn path(&self, file: u16) -> Option<&Path> {
        self.files.get(file as usize).and_then(|p| p.as_deref())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().flatten().any(|p| p == path)
    }

    /// Attach the file path to a diagnostic raised at `diag.pos`.
    pub fn locate(&self, mut diag: Diagnostic) -> Diagnostic {
        if diag.file.is_none() {
            diag.file = self.path(diag.pos.file).map(Path::to_path_buf);
        }
        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_file() {
        let diag = Diagnostic::new(
            "SP1002",
            "; expected",
            Pos {
                file: 0,
                line: 1,
                col: 11,
            },
        );
        assert_eq!(diag.to_string(), "(1,11): error SP1002: ; expected");
    }

    #[test]
    fn test_locate_loaded_file() {
        let mut sources = SourceMap::new();
        let index = sources.add(PathBuf::from("lib.csx"));
        let diag = sources.locate(Diagnostic::new(
            "SP0103",
            "The name 'y' does not exist in the current context",
            Pos {
                file: index,
                line: 2,
                col: 5,
            },
        ));
        assert_eq!(
            diag.to_string(),
            "lib.csx(2,5): error SP0103: The name 'y' does not exist in the current context"
        );
        assert!(sources.contains(Path::new("lib.csx")));
    }
}
