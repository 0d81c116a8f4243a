//! `#load` expansion.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::ast::{Item, Submission};
use super::diagnostic::{Diagnostic, SourceMap};
use super::parser::parse_source;

/// Parse a submission and splice in every `#load`ed file.
///
/// Relative paths resolve against `script_root` for the submission itself
/// and against the loading file's directory for nested loads. A file that is
/// already part of the submission is not loaded again, which also breaks
/// cycles.
pub fn load(
    code: &str,
    script_root: Option<&Path>,
    sources: &mut SourceMap,
) -> Result<Submission, Diagnostic> {
    let submission = parse_source(code, 0)?;
    let base = script_root.map(Path::to_path_buf).unwrap_or_default();
    let mut items = Vec::with_capacity(submission.items.len());
    expand(submission.items, &base, sources, &mut items)?;
    Ok(Submission { items })
}

fn expand(
    items: Vec<Item>,
    base: &Path,
    sources: &mut SourceMap,
    out: &mut Vec<Item>,
) -> Result<(), Diagnostic> {
    for item in items {
        let Item::Load { path, pos } = item else {
            out.push(item);
            continue;
        };
        let resolved = resolve(base, &path);
        if sources.contains(&resolved) {
            debug!("Skipping already loaded source {}", resolved.display());
            continue;
        }
        let text = std::fs::read_to_string(&resolved).map_err(|e| {
            Diagnostic::new(
                "SP1504",
                format!("Source file '{}' could not be opened -- {e}", resolved.display()),
                pos,
            )
        })?;
        debug!("Loading source {}", resolved.display());
        let file = sources.add(resolved.clone());
        let loaded = parse_source(&text, file)?;
        let nested_base = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        expand(loaded.items, &nested_base, sources, out)?;
    }
    Ok(())
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let joined = base.join(path);
    joined.canonicalize().unwrap_or(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_splices_items() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lib.csx"), "int Twice(int n) { return n * 2; }").unwrap();

        let mut sources = SourceMap::new();
        let sub = load("#load \"lib.csx\"\nTwice(2)", Some(dir.path()), &mut sources).unwrap();

        assert_eq!(sub.items.len(), 2);
        assert!(matches!(sub.items[0], Item::Function(_)));
        assert!(matches!(sub.items[1], Item::Trailing(_)));
    }

    #[test]
    fn test_nested_load_is_relative_to_loading_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.csx"), "#load \"b.csx\"\nint a = 1;").unwrap();
        fs::write(dir.path().join("sub/b.csx"), "int b = 2;").unwrap();

        let mut sources = SourceMap::new();
        let sub = load("#load \"sub/a.csx\"", Some(dir.path()), &mut sources).unwrap();
        assert_eq!(sub.items.len(), 2);
    }

    #[test]
    fn test_cyclic_load_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csx"), "#load \"b.csx\"\nint a = 1;").unwrap();
        fs::write(dir.path().join("b.csx"), "#load \"a.csx\"\nint b = 2;").unwrap();

        let mut sources = SourceMap::new();
        let sub = load("#load \"a.csx\"", Some(dir.path()), &mut sources).unwrap();
        assert_eq!(sub.items.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut sources = SourceMap::new();
        let err = load("#load \"nope.csx\"", Some(dir.path()), &mut sources).unwrap_err();
        assert_eq!(err.code, "SP1504");
        assert!(err.message.contains("nope.csx"));
    }

    #[test]
    fn test_syntax_error_in_loaded_file_is_located() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.csx"), "int x = ;").unwrap();

        let mut sources = SourceMap::new();
        let err = load("#load \"bad.csx\"", Some(dir.path()), &mut sources).unwrap_err();
        let located = sources.locate(err);
        assert!(located.to_string().contains("bad.csx(1,9): error SP1525"));
    }
}
