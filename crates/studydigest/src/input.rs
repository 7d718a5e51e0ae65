//! Reading document text from a file or stdin.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Read UTF-8 text from `path`, or from stdin when `path` is `-`.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Default document ID for an ingested file: `<owner>/<file stem>`.
pub fn default_document_id(owner_id: &str, path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty() && s != "-")
        .unwrap_or_else(|| "stdin".to_string());
    format!("{}/{}", owner_id, stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_document_id() {
        assert_eq!(
            default_document_id("alice", Path::new("notes/cell-biology.md")),
            "alice/cell-biology"
        );
        assert_eq!(default_document_id("alice", Path::new("-")), "alice/stdin");
    }

    #[test]
    fn test_read_text_lossy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"ok \xff done").unwrap();
        assert_eq!(read_text(&path).unwrap(), "ok \u{fffd} done");
    }
}
