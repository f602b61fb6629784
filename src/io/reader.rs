//! Document reading for the preprocessing pipeline.
//!
//! Directory walking with extension filtering and file reads that switch
//! to memory mapping above a size threshold. Invalid UTF-8 is replaced
//! rather than fatal; binary files are detected and flagged upstream.

use std::fs;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{IoError, Result};

/// Files at or above this size are memory-mapped instead of read whole.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Extensions the pipeline considers processable.
const SOURCE_EXTENSIONS: &[&str] = &[
    "md", "markdown", "rst", "txt", "text", "pdf", "rs", "py", "js", "ts", "go", "java", "c",
    "cpp", "h", "rb", "toml", "yaml", "yml", "json",
];

/// A source document read from disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the scanned directory.
    pub relative_path: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Decoded content (lossy for invalid UTF-8).
    pub content: String,
}

/// Recursively lists processable files under `dir`, sorted by relative
/// path for deterministic pipeline output.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn walk_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IoError::FileNotFound {
            path: dir.display().to_string(),
        }
        .into());
    }
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| IoError::ReadFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| IoError::ReadFailed {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if has_source_extension(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Reads one file, memory-mapping large ones.
///
/// # Errors
///
/// Returns an error if the file cannot be read or mapped.
pub fn read_file(root: &Path, path: &Path) -> Result<SourceFile> {
    let metadata = fs::metadata(path).map_err(|e| IoError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let size_bytes = metadata.len();

    let content = if size_bytes >= MMAP_THRESHOLD {
        let file = fs::File::open(path).map_err(|e| IoError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        // SAFETY: the mapping is read-only and dropped before this
        // function returns; content is copied out.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IoError::MmapFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        String::from_utf8_lossy(&mmap).into_owned()
    } else {
        let bytes = fs::read(path).map_err(|e| IoError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let relative_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned();

    Ok(SourceFile {
        relative_path,
        path: path.to_path_buf(),
        size_bytes,
        content,
    })
}

/// Whether decoded content looks binary (replacement-character density).
#[must_use]
pub fn looks_binary(content: &str) -> bool {
    if content.is_empty() {
        return false;
    }
    let replacements = content.chars().filter(|&c| c == '\u{FFFD}').count();
    replacements * 100 / content.chars().count().max(1) > 5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &[u8]) {
        if let Some(parent) = Path::new(name).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(dir.join(parent)).unwrap();
        }
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(content).unwrap();
    }

    #[test]
    fn test_walk_directory_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "b.md", b"beta");
        write_file(tmp.path(), "a.txt", b"alpha");
        write_file(tmp.path(), "ignore.bin", b"\x00\x01");
        write_file(tmp.path(), "nested/c.rs", b"fn main() {}");
        write_file(tmp.path(), ".hidden.md", b"hidden");

        let files = walk_directory(tmp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md", "nested/c.rs"]);
    }

    #[test]
    fn test_walk_directory_missing() {
        let err = walk_directory(Path::new("/nonexistent/dir-xyz")).unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_read_file_small() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "doc.md", "# Title\nbody\n".as_bytes());
        let file = read_file(tmp.path(), &tmp.path().join("doc.md")).unwrap();
        assert_eq!(file.relative_path, "doc.md");
        assert!(file.content.starts_with("# Title"));
        assert_eq!(file.size_bytes, 13);
    }

    #[test]
    fn test_read_file_large_uses_mmap() {
        let tmp = TempDir::new().unwrap();
        let content = "line of text\n".repeat(100_000);
        write_file(tmp.path(), "big.txt", content.as_bytes());
        let file = read_file(tmp.path(), &tmp.path().join("big.txt")).unwrap();
        assert!(file.size_bytes >= MMAP_THRESHOLD);
        assert_eq!(file.content.len(), content.len());
    }

    #[test]
    fn test_invalid_utf8_is_lossy_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "weird.txt", b"ok \xFF\xFE bytes");
        let file = read_file(tmp.path(), &tmp.path().join("weird.txt")).unwrap();
        assert!(file.content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_looks_binary() {
        assert!(!looks_binary("normal text"));
        let noisy: String = "\u{FFFD}".repeat(50);
        assert!(looks_binary(&noisy));
        assert!(!looks_binary(""));
    }
}
