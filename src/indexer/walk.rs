//! Source file enumeration.

use std::path::Path;

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use tracing::warn;

use crate::{Error, Result};

/// Directories never indexed, on top of `.gitignore` and configured globs
pub const DEFAULT_EXCLUDES: &[&str] = &["vendor/", "node_modules/", "tmp/", "log/", ".git/", ".repodex/"];

/// Relative paths (forward slashes, sorted) of every indexable file under `root`
pub fn collect_files(root: &Path, extensions: &[String], exclude: &[String]) -> Result<Vec<String>> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in DEFAULT_EXCLUDES.iter().copied().chain(exclude.iter().map(String::as_str)) {
        overrides
            .add(&format!("!{}", pattern))
            .map_err(|e| Error::InvalidQuery(format!("invalid exclude pattern {:?}: {}", pattern, e)))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| Error::InvalidQuery(format!("invalid exclude patterns: {}", e)))?;

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !has_extension(path, extensions) {
            continue;
        }
        if let Some(relative) = relative_path(root, path) {
            files.push(relative);
        }
    }
    files.sort();
    Ok(files)
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.trim_start_matches('.') == ext))
}

/// `path` relative to `root` with forward slashes
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// blake3 hex digest of a file's bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# ruby\n").unwrap();
    }

    #[test]
    fn test_collect_files_applies_excludes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "app/models/user.rb");
        touch(root, "app/models/notes.txt");
        touch(root, "vendor/bundle/gem.rb");
        touch(root, "tmp/cache.rb");
        touch(root, "lib/generated/out.rb");
        touch(root, "lib/tasks/seed.rb");
        touch(root, "ignored/thing.rb");
        fs::write(root.join(".gitignore"), "ignored/\n").unwrap();

        let files = collect_files(root, &["rb".to_string()], &["lib/generated/".to_string()]).unwrap();
        assert_eq!(files, vec!["app/models/user.rb", "lib/tasks/seed.rb"]);
    }

    #[test]
    fn test_invalid_exclude() {
        let dir = TempDir::new().unwrap();
        let err = collect_files(dir.path(), &["rb".to_string()], &["a[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        assert_eq!(fingerprint(b"class A; end"), fingerprint(b"class A; end"));
        assert_ne!(fingerprint(b"class A; end"), fingerprint(b"class B; end"));
        assert_eq!(fingerprint(b"").len(), 64);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/repo");
        assert_eq!(relative_path(root, Path::new("/repo/app/a.rb")).as_deref(), Some("app/a.rb"));
        assert_eq!(relative_path(root, Path::new("/elsewhere/a.rb")), None);
        assert!(has_extension(Path::new("a.rb"), &[".rb".to_string()]));
        assert!(!has_extension(Path::new("a.rake"), &["rb".to_string()]));
    }
}
