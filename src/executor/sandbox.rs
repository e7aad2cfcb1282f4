// Allowed-directory path confinement
//
// Candidates are resolved to their real location before the containment
// check, so symlinks pointing out of an allowed root are rejected.

use crate::executor::config::ExecutionConfig;
use crate::executor::error::ExecutionError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Expected entry type for a validated path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

impl PathKind {
    fn noun(self) -> &'static str {
        match self {
            PathKind::File => "file",
            PathKind::Directory => "directory",
        }
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }

    normalized
}

/// Resolve `path` to its real absolute location.
///
/// When the path does not exist, the deepest existing ancestor is
/// canonicalized and the missing tail is appended, so a symlinked ancestor
/// cannot smuggle a not-yet-created target out of the sandbox.
pub fn resolve_canonical(path: &Path) -> PathBuf {
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }

    let normalized = normalize_lexical(path);
    let mut tail = Vec::new();
    let mut current = normalized.as_path();

    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            tail.push(name.to_os_string());
        }
        current = parent;

        if let Ok(mut real) = std::fs::canonicalize(current) {
            for part in tail.iter().rev() {
                real.push(part);
            }
            return real;
        }
    }

    normalized
}

fn fold_case(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

/// True if `candidate` equals `root` or lies strictly beneath it (case-insensitive)
fn is_within(root: &Path, candidate: &Path) -> bool {
    let root = fold_case(root);
    let candidate = fold_case(candidate);

    match candidate.strip_prefix(&root) {
        Ok(relative) => {
            !relative.is_absolute()
                && !relative
                    .components()
                    .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        }
        Err(_) => false,
    }
}

/// Validates candidate paths against the allowlist
#[derive(Debug, Clone)]
pub struct PathValidator {
    allowed: Vec<PathBuf>,
    base: PathBuf,
}

impl PathValidator {
    /// `allowed` should already be canonical; `base` resolves relative candidates
    pub fn new(allowed: Vec<PathBuf>, base: PathBuf) -> Self {
        Self { allowed, base }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(
            config.allowed_directories.clone(),
            config.default_working_directory.clone(),
        )
    }

    /// Containment check for an already-resolved path
    pub fn is_allowed(&self, resolved: &Path) -> bool {
        self.allowed.iter().any(|root| is_within(root, resolved))
    }

    /// Resolve `candidate` and confirm it is an existing `kind` inside the allowlist.
    ///
    /// Returns the canonical absolute path. Never mutates the filesystem.
    pub fn validate(&self, candidate: &str, kind: PathKind) -> Result<PathBuf, ExecutionError> {
        let raw = Path::new(candidate);
        let absolute = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.base.join(raw)
        };
        let resolved = resolve_canonical(&absolute);

        if !self.is_allowed(&resolved) {
            warn!(
                candidate = %candidate,
                resolved = %resolved.display(),
                allowed = ?self.allowed,
                "path rejected: outside allowed directories"
            );
            return Err(ExecutionError::path_not_allowed(
                candidate,
                format!("Path is outside the allowed directories: {}", candidate),
            ));
        }

        // Permission errors are reported the same as a missing entry
        let Ok(metadata) = std::fs::metadata(&resolved) else {
            debug!(resolved = %resolved.display(), "path rejected: not found");
            return Err(ExecutionError::path_not_allowed(
                candidate,
                format!("{} not found: {}", capitalize(kind.noun()), candidate),
            ));
        };

        let matches = match kind {
            PathKind::File => metadata.is_file(),
            PathKind::Directory => metadata.is_dir(),
        };
        if !matches {
            return Err(ExecutionError::path_not_allowed(
                candidate,
                format!("Path is not a {}: {}", kind.noun(), candidate),
            ));
        }

        debug!(resolved = %resolved.display(), kind = kind.noun(), "path validated");
        Ok(resolved)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, PathBuf, PathValidator) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::write(root.join("src/main.py"), "print('hi')\n").unwrap();
        let validator = PathValidator::new(vec![root.clone()], root.clone());
        (dir, root, validator)
    }

    fn assert_rejected(result: Result<PathBuf, ExecutionError>, expected_path: &str) {
        match result {
            Err(ExecutionError::PathNotAllowed { path, .. }) => assert_eq!(path, expected_path),
            other => panic!("expected PathNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn test_allowed_root_itself() {
        let (_dir, root, validator) = sandbox();
        let resolved = validator
            .validate(&root.to_string_lossy(), PathKind::Directory)
            .unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn test_descendants_are_allowed() {
        let (_dir, root, validator) = sandbox();

        let file = validator
            .validate(&root.join("src/main.py").to_string_lossy(), PathKind::File)
            .unwrap();
        assert_eq!(file, root.join("src/main.py"));
        assert!(file.is_absolute());

        let nested = validator
            .validate("src/nested", PathKind::Directory)
            .unwrap();
        assert_eq!(nested, root.join("src/nested"));
    }

    #[test]
    fn test_inner_dotdot_that_stays_inside() {
        let (_dir, root, validator) = sandbox();
        let resolved = validator
            .validate("src/nested/../main.py", PathKind::File)
            .unwrap();
        assert_eq!(resolved, root.join("src/main.py"));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let (_dir, root, validator) = sandbox();
        let candidate = format!("{}/../../etc/passwd", root.display());
        assert_rejected(validator.validate(&candidate, PathKind::File), &candidate);
    }

    #[test]
    fn test_outside_path_is_rejected() {
        let (_dir, _root, validator) = sandbox();
        assert_rejected(validator.validate("/etc/passwd", PathKind::File), "/etc/passwd");
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let parent = tempfile::tempdir().unwrap();
        let parent = parent.path().canonicalize().unwrap();
        fs::create_dir_all(parent.join("box")).unwrap();
        fs::create_dir_all(parent.join("box2")).unwrap();
        let validator = PathValidator::new(vec![parent.join("box")], parent.join("box"));

        let candidate = parent.join("box2").to_string_lossy().to_string();
        assert_rejected(validator.validate(&candidate, PathKind::Directory), &candidate);
    }

    #[test]
    fn test_empty_allowlist_denies_everything() {
        let (_dir, root, _) = sandbox();
        let validator = PathValidator::new(Vec::new(), root.clone());
        assert_rejected(
            validator.validate(&root.to_string_lossy(), PathKind::Directory),
            &root.to_string_lossy(),
        );
    }

    #[test]
    fn test_missing_and_wrong_kind_messages_differ() {
        let (_dir, _root, validator) = sandbox();

        let missing = validator.validate("src/absent.py", PathKind::File).unwrap_err();
        assert!(missing.to_string().contains("not found"), "{missing}");

        let wrong = validator.validate("src", PathKind::File).unwrap_err();
        assert!(wrong.to_string().contains("not a file"), "{wrong}");

        let wrong_dir = validator
            .validate("src/main.py", PathKind::Directory)
            .unwrap_err();
        assert!(wrong_dir.to_string().contains("not a directory"), "{wrong_dir}");
    }

    #[test]
    fn test_rejection_does_not_leak_allowlist() {
        let (_dir, root, validator) = sandbox();
        let err = validator.validate("/etc/passwd", PathKind::File).unwrap_err();
        assert!(!err.to_string().contains(&*root.to_string_lossy()));
    }

    #[test]
    fn test_case_insensitive_containment() {
        let root = PathBuf::from("/Sandbox/Project");
        assert!(is_within(&root, Path::new("/sandbox/project/a.py")));
        assert!(is_within(&root, Path::new("/SANDBOX/PROJECT")));
        assert!(!is_within(&root, Path::new("/sandbox/projectx")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let (_dir, root, validator) = sandbox();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert_rejected(
            validator.validate("link/secret.txt", PathKind::File),
            "link/secret.txt",
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_target_under_escaping_symlink_is_resolved() {
        let (_dir, root, validator) = sandbox();
        let outside = tempfile::tempdir().unwrap();
        let outside_real = outside.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(&outside_real, root.join("link")).unwrap();

        let resolved = resolve_canonical(&root.join("link/not-yet/created.py"));
        assert!(resolved.starts_with(&outside_real));
        assert!(!validator.is_allowed(&resolved));
    }

    #[test]
    fn test_normalize_lexical() {
        assert_eq!(
            normalize_lexical(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_lexical(Path::new("/../..")), PathBuf::from("/"));
        assert_eq!(normalize_lexical(Path::new("")), PathBuf::from("."));
    }

    #[test]
    fn test_rejects_without_mutation() {
        let (_dir, root, validator) = sandbox();
        let before: Vec<_> = fs::read_dir(&root).unwrap().map(|e| e.unwrap().path()).collect();

        let _ = validator.validate("/etc/shadow", PathKind::File);
        let _ = validator.validate("new/dir", PathKind::Directory);

        let after: Vec<_> = fs::read_dir(&root).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(before.len(), after.len());
        assert!(!root.join("new").exists());
    }
}
