//! Path normalization utilities.
//!
//! Provides consistent path handling across the codebase:
//! - `normalize_path` - file system paths (canonicalize + fallback)
//! - `normalize_lexically` - collapse `.` and `..` without touching the disk

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Lexical normalization if already absolute
/// - Join with current directory if relative
///
/// # Example
/// ```ignore
/// use sitepipe::utils::path::normalize_path;
/// let abs = normalize_path(Path::new("./site"));
/// ```
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            normalize_lexically(path)
        } else {
            std::env::current_dir().map_or_else(
                |_| path.to_path_buf(),
                |cwd| normalize_lexically(&cwd.join(path)),
            )
        }
    })
}

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// `..` never climbs above the root, so `/../a` becomes `/a`.
/// A relative path keeps leading `..` components it cannot cancel.
///
/// # Example
/// ```ignore
/// assert_eq!(normalize_lexically(Path::new("/site/b/../shared/lib.js")),
///            PathBuf::from("/site/shared/lib.js"));
/// ```
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
