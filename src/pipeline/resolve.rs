//! Reference resolution.
//!
//! Maps `(source dir, output dir, requesting document, reference)` to the
//! asset's absolute source path, its path relative to the source root and
//! its output path. Pure: no I/O, so the output tree mirrors the source
//! tree for every processed asset.
//!
//! ```text
//! site/b/c.html  references  ../shared/lib.js
//!   absolute_path       site/shared/lib.js
//!   root_relative_path  shared/lib.js
//!   output_path         site-out/shared/lib.js
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::utils::path::normalize_lexically;
use crate::utils::path::route::{
    decode_path, is_external_link, is_protocol_relative, strip_query_fragment,
};

/// Reference that cannot be mapped into the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("`{reference}` resolves to `{}`, outside the source directory", absolute.display())]
    OutsideSource { reference: String, absolute: PathBuf },

    #[error("`{reference}` resolves to the source directory itself")]
    SourceRoot { reference: String },
}

/// Resolved locations of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub absolute_path: PathBuf,
    pub output_path: PathBuf,
    pub root_relative_path: PathBuf,
}

/// Resolve `reference` as requested by the document at `requester`.
///
/// A reference beginning with a root (`/lib.js`) is absolute; anything else
/// is relative to the directory containing the requester. The result must
/// lie inside `source_dir`, otherwise no output location exists for it.
pub fn resolve(
    source_dir: &Path,
    output_dir: &Path,
    requester: &Path,
    reference: &str,
) -> Result<ResolvedPaths, ResolveError> {
    let base = requester.parent().unwrap_or(source_dir);
    let absolute_path = normalize_lexically(&base.join(reference));

    let root_relative_path = absolute_path
        .strip_prefix(source_dir)
        .map_err(|_| ResolveError::OutsideSource {
            reference: reference.to_owned(),
            absolute: absolute_path.clone(),
        })?
        .to_path_buf();

    if root_relative_path.as_os_str().is_empty() {
        return Err(ResolveError::SourceRoot {
            reference: reference.to_owned(),
        });
    }

    Ok(ResolvedPaths {
        output_path: output_dir.join(&root_relative_path),
        absolute_path,
        root_relative_path,
    })
}

/// Turn a raw attribute value into a local path reference.
///
/// Returns `None` for references that never map to a local file:
/// URLs with a scheme, protocol-relative URLs and bare fragments.
/// Query and fragment suffixes are dropped and `%XX` escapes decoded.
pub fn local_reference(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if is_external_link(raw) || is_protocol_relative(raw) {
        return None;
    }
    let path = strip_query_fragment(raw);
    if path.is_empty() {
        return None;
    }
    Some(decode_path(path).into_owned())
}

/// Everything a transform needs to know about one asset occurrence.
///
/// Built once per scheduled asset and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingContext {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Reference as written in the document (before cleanup)
    pub request_path: String,
    /// Document that referenced the asset
    pub requester_path: PathBuf,
    pub absolute_path: PathBuf,
    pub output_path: PathBuf,
    pub root_relative_path: PathBuf,
}

impl ProcessingContext {
    /// Resolve a cleaned-up reference into a full context.
    pub fn new(
        source_dir: &Path,
        output_dir: &Path,
        requester: &Path,
        request: &str,
        reference: &str,
    ) -> Result<Self, ResolveError> {
        let resolved = resolve(source_dir, output_dir, requester, reference)?;
        Ok(Self {
            source_dir: source_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            request_path: request.to_owned(),
            requester_path: requester.to_path_buf(),
            absolute_path: resolved.absolute_path,
            output_path: resolved.output_path,
            root_relative_path: resolved.root_relative_path,
        })
    }
}
