//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! src = "site"             # documents and assets
//! out = "site-out"         # mirrored output tree
//! clean = false            # remove `out` before building
//! default_plugins = true   # append the built-in js/css plugins
//! max_tasks = 0            # concurrent transforms, 0 = available parallelism
//! ```

use crate::config::{ConfigDiagnostics, FieldPath};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Upper bound accepted for `build.max_tasks`.
pub const MAX_TASKS_LIMIT: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source directory.
    pub src: PathBuf,

    /// Output directory.
    pub out: PathBuf,

    /// Remove the output directory before building.
    pub clean: bool,

    /// Register the built-in `js` and `css` plugins after user plugins.
    pub default_plugins: bool,

    /// Concurrent transform bound (0 = available parallelism).
    pub max_tasks: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src: "site".into(),
            out: "site-out".into(),
            clean: false,
            default_plugins: true,
            max_tasks: 0,
        }
    }
}

impl BuildConfig {
    /// Effective transform bound.
    pub fn task_limit(&self) -> usize {
        match self.max_tasks {
            0 => std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            n => n,
        }
    }

    /// Validate build configuration (expects normalized paths).
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.max_tasks > MAX_TASKS_LIMIT {
            diag.error_with_hint(
                FieldPath::new("build.max_tasks"),
                format!("{} concurrent tasks is too many", self.max_tasks),
                format!("use a value up to {MAX_TASKS_LIMIT}, or 0 for available parallelism"),
            );
        }

        if self.src == self.out {
            diag.error(
                FieldPath::new("build.out"),
                format!("output directory is the source directory `{}`", self.src.display()),
            );
        } else if self.src.starts_with(&self.out) {
            diag.error(
                FieldPath::new("build.out"),
                format!(
                    "output directory `{}` contains the source directory",
                    self.out.display()
                ),
            );
        } else if self.out.starts_with(&self.src) {
            diag.warn(
                FieldPath::new("build.out"),
                "output directory is inside the source directory and is skipped during discovery",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.build.src, PathBuf::from("site"));
        assert_eq!(config.build.out, PathBuf::from("site-out"));
        assert!(!config.build.clean);
        assert!(config.build.default_plugins);
        assert_eq!(config.build.max_tasks, 0);
    }

    #[test]
    fn test_custom_build() {
        let config = test_parse_config(
            r#"
[build]
src = "www"
out = "dist"
clean = true
default_plugins = false
max_tasks = 8
"#,
        );
        assert_eq!(config.build.src, PathBuf::from("www"));
        assert_eq!(config.build.out, PathBuf::from("dist"));
        assert!(config.build.clean);
        assert!(!config.build.default_plugins);
        assert_eq!(config.build.task_limit(), 8);
    }

    #[test]
    fn test_zero_tasks_uses_parallelism() {
        assert!(BuildConfig::default().task_limit() >= 1);
    }

    #[test]
    fn test_validate_bounds() {
        let mut diag = ConfigDiagnostics::new();
        let build = BuildConfig {
            max_tasks: MAX_TASKS_LIMIT + 1,
            ..BuildConfig::default()
        };
        build.validate(&mut diag);
        assert_eq!(diag.len(), 1);
        assert_eq!(diag.errors()[0].field.as_str(), "build.max_tasks");
    }

    #[test]
    fn test_validate_overlapping_dirs() {
        let mut diag = ConfigDiagnostics::new();
        BuildConfig {
            src: "/w/site".into(),
            out: "/w/site".into(),
            ..BuildConfig::default()
        }
        .validate(&mut diag);
        assert_eq!(diag.len(), 1);

        let mut diag = ConfigDiagnostics::new();
        BuildConfig {
            src: "/w/site".into(),
            out: "/w/site/out".into(),
            ..BuildConfig::default()
        }
        .validate(&mut diag);
        assert!(diag.is_empty());
        assert_eq!(diag.warnings().len(), 1);
    }
}
