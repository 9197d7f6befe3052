//! `[js]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [js]
//! minify = true
//!
//! # or hand every entry to a bundler instead
//! command = ["esbuild", "$SITEPIPE_INPUT", "--bundle", "--outfile=$SITEPIPE_OUTPUT"]
//! ```

use crate::asset::{CommandTransform, JsTransform};
use crate::config::{ConfigDiagnostics, FieldPath};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::validate_command;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsConfig {
    /// Minify emitted modules (ignored with `command`).
    pub minify: bool,

    /// External bundler; replaces the built-in module emitter when set.
    pub command: Vec<String>,
}

impl JsConfig {
    pub fn transform(&self) -> JsTransform {
        if self.command.is_empty() {
            JsTransform::new(self.minify)
        } else {
            JsTransform::with_command(CommandTransform::new(self.command.clone()))
        }
    }

    pub fn validate(&self, cwd: &Path, diag: &mut ConfigDiagnostics) {
        if self.command.is_empty() {
            return;
        }
        validate_command(diag, FieldPath::new("js.command"), &self.command, cwd);
        if self.minify {
            diag.warn(
                FieldPath::new("js.minify"),
                "ignored when `js.command` is set",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_defaults() {
        let config = test_parse_config("");
        assert!(!config.js.minify);
        assert!(config.js.command.is_empty());
    }

    #[test]
    fn test_bundler_command() {
        let config = test_parse_config(
            r#"
[js]
command = ["esbuild", "$SITEPIPE_INPUT", "--bundle", "--outfile=$SITEPIPE_OUTPUT"]
"#,
        );
        assert_eq!(config.js.command.len(), 4);
        assert_eq!(config.js.command[0], "esbuild");
    }
}
