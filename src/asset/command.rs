//! External command transforms.
//!
//! Commands see the asset locations as `$SITEPIPE_*` variables, both
//! substituted into their arguments and exported into their environment:
//!
//! | Variable               | Value                             |
//! |------------------------|-----------------------------------|
//! | `SITEPIPE_INPUT`       | absolute source path of the asset |
//! | `SITEPIPE_OUTPUT`      | output path of the asset          |
//! | `SITEPIPE_OUTPUT_DIR`  | output root                       |
//! | `SITEPIPE_SOURCE_DIR`  | source root                       |
//! | `SITEPIPE_REQUESTER`   | document that referenced it       |

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use crate::pipeline::{ProcessingContext, Tag, Transform};
use crate::utils::exec::{Cmd, FilterRule, resolve_args};

use super::ensure_parent;

/// Build the `$SITEPIPE_*` variables for one asset.
pub fn command_vars(ctx: &ProcessingContext) -> FxHashMap<&'static str, String> {
    let mut vars = FxHashMap::default();
    vars.insert("SITEPIPE_INPUT", ctx.absolute_path.display().to_string());
    vars.insert("SITEPIPE_OUTPUT", ctx.output_path.display().to_string());
    vars.insert("SITEPIPE_OUTPUT_DIR", ctx.output_dir.display().to_string());
    vars.insert("SITEPIPE_SOURCE_DIR", ctx.source_dir.display().to_string());
    vars.insert("SITEPIPE_REQUESTER", ctx.requester_path.display().to_string());
    vars
}

/// Tool chatter on stderr that says nothing about the asset.
static TOOL_NOISE: FilterRule = FilterRule::new(&[
    "Browserslist: caniuse-lite is outdated",
    "npx update-browserslist-db",
    "npm warn",
    "npm WARN",
    "⚡ Done in",
]);

fn command(argv: &[String], ctx: &ProcessingContext) -> Cmd {
    let vars = command_vars(ctx);
    Cmd::from_slice(&resolve_args(argv, &vars))
        .cwd(&ctx.source_dir)
        .envs(vars)
        .filter(&TOOL_NOISE)
}

/// Pipe `input` through a command and return its stdout.
pub fn filter_through(argv: &[String], ctx: &ProcessingContext, input: &str) -> Result<String> {
    let output = command(argv, ctx).stdin(input).run()?;
    let name = argv.first().map_or("command", String::as_str);
    String::from_utf8(output.stdout).with_context(|| format!("`{name}` printed invalid UTF-8"))
}

/// Run a command that writes the asset's output itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTransform {
    argv: Vec<String>,
}

impl CommandTransform {
    /// `argv` must be non-empty; configuration validates this.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Transform for CommandTransform {
    fn transform(&self, ctx: &ProcessingContext, _tag: &Tag) -> Result<()> {
        ensure_parent(&ctx.output_path)?;
        command(&self.argv, ctx).run().with_context(|| {
            format!(
                "failed to process `{}`",
                ctx.root_relative_path.display()
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn context(dir: &Path, file: &str) -> ProcessingContext {
        let src = dir.join("site");
        let out = dir.join("out");
        fs::create_dir_all(&src).unwrap();
        ProcessingContext::new(&src, &out, &src.join("index.html"), file, file).unwrap()
    }

    #[test]
    fn test_command_vars() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "js/app.js");
        let vars = command_vars(&ctx);
        assert_eq!(vars["SITEPIPE_INPUT"], ctx.absolute_path.display().to_string());
        assert_eq!(vars["SITEPIPE_OUTPUT"], ctx.output_path.display().to_string());
        assert!(vars["SITEPIPE_REQUESTER"].ends_with("index.html"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_writes_output() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "js/app.js");
        fs::create_dir_all(ctx.absolute_path.parent().unwrap()).unwrap();
        fs::write(&ctx.absolute_path, "let a = 1;").unwrap();

        let transform = CommandTransform::new(vec![
            "cp".into(),
            "$SITEPIPE_INPUT".into(),
            "$SITEPIPE_OUTPUT".into(),
        ]);
        transform.transform(&ctx, &Tag::default()).unwrap();
        assert_eq!(fs::read_to_string(&ctx.output_path).unwrap(), "let a = 1;");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "app.js");
        let transform = CommandTransform::new(vec!["false".into()]);
        let err = transform.transform(&ctx, &Tag::default()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to process `app.js`"));
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_through_stdin() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "a.css");
        let out = filter_through(&["tr".into(), "a-z".into(), "A-Z".into()], &ctx, "abc").unwrap();
        assert_eq!(out, "ABC");
    }
}
