//! Stylesheet transform.
//!
//! Threads the stylesheet text through an ordered chain of steps. With an
//! empty chain the file is copied unchanged.
//!
//! With source maps on, the final step of the chain (`normalize` or
//! `minify`) also writes `<output>.map` and links it from the stylesheet.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::pipeline::{ProcessingContext, Tag, Transform};

use super::command::filter_through;
use super::copy::copy_asset;
use super::ensure_parent;
use super::minify::{process_css, process_css_with_map};

/// One stage of the stylesheet chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssStep {
    /// Parse and pretty-print.
    Normalize,
    /// Parse, minify and print minified.
    Minify,
    /// Pipe through an external command (stdin -> stdout).
    Command(Vec<String>),
}

impl CssStep {
    fn apply(&self, ctx: &ProcessingContext, css: String) -> Result<String> {
        let filename = ctx.root_relative_path.display().to_string();
        match self {
            Self::Normalize => process_css(&css, &filename, false),
            Self::Minify => process_css(&css, &filename, true),
            Self::Command(argv) => filter_through(argv, ctx, &css),
        }
    }

    /// Run a built-in step with a source map; `None` for command steps.
    fn apply_with_map(
        &self,
        ctx: &ProcessingContext,
        css: &str,
        filename: &str,
    ) -> Option<Result<(String, String)>> {
        match self {
            Self::Normalize => Some(process_css_with_map(css, filename, false)),
            Self::Minify => Some(process_css_with_map(css, filename, true)),
            Self::Command(_) => {
                crate::debug!("css"; "no source map for `{}`: chain ends with a command",
                    ctx.root_relative_path.display());
                None
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Normalize => "normalize",
            Self::Minify => "minify",
            Self::Command(argv) => argv.first().map_or("command", String::as_str),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssTransform {
    steps: Vec<CssStep>,
    source_map: bool,
}

impl CssTransform {
    pub fn new(steps: Vec<CssStep>) -> Self {
        Self {
            steps,
            source_map: false,
        }
    }

    /// Write `<output>.map` next to each processed stylesheet.
    pub fn with_source_map(mut self, source_map: bool) -> Self {
        self.source_map = source_map;
        self
    }

    #[cfg(test)]
    pub fn steps(&self) -> &[CssStep] {
        &self.steps
    }
}

impl Transform for CssTransform {
    fn transform(&self, ctx: &ProcessingContext, _tag: &Tag) -> Result<()> {
        if self.steps.is_empty() {
            return copy_asset(ctx);
        }

        let source = fs::read_to_string(&ctx.absolute_path)
            .with_context(|| format!("failed to read `{}`", ctx.absolute_path.display()))?;

        let run = |css: String, step: &CssStep| {
            step.apply(ctx, css).with_context(|| step_failed(step, ctx))
        };

        let (css, map) = match self.steps.split_last() {
            Some((last, init)) if self.source_map => {
                let css = init.iter().try_fold(source, run)?;
                let name = file_name(&ctx.output_path);
                match last.apply_with_map(ctx, &css, &file_name(&ctx.absolute_path)) {
                    Some(printed) => {
                        let (code, map) = printed.with_context(|| step_failed(last, ctx))?;
                        (format!("{code}\n/*# sourceMappingURL={name}.map */\n"), Some(map))
                    }
                    None => (run(css, last)?, None),
                }
            }
            _ => (self.steps.iter().try_fold(source, run)?, None),
        };

        ensure_parent(&ctx.output_path)?;
        fs::write(&ctx.output_path, css)
            .with_context(|| format!("failed to write `{}`", ctx.output_path.display()))?;
        if let Some(map) = map {
            let map_path = map_path(&ctx.output_path);
            fs::write(&map_path, map)
                .with_context(|| format!("failed to write `{}`", map_path.display()))?;
        }
        Ok(())
    }
}

fn step_failed(step: &CssStep, ctx: &ProcessingContext) -> String {
    format!(
        "`{}` failed on `{}`",
        step.name(),
        ctx.root_relative_path.display()
    )
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `out/theme.css` -> `out/theme.css.map`
fn map_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".map");
    PathBuf::from(path)
}
