//! Script transform.
//!
//! Either hands the entry to an external bundler, or emits the entry's
//! static module graph itself:
//!
//! ```text
//! site/app.js ──import "./lib/util.js"──► site/lib/util.js
//!      │                                        │
//!      ▼                                        ▼
//! out/app.js                              out/lib/util.js
//! ```
//!
//! Every module is written to its mirrored output path, so relative import
//! specifiers stay valid without rewriting. Bare specifiers (`"lodash"`)
//! and URLs are left for the browser or an import map to resolve.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use dashmap::DashSet;
use rustc_hash::FxHashSet;
use oxc::allocator::Allocator;
use oxc::ast::ast::Statement;
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::pipeline::{ProcessingContext, Tag, Transform};
use crate::utils::path::normalize_lexically;

use super::command::CommandTransform;
use super::ensure_parent;
use super::minify::minify_js;

/// Extensions tried, in order, for an import specifier without one.
const RESOLVE_EXTENSIONS: &[&str] = &["js", "mjs"];

/// Clones share the set of emitted modules.
#[derive(Debug, Clone, Default)]
pub struct JsTransform {
    minify: bool,
    command: Option<CommandTransform>,
    /// Modules written so far this run, shared by all entries
    emitted: Arc<DashSet<PathBuf>>,
}

impl JsTransform {
    /// Built-in module emitter.
    pub fn new(minify: bool) -> Self {
        Self {
            minify,
            ..Self::default()
        }
    }

    /// Delegate to an external bundler.
    pub fn with_command(command: CommandTransform) -> Self {
        Self {
            command: Some(command),
            ..Self::default()
        }
    }

    /// Write the entry and every module it reaches.
    ///
    /// The entry is always written; its task is the only one for it. A
    /// dependency is skipped once another graph has written it, and only
    /// counts as written after its output exists.
    fn emit_graph(&self, ctx: &ProcessingContext, tag: &Tag) -> Result<()> {
        let mut queue = VecDeque::from([ctx.absolute_path.clone()]);
        let mut queued = FxHashSet::default();
        queued.insert(ctx.absolute_path.clone());
        let mut imports = 0;

        while let Some(module) = queue.pop_front() {
            let source = fs::read_to_string(&module)
                .with_context(|| format!("failed to read `{}`", module.display()))?;
            let source_type = source_type(&module);

            for specifier in static_imports(&module, &source, source_type)? {
                if !is_relative(&specifier) {
                    crate::debug!("js"; "external import `{}` in `{}`", specifier, module.display());
                    continue;
                }
                let dependency = resolve_import(&module, &specifier).ok_or_else(|| {
                    anyhow!(
                        "unresolved import `{specifier}` in `{}`",
                        module.display()
                    )
                })?;
                if !dependency.starts_with(&ctx.source_dir) {
                    bail!(
                        "import `{specifier}` in `{}` leaves the source directory",
                        module.display()
                    );
                }
                imports += 1;
                if !self.emitted.contains(&dependency) && queued.insert(dependency.clone()) {
                    queue.push_back(dependency);
                }
            }

            let relative = module.strip_prefix(&ctx.source_dir).with_context(|| {
                format!("`{}` is outside the source directory", module.display())
            })?;
            let output = ctx.output_dir.join(relative);
            let code = if self.minify {
                minify_js(&source, source_type)
                    .ok_or_else(|| anyhow!("failed to minify `{}`", module.display()))?
            } else {
                source
            };

            ensure_parent(&output)?;
            fs::write(&output, code)
                .with_context(|| format!("failed to write `{}`", output.display()))?;
            self.emitted.insert(module);
        }

        if needs_module_script(tag, imports) {
            crate::log!("warning"; "`{}` imports other modules but its <script> has no type=\"module\"; \
                set `js.command` to bundle it", ctx.root_relative_path.display());
        }
        Ok(())
    }
}

impl Transform for JsTransform {
    fn transform(&self, ctx: &ProcessingContext, tag: &Tag) -> Result<()> {
        match &self.command {
            Some(command) => command.transform(ctx, tag),
            None => self.emit_graph(ctx, tag),
        }
    }
}

fn source_type(path: &Path) -> SourceType {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("cjs") => SourceType::cjs(),
        _ => SourceType::mjs(),
    }
}

/// Specifiers of `import … from`, `export * from` and `export { … } from`.
///
/// Dynamic `import()` is not followed.
fn static_imports(path: &Path, source: &str, source_type: SourceType) -> Result<Vec<String>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if let Some(error) = ret.errors.first() {
        bail!("syntax error in `{}`: {error}", path.display());
    }

    let specifiers = ret
        .program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => Some(decl.source.value.to_string()),
            Statement::ExportAllDeclaration(decl) => Some(decl.source.value.to_string()),
            Statement::ExportNamedDeclaration(decl) => {
                decl.source.as_ref().map(|source| source.value.to_string())
            }
            _ => None,
        })
        .collect();
    Ok(specifiers)
}

/// Emitted modules keep their `import`s, which a classic script cannot run.
fn needs_module_script(tag: &Tag, imports: usize) -> bool {
    let is_module = tag
        .attribute("type")
        .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("module"));
    imports > 0 && !is_module
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Resolve a relative specifier against the importing module.
///
/// Tries the path as written, then with each known extension, then as a
/// directory with an `index` module.
fn resolve_import(importer: &Path, specifier: &str) -> Option<PathBuf> {
    let base = importer.parent()?;
    let target = normalize_lexically(&base.join(specifier));
    if target.is_file() {
        return Some(target);
    }

    let with_ext = RESOLVE_EXTENSIONS.iter().map(|ext| {
        let mut name = target.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    });
    let index = RESOLVE_EXTENSIONS
        .iter()
        .map(|ext| target.join(format!("index.{ext}")));

    with_ext.chain(index).find(|candidate| candidate.is_file())
}
