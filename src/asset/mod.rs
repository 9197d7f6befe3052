//! Built-in asset transforms and the default plugin set.
//!
//! | Plugin | Matches                              | Transform      |
//! |--------|--------------------------------------|----------------|
//! | `js`   | `<script src>`                       | [`JsTransform`]  |
//! | `css`  | `<link rel="stylesheet" href>`       | [`CssTransform`] |

mod command;
mod copy;
mod css;
mod js;
pub mod minify;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::{Constraint, Plugin, Processor, Target};

pub use command::CommandTransform;
pub use copy::CopyTransform;
pub use css::{CssStep, CssTransform};
pub use js::JsTransform;

pub const JS_PLUGIN: &str = "js";
pub const CSS_PLUGIN: &str = "css";

/// `<script src>` handled by `transform`.
pub fn js_plugin(transform: JsTransform) -> Plugin {
    Plugin::new(
        JS_PLUGIN,
        Processor::new(Target::new("script", "src"), transform),
    )
}

/// `<link rel="stylesheet" href>` handled by `transform`.
pub fn css_plugin(transform: CssTransform) -> Plugin {
    Plugin::new(
        CSS_PLUGIN,
        Processor::new(
            Target::new("link", "href").with("rel", Constraint::equals("stylesheet")),
            transform,
        ),
    )
}

/// The built-in plugins, in precedence order.
pub fn default_plugins(js: JsTransform, css: CssTransform) -> Vec<Plugin> {
    vec![js_plugin(js), css_plugin(css)]
}

/// Create the parent directory of an output file.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    Ok(())
}
