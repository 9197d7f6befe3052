//! Configuration section definitions.
//!
//! | Section       | Purpose                                        |
//! |---------------|------------------------------------------------|
//! | `[build]`     | Source/output directories, task bound          |
//! | `[js]`        | Built-in script plugin (minify or bundler)     |
//! | `[css]`       | Built-in stylesheet plugin chain               |
//! | `[[plugins]]` | User plugins, consulted before the built-ins   |

mod build;
mod css;
mod js;
mod plugin;

pub use build::BuildConfig;
pub use css::CssConfig;
pub use js::JsConfig;
pub use plugin::PluginConfig;

use std::path::Path;

use super::{ConfigDiagnostics, FieldPath};

/// Check that a command list is non-empty and its program can be located.
///
/// Relative programs (`./scripts/min.sh`) are looked up from `cwd`, the
/// directory commands run in.
pub(crate) fn validate_command(
    diag: &mut ConfigDiagnostics,
    field: FieldPath,
    command: &[String],
    cwd: &Path,
) {
    let Some(program) = command.first() else {
        diag.error(field, "command is empty");
        return;
    };

    if which::which_in(program, std::env::var_os("PATH"), cwd).is_err() {
        diag.error_with_hint(
            field.clone(),
            format!("`{program}` not found"),
            format!("install the command or update {field}"),
        );
    }
}
