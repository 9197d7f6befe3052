//! `[css]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [css]
//! # applied in order; an empty chain copies stylesheets unchanged
//! plugins = ["normalize", { command = ["npx", "postcss"] }, "minify"]
//! source_map = true   # writes theme.css.map beside theme.css
//! ```

use crate::asset::{CssStep, CssTransform};
use crate::config::{ConfigDiagnostics, FieldPath};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::validate_command;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CssConfig {
    /// Ordered stylesheet transform chain.
    pub plugins: Vec<CssPluginConfig>,

    /// Write a source map for each processed stylesheet.
    pub source_map: bool,
}

/// One entry of `css.plugins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CssPluginConfig {
    /// `"minify"` or `"normalize"`.
    Builtin(CssStepName),
    /// `{ command = [...] }`: stylesheet on stdin, result on stdout.
    Command { command: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CssStepName {
    Minify,
    Normalize,
}

impl CssConfig {
    pub fn transform(&self) -> CssTransform {
        let steps = self
            .plugins
            .iter()
            .map(|plugin| match plugin {
                CssPluginConfig::Builtin(CssStepName::Minify) => CssStep::Minify,
                CssPluginConfig::Builtin(CssStepName::Normalize) => CssStep::Normalize,
                CssPluginConfig::Command { command } => CssStep::Command(command.clone()),
            })
            .collect();
        CssTransform::new(steps).with_source_map(self.source_map)
    }

    pub fn validate(&self, cwd: &Path, diag: &mut ConfigDiagnostics) {
        let field = FieldPath::new("css.plugins");
        for (i, plugin) in self.plugins.iter().enumerate() {
            if let CssPluginConfig::Command { command } = plugin {
                validate_command(diag, field.index(i).join("command"), command, cwd);
            }
        }

        if self.source_map {
            match self.plugins.last() {
                None => diag.warn(
                    FieldPath::new("css.source_map"),
                    "ignored: without `css.plugins` stylesheets are copied unchanged",
                ),
                Some(CssPluginConfig::Command { .. }) => diag.warn(
                    FieldPath::new("css.source_map"),
                    "ignored: the chain must end with `normalize` or `minify`",
                ),
                Some(CssPluginConfig::Builtin(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_default_chain_is_empty() {
        let config = test_parse_config("");
        assert!(config.css.plugins.is_empty());
        assert!(config.css.transform().steps().is_empty());
    }

    #[test]
    fn test_mixed_chain_keeps_order() {
        let config = test_parse_config(
            r#"
[css]
plugins = ["normalize", { command = ["postcss"] }, "minify"]
"#,
        );
        assert_eq!(
            config.css.transform().steps(),
            [
                CssStep::Normalize,
                CssStep::Command(vec!["postcss".into()]),
                CssStep::Minify,
            ]
        );
    }

    #[test]
    fn test_unknown_step_is_parse_error() {
        let result = toml::from_str::<crate::config::SiteConfig>("[css]\nplugins = [\"uglify\"]");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_command_reported_with_index() {
        let config = test_parse_config("[css]\nplugins = [\"minify\", { command = [] }]");
        let mut diag = ConfigDiagnostics::new();
        config.css.validate(Path::new("."), &mut diag);
        assert_eq!(diag.errors()[0].field.as_str(), "css.plugins[1].command");
    }

    #[test]
    fn test_source_map_option() {
        let config = test_parse_config("[css]\nplugins = [\"minify\"]\nsource_map = true");
        assert_eq!(
            config.css.transform(),
            CssTransform::new(vec![CssStep::Minify]).with_source_map(true)
        );

        let mut diag = ConfigDiagnostics::new();
        config.css.validate(Path::new("."), &mut diag);
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn test_source_map_needs_builtin_last_step() {
        let config = test_parse_config("[css]\nsource_map = true");
        let mut diag = ConfigDiagnostics::new();
        config.css.validate(Path::new("."), &mut diag);
        assert_eq!(diag.warnings()[0].field.as_str(), "css.source_map");
        assert!(diag.is_empty());
    }
}
