//! `[[plugins]]` user plugin declarations.
//!
//! # Example
//!
//! ```toml
//! [[plugins]]
//! name = "images"
//!
//! [[plugins.processors]]
//! tag = "img"
//! reference = "src"
//! attrs = { class = { matches = "^hero" }, hidden = false }
//! action = "copy"
//! set_attrs = { loading = "lazy" }
//!
//! [[plugins.processors]]
//! tag = "script"
//! reference = "src"
//! attrs = { type = "module" }
//! action = { command = ["esbuild", "$SITEPIPE_INPUT", "--bundle", "--outfile=$SITEPIPE_OUTPUT"] }
//! remove_attrs = ["integrity"]
//! ```
//!
//! `attrs` values map onto match constraints:
//!
//! | TOML value            | Matches when                               |
//! |-----------------------|--------------------------------------------|
//! | `"module"`            | value equals (absent counts as `""`)       |
//! | `true` / `false`      | attribute present / absent                 |
//! | `{ matches = "re" }`  | value matches the regex (absent as `""`)   |

use crate::asset::{CommandTransform, CopyTransform, CssTransform, JsTransform};
use crate::config::{ConfigDiagnostics, FieldPath};
use crate::pipeline::{Constraint, Plugin, Processor, TagEditor, Target};
use anyhow::{Context, Result};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::validate_command;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub name: String,
    pub processors: Vec<ProcessorConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Element name.
    pub tag: String,
    /// Attribute holding the asset reference.
    pub reference: String,
    /// Attribute constraints, all of which must hold.
    pub attrs: BTreeMap<String, AttrConstraint>,
    pub action: ActionConfig,
    /// Attributes stripped from the matched tag in the output document.
    pub remove_attrs: Vec<String>,
    /// Attributes set on the matched tag in the output document.
    pub set_attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrConstraint {
    Equals(String),
    Present(bool),
    Matches { matches: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Builtin(BuiltinAction),
    Command { command: Vec<String> },
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self::Builtin(BuiltinAction::Copy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinAction {
    /// Copy the asset unchanged.
    Copy,
    /// Same transform as the built-in `js` plugin.
    Js,
    /// Same transform as the built-in `css` plugin.
    Css,
}

impl AttrConstraint {
    fn to_constraint(&self) -> Result<Constraint> {
        Ok(match self {
            Self::Equals(value) => Constraint::equals(value.as_str()),
            Self::Present(present) => Constraint::Present(*present),
            Self::Matches { matches } => {
                let re = Regex::new(matches)?;
                Constraint::predicate(move |value| re.is_match(value.unwrap_or_default()))
            }
        })
    }
}

impl PluginConfig {
    /// Build the runtime plugin; `js` and `css` back the built-in actions.
    pub fn build(&self, js: &JsTransform, css: &CssTransform) -> Result<Plugin> {
        let processors = self
            .processors
            .iter()
            .map(|processor| processor.build(js, css))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid plugin `{}`", self.name))?;
        Ok(Plugin::new(self.name.as_str(), processors))
    }

    /// Validate every user plugin.
    pub fn validate_all(plugins: &[Self], cwd: &Path, diag: &mut ConfigDiagnostics) {
        let mut names = FxHashSet::default();
        let field = FieldPath::new("plugins");

        for (i, plugin) in plugins.iter().enumerate() {
            let field = field.index(i);
            let name = plugin.name.trim();

            if name.is_empty() {
                diag.error(field.join("name"), "plugin name is empty");
            } else if !names.insert(name) {
                diag.error(field.join("name"), format!("duplicate plugin name `{name}`"));
            }

            if plugin.processors.is_empty() {
                diag.error_with_hint(
                    field.join("processors"),
                    "plugin declares no processors",
                    "add at least one [[plugins.processors]] table",
                );
            }
            for (j, processor) in plugin.processors.iter().enumerate() {
                processor.validate(field.join("processors").index(j), cwd, diag);
            }
        }
    }
}

impl ProcessorConfig {
    fn build(&self, js: &JsTransform, css: &CssTransform) -> Result<Processor> {
        let mut target = Target::new(self.tag.as_str(), self.reference.as_str());
        for (attr, constraint) in &self.attrs {
            let constraint = constraint
                .to_constraint()
                .with_context(|| format!("invalid constraint on `{}`", attr))?;
            target = target.with(attr.as_str(), constraint);
        }

        let processor = match &self.action {
            ActionConfig::Builtin(BuiltinAction::Copy) => Processor::new(target, CopyTransform),
            ActionConfig::Builtin(BuiltinAction::Js) => Processor::new(target, js.clone()),
            ActionConfig::Builtin(BuiltinAction::Css) => Processor::new(target, css.clone()),
            ActionConfig::Command { command } => {
                Processor::new(target, CommandTransform::new(command.clone()))
            }
        };

        if self.remove_attrs.is_empty() && self.set_attrs.is_empty() {
            return Ok(processor);
        }
        let remove = self.remove_attrs.clone();
        let set = self.set_attrs.clone();
        Ok(processor.on_match(move |tag: &mut dyn TagEditor| {
            for name in &remove {
                tag.remove_attribute(name);
            }
            for (name, value) in &set {
                tag.set_attribute(name, value)?;
            }
            Ok(())
        }))
    }

    fn validate(&self, field: FieldPath, cwd: &Path, diag: &mut ConfigDiagnostics) {
        if self.tag.trim().is_empty() {
            diag.error(field.join("tag"), "tag name is empty");
        }
        if self.reference.trim().is_empty() {
            diag.error(field.join("reference"), "reference attribute is empty");
        }

        for (attr, constraint) in &self.attrs {
            if let AttrConstraint::Matches { matches } = constraint
                && let Err(err) = Regex::new(matches)
            {
                diag.error(
                    field.join("attrs").join(attr),
                    format!("invalid regex `{matches}`: {err}"),
                );
            }
        }

        if let ActionConfig::Command { command } = &self.action {
            validate_command(diag, field.join("action").join("command"), command, cwd);
        }

        for name in self.set_attrs.keys() {
            if self.remove_attrs.contains(name) {
                diag.warn(
                    field.join("set_attrs").join(name),
                    "also listed in `remove_attrs`; the attribute is removed then set",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    const IMAGES: &str = r#"
[[plugins]]
name = "images"

[[plugins.processors]]
tag = "img"
reference = "src"
attrs = { class = { matches = "^hero" }, hidden = false, decoding = "async" }
set_attrs = { loading = "lazy" }
remove_attrs = ["fetchpriority"]
"#;

    #[test]
    fn test_parse_processor() {
        let config = test_parse_config(IMAGES);
        let processor = &config.plugins[0].processors[0];
        assert_eq!(processor.tag, "img");
        assert_eq!(processor.action, ActionConfig::Builtin(BuiltinAction::Copy));
        assert_eq!(
            processor.attrs["class"],
            AttrConstraint::Matches { matches: "^hero".into() }
        );
        assert_eq!(processor.attrs["hidden"], AttrConstraint::Present(false));
        assert_eq!(processor.attrs["decoding"], AttrConstraint::Equals("async".into()));
        assert_eq!(processor.set_attrs["loading"], "lazy");
    }

    #[test]
    fn test_parse_actions() {
        let config = test_parse_config(
            r#"
[[plugins]]
name = "scripts"
[[plugins.processors]]
tag = "script"
reference = "src"
action = "js"
[[plugins.processors]]
tag = "script"
reference = "data-src"
action = { command = ["cp", "$SITEPIPE_INPUT", "$SITEPIPE_OUTPUT"] }
"#,
        );
        let processors = &config.plugins[0].processors;
        assert_eq!(processors[0].action, ActionConfig::Builtin(BuiltinAction::Js));
        assert!(matches!(&processors[1].action, ActionConfig::Command { command } if command.len() == 3));
    }

    #[test]
    fn test_build_constraints() {
        let config = test_parse_config(IMAGES);
        let plugin = config.plugins[0]
            .build(&JsTransform::default(), &CssTransform::default())
            .unwrap();
        assert_eq!(plugin.name, "images");

        let processors = plugin.processors.into_vec();
        let processor = &processors[0];
        assert!(processor.on_match.is_some());
        let constraints: Vec<_> = processor
            .target
            .attributes
            .iter()
            .map(|(name, c)| (name.as_str(), c))
            .collect();
        let class = constraints.iter().find(|(n, _)| *n == "class").unwrap().1;
        assert!(class.holds(Some("hero banner")));
        assert!(!class.holds(Some("thumb")));
        assert!(!class.holds(None));
        let hidden = constraints.iter().find(|(n, _)| *n == "hidden").unwrap().1;
        assert!(hidden.holds(None));
        assert!(!hidden.holds(Some("")));
    }

    #[test]
    fn test_validate_names_and_processors() {
        let config = test_parse_config(
            r#"
[[plugins]]
name = "a"
[[plugins.processors]]
tag = "img"
reference = "src"

[[plugins]]
name = "a"

[[plugins]]
name = " "
[[plugins.processors]]
tag = ""
reference = "src"
attrs = { class = { matches = "(" } }
"#,
        );
        let mut diag = ConfigDiagnostics::new();
        PluginConfig::validate_all(&config.plugins, Path::new("."), &mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "plugins[1].name",
                "plugins[1].processors",
                "plugins[2].name",
                "plugins[2].processors[0].tag",
                "plugins[2].processors[0].attrs.class",
            ]
        );
    }

    #[test]
    fn test_invalid_regex_fails_build() {
        let config = test_parse_config(
            r#"
[[plugins]]
name = "broken"
[[plugins.processors]]
tag = "img"
reference = "src"
attrs = { class = { matches = "[" } }
"#,
        );
        let err = config.plugins[0]
            .build(&JsTransform::default(), &CssTransform::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid constraint on `class`"));
    }
}
