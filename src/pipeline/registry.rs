//! Processor registry keyed by tag name.
//!
//! Built once per run. Each tag name maps to its processors in plugin
//! registration order, then declaration order within a plugin.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::plugin::{Plugin, Processor};

/// Malformed plugin declaration, detected before any document is read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin #{index} has an empty name")]
    EmptyPluginName { index: usize },

    #[error("plugin `{plugin}` declares no processors")]
    NoProcessors { plugin: String },

    #[error("plugin `{plugin}` has a processor with an empty tag name")]
    EmptyTagName { plugin: String },

    #[error("plugin `{plugin}`: `{tag}` is not a valid tag name")]
    InvalidTagName { plugin: String, tag: String },

    #[error("plugin `{plugin}`: processor for `<{tag}>` has an empty reference attribute")]
    EmptyReferenceAttribute { plugin: String, tag: String },
}

/// A processor together with the plugin that owns it.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub processor: Arc<Processor>,
    pub plugin: Arc<str>,
}

/// Registered processors grouped by tag name.
#[derive(Debug, Default)]
pub struct ProcessorRegistry {
    by_tag: FxHashMap<String, Vec<RegistryEntry>>,
    /// Tag names in first-registration order
    tags: Vec<String>,
}

impl ProcessorRegistry {
    /// Flatten plugins into per-tag candidate lists.
    pub fn build(plugins: Vec<Plugin>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();

        for (index, plugin) in plugins.into_iter().enumerate() {
            if plugin.name.trim().is_empty() {
                return Err(RegistryError::EmptyPluginName { index });
            }
            let name: Arc<str> = Arc::from(plugin.name.as_str());
            let processors = plugin.processors.into_vec();
            if processors.is_empty() {
                return Err(RegistryError::NoProcessors {
                    plugin: plugin.name,
                });
            }

            for processor in processors {
                let tag = validate_target(&name, &processor)?;
                registry.insert(
                    tag,
                    RegistryEntry {
                        processor: Arc::new(processor),
                        plugin: Arc::clone(&name),
                    },
                );
            }
        }

        Ok(registry)
    }

    fn insert(&mut self, tag: String, entry: RegistryEntry) {
        match self.by_tag.get_mut(&tag) {
            Some(entries) => entries.push(entry),
            None => {
                self.tags.push(tag.clone());
                self.by_tag.insert(tag, vec![entry]);
            }
        }
    }

    /// Processors registered for `tag`, in precedence order.
    pub fn candidates(&self, tag: &str) -> &[RegistryEntry] {
        self.by_tag
            .get(&tag.to_ascii_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Registered tag names, in first-registration order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Total number of registered processors.
    pub fn len(&self) -> usize {
        self.by_tag.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

/// Check a processor's target and return its normalized tag name.
fn validate_target(plugin: &str, processor: &Processor) -> Result<String, RegistryError> {
    let target = &processor.target;
    let tag = target.tag_name.trim().to_ascii_lowercase();

    if tag.is_empty() {
        return Err(RegistryError::EmptyTagName {
            plugin: plugin.to_owned(),
        });
    }
    if !is_valid_tag_name(&tag) {
        return Err(RegistryError::InvalidTagName {
            plugin: plugin.to_owned(),
            tag,
        });
    }
    if target.reference_attribute.trim().is_empty() {
        return Err(RegistryError::EmptyReferenceAttribute {
            plugin: plugin.to_owned(),
            tag,
        });
    }
    Ok(tag)
}

/// Element names: an ASCII letter followed by letters, digits or `-`.
fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::matcher::Tag;
    use crate::pipeline::plugin::{Constraint, Target};
    use crate::pipeline::resolve::ProcessingContext;
    use anyhow::Result;

    fn noop(_: &ProcessingContext, _: &Tag) -> Result<()> {
        Ok(())
    }

    fn processor(tag: &str, attr: &str) -> Processor {
        Processor::new(Target::new(tag, attr), noop)
    }

    #[test]
    fn test_build_groups_by_tag_in_registration_order() {
        let registry = ProcessorRegistry::build(vec![
            Plugin::new("first", vec![processor("script", "src"), processor("link", "href")]),
            Plugin::new("second", processor("SCRIPT", "data-src")),
        ])
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.tag_names().collect::<Vec<_>>(), vec!["script", "link"]);

        let scripts = registry.candidates("script");
        assert_eq!(scripts.len(), 2);
        assert_eq!(&*scripts[0].plugin, "first");
        assert_eq!(&*scripts[1].plugin, "second");
        assert_eq!(scripts[1].processor.target.reference_attribute, "data-src");
    }

    #[test]
    fn test_candidates_unknown_tag_is_empty() {
        let registry = ProcessorRegistry::build(vec![Plugin::new(
            "js",
            processor("script", "src"),
        )])
        .unwrap();
        assert!(registry.candidates("img").is_empty());
        assert_eq!(registry.candidates("Script").len(), 1);
    }

    #[test]
    fn test_build_keeps_constraints() {
        let target = Target::new("link", "href").with("rel", Constraint::equals("stylesheet"));
        let registry =
            ProcessorRegistry::build(vec![Plugin::new("css", Processor::new(target, noop))])
                .unwrap();
        let entry = &registry.candidates("link")[0];
        assert_eq!(entry.processor.target.attributes.len(), 1);
    }

    #[test]
    fn test_build_rejects_malformed_plugins() {
        let err = ProcessorRegistry::build(vec![Plugin::new(" ", processor("script", "src"))])
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyPluginName { index: 0 });

        let err = ProcessorRegistry::build(vec![Plugin::new("x", Vec::new())]).unwrap_err();
        assert!(matches!(err, RegistryError::NoProcessors { .. }));

        let err =
            ProcessorRegistry::build(vec![Plugin::new("x", processor("", "src"))]).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyTagName { .. }));

        let err = ProcessorRegistry::build(vec![Plugin::new("x", processor("a[href]", "href"))])
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTagName { .. }));

        let err =
            ProcessorRegistry::build(vec![Plugin::new("x", processor("script", ""))]).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyReferenceAttribute { .. }));
    }

    #[test]
    fn test_valid_tag_names() {
        assert!(is_valid_tag_name("script"));
        assert!(is_valid_tag_name("my-widget"));
        assert!(is_valid_tag_name("h1"));
        assert!(!is_valid_tag_name("1a"));
        assert!(!is_valid_tag_name("a b"));
        assert!(!is_valid_tag_name("*"));
    }
}
