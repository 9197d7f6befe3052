//! Tag matching.
//!
//! Given the attributes of one streamed element and the processors
//! registered for its tag name, pick the processor that handles it.

use rustc_hash::FxHashMap;

use super::registry::RegistryEntry;

/// Attribute map of one element. Names are ASCII-lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagAttributes(FxHashMap<String, String>);

impl TagAttributes {
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for TagAttributes {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut attrs = Self::default();
        for (name, value) in iter {
            attrs.insert(name.as_ref(), value);
        }
        attrs
    }
}

/// Read-only snapshot of a matched element, handed to transforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased element name
    pub name: String,
    pub attributes: TagAttributes,
}

impl Tag {
    pub fn new(name: &str, attributes: TagAttributes) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }
}

/// The winning processor and the raw reference it extracted.
#[derive(Debug, Clone)]
pub struct TagMatch<'r, 't> {
    pub entry: &'r RegistryEntry,
    pub reference: &'t str,
}

/// Select the first candidate whose constraints all hold and whose
/// reference attribute carries a non-empty value.
///
/// Candidates are expected in precedence order; later ones are never
/// consulted once one matches.
pub fn match_tag<'r, 't>(
    tag: &'t Tag,
    candidates: &'r [RegistryEntry],
) -> Option<TagMatch<'r, 't>> {
    candidates.iter().find_map(|entry| {
        let target = &entry.processor.target;
        let satisfied = target
            .attributes
            .iter()
            .all(|(name, constraint)| constraint.holds(tag.attribute(name)));
        if !satisfied {
            return None;
        }
        tag.attribute(&target.reference_attribute)
            .filter(|value| !value.trim().is_empty())
            .map(|reference| TagMatch { entry, reference })
    })
}
