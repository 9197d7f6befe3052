//! Plugin and processor declarations.
//!
//! A [`Plugin`] is a named bundle of [`Processor`]s. A processor declares
//! which tag shape it handles ([`Target`]), an optional synchronous tag
//! edit run while the document is streaming, and the [`Transform`] run
//! later as an asynchronous task.
//!
//! ```ignore
//! let stylesheet = Processor::new(
//!     Target::new("link", "href").with("rel", Constraint::equals("stylesheet")),
//!     CssTransform::default(),
//! );
//! let plugin = Plugin::new("css", stylesheet);
//! ```

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::matcher::Tag;
use super::resolve::ProcessingContext;

// ============================================================================
// Constraint
// ============================================================================

/// Predicate over an attribute value (`None` when the attribute is absent).
pub type AttributePredicate = dyn Fn(Option<&str>) -> bool + Send + Sync;

/// Condition one attribute must satisfy for a processor to match.
#[derive(Clone)]
pub enum Constraint {
    /// Value equals the string; an absent attribute counts as `""`.
    Equals(String),
    /// Attribute is present (`true`) or absent (`false`).
    Present(bool),
    /// Arbitrary predicate over the value.
    Predicate(Arc<AttributePredicate>),
}

impl Constraint {
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equals(value.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Check the constraint against an observed value.
    pub fn holds(&self, value: Option<&str>) -> bool {
        match self {
            Self::Equals(expected) => value.unwrap_or_default() == expected.as_str(),
            Self::Present(present) => value.is_some() == *present,
            Self::Predicate(predicate) => predicate(value),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(value) => f.debug_tuple("Equals").field(value).finish(),
            Self::Present(present) => f.debug_tuple("Present").field(present).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

// ============================================================================
// Target
// ============================================================================

/// Tag shape a processor handles.
#[derive(Debug, Clone)]
pub struct Target {
    /// Element name (case-insensitive)
    pub tag_name: String,
    /// Constraints in declaration order
    pub attributes: Vec<(String, Constraint)>,
    /// Attribute holding the asset reference
    pub reference_attribute: String,
}

impl Target {
    pub fn new(tag_name: impl Into<String>, reference_attribute: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: Vec::new(),
            reference_attribute: reference_attribute.into(),
        }
    }

    /// Add an attribute constraint.
    pub fn with(mut self, attribute: impl Into<String>, constraint: Constraint) -> Self {
        self.attributes.push((attribute.into(), constraint));
        self
    }
}

// ============================================================================
// Tag editing
// ============================================================================

/// Write access to the tag currently being streamed.
///
/// Only available while the dispatcher is positioned on the element;
/// transforms never see it.
pub trait TagEditor {
    fn tag_name(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&mut self, name: &str, value: &str) -> Result<()>;
    fn remove_attribute(&mut self, name: &str);
}

/// Synchronous tag edit run when a processor matches.
pub type OnMatch = dyn Fn(&mut dyn TagEditor) -> Result<()> + Send + Sync;

// ============================================================================
// Transform
// ============================================================================

/// Asset transformation run as an asynchronous task.
///
/// Receives the resolved paths and a read-only snapshot of the matched tag.
/// Implementations write their output(s) under `ctx.output_dir` only.
pub trait Transform: Send + Sync {
    fn transform(&self, ctx: &ProcessingContext, tag: &Tag) -> Result<()>;
}

impl<F> Transform for F
where
    F: Fn(&ProcessingContext, &Tag) -> Result<()> + Send + Sync,
{
    fn transform(&self, ctx: &ProcessingContext, tag: &Tag) -> Result<()> {
        self(ctx, tag)
    }
}

// ============================================================================
// Processor / Plugin
// ============================================================================

/// Declarative rule: tag shape -> transform.
#[derive(Clone)]
pub struct Processor {
    pub target: Target,
    pub on_match: Option<Arc<OnMatch>>,
    pub transform: Arc<dyn Transform>,
}

impl Processor {
    pub fn new(target: Target, transform: impl Transform + 'static) -> Self {
        Self {
            target,
            on_match: None,
            transform: Arc::new(transform),
        }
    }

    /// Edit the matched tag in the output document.
    pub fn on_match<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn TagEditor) -> Result<()> + Send + Sync + 'static,
    {
        self.on_match = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("target", &self.target)
            .field("on_match", &self.on_match.is_some())
            .finish_non_exhaustive()
    }
}

/// One processor or several.
#[derive(Debug, Clone)]
pub enum Processors {
    One(Processor),
    Many(Vec<Processor>),
}

impl Processors {
    pub fn into_vec(self) -> Vec<Processor> {
        match self {
            Self::One(processor) => vec![processor],
            Self::Many(processors) => processors,
        }
    }
}

impl From<Processor> for Processors {
    fn from(processor: Processor) -> Self {
        Self::One(processor)
    }
}

impl From<Vec<Processor>> for Processors {
    fn from(processors: Vec<Processor>) -> Self {
        Self::Many(processors)
    }
}

/// Named group of processors.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub processors: Processors,
}

impl Plugin {
    pub fn new(name: impl Into<String>, processors: impl Into<Processors>) -> Self {
        Self {
            name: name.into(),
            processors: processors.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equals_treats_absent_as_empty() {
        let c = Constraint::equals("stylesheet");
        assert!(c.holds(Some("stylesheet")));
        assert!(!c.holds(Some("preload")));
        assert!(!c.holds(None));
        assert!(Constraint::equals("").holds(None));
    }

    #[test]
    fn test_present() {
        assert!(Constraint::Present(true).holds(Some("")));
        assert!(!Constraint::Present(true).holds(None));
        assert!(Constraint::Present(false).holds(None));
        assert!(!Constraint::Present(false).holds(Some("module")));
    }

    #[test]
    fn test_predicate_sees_absence() {
        let c = Constraint::predicate(|v| v.is_none_or(|v| v != "module"));
        assert!(c.holds(None));
        assert!(c.holds(Some("text/javascript")));
        assert!(!c.holds(Some("module")));
    }

    #[test]
    fn test_processors_normalize_to_list() {
        let noop = |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) };
        let one = Processors::from(Processor::new(Target::new("script", "src"), noop));
        assert_eq!(one.into_vec().len(), 1);

        let many = Processors::from(vec![
            Processor::new(Target::new("script", "src"), noop),
            Processor::new(Target::new("link", "href"), noop),
        ]);
        assert_eq!(many.into_vec().len(), 2);
    }
}
