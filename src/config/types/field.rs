//! Config field paths.

use owo_colors::OwoColorize;
use std::borrow::Cow;
use std::fmt;

/// Dotted path of a config field, as written in `sitepipe.toml`.
///
/// Static for fixed fields (`build.max_tasks`), owned for indexed ones
/// (`plugins[2].processors[0].action`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Cow<'static, str>);

impl FieldPath {
    #[inline]
    pub const fn new(path: &'static str) -> Self {
        Self(Cow::Borrowed(path))
    }

    pub fn owned(path: impl Into<String>) -> Self {
        Self(Cow::Owned(path.into()))
    }

    /// Extend the path with a child key.
    pub fn join(&self, key: &str) -> Self {
        Self::owned(format!("{}.{key}", self.0))
    }

    /// Extend the path with an array index.
    pub fn index(&self, index: usize) -> Self {
        Self::owned(format!("{}[{index}]", self.0))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_index() {
        let path = FieldPath::new("plugins").index(2).join("processors").index(0);
        assert_eq!(path.as_str(), "plugins[2].processors[0]");
        assert_eq!(FieldPath::new("js.command").as_str(), "js.command");
    }
}
