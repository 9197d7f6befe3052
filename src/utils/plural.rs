//! Pluralization for summary lines.

/// Return "s" suffix for plural counts
#[inline]
pub fn plural_s(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Format count with noun, handling pluralization
///
/// - `plural_count(0, "asset")` -> `"0 assets"`
/// - `plural_count(1, "document")` -> `"1 document"`
#[inline]
pub fn plural_count(count: usize, noun: &str) -> String {
    format!("{count} {noun}{}", plural_s(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_count() {
        assert_eq!(plural_count(0, "asset"), "0 assets");
        assert_eq!(plural_count(1, "document"), "1 document");
        assert_eq!(plural_count(7, "error"), "7 errors");
    }
}
