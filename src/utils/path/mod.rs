//! Path and reference utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization (`normalize_path`, `normalize_lexically`)
//! - [`route`]: Reference classification (`is_external_link`, `strip_query_fragment`)

pub mod fs;
pub mod route;

pub use fs::{normalize_lexically, normalize_path};
