//! Plain copy transform.

use std::fs;

use anyhow::{Context, Result};

use crate::pipeline::{ProcessingContext, Tag, Transform};

use super::ensure_parent;

/// Copy the asset byte for byte to its output path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn transform(&self, ctx: &ProcessingContext, _tag: &Tag) -> Result<()> {
        copy_asset(ctx)
    }
}

pub fn copy_asset(ctx: &ProcessingContext) -> Result<()> {
    ensure_parent(&ctx.output_path)?;
    fs::copy(&ctx.absolute_path, &ctx.output_path).with_context(|| {
        format!(
            "failed to copy `{}` to `{}`",
            ctx.absolute_path.display(),
            ctx.output_path.display()
        )
    })?;
    Ok(())
}
