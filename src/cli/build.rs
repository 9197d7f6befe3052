//! `sitepipe build`.
//!
//! Phases:
//! - **Init** - optional clean of the output directory
//! - **Run** - stream documents and settle every transform on a tokio runtime
//! - **Report** - summary line, or every collected failure

use crate::{
    config::SiteConfig,
    log,
    pipeline::{self, BuildSummary, PipelineError},
    utils::plural_count,
};
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Build the site described by `config`.
pub fn build_site(config: &SiteConfig, quiet: bool) -> Result<BuildSummary> {
    if config.build.clean {
        clean_output(&config.build.out)?;
    }

    let pipeline = config.pipeline(quiet)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match runtime.block_on(pipeline::run(pipeline)) {
        Ok(summary) => {
            log_summary(&summary);
            Ok(summary)
        }
        Err(PipelineError::Failed(failure)) => {
            for item in &failure.failures {
                log!("error"; "{}", item);
            }
            bail!(failure)
        }
        Err(err) => Err(err.into()),
    }
}

fn clean_output(output: &Path) -> Result<()> {
    if output.exists() {
        crate::debug!("build"; "removing {}", output.display());
        fs::remove_dir_all(output).with_context(|| {
            format!("Failed to clear output directory: {}", output.display())
        })?;
    }
    Ok(())
}

fn log_summary(summary: &BuildSummary) {
    let mut line = format!(
        "{}, {}",
        plural_count(summary.documents, "document"),
        plural_count(summary.scheduled, "asset")
    );
    if summary.deduplicated > 0 {
        line.push_str(&format!(" ({} shared)", summary.deduplicated));
    }
    log!("build"; "{}", line);
    if summary.external > 0 {
        crate::debug!("build"; "{} left untouched", plural_count(summary.external, "external reference"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.build.src = dir.join("site");
        config.build.out = dir.join("site-out");
        config
    }

    #[test]
    fn test_build_site_with_defaults() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("site");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.html"), r#"<link rel="stylesheet" href="a.css">"#).unwrap();
        fs::write(src.join("a.css"), "a{}").unwrap();

        let summary = build_site(&config(dir.path()), true).unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.scheduled, 1);
        assert_eq!(fs::read_to_string(dir.path().join("site-out/a.css")).unwrap(), "a{}");
    }

    #[test]
    fn test_clean_removes_stale_output() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("site")).unwrap();
        let out = dir.path().join("site-out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.js"), "old").unwrap();

        let mut config = config(dir.path());
        config.build.clean = true;
        build_site(&config, true).unwrap();

        assert!(out.is_dir());
        assert!(!out.join("stale.js").exists());
    }

    #[test]
    fn test_failures_fail_the_build() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("site");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.html"), r#"<script src="missing.js"></script>"#).unwrap();

        let err = build_site(&config(dir.path()), true).unwrap_err();
        assert!(err.to_string().contains("build failed with 1 error"));
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let err = build_site(&config(dir.path()), true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingSource { .. })
        ));
    }
}
