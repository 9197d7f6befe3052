//! Pipeline configuration management for `sitepipe.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── build      # [build]
//! │   ├── js         # [js]
//! │   ├── css        # [css]
//! │   └── plugin     # [[plugins]]
//! ├── types/         # ConfigError, diagnostics, field paths
//! ├── util.rs        # Config file lookup
//! └── mod.rs         # SiteConfig (this file)
//! ```
//!
//! # Loading
//!
//! 1. Locate `sitepipe.toml` (`--config`, or search upward from cwd).
//! 2. Parse with unknown-key detection; ignored keys are warned about.
//! 3. Resolve paths against the config file's directory, apply CLI overrides.
//! 4. Validate everything into [`ConfigDiagnostics`]; any error is fatal.

pub mod section;
mod types;
mod util;

use util::find_config_file;

pub use section::{BuildConfig, CssConfig, JsConfig, PluginConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::{
    asset::default_plugins,
    cli::{BuildArgs, Cli, Commands},
    log,
    pipeline::Configuration,
    utils::path::normalize_path,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name.
pub const CONFIG_FILE: &str = "sitepipe.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing sitepipe.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Absolute path to the config file, empty with `--no-config`
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub js: JsConfig,

    #[serde(default)]
    pub css: CssConfig,

    /// User plugins, in precedence order
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl SiteConfig {
    /// Load, normalize and validate configuration for a CLI invocation.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = if cli.no_config {
            Self {
                root: cwd.clone(),
                ..Self::default()
            }
        } else {
            let path = Self::resolve_config_path(cli.config.as_deref(), &cwd)?;
            let mut config = Self::from_path(&path)?;
            config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            config.config_path = path;
            config
        };

        config.normalize_paths();
        config.apply_command_options(cli, &cwd);
        config.validate()?;
        Ok(config)
    }

    /// Locate the config file.
    ///
    /// An explicit directory is searched for `sitepipe.toml`; an explicit
    /// file must exist. Without `--config`, searches upward from `cwd`.
    fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
        let found = match explicit {
            Some(path) => {
                let path = normalize_path(&cwd.join(path));
                let path = if path.is_dir() {
                    path.join(CONFIG_FILE)
                } else {
                    path
                };
                path.is_file().then_some(path.clone()).ok_or(path)
            }
            None => find_config_file(cwd, Path::new(CONFIG_FILE)).ok_or(cwd.join(CONFIG_FILE)),
        };
        found.map_err(|missing| ConfigError::MissingConfig(missing).into())
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli, cwd: &Path) {
        match &cli.command {
            Commands::Build { build_args } => self.apply_build_args(build_args, cwd),
        }
    }

    /// Apply build arguments from CLI.
    ///
    /// Paths given on the command line are relative to `cwd`, not the
    /// config file.
    fn apply_build_args(&mut self, args: &BuildArgs, cwd: &Path) {
        let from_cwd = |path: &PathBuf| normalize_path(&cwd.join(path));

        Self::update_option(&mut self.build.src, args.input.as_ref().map(from_cwd).as_ref());
        Self::update_option(&mut self.build.out, args.output.as_ref().map(from_cwd).as_ref());
        if args.clean {
            self.build.clean = true;
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // path normalization
    // ========================================================================

    /// Normalize all paths relative to root directory.
    fn normalize_paths(&mut self) {
        let root = normalize_path(&self.root);
        self.build.src = normalize_path(&root.join(&self.build.src));
        self.build.out = normalize_path(&root.join(&self.build.out));
        self.root = root;
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate the normalized configuration.
    ///
    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();
        let cwd = &self.build.src;

        self.build.validate(&mut diag);
        self.js.validate(cwd, &mut diag);
        self.css.validate(cwd, &mut diag);
        PluginConfig::validate_all(&self.plugins, cwd, &mut diag);

        diag.print_warnings();

        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    // ========================================================================
    // pipeline
    // ========================================================================

    /// Build the orchestrator configuration.
    ///
    /// User plugins come first; the built-in `js`/`css` plugins follow
    /// unless `build.default_plugins` is off. User `js`/`css` actions share
    /// the built-in transforms.
    pub fn pipeline(&self, quiet: bool) -> Result<Configuration> {
        let js = self.js.transform();
        let css = self.css.transform();

        let mut plugins = self
            .plugins
            .iter()
            .map(|plugin| plugin.build(&js, &css))
            .collect::<Result<Vec<_>>>()?;
        if self.build.default_plugins {
            plugins.extend(default_plugins(js, css));
        }

        Ok(Configuration {
            source_dir: self.build.src.clone(),
            output_dir: self.build.out.clone(),
            plugins,
            max_tasks: self.build.task_limit(),
            quiet,
        })
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config text.
/// Panics if there are unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SiteConfig {
    let (parsed, ignored) = SiteConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
