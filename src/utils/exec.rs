//! External command execution.
//!
//! Asset commands (bundlers, stylesheet filters) run through [`Cmd`]:
//! stdout is captured for the caller, stderr is logged line by line under
//! the program name, and a non-zero exit becomes an error carrying stderr.
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! // Bundler writing its own output file
//! Cmd::from_slice(&["esbuild", "app.js", "--bundle", "--outfile=out/app.js"])
//!     .cwd(source_dir)
//!     .run()?;
//!
//! // Stylesheet filter: stdin -> stdout
//! let css = Cmd::from_slice(&["npx", "postcss"]).stdin(css).run()?.stdout;
//! ```

use crate::log;
use anyhow::{Context, Result};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    sync::OnceLock,
};

// ============================================================================
// Builder API
// ============================================================================

/// External process invocation.
#[derive(Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    stdin_data: Option<Vec<u8>>,
    filter: Option<&'static FilterRule>,
}

impl Cmd {
    /// Create from a command array (`["esbuild", ...]` or `["npx", "postcss"]`).
    ///
    /// Empty arguments are dropped.
    pub fn from_slice<S: AsRef<OsStr>>(argv: &[S]) -> Self {
        let mut iter = argv.iter().map(AsRef::as_ref);
        let program = iter.next().map(OsStr::to_owned).unwrap_or_default();
        let args = iter
            .filter(|arg| !arg.is_empty())
            .map(OsStr::to_owned)
            .collect();
        Self {
            program,
            args,
            ..Default::default()
        }
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Export environment variables to the process.
    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.envs.extend(
            vars.into_iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    /// Pipe `data` to the process's stdin.
    pub fn stdin<D: AsRef<[u8]>>(mut self, data: D) -> Self {
        self.stdin_data = Some(data.as_ref().to_vec());
        self
    }

    /// Drop matching stderr lines from the log.
    pub fn filter(mut self, filter: &'static FilterRule) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Execute the command and return its output.
    pub fn run(self) -> Result<Output> {
        let filter = self.filter.unwrap_or(&EMPTY_FILTER);
        let name = self.program.to_string_lossy().into_owned();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().cloned())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let Some(stdin_data) = self.stdin_data else {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .with_context(|| format!("Failed to execute `{name}`"))?;
            check_output(&name, &output, filter)?;
            return Ok(output);
        };

        let mut child = cmd
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn `{name}`"))?;

        // Writer thread: a child filling its stdout pipe must not block
        // against us. Dropping stdin signals EOF.
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|s| {
            let writer = s.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&stdin_data),
                None => Ok(()),
            });
            (child.wait_with_output(), writer.join())
        });

        let output = output.with_context(|| format!("Failed to wait for `{name}`"))?;
        check_output(&name, &output, filter)?;
        if let Ok(Err(e)) = written {
            return Err(e).with_context(|| format!("Failed to write stdin to `{name}`"));
        }
        Ok(output)
    }
}

// ============================================================================
// Variable Substitution
// ============================================================================

/// Resolve `$NAME` variables in command arguments
///
/// Longer names are substituted first so `$SITEPIPE_OUTPUT_DIR` is not
/// clobbered by `$SITEPIPE_OUTPUT`.
pub fn resolve_args(args: &[String], vars: &FxHashMap<&'static str, String>) -> Vec<String> {
    let mut keys: Vec<_> = vars.keys().copied().collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

    args.iter()
        .map(|arg| {
            keys.iter().fold(arg.clone(), |acc, key| {
                acc.replace(&format!("${key}"), &vars[key])
            })
        })
        .collect()
}

// ============================================================================
// Output Filtering
// ============================================================================

/// Stderr lines not worth logging.
pub struct FilterRule {
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    fn should_skip(&self, line: &str) -> bool {
        line.is_empty() || self.skip_prefixes.iter().any(|p| line.starts_with(p))
    }

    /// Lines of `output` that pass the filter, without color codes.
    fn keep(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .map(strip_ansi)
            .filter(|line| !self.should_skip(line.trim()))
            .map(Cow::into_owned)
            .collect()
    }
}

pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

// ============================================================================
// Helpers
// ============================================================================

fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    match RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").ok()) {
        Some(re) => re.replace_all(s, ""),
        None => Cow::Borrowed(s),
    }
}

/// Fail on a non-zero exit; otherwise log what is left of stderr.
fn check_output(name: &str, output: &Output, filter: &FilterRule) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines = filter.keep(stderr.trim());

    if !output.status.success() {
        let mut msg = format!("Command `{name}` failed with {}", output.status);
        if !lines.is_empty() {
            msg.push('\n');
            msg.push_str(&lines.join("\n"));
        }
        anyhow::bail!(msg);
    }

    if !lines.is_empty() {
        log!(name; "{}", lines.join("\n"));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
