//! Terminal logging with colored prefixes and a live progress line.
//!
//! - `log!` prints one line under a colored `[module]` prefix
//! - `debug!` does the same, only with `--verbose`
//! - [`ProgressLine`] keeps a single redrawn counter line at the bottom
//!
//! ```ignore
//! log!("build"; "streaming {} documents", count);
//!
//! let progress = ProgressLine::new(&[("html", 12), ("assets", 0)]);
//! progress.grow("assets");
//! progress.inc("html");
//! progress.finish();
//! ```

use crossterm::{
    cursor, queue,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{StdoutLock, Write, stdout},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set by `--verbose`.
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// A progress line currently owns the bottom terminal line.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Macros
// ============================================================================

/// Log a message with a colored module prefix
///
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Output
// ============================================================================

/// Print `message` under `[module]`, above any active progress line.
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut out = stdout().lock();
    if PROGRESS_ACTIVE.load(Ordering::SeqCst) {
        rewind(&mut out);
    }
    writeln!(out, "{prefix} {message}").ok();
    out.flush().ok();
}

fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "build" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        "warning" => prefix.bright_magenta().bold().to_string(),
        "config" | "hint" => prefix.bright_blue().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

/// Move to column 0 and clear the line.
fn rewind(out: &mut StdoutLock<'_>) {
    queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
}

// ============================================================================
// Progress Line
// ============================================================================

/// Single-line progress display with named counters.
///
/// Renders as `[build] html(3/10) assets(4/7)`. Totals may grow while work
/// is discovered; counters with a zero total are hidden. Redraws use
/// `try_lock`, so worker threads never wait on the terminal and a skipped
/// frame is covered by the next update.
pub struct ProgressLine {
    counters: Vec<Counter>,
    draw: Mutex<()>,
    finished: bool,
}

struct Counter {
    name: &'static str,
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressLine {
    pub fn new(items: &[(&'static str, usize)]) -> Self {
        let counters = items
            .iter()
            .map(|&(name, total)| Counter {
                name,
                total: AtomicUsize::new(total),
                done: AtomicUsize::new(0),
            })
            .collect();

        PROGRESS_ACTIVE.store(true, Ordering::SeqCst);
        let progress = Self {
            counters,
            draw: Mutex::new(()),
            finished: false,
        };
        progress.paint(false);
        progress
    }

    fn counter(&self, name: &str) -> Option<&Counter> {
        self.counters.iter().find(|c| c.name == name)
    }

    /// One more item of `name` finished.
    pub fn inc(&self, name: &str) {
        if let Some(counter) = self.counter(name) {
            counter.done.fetch_add(1, Ordering::Relaxed);
            self.refresh();
        }
    }

    /// One more item of `name` discovered.
    pub fn grow(&self, name: &str) {
        if let Some(counter) = self.counter(name) {
            counter.total.fetch_add(1, Ordering::Relaxed);
            self.refresh();
        }
    }

    /// `(done, total)` of the named counter.
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<(usize, usize)> {
        self.counter(name).map(|c| {
            (
                c.done.load(Ordering::Relaxed),
                c.total.load(Ordering::Relaxed),
            )
        })
    }

    fn refresh(&self) {
        if let Some(_guard) = self.draw.try_lock() {
            self.paint(false);
        }
    }

    fn render(&self) -> String {
        let counters: Vec<_> = self
            .counters
            .iter()
            .filter_map(|c| {
                let total = c.total.load(Ordering::Relaxed);
                (total > 0).then(|| {
                    format!("{}({}/{})", c.name, c.done.load(Ordering::Relaxed), total)
                })
            })
            .collect();
        format!("{} {}", colorize_prefix("build"), counters.join(" "))
    }

    /// Redraw the line in place, ending it with a newline when `last`.
    fn paint(&self, last: bool) {
        let line = self.render();
        let mut out = stdout().lock();
        rewind(&mut out);
        if last {
            writeln!(out, "{line}").ok();
        } else {
            write!(out, "{line}").ok();
        }
        out.flush().ok();
    }

    /// Leave the final state on screen and release the terminal line.
    pub fn finish(mut self) {
        self.paint_final();
    }

    fn paint_final(&mut self) {
        let _guard = self.draw.lock();
        self.paint(true);
        self.finished = true;
    }
}

impl Drop for ProgressLine {
    /// Release the terminal line; wipe it if `finish` was never called.
    fn drop(&mut self) {
        PROGRESS_ACTIVE.store(false, Ordering::SeqCst);
        if !self.finished {
            let mut out = stdout().lock();
            rewind(&mut out);
            out.flush().ok();
        }
    }
}
