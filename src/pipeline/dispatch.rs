//! Streaming document dispatch.
//!
//! Each document is copied to the output tree through an `lol_html`
//! rewriter. Every element whose tag name has registered processors is
//! matched synchronously while the stream is positioned on it; a match
//! may edit the tag and, unless the asset was already claimed, schedules
//! the processor's transform as an asynchronous task.
//!
//! ```text
//! document ──► rewriter ──► output document
//!                 │
//!                 ├─ match_tag ─► on_match (tag edit)
//!                 ├─ resolve   ─► DedupSet::claim
//!                 └─ spawn     ─► [permit] ─► transform   (AssetTask)
//! ```
//!
//! The rewriter is not `Send`, so streaming runs on a blocking thread and
//! hands scheduled tasks back to the orchestrator over a channel that
//! closes when the document ends.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use lol_html::errors::{RewritingError, SelectorError};
use lol_html::html_content::Element;
use lol_html::{ElementContentHandlers, HandlerResult, HtmlRewriter, Selector, Settings};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::dedup::DedupSet;
use super::matcher::{Tag, TagMatch, match_tag};
use super::plugin::{Processor, TagEditor};
use super::registry::ProcessorRegistry;
use super::resolve::{ProcessingContext, ResolveError, local_reference};

/// Read buffer size for streaming documents.
const CHUNK_SIZE: usize = 16 * 1024;

/// Document-level failure.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create `{}`", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid selector `{selector}`: {source}")]
    Selector {
        selector: String,
        #[source]
        source: SelectorError,
    },

    #[error("failed to rewrite `{}`: {source}", path.display())]
    Rewrite {
        path: PathBuf,
        #[source]
        source: RewritingError,
    },

    #[error("streaming `{}` did not complete: {source}", path.display())]
    Join {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// A document that failed mid-stream, with what it did before failing.
///
/// Tasks scheduled before the failure keep running; `report` still lists
/// them along with any rejected references.
#[derive(Debug)]
pub struct StreamFailure {
    pub error: StreamError,
    pub report: DocumentReport,
}

/// Reference that matched a processor but could not be resolved.
#[derive(Debug)]
pub struct RejectedReference {
    pub reference: String,
    pub error: ResolveError,
}

/// Per-document counters.
#[derive(Debug, Default)]
pub struct DocumentReport {
    /// Elements that matched a processor
    pub matched: usize,
    /// Transforms scheduled by this document
    pub scheduled: usize,
    /// Matches whose asset was already claimed
    pub deduplicated: usize,
    /// Matches skipped as non-local references
    pub external: usize,
    pub rejected: Vec<RejectedReference>,
}

/// Handle to one scheduled transform.
#[derive(Debug)]
pub struct AssetTask {
    pub context: Arc<ProcessingContext>,
    pub plugin: Arc<str>,
    pub handle: JoinHandle<Result<()>>,
}

/// Handles for a document being streamed.
#[derive(Debug)]
pub struct DocumentRun {
    pub document: PathBuf,
    pub done: JoinHandle<Result<DocumentReport, StreamFailure>>,
    /// Closes once the document has been fully streamed.
    pub tasks: UnboundedReceiver<AssetTask>,
}

/// Shared state for streaming documents of one run.
pub struct Dispatcher {
    source_dir: PathBuf,
    output_dir: PathBuf,
    registry: Arc<ProcessorRegistry>,
    dedup: Arc<DedupSet>,
    limiter: Arc<Semaphore>,
    runtime: Handle,
}

impl Dispatcher {
    /// `max_tasks` bounds transforms running at the same time (minimum 1).
    pub fn new(
        source_dir: PathBuf,
        output_dir: PathBuf,
        registry: Arc<ProcessorRegistry>,
        dedup: Arc<DedupSet>,
        max_tasks: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            source_dir,
            output_dir,
            registry,
            dedup,
            limiter: Arc::new(Semaphore::new(max_tasks.max(1))),
            runtime,
        }
    }

    /// Start streaming `document` on a blocking thread.
    pub fn process(self: &Arc<Self>, document: PathBuf) -> DocumentRun {
        let (sender, tasks) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        let path = document.clone();
        let done = self
            .runtime
            .spawn_blocking(move || this.stream(&path, &sender));
        DocumentRun {
            document,
            done,
            tasks,
        }
    }

    /// Output location of a document: same relative path under `output_dir`.
    pub fn document_output(&self, document: &Path) -> PathBuf {
        match document.strip_prefix(&self.source_dir) {
            Ok(relative) => self.output_dir.join(relative),
            Err(_) => self
                .output_dir
                .join(document.file_name().unwrap_or(document.as_os_str())),
        }
    }

    fn stream(
        &self,
        document: &Path,
        sender: &UnboundedSender<AssetTask>,
    ) -> Result<DocumentReport, StreamFailure> {
        let report = Rc::new(RefCell::new(DocumentReport::default()));
        let result = self.rewrite(document, sender, &report);
        // Handlers holding clones are gone once `rewrite` returns.
        let report = Rc::try_unwrap(report)
            .map(RefCell::into_inner)
            .unwrap_or_else(|shared| std::mem::take(&mut *shared.borrow_mut()));
        match result {
            Ok(()) => Ok(report),
            Err(error) => Err(StreamFailure { error, report }),
        }
    }

    fn rewrite(
        &self,
        document: &Path,
        sender: &UnboundedSender<AssetTask>,
        report: &Rc<RefCell<DocumentReport>>,
    ) -> Result<(), StreamError> {
        let output = self.document_output(document);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|source| StreamError::Create {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut input = File::open(document).map_err(|source| StreamError::Read {
            path: document.to_path_buf(),
            source,
        })?;
        let file = File::create(&output).map_err(|source| StreamError::Create {
            path: output.clone(),
            source,
        })?;

        let handlers = self.element_handlers(document, sender, report)?;

        let mut writer = BufWriter::new(file);
        let mut sink_error: Option<io::Error> = None;
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |chunk: &[u8]| {
                if sink_error.is_none()
                    && let Err(e) = writer.write_all(chunk)
                {
                    sink_error = Some(e);
                }
            },
        );

        let rewrite_error = |source| StreamError::Rewrite {
            path: document.to_path_buf(),
            source,
        };
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = input.read(&mut buf).map_err(|source| StreamError::Read {
                path: document.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            rewriter.write(&buf[..n]).map_err(rewrite_error)?;
        }
        rewriter.end().map_err(rewrite_error)?;

        let write_error = |source| StreamError::Write {
            path: output.clone(),
            source,
        };
        if let Some(e) = sink_error {
            return Err(write_error(e));
        }
        writer.flush().map_err(write_error)
    }

    /// One element handler per registered tag name.
    #[allow(clippy::type_complexity)]
    fn element_handlers<'h>(
        &'h self,
        document: &'h Path,
        sender: &UnboundedSender<AssetTask>,
        report: &Rc<RefCell<DocumentReport>>,
    ) -> Result<Vec<(Cow<'static, Selector>, ElementContentHandlers<'h>)>, StreamError> {
        self.registry
            .tag_names()
            .map(|tag_name| {
                let selector = tag_name
                    .parse::<Selector>()
                    .map_err(|source| StreamError::Selector {
                        selector: tag_name.to_owned(),
                        source,
                    })?;
                let sender = sender.clone();
                let report = Rc::clone(report);
                let handler = move |el: &mut Element<'_, '_>| -> HandlerResult {
                    self.handle_element(el, document, &sender, &mut report.borrow_mut())?;
                    Ok(())
                };
                Ok((
                    Cow::Owned(selector),
                    ElementContentHandlers::default().element(handler),
                ))
            })
            .collect()
    }

    fn handle_element(
        &self,
        el: &mut Element<'_, '_>,
        document: &Path,
        sender: &UnboundedSender<AssetTask>,
        report: &mut DocumentReport,
    ) -> Result<()> {
        let tag = Tag::new(
            &el.tag_name(),
            el.attributes()
                .iter()
                .map(|attr| (attr.name(), attr.value()))
                .collect(),
        );
        let Some(TagMatch { entry, reference }) =
            match_tag(&tag, self.registry.candidates(&tag.name))
        else {
            return Ok(());
        };
        report.matched += 1;

        if let Some(on_match) = &entry.processor.on_match {
            let mut editor = ElementEditor(el);
            on_match(&mut editor).with_context(|| {
                format!("[{}] failed to edit <{}> for `{}`", entry.plugin, tag.name, reference)
            })?;
        }

        let Some(local) = local_reference(reference) else {
            report.external += 1;
            crate::debug!("skip"; "external reference `{}`", reference);
            return Ok(());
        };

        let context = match ProcessingContext::new(
            &self.source_dir,
            &self.output_dir,
            document,
            reference,
            &local,
        ) {
            Ok(context) => context,
            Err(error) => {
                report.rejected.push(RejectedReference {
                    reference: reference.to_owned(),
                    error,
                });
                return Ok(());
            }
        };

        if !self.dedup.claim(&context.absolute_path) {
            report.deduplicated += 1;
            return Ok(());
        }
        report.scheduled += 1;
        crate::debug!(&entry.plugin; "{}", context.root_relative_path.display());

        let context = Arc::new(context);
        let plugin = Arc::clone(&entry.plugin);
        let handle = self.spawn_transform(Arc::clone(&entry.processor), Arc::clone(&context), tag);
        // Receiver gone means the run was abandoned; the task runs detached.
        let _ = sender.send(AssetTask {
            context,
            plugin,
            handle,
        });
        Ok(())
    }

    fn spawn_transform(
        &self,
        processor: Arc<Processor>,
        context: Arc<ProcessingContext>,
        tag: Tag,
    ) -> JoinHandle<Result<()>> {
        let limiter = Arc::clone(&self.limiter);
        self.runtime.spawn(async move {
            let _permit = limiter
                .acquire_owned()
                .await
                .context("task limiter closed")?;
            tokio::task::spawn_blocking(move || processor.transform.transform(&context, &tag))
                .await
                .context("transform panicked")?
        })
    }
}

/// [`TagEditor`] over the element the rewriter is positioned on.
struct ElementEditor<'a, 'r, 't>(&'a mut Element<'r, 't>);

impl TagEditor for ElementEditor<'_, '_, '_> {
    fn tag_name(&self) -> String {
        self.0.tag_name()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.0
            .set_attribute(name, value)
            .with_context(|| format!("invalid attribute name `{name}`"))
    }

    fn remove_attribute(&mut self, name: &str) {
        self.0.remove_attribute(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::plugin::{Constraint, Plugin, Target};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Site {
        _dir: TempDir,
        src: PathBuf,
        out: PathBuf,
    }

    fn site(files: &[(&str, &str)]) -> Site {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("site");
        let out = dir.path().join("out");
        for (path, content) in files {
            let path = src.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Site {
            _dir: dir,
            src,
            out,
        }
    }

    fn dispatcher(site: &Site, plugins: Vec<Plugin>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            site.src.clone(),
            site.out.clone(),
            Arc::new(ProcessorRegistry::build(plugins).unwrap()),
            Arc::new(DedupSet::new()),
            4,
            Handle::current(),
        ))
    }

    async fn drain(run: DocumentRun) -> (DocumentReport, Vec<AssetTask>) {
        let DocumentRun {
            done, mut tasks, ..
        } = run;
        let report = done.await.unwrap().unwrap();
        let mut scheduled = Vec::new();
        while let Some(task) = tasks.recv().await {
            scheduled.push(task);
        }
        (report, scheduled)
    }

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn(&ProcessingContext, &Tag) -> Result<()> {
        move |_: &ProcessingContext, _: &Tag| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_document_copied_unchanged() {
        let html = "<!doctype html><html><head><script src=\"app.js\"></script></head><body><p>hi</p></body></html>";
        let site = site(&[("index.html", html), ("app.js", "1")]);
        let counter = Arc::new(AtomicUsize::new(0));
        let d = dispatcher(
            &site,
            vec![Plugin::new(
                "js",
                Processor::new(Target::new("script", "src"), counting(Arc::clone(&counter))),
            )],
        );

        let (report, tasks) = drain(d.process(site.src.join("index.html"))).await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.scheduled, 1);
        for task in tasks {
            assert_eq!(task.context.root_relative_path, PathBuf::from("app.js"));
            assert_eq!(&*task.plugin, "js");
            task.handle.await.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(site.out.join("index.html")).unwrap(), html);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_reference_scheduled_once() {
        let html = r#"<script src="a.js"></script><script src="./a.js"></script>"#;
        let site = site(&[("index.html", html)]);
        let counter = Arc::new(AtomicUsize::new(0));
        let d = dispatcher(
            &site,
            vec![Plugin::new(
                "js",
                Processor::new(Target::new("script", "src"), counting(Arc::clone(&counter))),
            )],
        );

        let (report, tasks) = drain(d.process(site.src.join("index.html"))).await;
        assert_eq!(report.matched, 2);
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.deduplicated, 1);
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_external_and_unmatched_tags_skipped() {
        let html = r#"<script src="https://cdn.example.com/x.js"></script>
<link rel="preload" href="theme.css">
<script>inline()</script>"#;
        let site = site(&[("index.html", html)]);
        let d = dispatcher(
            &site,
            vec![
                Plugin::new(
                    "css",
                    Processor::new(
                        Target::new("link", "href").with("rel", Constraint::equals("stylesheet")),
                        |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) },
                    ),
                ),
                Plugin::new(
                    "js",
                    Processor::new(
                        Target::new("script", "src"),
                        |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) },
                    ),
                ),
            ],
        );

        let (report, tasks) = drain(d.process(site.src.join("index.html"))).await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.external, 1);
        assert!(tasks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_on_match_edits_output_tag() {
        let html = r#"<script src="app.ts" type="module"></script>"#;
        let site = site(&[("index.html", html)]);
        let processor = Processor::new(
            Target::new("script", "src"),
            |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) },
        )
        .on_match(|tag| {
            let src = tag.attribute("src").unwrap_or_default();
            tag.set_attribute("src", &src.replace(".ts", ".js"))?;
            tag.remove_attribute("type");
            Ok(())
        });
        let d = dispatcher(&site, vec![Plugin::new("ts", processor)]);

        let (report, tasks) = drain(d.process(site.src.join("index.html"))).await;
        assert_eq!(report.scheduled, 1);
        // The transform still sees the original reference.
        assert_eq!(
            tasks[0].context.absolute_path,
            site.src.join("app.ts")
        );
        assert_eq!(
            fs::read_to_string(site.out.join("index.html")).unwrap(),
            r#"<script src="app.js"></script>"#
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_on_match_edits_external_reference() {
        let html = r#"<script src="https://cdn.example.com/x.js"></script>"#;
        let site = site(&[("index.html", html)]);
        let processor = Processor::new(
            Target::new("script", "src"),
            |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) },
        )
        .on_match(|tag| tag.set_attribute("crossorigin", "anonymous"));
        let d = dispatcher(&site, vec![Plugin::new("js", processor)]);

        let (report, tasks) = drain(d.process(site.src.join("index.html"))).await;
        assert_eq!(report.external, 1);
        assert!(tasks.is_empty());
        assert_eq!(
            fs::read_to_string(site.out.join("index.html")).unwrap(),
            r#"<script src="https://cdn.example.com/x.js" crossorigin="anonymous"></script>"#
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_keeps_partial_report() {
        let html = r#"<script src="../../evil.js"></script><script src="a.js"></script><script src="b.js"></script>"#;
        let site = site(&[("index.html", html)]);
        let processor = Processor::new(
            Target::new("script", "src"),
            |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) },
        )
        .on_match(|tag| match tag.attribute("src").as_deref() {
            Some("b.js") => anyhow::bail!("cannot edit"),
            _ => Ok(()),
        });
        let d = dispatcher(&site, vec![Plugin::new("js", processor)]);

        let DocumentRun {
            done, mut tasks, ..
        } = d.process(site.src.join("index.html"));
        let failure = done.await.unwrap().unwrap_err();
        assert!(matches!(failure.error, StreamError::Rewrite { .. }));
        assert_eq!(failure.report.scheduled, 1);
        assert_eq!(failure.report.rejected.len(), 1);

        let task = tasks.recv().await.unwrap();
        assert!(task.context.absolute_path.ends_with("a.js"));
        assert!(tasks.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reference_outside_source_rejected() {
        let site = site(&[("index.html", r#"<script src="../../evil.js"></script>"#)]);
        let d = dispatcher(
            &site,
            vec![Plugin::new(
                "js",
                Processor::new(
                    Target::new("script", "src"),
                    |_: &ProcessingContext, _: &Tag| -> Result<()> { Ok(()) },
                ),
            )],
        );

        let (report, tasks) = drain(d.process(site.src.join("index.html"))).await;
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reference, "../../evil.js");
        assert!(tasks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_document_is_read_error() {
        let site = site(&[]);
        let d = dispatcher(&site, Vec::new());
        let run = d.process(site.src.join("missing.html"));
        let failure = run.done.await.unwrap().unwrap_err();
        assert!(matches!(failure.error, StreamError::Read { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nested_document_output_mirrors_source() {
        let site = site(&[("docs/guide/index.html", "<p>guide</p>")]);
        let d = dispatcher(&site, Vec::new());
        let (report, _) = drain(d.process(site.src.join("docs/guide/index.html"))).await;
        assert_eq!(report.matched, 0);
        assert_eq!(
            fs::read_to_string(site.out.join("docs/guide/index.html")).unwrap(),
            "<p>guide</p>"
        );
    }
}
