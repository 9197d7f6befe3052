//! Build orchestration.
//!
//! One run: build the registry, discover documents, stream every document
//! concurrently, then wait until every document and every scheduled
//! transform has settled.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jwalk::WalkDir;
use tokio::runtime::Handle;

use crate::logger::ProgressLine;
use crate::utils::plural_count;

use super::dedup::DedupSet;
use super::dispatch::{
    AssetTask, DocumentReport, DocumentRun, Dispatcher, StreamError, StreamFailure,
};
use super::error::{BuildFailure, Failure, PipelineError};
use super::plugin::Plugin;
use super::registry::ProcessorRegistry;

/// Validated input of one run.
#[derive(Debug)]
pub struct Configuration {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// In precedence order
    pub plugins: Vec<Plugin>,
    /// Concurrent transform bound
    pub max_tasks: usize,
    /// Suppress the progress line
    pub quiet: bool,
}

/// Counters of a successful run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: usize,
    /// Transforms run, one per distinct asset
    pub scheduled: usize,
    /// Matches served by an asset another match already claimed
    pub deduplicated: usize,
    /// Matches skipped as non-local references
    pub external: usize,
}

/// Run the pipeline to completion.
///
/// Returns `Err(PipelineError::Failed)` when any document, reference or
/// transform failed; every other document and task still ran to the end.
pub async fn run(config: Configuration) -> Result<BuildSummary, PipelineError> {
    let registry = Arc::new(ProcessorRegistry::build(config.plugins)?);
    crate::debug!("build"; "{} for <{}>",
        plural_count(registry.len(), "processor"),
        registry.tag_names().collect::<Vec<_>>().join("> <"));
    if registry.is_empty() {
        crate::log!("warning"; "no processors registered, documents are copied unchanged");
    }

    if !config.source_dir.is_dir() {
        return Err(PipelineError::MissingSource {
            path: config.source_dir,
        });
    }
    let documents = discover_documents(&config.source_dir, &config.output_dir)?;
    fs::create_dir_all(&config.output_dir).map_err(|source| PipelineError::CreateOutput {
        path: config.output_dir.clone(),
        source,
    })?;

    if documents.is_empty() {
        crate::log!("warning"; "no html documents in `{}`", config.source_dir.display());
    }

    let dispatcher = Arc::new(Dispatcher::new(
        config.source_dir,
        config.output_dir,
        registry,
        Arc::new(DedupSet::new()),
        config.max_tasks,
        Handle::current(),
    ));

    let progress = (!config.quiet && !documents.is_empty())
        .then(|| ProgressLine::new(&[("html", documents.len()), ("assets", 0)]));

    let mut summary = BuildSummary {
        documents: documents.len(),
        ..BuildSummary::default()
    };

    // Start every document before awaiting any of them.
    let runs: Vec<DocumentRun> = documents
        .into_iter()
        .map(|document| dispatcher.process(document))
        .collect();

    let mut failures = Vec::new();
    let mut tasks = Vec::new();
    for run in runs {
        settle_document(run, &mut summary, &mut failures, &mut tasks, progress.as_ref()).await;
    }

    for task in tasks {
        if let Some(failure) = settle_task(task).await {
            failures.push(failure);
        }
        if let Some(progress) = &progress {
            progress.inc("assets");
        }
    }

    if let Some(progress) = progress {
        progress.finish();
    }

    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(BuildFailure { failures }.into())
    }
}

/// Wait for one document stream and collect the tasks it scheduled.
async fn settle_document(
    run: DocumentRun,
    summary: &mut BuildSummary,
    failures: &mut Vec<Failure>,
    tasks: &mut Vec<AssetTask>,
    progress: Option<&ProgressLine>,
) {
    let DocumentRun {
        document,
        done,
        tasks: mut receiver,
    } = run;

    // The sender lives in the stream job, so the channel closes once the
    // document settles; draining first keeps the two in step.
    while let Some(task) = receiver.recv().await {
        if let Some(progress) = progress {
            progress.grow("assets");
        }
        tasks.push(task);
    }

    match done.await {
        Ok(Ok(report)) => record_report(&document, report, summary, failures),
        Ok(Err(StreamFailure { error, report })) => {
            record_report(&document, report, summary, failures);
            failures.push(Failure::Document {
                path: document,
                error,
            });
        }
        Err(source) => failures.push(Failure::Document {
            error: StreamError::Join {
                path: document.clone(),
                source,
            },
            path: document,
        }),
    }

    if let Some(progress) = progress {
        progress.inc("html");
    }
}

/// Add a document's counters and rejected references to the run.
fn record_report(
    document: &Path,
    report: DocumentReport,
    summary: &mut BuildSummary,
    failures: &mut Vec<Failure>,
) {
    summary.scheduled += report.scheduled;
    summary.deduplicated += report.deduplicated;
    summary.external += report.external;
    failures.extend(report.rejected.into_iter().map(|rejected| Failure::Reference {
        document: document.to_path_buf(),
        reference: rejected.reference,
        error: rejected.error,
    }));
}

/// Wait for one transform; `Some` when it failed.
async fn settle_task(task: AssetTask) -> Option<Failure> {
    let AssetTask {
        context,
        plugin,
        handle,
    } = task;
    let error = match handle.await {
        Ok(Ok(())) => return None,
        Ok(Err(error)) => error,
        Err(join) => anyhow::Error::new(join).context("transform task aborted"),
    };
    Some(Failure::Asset {
        path: context.absolute_path.clone(),
        requester: context.requester_path.clone(),
        plugin: plugin.to_string(),
        error,
    })
}

/// All `*.html` files under `source_dir`, sorted.
///
/// An output directory nested inside the source tree is skipped so a
/// previous build's output is never treated as input.
pub fn discover_documents(
    source_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(source_dir).sort(true) {
        let entry = entry.map_err(|e| PipelineError::Discovery {
            path: source_dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.starts_with(output_dir) {
            continue;
        }
        if path.extension().is_some_and(|ext| ext == "html") {
            documents.push(path);
        }
    }
    documents.sort();
    Ok(documents)
}
