//! Dispatch of discovered files onto two bounded worker pools.
//!
//! Traversal streams [`MediaFile`]s through a bounded channel. The
//! dispatcher classifies each one, claims its output path, and spawns a job.
//! Each job acquires a permit from its pipeline's own semaphore, so a
//! saturated video pool never holds up image work and vice versa.
//!
//! A job's failure (or panic) becomes a `Failed` outcome for that file only.
//! The one exception is an output root that stops being writable mid-run:
//! dispatch stops, in-flight jobs drain, and the run ends with a
//! [`StartupError::OutputUnwritable`].

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use super::channel::spawn_traversal;
use super::decode::DecoderSet;
use super::discovery::FileDiscovery;
use super::encoder::VideoEncoder;
use super::idempotency::IdempotencyChecker;
use super::image::ImagePipeline;
use super::layout::OutputLayout;
use super::preserve::Preserver;
use super::probe::MediaProbe;
use super::video::VideoPipeline;
use crate::config::Config;
use crate::error::{MirrorError, PipelineResult, StartupError};
use crate::report::Reporter;
use crate::types::{ConversionJob, Outcome, PipelineKind, RunSummary};

/// Name of the throwaway file used to test output root writability.
const WRITE_PROBE: &str = ".mediamirror-write-test";

/// Everything a spawned job needs, shared across all jobs of a run.
struct Workers {
    images: ImagePipeline,
    videos: VideoPipeline,
    preserver: Preserver,
    reporter: Arc<Reporter>,
    checker: IdempotencyChecker,
    output_root: PathBuf,
    /// Set once the output root is found unwritable mid-run
    aborted: AtomicBool,
}

/// Runs one mirror pass from the input root to the output root.
pub struct Scheduler {
    config: Arc<Config>,
    workers: Arc<Workers>,
}

impl Scheduler {
    pub fn new(
        config: Arc<Config>,
        decoders: DecoderSet,
        probe: Arc<dyn MediaProbe>,
        encoder: Arc<dyn VideoEncoder>,
        reporter: Arc<Reporter>,
    ) -> Self {
        let workers = Workers {
            images: ImagePipeline::new(decoders),
            videos: VideoPipeline::new(Arc::clone(&probe), Arc::clone(&encoder)),
            preserver: Preserver::new(probe, encoder),
            reporter,
            checker: IdempotencyChecker::new(config.idempotency.skip_policy),
            output_root: config.output_root(),
            aborted: AtomicBool::new(false),
        };
        Self {
            config,
            workers: Arc::new(workers),
        }
    }

    /// Verify the roots before anything is dispatched.
    ///
    /// Creates the output root if it does not exist yet, but only once it is
    /// known not to overlap the input root.
    pub fn check_roots(input: &Path, output: &Path) -> Result<(), StartupError> {
        let input_unreadable = |message: String| StartupError::InputUnreadable {
            path: input.to_path_buf(),
            message,
        };
        let output_unwritable = |e: std::io::Error| StartupError::OutputUnwritable {
            path: output.to_path_buf(),
            message: e.to_string(),
        };
        if !input.is_dir() {
            return Err(input_unreadable("not a directory".to_string()));
        }
        std::fs::read_dir(input).map_err(|e| input_unreadable(e.to_string()))?;

        let input_abs = input
            .canonicalize()
            .map_err(|e| input_unreadable(e.to_string()))?;
        let output_abs = resolve_absolute(output).map_err(output_unwritable)?;
        if output_abs.starts_with(&input_abs) || input_abs.starts_with(&output_abs) {
            return Err(StartupError::OverlappingRoots {
                input: input_abs,
                output: output_abs,
            });
        }

        std::fs::create_dir_all(output).map_err(output_unwritable)?;
        probe_writable(output).map_err(output_unwritable)?;
        Ok(())
    }

    /// Convert every file under the input root.
    ///
    /// Returns once every discovered file has a recorded outcome. Per-file
    /// failures are counted in the summary and never make this return `Err`.
    pub async fn run(&self) -> Result<RunSummary, MirrorError> {
        let input = self.config.input_root();
        let output = self.config.output_root();
        Self::check_roots(&input, &output)?;

        let scheduler = &self.config.scheduler;
        tracing::info!(
            "Mirroring {:?} -> {:?} ({} image workers, {} video workers)",
            input,
            output,
            scheduler.image_workers,
            scheduler.video_workers
        );

        let image_slots = scheduler.image_workers.max(1);
        let video_slots = scheduler.video_workers.max(1);
        let image_permits = Arc::new(Semaphore::new(image_slots));
        let video_permits = Arc::new(Semaphore::new(video_slots));
        // Jobs waiting on a permit still hold memory; cap them at the queue size
        let max_pending =
            scheduler.queue_size.max(1) + scheduler.image_workers + scheduler.video_workers;

        let (traversal, mut files) =
            spawn_traversal(FileDiscovery::new(&input), scheduler.queue_size);
        let mut layout = OutputLayout::new(&output);
        let mut jobs = JoinSet::new();

        while let Some(file) = files.recv().await {
            if self.workers.aborted.load(Ordering::SeqCst) {
                break;
            }

            let (Some(pipeline), Some(target_ext)) =
                (file.kind.pipeline(), file.kind.target_extension())
            else {
                self.workers.reporter.record(&file, &Outcome::SkippedUnsupported);
                continue;
            };

            let Some(output_path) = layout.claim(&file.relative_path, target_ext) else {
                self.workers.reporter.record(
                    &file,
                    &Outcome::Failed {
                        kind: "io".to_string(),
                        reason: "no free output path for this source".to_string(),
                    },
                );
                continue;
            };

            let permits = match pipeline {
                PipelineKind::Image => Arc::clone(&image_permits),
                PipelineKind::Video => Arc::clone(&video_permits),
            };
            let job = ConversionJob {
                file,
                output_path,
                pipeline,
                config: Arc::clone(&self.config),
            };

            while jobs.len() >= max_pending {
                reap(jobs.join_next().await);
            }
            jobs.spawn(run_job(Arc::clone(&self.workers), permits, job));
        }
        // Stops traversal if dispatch ended early
        drop(files);

        while let Some(result) = jobs.join_next().await {
            reap(Some(result));
        }
        // A decode that overran its budget holds its slot until it returns
        let _idle = (
            image_permits.acquire_many(image_slots as u32).await,
            video_permits.acquire_many(video_slots as u32).await,
        );
        match traversal.await {
            Ok(sent) => tracing::debug!("Traversal finished after {} files", sent),
            Err(e) => tracing::warn!("Traversal task failed: {}", e),
        }

        let summary = self.workers.reporter.finish();
        if self.workers.aborted.load(Ordering::SeqCst) {
            return Err(StartupError::OutputUnwritable {
                path: output,
                message: "became unwritable during the run".to_string(),
            }
            .into());
        }
        Ok(summary)
    }
}

/// One file from permit to recorded outcome.
async fn run_job(workers: Arc<Workers>, permits: Arc<Semaphore>, job: ConversionJob) {
    if workers.checker.is_current(&job.file, &job.output_path) {
        let outcome = Outcome::SkippedAlreadyProcessed {
            output: job.output_path.clone(),
        };
        workers.reporter.record(&job.file, &outcome);
        return;
    }

    let Ok(slot) = permits.acquire_owned().await else {
        return;
    };
    if workers.aborted.load(Ordering::SeqCst) {
        return;
    }

    let outcome = match AssertUnwindSafe(convert(&workers, &job, slot))
        .catch_unwind()
        .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => Outcome::Failed {
            kind: e.kind().to_string(),
            reason: e.to_string(),
        },
        Err(panic) => Outcome::Failed {
            kind: "panic".to_string(),
            reason: panic_message(panic.as_ref()),
        },
    };

    if let Outcome::Failed { kind, .. } = &outcome {
        if kind == "io" {
            if let Err(e) = probe_writable(&workers.output_root) {
                tracing::error!(
                    "Output root {:?} is no longer writable, stopping: {}",
                    workers.output_root,
                    e
                );
                workers.aborted.store(true, Ordering::SeqCst);
            }
        }
    }

    workers.reporter.record(&job.file, &outcome);
}

async fn convert(
    workers: &Workers,
    job: &ConversionJob,
    slot: OwnedSemaphorePermit,
) -> PipelineResult<Outcome> {
    // The image slot travels with the blocking decode; the video slot is
    // held until this job returns
    let (conversion, _slot) = match job.pipeline {
        PipelineKind::Image => (workers.images.convert_in_slot(job, Some(slot)).await?, None),
        PipelineKind::Video => (workers.videos.convert(job).await?, Some(slot)),
    };
    let mut warnings = conversion.warnings.clone();
    warnings.extend(workers.preserver.preserve(job, &conversion).await);
    Ok(Outcome::Converted {
        output: conversion.output,
        warnings,
    })
}

fn reap(result: Option<Result<(), tokio::task::JoinError>>) {
    if let Some(Err(e)) = result {
        tracing::error!("Job task ended abnormally: {}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}

/// Absolute form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the missing components are appended.
fn resolve_absolute(path: &Path) -> std::io::Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut missing = Vec::new();
    let mut existing = path.as_path();
    loop {
        match existing.canonicalize() {
            Ok(base) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(base, |resolved, name| resolved.join(name)))
            }
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(e),
            },
        }
    }
}

/// Create and remove a small file in `dir`.
fn probe_writable(dir: &Path) -> std::io::Result<()> {
    let path = dir.join(format!("{}-{}", WRITE_PROBE, std::process::id()));
    std::fs::write(&path, b"ok")?;
    std::fs::remove_file(&path)
}
