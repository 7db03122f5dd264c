//! The `mediamirror run` command.

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mediamirror_core::config::SkipPolicy;
use mediamirror_core::pipeline::FileDiscovery;
use mediamirror_core::{
    Config, FileRecord, JsonlSink, MediaMirror, ReportSink, Reporter, RunSummary, TracingSink,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Source tree (overrides paths.input_root)
    pub input: Option<PathBuf>,

    /// Destination tree (overrides paths.output_root)
    pub output: Option<PathBuf>,

    /// Longest side of converted images, in pixels
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Number of concurrent image jobs
    #[arg(long)]
    pub image_workers: Option<usize>,

    /// Number of concurrent video jobs
    #[arg(long)]
    pub video_workers: Option<usize>,

    /// When an existing output counts as already processed
    #[arg(long, value_enum)]
    pub skip_policy: Option<SkipPolicyArg>,

    /// Write one JSON line per source file to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(short, long, env = "MEDIAMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// CLI spelling of [`SkipPolicy`].
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SkipPolicyArg {
    /// Any existing output is current
    Exists,
    /// Existing output must carry the source's modification time
    Mtime,
}

impl From<SkipPolicyArg> for SkipPolicy {
    fn from(arg: SkipPolicyArg) -> Self {
        match arg {
            SkipPolicyArg::Exists => SkipPolicy::Exists,
            SkipPolicyArg::Mtime => SkipPolicy::Mtime,
        }
    }
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.paths.input_root = expand(input);
        }
        if let Some(output) = &self.output {
            config.paths.output_root = expand(output);
        }
        if let Some(max) = self.max_dimension {
            config.image.max_dimension = max;
        }
        if let Some(workers) = self.image_workers {
            config.scheduler.image_workers = workers;
        }
        if let Some(workers) = self.video_workers {
            config.scheduler.video_workers = workers;
        }
        if let Some(policy) = self.skip_policy {
            config.idempotency.skip_policy = policy.into();
        }
        if let Some(report) = &self.report {
            config.report.path = Some(expand(report));
        }
    }
}

/// Execute the run command.
///
/// Per-file failures are reported in the summary; only conditions that stop
/// the whole run (bad config, missing tools, unusable roots) return an error.
pub async fn execute(args: RunArgs, mut config: Config) -> anyhow::Result<()> {
    args.apply(&mut config);
    let mirror = MediaMirror::new(config)?;
    let config = mirror.config();

    let mut reporter = Reporter::default().with_sink(Box::new(TracingSink));
    if let Some(path) = config.report_path() {
        let sink = JsonlSink::create(&path)
            .map_err(|e| anyhow::anyhow!("Failed to create report {}: {}", path.display(), e))?;
        tracing::info!("Writing report to {:?}", path);
        reporter = reporter.with_sink(Box::new(sink));
    }

    let show_progress = !args.no_progress && console::Term::stderr().is_term();
    if show_progress {
        let root = config.input_root();
        let total = tokio::task::spawn_blocking(move || FileDiscovery::new(root).iter().count())
            .await
            .unwrap_or(0);
        reporter = reporter.with_sink(Box::new(ProgressSink::new(total as u64)));
    }

    let summary = mirror.run(Arc::new(reporter)).await?;
    print_summary(&summary);
    Ok(())
}

/// Advances a progress bar as files reach their outcome.
struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    fn new(total: u64) -> Self {
        Self {
            bar: create_progress_bar(total),
        }
    }
}

impl ReportSink for ProgressSink {
    fn record(&self, record: &FileRecord) {
        self.bar.set_message(record.relative_path.display().to_string());
        self.bar.inc(1);
    }

    fn finish(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after a run.
fn print_summary(summary: &RunSummary) {
    let mb_processed = summary.input_bytes as f64 / 1_000_000.0;
    let (rate, throughput) = if summary.total_seconds > 0.0 {
        (
            (summary.converted + summary.failed) as f64 / summary.total_seconds,
            mb_processed / summary.total_seconds,
        )
    } else {
        (0.0, 0.0)
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Converted:    {:>8}", summary.converted);
    if summary.with_warnings > 0 {
        eprintln!("      w/ warnings:{:>8}", summary.with_warnings);
    }
    eprintln!("    Up to date:   {:>8}", summary.skipped_already_processed);
    if summary.skipped_unsupported > 0 {
        eprintln!("    Unsupported:  {:>8}", summary.skipped_unsupported);
    }
    if summary.failed > 0 {
        eprintln!("    Failed:       {:>8}", summary.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", summary.total());
    eprintln!("    Duration:     {:>7.1}s", summary.total_seconds);
    eprintln!("    Rate:         {:>7.1} files/sec", rate);
    eprintln!("    Throughput:   {:>7.1} MB/sec", throughput);
    eprintln!("  ====================================");
}

fn expand(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
