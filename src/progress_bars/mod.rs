use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::{fmt::Write, sync::Arc, time::Duration};

const PROGRESS_CHARS: &str = "━━";

pub struct BarTemplates {
    pub main: &'static str,
    pub download: &'static str,
}

impl Default for BarTemplates {
    fn default() -> Self {
        Self {
            main: "{spinner:.green.bold} {elapsed_precise:.bold} {pos:.green} files ({msg:.bold.blue} | {files_sec:.blue})",
            download: "{spinner:.green.bold} {bar:40.green/white.dim} {percent:.bold} | {byte_progress:.green} @ {bytes_per_sec:>13.red} (eta. {eta:.blue})",
        }
    }
}

/// Condenses the file counter and the per-download bars of one job.
///
/// Cloning the [`Arc`] is enough to share it with anything running downloads.
pub struct ProgressArcs {
    pub main: Arc<ProgressBar>,
    pub multi: Arc<MultiProgress>,
}

impl ProgressArcs {
    /// Bars drawn on stderr. `label` is shown next to the file counter.
    pub fn initialize(label: &str) -> Arc<Self> {
        Self::with_target(label, ProgressDrawTarget::stderr_with_hz(60))
    }

    /// Bars that are never drawn.
    pub fn hidden() -> Arc<Self> {
        Self::with_target("", ProgressDrawTarget::hidden())
    }

    fn with_target(label: &str, target: ProgressDrawTarget) -> Arc<Self> {
        let templates = BarTemplates::default();
        let multi = Arc::new(MultiProgress::with_draw_target(target));

        let bar = ProgressBar::new_spinner().with_style(master_progress_style(&templates));
        bar.set_message(label.to_string());
        let main = Arc::new(multi.add(bar));
        if !multi.is_hidden() {
            main.enable_steady_tick(Duration::from_millis(100));
        }

        Arc::new(Self { main, multi })
    }

    /// A bar tracking the bytes of one download of `size` bytes, `0` if unknown.
    pub fn add_download_bar(&self, size: u64) -> ProgressBar {
        let bar = ProgressBar::new(size).with_style(download_progress_style(&BarTemplates::default()));
        self.multi.add(bar)
    }

    /// Print a line above the bars.
    pub fn println(&self, line: &str) {
        if self.multi.is_hidden() {
            return;
        }
        if let Err(error) = self.multi.println(line) {
            log::debug!("Failed to print progress line: {}", error);
        }
    }
}

pub fn master_progress_style(templates: &BarTemplates) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(templates.main)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .with_key(
            "files_sec",
            |state: &ProgressState, w: &mut dyn Write| {
                let _ = match state.per_sec() {
                    files_sec if files_sec.abs() < f64::EPSILON => write!(w, "0 files/s"),
                    files_sec if files_sec < 1.0 => write!(w, "{:.2} s/file", 1.0 / files_sec),
                    files_sec => write!(w, "{:.2} files/s", files_sec),
                };
            },
        )
}

pub fn download_progress_style(templates: &BarTemplates) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(templates.download)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("percent", |state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:>3.0}%", state.fraction() * 100_f32);
        })
        .with_key(
            "byte_progress",
            |state: &ProgressState, w: &mut dyn Write| {
                let _ = match state.len() {
                    Some(len) if len > 0 => write!(w, "{}/{}", HumanBytes(state.pos()), HumanBytes(len)),
                    _ => write!(w, "{}", HumanBytes(state.pos())),
                };
            },
        )
        .progress_chars(PROGRESS_CHARS)
}
