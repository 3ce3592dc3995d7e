use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::report::MetricsSink;
use crate::{Outcome, Summary};

#[derive(Debug, Serialize)]
struct OutcomeLine {
    timestamp: String,
    virtual_user: usize,
    success: bool,
    elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed_checks: Vec<String>,
}

impl From<&Outcome> for OutcomeLine {
    fn from(outcome: &Outcome) -> Self {
        Self {
            timestamp: DateTime::<Utc>::from(outcome.timestamp())
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            virtual_user: outcome.virtual_user(),
            success: outcome.is_success(),
            elapsed_ms: outcome.elapsed().as_micros() as f64 / 1000.0,
            detail: outcome.detail().map(ToString::to_string),
            failed_checks: outcome
                .failed_checks()
                .map(|c| c.name().to_string())
                .collect(),
        }
    }
}

/// Write every outcome to disk as a JSON line.
///
/// Writing happens on a background task so that virtual users never wait on the disk. The file is
/// named `<scenario>-<unix seconds>.jsonl` inside the configured directory.
pub struct OutcomeFileReporter {
    path: PathBuf,
    writer: Option<UnboundedSender<OutcomeLine>>,
    join_handle: JoinHandle<()>,
    flush_complete: Arc<AtomicBool>,
}

impl OutcomeFileReporter {
    pub fn new(runtime: &Handle, dir: PathBuf, scenario_name: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create outcome directory {}", dir.display()))?;

        let path = dir.join(format!(
            "{}-{}.jsonl",
            scenario_name,
            SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs()
        ));
        let file = std::fs::File::options()
            .create_new(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to create outcome file {}", path.display()))?;

        let flush_complete = Arc::new(AtomicBool::new(false));
        let (writer, receiver) = tokio::sync::mpsc::unbounded_channel();

        // The std file is converted inside the task so that it is registered with the runtime.
        let task_flush_complete = flush_complete.clone();
        let join_handle = runtime.spawn(async move {
            let file = tokio::fs::File::from_std(file);
            write_outcomes(BufWriter::new(file), receiver).await;
            task_flush_complete.store(true, Ordering::Relaxed);
        });

        Ok(Self {
            path,
            writer: Some(writer),
            join_handle,
            flush_complete,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for OutcomeFileReporter {
    fn add_outcome(&mut self, outcome: &Outcome) {
        let Some(writer) = &self.writer else {
            log::info!("Outcome reported after the outcome file was closed");
            return;
        };

        if let Err(e) = writer.send(OutcomeLine::from(outcome)) {
            log::warn!("Failed to record outcome: {}", e);
        }
    }

    fn finalize(&mut self, _summary: &Summary) {
        // Closing the channel lets the write task drain and exit.
        self.writer.take();

        let wait_started = Instant::now();
        let mut notify_timer = Instant::now();
        while !self.flush_complete.load(Ordering::Relaxed) {
            if notify_timer.elapsed().as_secs() > 10 {
                log::warn!(
                    "Still waiting for outcomes to flush after {} seconds.",
                    wait_started.elapsed().as_secs()
                );
                notify_timer = Instant::now();
            }

            // If the write task has exited then there's no point trying to wait for it to finish
            // any longer.
            if self.join_handle.is_finished() {
                break;
            }

            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        log::debug!(
            "Outcomes flushed to {} after {} ms",
            self.path.display(),
            wait_started.elapsed().as_millis()
        );
    }
}

async fn write_outcomes<W>(mut writer: W, mut receiver: UnboundedReceiver<OutcomeLine>)
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0usize;
    while let Some(line) = receiver.recv().await {
        if let Err(e) = write_line(&mut writer, &line).await {
            log::warn!("Failed to write outcome: {e:?}");
            continue;
        }

        written += 1;
        if written % 10_000 == 0 {
            log::trace!("Written {} outcomes", written);
        }
    }

    // Ensure everything that's buffered has been written to disk.
    if let Err(e) = writer.flush().await {
        log::warn!("Failed to flush outcome file: {e:?}");
    }

    log::debug!("Outcome writer finished after {} outcomes", written);
}

#[inline]
async fn write_line<W>(writer: &mut W, line: &OutcomeLine) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(line)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;

    Ok(())
}
