//! The streaming pipeline: upload chunks are reassembled into lines, each
//! line is routed to one of the two partition compressors, and the finished
//! gzip streams are bundled into the response archive. One job moves through
//! `Receiving -> Splitting -> Routing+Compressing -> Archiving -> Done`,
//! falling straight to `Failed` on the first error.

pub mod lines;
pub mod route;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::api::SplitError;
use crate::archive;
use crate::pipeline::lines::LineSplitter;
use crate::pipeline::route::{HeaderRow, Partition, RowRouter};
use crate::progress::{JobProgress, Stage};
use crate::sinks::{CompressedPartition, GzipFileSink};

/// Bookkeeping for one upload, from payload receipt to archive flush.
pub struct UploadJob {
    pub id: Uuid,
    total_bytes: u64,
    estimated_lines: u64,
    lines_parsed: u64,
    consumed: Arc<AtomicU64>,
    progress: JobProgress,
    line_buffer: usize,
}

impl UploadJob {
    /// `total_bytes` is the declared payload length; the exact line count is
    /// unknown until parsing completes, so the `parsing` denominator is
    /// estimated from it and corrected by forcing 100 at the end.
    pub fn new(
        total_bytes: u64,
        estimated_line_bytes: u64,
        line_buffer: usize,
        progress: JobProgress,
    ) -> Self {
        let estimated_lines = (total_bytes / estimated_line_bytes.max(1)).max(1);
        Self {
            id: Uuid::now_v7(),
            total_bytes,
            estimated_lines,
            lines_parsed: 0,
            consumed: Arc::new(AtomicU64::new(0)),
            progress,
            line_buffer,
        }
    }

    /// Upload progress reflects raw transport bytes, advanced per chunk, not
    /// per parsed line.
    fn consume_chunk(&self, len: usize) {
        let consumed = self.consumed.fetch_add(len as u64, Ordering::Relaxed) + len as u64;
        if self.total_bytes > 0 {
            let percent = consumed as f64 / self.total_bytes as f64 * 100.0;
            self.progress.publish(Stage::Upload, percent);
        }
    }

    fn line_parsed(&mut self) {
        self.lines_parsed += 1;
        let percent = self.lines_parsed as f64 / self.estimated_lines as f64 * 100.0;
        self.progress.publish(Stage::Parsing, percent);
    }
}

/// Drive one upload through the whole pipeline, returning the assembled
/// archive rewound to its start.
///
/// Every error path drops the fan-out, which closes both line channels and
/// aborts the compressor tasks; their staging files are deleted on drop. The
/// same holds when the caller's future is dropped mid-flight, so a severed
/// connection leaves no detached work or partial files behind.
pub async fn run<S>(chunks: S, mut job: UploadJob) -> Result<std::fs::File, SplitError>
where
    S: Stream<Item = Result<Bytes, SplitError>>,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut splitter = LineSplitter::new();
    let mut fanout: Option<Fanout> = None;

    tracing::debug!(job = %job.id, total_bytes = job.total_bytes, "splitting upload");

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        job.consume_chunk(chunk.len());
        for line in splitter.push(&chunk) {
            dispatch(&mut fanout, &mut job, line).await?;
        }
    }
    if let Some(line) = splitter.finish() {
        dispatch(&mut fanout, &mut job, line).await?;
    }

    // No lines at all means no header was ever observed.
    let fanout = fanout.ok_or(SplitError::EmptyUpload)?;

    job.progress.complete(Stage::Upload);
    job.progress.complete(Stage::Parsing);

    tracing::debug!(
        job = %job.id,
        lines = job.lines_parsed,
        "routing complete, draining compressors"
    );
    let partitions = fanout.finish().await?;

    let archive = tokio::task::spawn_blocking(move || archive::assemble(partitions))
        .await
        .map_err(|e| SplitError::Assembly(e.to_string()))??;

    tracing::info!(job = %job.id, lines = job.lines_parsed, "upload processed");
    Ok(archive)
}

/// Route one logical line. The first line is the header: the designated
/// column is resolved before any partition sink is opened, then both sinks
/// are opened and seeded with it.
async fn dispatch(
    fanout: &mut Option<Fanout>,
    job: &mut UploadJob,
    line: String,
) -> Result<(), SplitError> {
    job.line_parsed();
    match fanout {
        None => {
            let router = RowRouter::new(HeaderRow::parse(line))?;
            *fanout = Some(Fanout::open(router, job).await?);
        }
        Some(fanout) => fanout.route(line).await?,
    }
    Ok(())
}

/// The dual-sink fan-out: one bounded line channel and one compressor task
/// per partition. Tasks live in a `JoinSet`, so dropping the fan-out aborts
/// whatever is still running.
struct Fanout {
    router: RowRouter,
    male: mpsc::Sender<String>,
    female: mpsc::Sender<String>,
    tasks: JoinSet<Result<CompressedPartition, SplitError>>,
}

impl Fanout {
    async fn open(router: RowRouter, job: &UploadJob) -> Result<Self, SplitError> {
        let mut tasks = JoinSet::new();
        let male = Self::open_partition(Partition::Male, job, &mut tasks)?;
        let female = Self::open_partition(Partition::Female, job, &mut tasks)?;
        let fanout = Self {
            router,
            male,
            female,
            tasks,
        };

        // The header is always the first line each partition sees.
        let header = fanout.router.header_line().to_owned();
        fanout.send(Partition::Male, header.clone()).await?;
        fanout.send(Partition::Female, header).await?;
        Ok(fanout)
    }

    fn open_partition(
        partition: Partition,
        job: &UploadJob,
        tasks: &mut JoinSet<Result<CompressedPartition, SplitError>>,
    ) -> Result<mpsc::Sender<String>, SplitError> {
        let (tx, mut rx) = mpsc::channel::<String>(job.line_buffer);
        let mut sink = GzipFileSink::create(partition, job.progress.clone(), job.consumed.clone())?;

        tasks.spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = sink.write_line(&line) {
                    tracing::error!(partition = partition.label(), "partition write failed: {e}");
                    return Err(e);
                }
            }
            // Channel closed: explicit end-of-input for this partition.
            sink.finish()
        });

        Ok(tx)
    }

    async fn route(&self, line: String) -> Result<(), SplitError> {
        if let Some(partition) = self.router.classify(&line) {
            self.send(partition, line).await?;
        }
        Ok(())
    }

    /// Forwarding suspends on the bounded channel under back-pressure; lines
    /// are never dropped or reordered.
    async fn send(&self, partition: Partition, line: String) -> Result<(), SplitError> {
        let tx = match partition {
            Partition::Male => &self.male,
            Partition::Female => &self.female,
        };
        tx.send(line).await.map_err(|_| {
            SplitError::Sink(format!("{} compressor stopped early", partition.label()))
        })
    }

    /// Close both channels and wait for the compressors. Outputs come back
    /// in archive entry order regardless of which task finished first.
    async fn finish(self) -> Result<Vec<CompressedPartition>, SplitError> {
        let Fanout {
            male,
            female,
            mut tasks,
            router: _,
        } = self;
        drop(male);
        drop(female);

        let mut outputs = Vec::with_capacity(Partition::ALL.len());
        while let Some(joined) = tasks.join_next().await {
            let output = joined.map_err(|e| SplitError::Sink(e.to_string()))??;
            outputs.push(output);
        }
        outputs.sort_by_key(|p| p.partition.index());
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressBus;

    fn job(total_bytes: u64) -> UploadJob {
        UploadJob::new(total_bytes, 64, 8, JobProgress::new(ProgressBus::new(64)))
    }

    #[test]
    fn line_estimate_never_hits_zero() {
        assert_eq!(job(0).estimated_lines, 1);
        assert_eq!(job(10).estimated_lines, 1);
        assert_eq!(job(6400).estimated_lines, 100);
    }

    #[test]
    fn consumed_bytes_accumulate_across_chunks() {
        let job = job(100);
        job.consume_chunk(30);
        job.consume_chunk(20);
        assert_eq!(job.consumed.load(Ordering::Relaxed), 50);
    }
}
