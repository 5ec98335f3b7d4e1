use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use crate::api::SplitError;
use crate::pipeline::route::Partition;
use crate::progress::JobProgress;

/// Counts the bytes flowing into the destination, so the sink can report
/// compressed output size while the stream is still open.
struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming gzip sink for one partition, staged in a temp file until the
/// archive assembler consumes it. The temp file is deleted on drop, so a
/// failed or aborted job leaves nothing behind.
pub struct GzipFileSink {
    partition: Partition,
    encoder: GzEncoder<CountingWriter<NamedTempFile>>,
    progress: JobProgress,
    // Raw upload bytes consumed so far, shared with the splitter. The true
    // denominator (final compressed size) is unknown until finish().
    upload_bytes: Arc<AtomicU64>,
}

/// One partition's finished gzip stream, ready for the assembler.
pub struct CompressedPartition {
    pub partition: Partition,
    pub file: NamedTempFile,
    pub bytes_written: u64,
}

impl GzipFileSink {
    pub fn create(
        partition: Partition,
        progress: JobProgress,
        upload_bytes: Arc<AtomicU64>,
    ) -> Result<Self, SplitError> {
        let file = NamedTempFile::new()
            .map_err(|e| SplitError::Sink(format!("failed to stage partition file: {e}")))?;

        Ok(Self {
            partition,
            encoder: GzEncoder::new(CountingWriter::new(file), Compression::default()),
            progress,
            upload_bytes,
        })
    }

    /// Compressed bytes flushed to the staging file so far.
    pub fn bytes_written(&self) -> u64 {
        self.encoder.get_ref().bytes
    }

    /// Append one line, terminator restored, to the compressed stream.
    pub fn write_line(&mut self, line: &str) -> Result<(), SplitError> {
        self.encoder
            .write_all(line.as_bytes())
            .and_then(|()| self.encoder.write_all(b"\n"))
            .map_err(|e| SplitError::Sink(e.to_string()))?;

        let consumed = self.upload_bytes.load(Ordering::Relaxed);
        if consumed > 0 {
            let percent = self.bytes_written() as f64 / consumed as f64 * 100.0;
            self.progress.publish(self.partition.stage(), percent);
        }
        Ok(())
    }

    /// Flush whatever the compressor still buffers, close the stream and
    /// hand over the staging file. Forces this stage to 100.
    pub fn finish(self) -> Result<CompressedPartition, SplitError> {
        let GzipFileSink {
            partition,
            encoder,
            progress,
            ..
        } = self;

        let writer = encoder
            .finish()
            .map_err(|e| SplitError::Sink(e.to_string()))?;

        progress.complete(partition.stage());

        Ok(CompressedPartition {
            partition,
            file: writer.inner,
            bytes_written: writer.bytes,
        })
    }
}
