use std::fs::File;
use std::io::{self, Seek, SeekFrom};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::SplitError;
use crate::sinks::CompressedPartition;

/// Filename presented in the Content-Disposition of a successful response.
pub const ARCHIVE_FILENAME: &str = "processed-files.zip";

/// Serialize the finished partition streams as named entries of a single
/// zip, staged in an anonymous temp file rewound for streaming. Entries are
/// written sequentially even though the partitions were produced
/// concurrently. The payloads are already gzip streams, so they are stored
/// rather than deflated a second time.
///
/// Each partition's staging file is dropped, and therefore deleted, as soon
/// as its bytes have been consumed; on failure the remaining ones are
/// dropped with the error.
pub fn assemble(partitions: Vec<CompressedPartition>) -> Result<File, SplitError> {
    let staging = tempfile::tempfile().map_err(|e| SplitError::Assembly(e.to_string()))?;
    let mut zip = ZipWriter::new(staging);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in partitions {
        zip.start_file(entry.partition.entry_name(), options)?;
        let mut source = entry
            .file
            .reopen()
            .map_err(|e| SplitError::Assembly(e.to_string()))?;
        io::copy(&mut source, &mut zip).map_err(|e| SplitError::Assembly(e.to_string()))?;
    }

    let mut archive = zip.finish()?;
    archive
        .seek(SeekFrom::Start(0))
        .map_err(|e| SplitError::Assembly(e.to_string()))?;
    Ok(archive)
}
