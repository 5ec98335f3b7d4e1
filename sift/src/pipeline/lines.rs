/// Reassembles logical lines from an ordered sequence of byte chunks.
///
/// Only the suffix of the previous chunk after its last `\n` is carried
/// between calls, so memory stays bounded by the longest line and a
/// terminator falling on a chunk boundary never corrupts a line. Non-UTF-8
/// bytes are replaced rather than failing the job.
#[derive(Debug, Default)]
pub struct LineSplitter {
    carry: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk, returning every line it completes, in input order
    /// and with the terminator stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        for (i, byte) in chunk.iter().enumerate() {
            if *byte == b'\n' {
                self.carry.extend_from_slice(&chunk[start..i]);
                lines.push(String::from_utf8_lossy(&self.carry).into_owned());
                self.carry.clear();
                start = i + 1;
            }
        }

        self.carry.extend_from_slice(&chunk[start..]);
        lines
    }

    /// Files need not end with a terminator: whatever is still carried at
    /// end-of-input is the final line.
    pub fn finish(self) -> Option<String> {
        if self.carry.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.carry).into_owned())
        }
    }
}
