//! Line output consumer
//!
//! Writes each framed message as one line and flushes once per batch.
//! Line breaks kept inside quoted values are written as `\n` / `\r` so a
//! message never spans output lines. Diagnostics go to stderr, so stdout
//! carries only message data.

use std::io::{self, BufWriter, Stdout, Write};

use strand_pipeline::{BatchConsumer, ConsumerError, FramedMessage};

/// Batch consumer writing newline-terminated payloads
pub struct LineConsumer<W: Write> {
    out: W,
}

impl LineConsumer<BufWriter<Stdout>> {
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(io::stdout()))
    }
}

impl<W: Write> LineConsumer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write_batch(&mut self, batch: &[FramedMessage]) -> io::Result<()> {
        for message in batch {
            write_line(&mut self.out, &message.payload)?;
        }
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn write_line(out: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let mut rest = payload;
    while let Some(at) = rest.iter().position(|&b| b == b'\n' || b == b'\r') {
        out.write_all(&rest[..at])?;
        out.write_all(if rest[at] == b'\n' { b"\\n" } else { b"\\r" })?;
        rest = &rest[at + 1..];
    }
    out.write_all(rest)?;
    out.write_all(b"\n")
}

impl<W: Write> BatchConsumer for LineConsumer<W> {
    fn consume(&mut self, batch: Vec<FramedMessage>) -> Result<(), ConsumerError> {
        self.write_batch(&batch).map_err(|e| {
            tracing::debug!(error = %e, messages = batch.len(), "output write failed");
            ConsumerError::Closed(batch.len())
        })
    }
}
