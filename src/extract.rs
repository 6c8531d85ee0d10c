//! Cancellable export of content to disk
//!
//! Export copies in fixed-size buffers and asks the caller whether to stop
//! before each read. A cancelled export leaves whatever was already written
//! in place; removing it is up to the caller.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::common::audit;
use crate::common::EXPORT_BUFFER_SIZE;
use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "bytes", rename_all = "snake_case")]
pub enum ExtractOutcome {
    Completed(u64),
    /// Stopped on request after this many bytes
    Cancelled(u64),
}

impl ExtractOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            ExtractOutcome::Completed(n) | ExtractOutcome::Cancelled(n) => *n,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractOutcome::Cancelled(_))
    }
}

/// Copy `reader` into `writer`, checking `is_cancelled` before every read
pub fn copy_with_cancel<R, W, C>(
    reader: &mut R,
    writer: &mut W,
    is_cancelled: C,
) -> CoreResult<ExtractOutcome>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    C: Fn() -> bool,
{
    let mut buffer = vec![0u8; EXPORT_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        if is_cancelled() {
            writer.flush()?;
            debug!(bytes = total, "Export cancelled");
            return Ok(ExtractOutcome::Cancelled(total));
        }
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }

    writer.flush()?;
    Ok(ExtractOutcome::Completed(total))
}

/// Export `reader` to a new file at `destination`. `source` names the
/// exported content in the audit log.
pub fn write_to_file<R, C>(
    reader: &mut R,
    source: &str,
    destination: &Path,
    is_cancelled: C,
) -> CoreResult<ExtractOutcome>
where
    R: Read + ?Sized,
    C: Fn() -> bool,
{
    let file = File::create(destination)?;
    let mut writer = BufWriter::new(file);
    let outcome = copy_with_cancel(reader, &mut writer, is_cancelled)?;

    audit::log_data_export(source, destination, outcome.bytes(), !outcome.is_cancelled());
    info!(
        source,
        destination = %destination.display(),
        bytes = outcome.bytes(),
        cancelled = outcome.is_cancelled(),
        "Content exported"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_copy_completes() {
        let data = payload(EXPORT_BUFFER_SIZE * 3 + 17);
        let mut out = Vec::new();
        let outcome = copy_with_cancel(&mut Cursor::new(&data), &mut out, || false).unwrap();
        assert_eq!(outcome, ExtractOutcome::Completed(data.len() as u64));
        assert_eq!(out, data);
    }

    #[test]
    fn test_cancel_checked_per_buffer() {
        let data = payload(EXPORT_BUFFER_SIZE * 4);
        let checks = Cell::new(0);
        let mut out = Vec::new();

        let outcome = copy_with_cancel(&mut Cursor::new(&data), &mut out, || {
            checks.set(checks.get() + 1);
            checks.get() > 2
        })
        .unwrap();

        assert_eq!(outcome, ExtractOutcome::Cancelled(2 * EXPORT_BUFFER_SIZE as u64));
        assert_eq!(out, data[..2 * EXPORT_BUFFER_SIZE]);
    }

    #[test]
    fn test_cancelled_file_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("export.bin");
        let data = payload(EXPORT_BUFFER_SIZE * 2 + 5);
        let checks = Cell::new(0);

        let outcome = write_to_file(&mut Cursor::new(&data), "obj 42", &dest, || {
            checks.set(checks.get() + 1);
            checks.get() > 1
        })
        .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(std::fs::read(&dest).unwrap().len(), EXPORT_BUFFER_SIZE);
    }

    #[test]
    fn test_write_to_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("notes.txt");
        let outcome = write_to_file(&mut Cursor::new(b"case notes"), "obj 7", &dest, || false).unwrap();
        assert_eq!(outcome.bytes(), 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"case notes");
    }

    #[test]
    fn test_missing_destination_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing").join("out.bin");
        let err = write_to_file(&mut Cursor::new(b"x"), "obj 1", &dest, || false).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Io(_)));
    }
}
