//! Piped input cannot be re-read, but the carve resolver needs random
//! access. The stream is copied to an anonymous temporary file first.

use crate::reader::DiskReader;
use std::io::{self, BufWriter, Read, Write};
use tracing::info;

/// Copies `input` to an unnamed temporary file and opens it for reading.
/// The file is removed by the OS once the reader is dropped.
pub fn spool<R: Read>(mut input: R) -> io::Result<DiskReader> {
    let file = tempfile::tempfile()?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    let copied = io::copy(&mut input, &mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;

    info!(bytes = copied, "spooled piped input");
    DiskReader::from_file(file)
}
