use anyhow::Result;

/// Byte-level transport to the printer
///
/// Implementations are append-only: bytes go out, nothing is read back.
/// They are driven from the printer service's own thread, so blocking
/// writes are fine.
pub trait PrinterSink: Send {
    /// Write one encoded job
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Push any buffered bytes to the device
    fn flush(&mut self) -> Result<()>;
}
