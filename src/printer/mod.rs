pub mod escpos;
pub mod serial;
pub mod sink;

pub use serial::SerialSink;
pub use sink::PrinterSink;

/// Printer default line height in dots
pub const DEFAULT_LINE_HEIGHT: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
}

/// A single formatting directive or payload for the printer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOp {
    Reset,
    Justify(Justify),
    LineHeight(u8),
    Line(String),
    Feed(u8),
}

/// An ordered batch of print operations, written to the printer as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintJob {
    ops: Vec<PrintOp>,
}

impl PrintJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(self) -> Self {
        self.push(PrintOp::Reset)
    }

    pub fn justify(self, justify: Justify) -> Self {
        self.push(PrintOp::Justify(justify))
    }

    pub fn line_height(self, dots: u8) -> Self {
        self.push(PrintOp::LineHeight(dots))
    }

    pub fn line(self, text: impl Into<String>) -> Self {
        self.push(PrintOp::Line(text.into()))
    }

    /// Add one line per line of `text`
    pub fn lines(self, text: &str) -> Self {
        text.lines().fold(self, |job, line| job.line(line))
    }

    pub fn feed(self, lines: u8) -> Self {
        self.push(PrintOp::Feed(lines))
    }

    pub fn append(mut self, other: PrintJob) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn ops(&self) -> &[PrintOp] {
        &self.ops
    }

    fn push(mut self, op: PrintOp) -> Self {
        self.ops.push(op);
        self
    }
}
