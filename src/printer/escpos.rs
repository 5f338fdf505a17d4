//! ESC/POS byte encoding for thermal receipt printers

use super::{Justify, PrintJob, PrintOp};

const ESC: u8 = 0x1b;
const LF: u8 = b'\n';

/// Encode a print job into the byte stream sent over the serial link
pub fn encode(job: &PrintJob) -> Vec<u8> {
    let mut out = Vec::new();

    for op in job.ops() {
        match op {
            PrintOp::Reset => out.extend([ESC, b'@']),
            PrintOp::Justify(justify) => {
                let n = match justify {
                    Justify::Left => 0,
                    Justify::Center => 1,
                };
                out.extend([ESC, b'a', n]);
            }
            // The printer ignores spacings below 24 dots
            PrintOp::LineHeight(dots) => out.extend([ESC, b'3', (*dots).max(24)]),
            PrintOp::Line(text) => {
                out.extend(fold_to_ascii(text).bytes());
                out.push(LF);
            }
            PrintOp::Feed(0) => {}
            PrintOp::Feed(lines) => out.extend([ESC, b'd', *lines]),
        }
    }

    out
}

/// Map text onto the printer's ASCII code page.
///
/// Typographic punctuation is replaced by its plain counterpart; control
/// characters are dropped; anything else outside ASCII becomes `?`.
pub fn fold_to_ascii(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            ' '..='~' => folded.push(c),
            '\t' => folded.push(' '),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => folded.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => folded.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => folded.push('-'),
            '\u{2026}' => folded.push_str("..."),
            '\u{00A0}' => folded.push(' '),
            c if c.is_control() => {}
            _ => folded.push('?'),
        }
    }

    folded
}
