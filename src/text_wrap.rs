/// Prefix for every wrapped continuation line.
pub const INDENT: &str = "   ";

/// Wrap text to a fixed column width for the receipt printer.
///
/// Each source line is packed greedily with whitespace-delimited words.
/// The first output line of a source line is flush left; the rest are
/// prefixed with [`INDENT`] and packed against `width - INDENT.len()`, so
/// the printed width never exceeds `width`. A word longer than the
/// available width is emitted alone on its own line, unsplit.
///
/// Blank source lines survive as blank output lines. Every output line
/// ends with exactly one `\n`; empty input yields empty output.
pub fn wrap(text: &str, width: usize) -> String {
    let indent_len = INDENT.chars().count();
    let mut wrapped = String::new();

    for line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        let mut first = true;

        for word in line.split_whitespace() {
            let word_len = word.chars().count();
            let limit = if first {
                width
            } else {
                width.saturating_sub(indent_len)
            };

            // +1 for the separating space
            let fits = current.is_empty() || current_len + 1 + word_len <= limit;
            if !fits {
                push_line(&mut wrapped, &current, first);
                first = false;
                current.clear();
                current_len = 0;
            }

            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }

        push_line(&mut wrapped, &current, first);
    }

    wrapped
}

fn push_line(out: &mut String, line: &str, first: bool) {
    if !first {
        out.push_str(INDENT);
    }
    out.push_str(line);
    out.push('\n');
}
