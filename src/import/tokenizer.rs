//! Quote-aware splitting of a single CSV line.
//!
//! Lines are already separated by the caller, so a quoted field never spans
//! a line break here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Splits `line` on commas that sit outside double quotes.
///
/// Surrounding quotes are removed, `""` inside a quoted field becomes `"`,
/// and every field is trimmed. An unterminated quote swallows the rest of the
/// line.
pub fn split_quoted(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut state = State::FieldStart;

    for ch in line.chars() {
        state = match (state, ch) {
            (State::FieldStart, ',') => {
                fields.push(finish(&mut current));
                State::FieldStart
            }
            (State::FieldStart, '"') => State::Quoted,
            (State::FieldStart, c) if c.is_whitespace() => State::FieldStart,
            (State::FieldStart, c) => {
                current.push(c);
                State::Unquoted
            }

            (State::Unquoted, ',') => {
                fields.push(finish(&mut current));
                State::FieldStart
            }
            (State::Unquoted, c) => {
                current.push(c);
                State::Unquoted
            }

            (State::Quoted, '"') => State::QuoteInQuoted,
            (State::Quoted, c) => {
                current.push(c);
                State::Quoted
            }

            (State::QuoteInQuoted, '"') => {
                current.push('"');
                State::Quoted
            }
            (State::QuoteInQuoted, ',') => {
                fields.push(finish(&mut current));
                State::FieldStart
            }
            // Text after a closing quote stays part of the field.
            (State::QuoteInQuoted, c) => {
                current.push(c);
                State::Unquoted
            }
        };
    }
    fields.push(finish(&mut current));
    fields
}

/// Plain comma split with per-field trimming.
pub fn split_plain(line: &str) -> Vec<String> {
    line.split(',').map(|s| s.trim().to_string()).collect()
}

fn finish(current: &mut String) -> String {
    let field = current.trim().to_string();
    current.clear();
    field
}
