use super::parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, is_name_byte,
};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backticked,
    Bracketed,
    LineComment,
    BlockComment,
}

impl State {
    /// The literal or comment that opens at `idx`, with the index of the last
    /// byte of its opening delimiter.
    pub(super) fn opening(bytes: &[u8], idx: usize) -> Option<(State, usize)> {
        let state = match bytes.get(idx)? {
            b'\'' => State::SingleQuoted,
            b'"' => State::DoubleQuoted,
            b'`' => State::Backticked,
            b'[' => State::Bracketed,
            _ if is_line_comment_start(bytes, idx) => return Some((State::LineComment, idx + 1)),
            _ if is_block_comment_start(bytes, idx) => {
                return Some((State::BlockComment, idx + 1));
            }
            _ => return None,
        };
        Some((state, idx))
    }

    /// Consume the byte at `idx` inside a literal or comment. Returns the
    /// state after it and the index of the last byte consumed.
    pub(super) fn step(self, bytes: &[u8], idx: usize) -> (State, usize) {
        let b = bytes[idx];
        match self {
            State::Normal => (self, idx),
            State::SingleQuoted | State::DoubleQuoted => {
                let quote = if self == State::SingleQuoted { b'\'' } else { b'"' };
                if b != quote {
                    (self, idx)
                } else if bytes.get(idx + 1) == Some(&quote) {
                    (self, idx + 1) // escaped quote
                } else {
                    (State::Normal, idx)
                }
            }
            State::Backticked if b == b'`' => (State::Normal, idx),
            State::Bracketed if b == b']' => (State::Normal, idx),
            State::LineComment if b == b'\n' => (State::Normal, idx),
            State::BlockComment if is_block_comment_end(bytes, idx) => (State::Normal, idx + 1),
            State::Backticked | State::Bracketed | State::LineComment | State::BlockComment => {
                (self, idx)
            }
        }
    }
}

pub(super) fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|digits| (idx, digits))
    }
}

/// End of a parameter name starting at `start`, tokenized the way `SQLite`
/// does: `::` joins name segments and a `(...)` suffix after the name belongs
/// to it, so `$a::b` and `$a(x)` are single parameters.
///
/// `None` if there is no name, or a `(` suffix is not closed before
/// whitespace (`SQLite` rejects that token).
pub(super) fn scan_name(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start;
    let mut name_len = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        if is_name_byte(b) {
            name_len += 1;
        } else if b == b'(' && name_len > 0 {
            let close = bytes[idx..]
                .iter()
                .position(|c| *c == b')' || c.is_ascii_whitespace())?;
            if bytes[idx + close] != b')' {
                return None;
            }
            return Some(idx + close + 1);
        } else if b == b':' && bytes.get(idx + 1) == Some(&b':') {
            idx += 1;
        } else {
            break;
        }
        idx += 1;
    }
    (name_len > 0).then_some(idx)
}

/// End of an identifier or keyword starting at `start`; `$` is allowed after
/// the first byte, as in `SQLite` identifiers.
pub(super) fn skip_identifier(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() {
        let b = bytes[idx];
        if !(is_name_byte(b) || (idx > start && b == b'$')) {
            break;
        }
        idx += 1;
    }
    idx
}
