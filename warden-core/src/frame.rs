//! Inbound frame classification
//!
//! Client frames are raw terminal input, except for the reserved resize
//! directive `resize:<cols>,<rows>`. The directive is only recognized at the
//! very start of a frame. One line terminator directly after it belongs to the
//! directive; any bytes after that are ordinary input.

const RESIZE_PREFIX: &[u8] = b"resize:";

/// A classified client frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Geometry change, plus any input that followed the directive
    Resize {
        cols: u16,
        rows: u16,
        remainder: &'a [u8],
    },
    /// Bytes for the terminal, verbatim
    Input(&'a [u8]),
}

/// Classify one inbound frame
pub fn classify(frame: &[u8]) -> Frame<'_> {
    match parse_resize(frame) {
        Some((cols, rows, consumed)) => Frame::Resize {
            cols,
            rows,
            remainder: &frame[consumed..],
        },
        None => Frame::Input(frame),
    }
}

/// Returns (cols, rows, bytes consumed)
fn parse_resize(frame: &[u8]) -> Option<(u16, u16, usize)> {
    let rest = frame.strip_prefix(RESIZE_PREFIX)?;
    let (cols, cols_len) = parse_dimension(rest)?;
    let rest = rest[cols_len..].strip_prefix(b",")?;
    let (rows, rows_len) = parse_dimension(rest)?;

    let mut consumed = RESIZE_PREFIX.len() + cols_len + 1 + rows_len;
    let tail = &frame[consumed..];
    if tail.starts_with(b"\r\n") {
        consumed += 2;
    } else if tail.starts_with(b"\n") {
        consumed += 1;
    }
    Some((cols, rows, consumed))
}

/// Leading decimal digits as a non-zero u16
fn parse_dimension(bytes: &[u8]) -> Option<(u16, usize)> {
    let len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    // Only ASCII digits, so this is valid UTF-8
    let text = std::str::from_utf8(&bytes[..len]).ok()?;
    let value: u16 = text.parse().ok()?;
    (value > 0).then_some((value, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_directive_is_a_resize() {
        assert_eq!(
            classify(b"resize:80,24"),
            Frame::Resize {
                cols: 80,
                rows: 24,
                remainder: b""
            }
        );
    }

    #[test]
    fn trailing_newline_belongs_to_directive() {
        assert_eq!(
            classify(b"resize:120,40\n"),
            Frame::Resize {
                cols: 120,
                rows: 40,
                remainder: b""
            }
        );
        assert_eq!(
            classify(b"resize:120,40\r\n"),
            Frame::Resize {
                cols: 120,
                rows: 40,
                remainder: b""
            }
        );
    }

    #[test]
    fn input_after_directive_is_forwarded() {
        assert_eq!(
            classify(b"resize:80,24\nls\n"),
            Frame::Resize {
                cols: 80,
                rows: 24,
                remainder: b"ls\n"
            }
        );
    }

    #[test]
    fn only_one_line_terminator_is_consumed() {
        assert_eq!(
            classify(b"resize:80,24\n\n"),
            Frame::Resize {
                cols: 80,
                rows: 24,
                remainder: b"\n"
            }
        );
    }

    #[test]
    fn plain_input_is_forwarded_verbatim() {
        assert_eq!(classify(b"ls -la\n"), Frame::Input(b"ls -la\n"));
        assert_eq!(classify(b""), Frame::Input(b""));
        assert_eq!(classify(b"\x1b[A"), Frame::Input(b"\x1b[A"));
    }

    #[test]
    fn directive_must_start_the_frame() {
        assert_eq!(
            classify(b"echo resize:80,24\n"),
            Frame::Input(b"echo resize:80,24\n")
        );
        assert_eq!(classify(b" resize:80,24"), Frame::Input(b" resize:80,24"));
    }

    #[test]
    fn malformed_directives_are_plain_input() {
        for frame in [
            &b"resize:"[..],
            b"resize:80",
            b"resize:80,",
            b"resize:,24",
            b"resize:abc,24",
            b"resize:80;24",
            b"RESIZE:80,24",
        ] {
            assert_eq!(classify(frame), Frame::Input(frame), "{:?}", frame);
        }
    }

    #[test]
    fn out_of_range_dimensions_are_plain_input() {
        assert_eq!(classify(b"resize:0,24"), Frame::Input(b"resize:0,24"));
        assert_eq!(classify(b"resize:80,0"), Frame::Input(b"resize:80,0"));
        assert_eq!(
            classify(b"resize:70000,24"),
            Frame::Input(b"resize:70000,24")
        );
    }

    #[test]
    fn max_dimensions_are_accepted() {
        assert_eq!(
            classify(b"resize:65535,65535"),
            Frame::Resize {
                cols: 65535,
                rows: 65535,
                remainder: b""
            }
        );
    }
}
