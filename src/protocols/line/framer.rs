//! Line framer.
//!
//! Turns the raw byte stream of one connection into command lines. Either
//! `\r` or `\n` ends a line on its own, so `\r\n` yields a line followed by an
//! empty line. Bytes outside the printable ASCII range are dropped.

/// What a single input byte turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-printable byte, discarded.
    Dropped,
    /// Printable byte, appended to the line and to be echoed back.
    Echo(u8),
    /// Terminator seen; carries the completed line (possibly empty).
    Line(String),
}

/// Per-connection line accumulator.
#[derive(Debug, Default)]
pub struct LineFramer {
    line: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. A completed line resets the buffer.
    pub fn push(&mut self, byte: u8) -> Frame {
        match byte {
            b'\r' | b'\n' => Frame::Line(std::mem::take(&mut self.line)),
            b if is_printable(b) => {
                self.line.push(char::from(b));
                Frame::Echo(b)
            }
            _ => Frame::Dropped,
        }
    }

    /// Characters accumulated since the last terminator.
    pub fn pending(&self) -> &str {
        &self.line
    }
}

fn is_printable(byte: u8) -> bool {
    byte == b' ' || byte.is_ascii_graphic()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[u8]) -> Vec<String> {
        let mut framer = LineFramer::new();
        input
            .iter()
            .filter_map(|&b| match framer.push(b) {
                Frame::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_carriage_return_terminates() {
        assert_eq!(lines(b"DIR\r"), vec!["DIR"]);
    }

    #[test]
    fn test_lone_newline_terminates() {
        assert_eq!(lines(b"DIR\n\n"), vec!["DIR", ""]);
    }

    #[test]
    fn test_crlf_is_two_terminators() {
        assert_eq!(lines(b"DIR\r\n"), vec!["DIR", ""]);
    }

    #[test]
    fn test_non_printable_dropped() {
        assert_eq!(lines(b"D\x07IR\n"), vec!["DIR"]);

        let mut framer = LineFramer::new();
        assert_eq!(framer.push(0x07), Frame::Dropped);
        assert_eq!(framer.push(0x7f), Frame::Dropped);
        assert_eq!(framer.push(0xc3), Frame::Dropped);
        assert_eq!(framer.push(b'\t'), Frame::Dropped);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_echo_and_reset() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b'e'), Frame::Echo(b'e'));
        assert_eq!(framer.push(b' '), Frame::Echo(b' '));
        assert_eq!(framer.push(b'x'), Frame::Echo(b'x'));
        assert_eq!(framer.pending(), "e x");

        assert_eq!(framer.push(b'\r'), Frame::Line("e x".to_string()));
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_partial_line_kept_across_chunks() {
        let mut framer = LineFramer::new();
        for &b in b"DI" {
            framer.push(b);
        }
        assert_eq!(framer.pending(), "DI");
        framer.push(b'R');
        assert_eq!(framer.push(b'\n'), Frame::Line("DIR".to_string()));
    }
}
