//! Single-line terminal status display.

use std::io::{self, Stdout, Write};

/// Prints each status over the previous one on the same terminal line.
pub struct StatusLine<W: Write> {
    out: W,
    last_len: usize,
}

impl StatusLine<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W) -> Self {
        Self { out, last_len: 0 }
    }

    /// Blank out the previous message, then print `msg` and return the cursor
    /// to the start of the line.
    pub fn print(&mut self, msg: &str) -> io::Result<()> {
        write!(self.out, "{:width$}\r", "", width = self.last_len)?;
        write!(self.out, "{}\r", msg)?;
        self.out.flush()?;
        self.last_len = msg.chars().count();
        Ok(())
    }

    /// Move past the status line so later output starts on a fresh line.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.last_len > 0 {
            writeln!(self.out)?;
            self.out.flush()?;
            self.last_len = 0;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrites_previous_message() {
        let mut line = StatusLine::new(Vec::new());
        line.print("Mic off").unwrap();
        line.print("Mic on").unwrap();

        let out = String::from_utf8(line.into_inner()).unwrap();
        assert_eq!(out, "\rMic off\r       \rMic on\r");
    }

    #[test]
    fn test_finish_ends_line_once() {
        let mut line = StatusLine::new(Vec::new());
        line.finish().unwrap();
        line.print("Mic on").unwrap();
        line.finish().unwrap();
        line.finish().unwrap();

        let out = String::from_utf8(line.into_inner()).unwrap();
        assert_eq!(out, "\rMic on\r\n");
    }
}
