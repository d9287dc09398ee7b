use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;

const BOM: &str = "\u{feff}";

/// Buffered line stream with look-ahead, so format checks can inspect lines
/// without losing them.
pub struct LineSource {
    reader: Box<dyn BufRead + Send>,
    peeked: VecDeque<String>,
    line_estimate: Option<usize>,
    at_start: bool,
}

impl LineSource {
    pub fn new(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            peeked: VecDeque::new(),
            line_estimate: None,
            at_start: true,
        }
    }

    /// Opens a file and pre-counts its lines for progress reporting.
    pub fn open(path: &Path) -> io::Result<Self> {
        let estimate = count_lines(File::open(path)?)?;
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)).with_estimate(estimate))
    }

    pub fn from_text(text: String) -> Self {
        let lines = text.lines().count();
        Self::new(Cursor::new(text.into_bytes())).with_estimate(lines)
    }

    pub fn with_estimate(mut self, lines: usize) -> Self {
        self.line_estimate = Some(lines);
        self
    }

    pub fn estimated_lines(&self) -> Option<usize> {
        self.line_estimate
    }

    /// Returns the next line without consuming it.
    pub fn peek_line(&mut self) -> io::Result<Option<&str>> {
        self.fill(1)?;
        Ok(self.peeked.front().map(String::as_str))
    }

    /// Returns up to `n` upcoming lines without consuming them.
    pub fn peek_lines(&mut self, n: usize) -> io::Result<Vec<&str>> {
        self.fill(n)?;
        Ok(self.peeked.iter().take(n).map(String::as_str).collect())
    }

    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.peeked.pop_front() {
            return Ok(Some(line));
        }
        self.read_line()
    }

    fn fill(&mut self, n: usize) -> io::Result<()> {
        while self.peeked.len() < n {
            match self.read_line()? {
                Some(line) => self.peeked.push_back(line),
                None => break,
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        let mut line = match String::from_utf8(buf) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        if self.at_start {
            self.at_start = false;
            if let Some(rest) = line.strip_prefix(BOM) {
                line = rest.to_string();
            }
        }
        Ok(Some(line))
    }
}

fn count_lines(mut file: File) -> io::Result<usize> {
    let mut buf = [0u8; 64 * 1024];
    let mut lines = 0usize;
    let mut last = None;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        lines += buf[..n].iter().filter(|b| **b == b'\n').count();
        last = Some(buf[n - 1]);
    }
    if matches!(last, Some(b) if b != b'\n') {
        lines += 1;
    }
    Ok(lines)
}
