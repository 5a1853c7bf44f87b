use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Log,
    Error,
    Outcome,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Log => "LOG",
            RecordKind::Error => "ERROR",
            RecordKind::Outcome => "OUTCOME",
        }
    }
}

/// Append-only text log for one work item.
///
/// Only ever grows; closing consumes the handle so a log cannot be closed
/// twice or written after close.
#[derive(Debug)]
pub struct RunLog {
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Write `<prefix> <KIND>: <message>`.
    pub fn record(
        &mut self,
        prefix: &str,
        kind: RecordKind,
        message: impl fmt::Display,
    ) -> io::Result<()> {
        writeln!(self.writer, "{prefix} {}: {message}", kind.as_str())
    }

    pub fn line(&mut self, text: impl fmt::Display) -> io::Result<()> {
        writeln!(self.writer, "{text}")
    }

    /// Append captured tool output, dropping unprintable characters.
    pub fn append_sanitized(&mut self, text: &str) -> io::Result<()> {
        let clean = sanitize(text);
        if clean.is_empty() {
            return Ok(());
        }
        self.writer.write_all(clean.as_bytes())?;
        if !clean.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

/// Keep newlines and printable characters only.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|c| *c == '\n' || !c.is_control()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_drops_control_bytes() {
        assert_eq!(sanitize("ok\x07 line\r\n\tnext\n"), "ok line\nnext\n");
    }

    #[test]
    fn records_are_prefixed_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("root.log");
        let mut log = RunLog::create(&path).unwrap();
        log.record("GEN", RecordKind::Log, "Time limit 5 seconds").unwrap();
        log.append_sanitized("partial\x00 output").unwrap();
        log.record("GEN", RecordKind::Outcome, "normal").unwrap();
        log.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "GEN LOG: Time limit 5 seconds\npartial output\nGEN OUTCOME: normal\n"
        );
    }
}
