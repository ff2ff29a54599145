//! Line producer/consumer traits (spec §5, §6): large buffered sequential
//! I/O, so the pipeline never has to hold a whole program in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::GCodeCleanError;

/// A lazily-produced sequence of raw text lines.
pub trait LineSource {
    fn lines(self: Box<Self>) -> Box<dyn Iterator<Item = String>>;
}

/// A sink that accepts one rendered line at a time.
pub trait LineSink {
    fn write_line(&mut self, line: &str) -> Result<(), GCodeCleanError>;
    fn flush(&mut self) -> Result<(), GCodeCleanError>;
}

/// A [`LineSource`] backed by a buffered file reader.
pub struct FileLineSource {
    reader: BufReader<File>,
}

impl FileLineSource {
    pub fn open(path: &Path) -> Result<FileLineSource, GCodeCleanError> {
        let file = File::open(path)
            .map_err(|_| GCodeCleanError::InputNotFound(path.display().to_string()))?;
        Ok(FileLineSource {
            reader: BufReader::new(file),
        })
    }
}

impl LineSource for FileLineSource {
    fn lines(self: Box<Self>) -> Box<dyn Iterator<Item = String>> {
        Box::new(self.reader.lines().map_while(Result::ok))
    }
}

/// A [`LineSource`] over an in-memory string, for tests and small inputs.
pub struct StringLineSource {
    text: String,
}

impl StringLineSource {
    pub fn new(text: impl Into<String>) -> StringLineSource {
        StringLineSource { text: text.into() }
    }
}

impl LineSource for StringLineSource {
    fn lines(self: Box<Self>) -> Box<dyn Iterator<Item = String>> {
        Box::new(self.text.lines().map(str::to_string).collect::<Vec<_>>().into_iter())
    }
}

/// A [`LineSink`] backed by a buffered file writer.
pub struct FileLineWriter {
    writer: BufWriter<File>,
}

impl FileLineWriter {
    pub fn create(path: &Path) -> Result<FileLineWriter, GCodeCleanError> {
        let file = File::create(path).map_err(GCodeCleanError::from)?;
        Ok(FileLineWriter {
            writer: BufWriter::new(file),
        })
    }
}

impl LineSink for FileLineWriter {
    fn write_line(&mut self, line: &str) -> Result<(), GCodeCleanError> {
        writeln!(self.writer, "{line}").map_err(GCodeCleanError::from)
    }

    fn flush(&mut self) -> Result<(), GCodeCleanError> {
        self.writer.flush().map_err(GCodeCleanError::from)
    }
}

/// A [`LineSink`] that accumulates into memory, for tests.
#[derive(Debug, Default)]
pub struct VecLineSink {
    pub lines: Vec<String>,
}

impl LineSink for VecLineSink {
    fn write_line(&mut self, line: &str) -> Result<(), GCodeCleanError> {
        self.lines.push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), GCodeCleanError> {
        Ok(())
    }
}
