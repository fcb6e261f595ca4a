//! Plaintext and gzip-compressed file input and output.
//!
//! Recombination maps are commonly distributed gzip-compressed, so
//! [`InputFile`] sniffs the gzip magic bytes rather than trusting the file
//! extension. [`OutputFile`] compresses when the output path ends in `.gz`.
//!
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error on '{path}': {source}")]
    IOError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    fn io(path: &Path, source: io::Error) -> Self {
        FileError::IOError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Check if a file is gzipped by looking for the magic numbers.
///
/// Files shorter than the magic number are plaintext.
fn is_gzipped_file(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::with_capacity(GZIP_MAGIC.len());
    Read::by_ref(&mut file)
        .take(GZIP_MAGIC.len() as u64)
        .read_to_end(&mut buffer)?;
    Ok(buffer == GZIP_MAGIC)
}

/// A possibly gzip-compressed input file.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub filepath: PathBuf,
}

impl InputFile {
    pub fn new(filepath: impl AsRef<Path>) -> Self {
        Self {
            filepath: filepath.as_ref().to_path_buf(),
        }
    }

    /// Opens the file and returns a buffered reader, decompressing on the fly
    /// if the file starts with the gzip magic number.
    pub fn reader(&self) -> Result<BufReader<Box<dyn Read>>, FileError> {
        let path = self.filepath.as_path();
        let file = File::open(path).map_err(|e| FileError::io(path, e))?;
        let is_gzipped = is_gzipped_file(path).map_err(|e| FileError::io(path, e))?;
        debug!("opening {} (gzip: {})", path.display(), is_gzipped);
        let reader: Box<dyn Read> = if is_gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::new(reader))
    }

    /// Returns the first line that is neither blank nor a `#` comment,
    /// or `None` if there is no such line.
    pub fn first_data_line(&self) -> Result<Option<String>, FileError> {
        let path = self.filepath.as_path();
        for line in self.reader()?.lines() {
            let line = line.map_err(|e| FileError::io(path, e))?;
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(Some(trimmed.to_string()));
            }
        }
        Ok(None)
    }
}

/// A plaintext or gzip-compressed output file.
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub filepath: PathBuf,
    /// Lines written as `#`-prefixed comments before any data.
    pub header: Option<Vec<String>>,
}

impl OutputFile {
    /// If `filepath` has a `.gz` extension the output is gzip-compressed.
    pub fn new(filepath: impl AsRef<Path>, header: Option<Vec<String>>) -> Self {
        Self {
            filepath: filepath.as_ref().to_path_buf(),
            header,
        }
    }

    /// Create the file and return a buffered writer, with any header
    /// comment lines already written.
    pub fn writer(&self) -> Result<OutputWriter, FileError> {
        let path = self.filepath.as_path();
        let file = File::create(path).map_err(|e| FileError::io(path, e))?;
        let is_gzip = path.extension().map_or(false, |ext| ext == "gz");
        let mut writer = if is_gzip {
            OutputWriter::Gzip(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            OutputWriter::Plain(BufWriter::new(file))
        };
        if let Some(entries) = &self.header {
            for entry in entries {
                writeln!(writer, "#{}", entry).map_err(|e| FileError::io(path, e))?;
            }
        }
        Ok(writer)
    }
}

/// A buffered output destination.
///
/// Call [`OutputWriter::finish`] when done: for gzip output it writes the
/// trailer and reports any error doing so, which dropping would swallow.
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
    Stdout(BufWriter<io::Stdout>),
}

impl OutputWriter {
    /// Flush buffered output and, for gzip output, finish the stream.
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(mut w) => w.flush(),
            OutputWriter::Stdout(mut w) => w.flush(),
            OutputWriter::Gzip(w) => {
                let encoder = w.into_inner().map_err(|e| e.into_error())?;
                encoder.finish()?;
                Ok(())
            }
        }
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Plain(w) => w.write(buf),
            OutputWriter::Gzip(w) => w.write(buf),
            OutputWriter::Stdout(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(w) => w.flush(),
            OutputWriter::Gzip(w) => w.flush(),
            OutputWriter::Stdout(w) => w.flush(),
        }
    }
}

/// Open `filepath` for writing, or standard out if no path is given.
pub fn open_writer(filepath: Option<&Path>) -> Result<OutputWriter, FileError> {
    match filepath {
        Some(path) => OutputFile::new(path, None).writer(),
        None => Ok(OutputWriter::Stdout(BufWriter::new(io::stdout()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn write_and_read(name: &str, header: Option<Vec<String>>) -> (bool, String) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        {
            let mut writer = OutputFile::new(&path, header).writer().unwrap();
            writeln!(writer, "10\t0.1").unwrap();
            writer.finish().unwrap();
        }
        let gzipped = is_gzipped_file(&path).unwrap();
        let mut contents = String::new();
        InputFile::new(&path)
            .reader()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        (gzipped, contents)
    }

    #[test]
    fn test_plaintext_roundtrip() {
        let (gzipped, contents) = write_and_read("map.tsv", None);
        assert!(!gzipped);
        assert_eq!(contents, "10\t0.1\n");
    }

    #[test]
    fn test_gzip_roundtrip() {
        let (gzipped, contents) = write_and_read("map.tsv.gz", Some(vec!["made by test".into()]));
        assert!(gzipped);
        assert_eq!(contents, "#made by test\n10\t0.1\n");
    }

    #[test]
    fn test_gzip_finished_without_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("finished.tsv.gz");
        let mut writer = OutputFile::new(&path, None).writer().unwrap();
        writeln!(writer, "20\t1.0").unwrap();
        writer.finish().unwrap();

        // a complete stream ends with the 8 byte CRC32 and size trailer
        let bytes = std::fs::read(&path).unwrap();
        let size = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(size as usize, "20\t1.0\n".len());
    }

    #[test]
    fn test_first_data_line_skips_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.txt");
        std::fs::write(&path, "# comment\n\nposition rate map\n1 2 3\n").unwrap();
        let line = InputFile::new(&path).first_data_line().unwrap();
        assert_eq!(line.as_deref(), Some("position rate map"));
    }

    #[test]
    fn test_empty_file_is_not_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        assert!(!is_gzipped_file(&path).unwrap());
        assert_eq!(InputFile::new(&path).first_data_line().unwrap(), None);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = match InputFile::new("does/not/exist.txt").reader() {
            Err(e) => e,
            Ok(_) => panic!("opened a missing file"),
        };
        assert!(err.to_string().contains("does/not/exist.txt"));
    }
}
