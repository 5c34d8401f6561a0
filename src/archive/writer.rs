use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::archive::entry_name::EntryNamer;
use crate::storage::UploadBody;
use crate::types::{ArchiveEntry, CandidateObject};

// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Where the container is assembled before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveSpool {
    Memory,
    TempFile,
}

enum ZipSink {
    Memory(ZipWriter<Cursor<Vec<u8>>>),
    TempFile {
        writer: ZipWriter<File>,
        spool: NamedTempFile,
    },
}

/// Serialized writer for the deflate container.
///
/// Entries are written in call order. Names are made unique by
/// [`EntryNamer`]. Any write error leaves the container unusable, so callers
/// treat it as fatal.
pub struct ArchiveWriter {
    sink: ZipSink,
    namer: EntryNamer,
    entries: Vec<ArchiveEntry>,
}

impl ArchiveWriter {
    pub fn new(spool: ArchiveSpool) -> Result<Self> {
        let sink = match spool {
            ArchiveSpool::Memory => ZipSink::Memory(ZipWriter::new(Cursor::new(Vec::new()))),
            ArchiveSpool::TempFile => {
                let spool = NamedTempFile::new().context("failed to create archive spool file.")?;
                let file = spool.as_file().try_clone()?;
                ZipSink::TempFile {
                    writer: ZipWriter::new(file),
                    spool,
                }
            }
        };

        Ok(Self {
            sink,
            namer: EntryNamer::new(),
            entries: Vec::new(),
        })
    }

    pub fn append(&mut self, candidate: &CandidateObject, content: &[u8]) -> Result<ArchiveEntry> {
        let entry_name = self.namer.assign(candidate.key());
        let content_length = content.len() as u64;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(content_length >= ZIP64_THRESHOLD)
            .last_modified_time(to_zip_datetime(candidate.last_modified()));

        let written = match &mut self.sink {
            ZipSink::Memory(writer) => write_entry(writer, &entry_name, options, content),
            ZipSink::TempFile { writer, .. } => write_entry(writer, &entry_name, options, content),
        };
        written.with_context(|| format!("failed to write archive entry {entry_name}."))?;

        let entry = ArchiveEntry {
            entry_name,
            content_length,
            source_key: candidate.key().to_string(),
        };
        self.entries.push(entry.clone());

        Ok(entry)
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Write the central directory and hand back the sealed container.
    pub fn finish(self) -> Result<SealedArchive> {
        match self.sink {
            ZipSink::Memory(writer) => {
                let buffer = writer.finish()?.into_inner();
                Ok(SealedArchive::Memory(Bytes::from(buffer)))
            }
            ZipSink::TempFile { writer, spool } => {
                let mut file = writer.finish()?;
                file.flush()?;
                file.sync_all()?;
                let len = file.metadata()?.len();
                Ok(SealedArchive::TempFile { spool, len })
            }
        }
    }
}

fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    entry_name: &str,
    options: SimpleFileOptions,
    content: &[u8],
) -> Result<()> {
    writer.start_file(entry_name, options)?;
    writer.write_all(content)?;
    Ok(())
}

// The zip format cannot represent times before 1980; those fall back to
// 1980-01-01.
fn to_zip_datetime(time: DateTime<Utc>) -> zip::DateTime {
    u16::try_from(time.year())
        .ok()
        .and_then(|year| {
            zip::DateTime::from_date_and_time(
                year,
                time.month() as u8,
                time.day() as u8,
                time.hour() as u8,
                time.minute() as u8,
                time.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

/// A finalized container ready for upload.
///
/// The temp-file variant owns the spool file; it is removed when this value
/// is dropped, so keep it alive until the upload has finished.
#[derive(Debug)]
pub enum SealedArchive {
    Memory(Bytes),
    TempFile { spool: NamedTempFile, len: u64 },
}

impl SealedArchive {
    pub fn len(&self) -> u64 {
        match self {
            SealedArchive::Memory(bytes) => bytes.len() as u64,
            SealedArchive::TempFile { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn upload_body(&self) -> UploadBody {
        match self {
            SealedArchive::Memory(bytes) => UploadBody::Bytes(bytes.clone()),
            SealedArchive::TempFile { spool, .. } => UploadBody::File(spool.path().to_path_buf()),
        }
    }

    pub fn read_to_bytes(&self) -> Result<Bytes> {
        match self {
            SealedArchive::Memory(bytes) => Ok(bytes.clone()),
            SealedArchive::TempFile { spool, .. } => {
                let mut file = spool.reopen()?;
                file.seek(SeekFrom::Start(0))?;
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}
