//! Record File
//!
//! Path-based handle over one entity's data file. Every call opens the file,
//! does its work and closes it again, so the handle itself holds no state
//! that could drift from what is on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncMode;
use crate::error::{CellarError, IoContext, Result};

use super::atomic;
use super::{
    FileHeader, FileLayout, Record, RecordId, RecordKey, LEN_PREFIX_SIZE, TOMBSTONE_DELETED,
};

/// A record together with the offset of its length prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    pub offset: u64,
    pub record: Record,
}

/// Outcome of a physical compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Tombstoned records dropped from the file
    pub records_removed: u32,

    /// Live records carried over
    pub records_retained: u32,
}

/// One entity's data file
#[derive(Debug, Clone)]
pub struct RecordFile {
    /// Entity label used in error messages
    entity: &'static str,
    path: PathBuf,
    layout: FileLayout,
    sync_mode: SyncMode,
}

impl RecordFile {
    pub fn new(
        entity: &'static str,
        path: impl Into<PathBuf>,
        layout: FileLayout,
        sync_mode: SyncMode,
    ) -> Self {
        Self {
            entity,
            path: path.into(),
            layout,
            sync_mode,
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> FileLayout {
        self.layout
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the file with a zeroed header if it does not exist yet
    ///
    /// Also creates missing parent directories and removes a `<path>.tmp`
    /// left behind by an interrupted rewrite. The header is written through
    /// `<path>.tmp`, so a crash never leaves a headerless file; an empty file
    /// found here is treated as never initialized. Idempotent.
    pub fn ensure_initialized(&self) -> Result<FileHeader> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).io_context("create data directory", parent)?;
            }
        }

        atomic::remove_stale_tmp(&self.path)?;

        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() > 0 => return self.header(),
            Ok(_) => tracing::warn!(
                "{} data file {} is empty; writing a fresh header",
                self.entity,
                self.path.display()
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).io_context("stat data file", &self.path),
        }

        let header = FileHeader::default();
        atomic::replace_file(&self.path, &header.encode(self.layout))?;
        tracing::debug!("Created {} data file {}", self.entity, self.path.display());
        Ok(header)
    }

    /// Read the current header
    pub fn header(&self) -> Result<FileHeader> {
        let mut file = File::open(&self.path).io_context("open data file", &self.path)?;
        self.read_header(&mut file)
    }

    /// Bring the header counters back in line with the records on disk
    ///
    /// A crash between appending a record and rewriting the header leaves
    /// the header behind the data. Returns the repaired header when anything
    /// had to change.
    pub fn reconcile_header(&self) -> Result<Option<FileHeader>> {
        let (header, records) = self.scan()?;
        self.repair_header(header, &records)
    }

    /// Reconcile the header and hand back the records scanned to do it
    ///
    /// Lets callers that need a full scan on startup (index validation)
    /// reuse the one the header check already paid for.
    pub fn recover(&self) -> Result<(FileHeader, Vec<ScannedRecord>)> {
        let (header, records) = self.scan()?;
        let header = self.repair_header(header, &records)?.unwrap_or(header);
        Ok((header, records))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a record to a sequenced file
    ///
    /// Returns the assigned id and the offset of the new record's length
    /// prefix (the value the index stores).
    pub fn append(&self, payload: &[u8]) -> Result<(RecordId, u64)> {
        self.require_layout(FileLayout::Sequenced)?;

        let mut file = self.open_rw()?;
        let mut header = self.read_header(&mut file)?;

        let id = RecordId::try_from(header.next_id)
            .map_err(|_| CellarError::IdSpaceExhausted { entity: self.entity })?;
        let bytes = Record::new(RecordKey::Id(id), payload.to_vec()).encode()?;

        let offset = self.append_bytes(&mut file, &bytes)?;

        header.next_id += 1;
        header.active_count += 1;
        self.write_header(&mut file, &header)?;
        self.finish_write(&mut file)?;

        tracing::trace!("Appended {} {} at offset {}", self.entity, id, offset);
        Ok((id, offset))
    }

    /// Append a record to a composite file
    ///
    /// Key uniqueness is the caller's concern.
    pub fn append_pair(&self, first: u16, second: u16, payload: &[u8]) -> Result<u64> {
        self.require_layout(FileLayout::Composite)?;

        let mut file = self.open_rw()?;
        let mut header = self.read_header(&mut file)?;

        let bytes = Record::new(RecordKey::Pair(first, second), payload.to_vec()).encode()?;
        let offset = self.append_bytes(&mut file, &bytes)?;

        header.active_count += 1;
        self.write_header(&mut file, &header)?;
        self.finish_write(&mut file)?;

        tracing::trace!(
            "Appended {} ({}, {}) at offset {}",
            self.entity,
            first,
            second,
            offset
        );
        Ok(offset)
    }

    /// Set the tombstone of the record starting at `offset` by overwriting
    /// its tombstone byte
    ///
    /// The record there must carry `expected`; anything else means the
    /// caller's offset is stale and is reported as `Corrupt`.
    pub fn mark_tombstone(&self, offset: u64, expected: RecordKey) -> Result<()> {
        let mut file = self.open_rw()?;
        let record = self.read_record_at(&mut file, offset)?;

        if record.key != expected {
            return Err(CellarError::corrupt(
                &self.path,
                offset,
                format!("expected record {}, found {}", expected, record.key),
            ));
        }
        if record.tombstone {
            return Err(CellarError::already_deleted(self.entity, expected));
        }

        let mut header = self.read_header(&mut file)?;
        if header.active_count == 0 {
            return Err(CellarError::corrupt(
                &self.path,
                0,
                "header reports no active records but a live record exists",
            ));
        }

        file.seek(SeekFrom::Start(offset + Record::tombstone_offset(self.layout)))
            .io_context("seek tombstone", &self.path)?;
        file.write_all(&[TOMBSTONE_DELETED])
            .io_context("write tombstone", &self.path)?;

        header.active_count -= 1;
        header.tombstone_count += 1;
        self.write_header(&mut file, &header)?;
        self.finish_write(&mut file)?;
        Ok(())
    }

    /// Set the tombstone of the live record with `key` by rewriting the
    /// whole file through `<path>.tmp`
    ///
    /// Record sizes and order are unchanged, so every offset stays valid.
    /// Returns the offset of the deleted record.
    pub fn rewrite_tombstone(&self, key: RecordKey) -> Result<u64> {
        let (mut header, mut records) = self.scan()?;

        let pos = match records
            .iter()
            .position(|r| r.record.key == key && !r.record.tombstone)
        {
            Some(pos) => pos,
            None if records.iter().any(|r| r.record.key == key) => {
                return Err(CellarError::already_deleted(self.entity, key));
            }
            None => return Err(CellarError::not_found(self.entity, key)),
        };

        if header.active_count == 0 {
            return Err(CellarError::corrupt(
                &self.path,
                0,
                "header reports no active records but a live record exists",
            ));
        }

        records[pos].record.tombstone = true;
        header.active_count -= 1;
        header.tombstone_count += 1;

        let bytes = self.encode_file(&header, records.iter().map(|r| &r.record))?;
        atomic::replace_file(&self.path, &bytes)?;
        Ok(records[pos].offset)
    }

    /// Drop every tombstoned record, rewriting through `<path>.tmp`
    ///
    /// Ids and `next_id` are preserved; offsets of retained records shift, so
    /// any index over this file must be rebuilt afterwards.
    pub fn compact(&self) -> Result<CompactionStats> {
        let (header, records) = self.scan()?;

        let retained: Vec<&Record> = records
            .iter()
            .map(|r| &r.record)
            .filter(|r| !r.tombstone)
            .collect();
        let stats = CompactionStats {
            records_removed: (records.len() - retained.len()) as u32,
            records_retained: retained.len() as u32,
        };

        let compacted = FileHeader {
            active_count: stats.records_retained,
            tombstone_count: 0,
            next_id: header.next_id,
        };
        let bytes = self.encode_file(&compacted, retained.into_iter())?;
        atomic::replace_file(&self.path, &bytes)?;

        tracing::info!(
            "Compacted {}: removed {}, retained {}",
            self.entity,
            stats.records_removed,
            stats.records_retained
        );
        Ok(stats)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every record in file order, tombstoned ones included
    pub fn read_all(&self) -> Result<Vec<ScannedRecord>> {
        self.scan().map(|(_, records)| records)
    }

    /// Parse the single record whose length prefix starts at `offset`
    pub fn read_at(&self, offset: u64) -> Result<Record> {
        let mut file = File::open(&self.path).io_context("open data file", &self.path)?;
        self.read_record_at(&mut file, offset)
    }

    /// Header plus every record, read in one pass
    pub fn scan(&self) -> Result<(FileHeader, Vec<ScannedRecord>)> {
        let data = fs::read(&self.path).io_context("read data file", &self.path)?;
        let header = FileHeader::decode(&data, self.layout, &self.path)?;
        let records = self.parse_records(&data)?;
        Ok((header, records))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn repair_header(
        &self,
        header: FileHeader,
        records: &[ScannedRecord],
    ) -> Result<Option<FileHeader>> {
        let tombstone_count = records.iter().filter(|r| r.record.tombstone).count() as u32;
        let active_count = records.len() as u32 - tombstone_count;
        let next_id = match self.layout {
            FileLayout::Sequenced => records
                .iter()
                .filter_map(|r| match r.record.key {
                    RecordKey::Id(id) => Some(id as u32 + 1),
                    RecordKey::Pair(..) => None,
                })
                .max()
                .unwrap_or(0)
                .max(header.next_id),
            FileLayout::Composite => 0,
        };

        let repaired = FileHeader {
            active_count,
            tombstone_count,
            next_id,
        };
        if repaired == header {
            return Ok(None);
        }

        tracing::warn!(
            "{} header out of sync with data (header {:?}, scanned {:?}); repairing",
            self.entity,
            header,
            repaired
        );
        let mut file = self.open_rw()?;
        self.write_header(&mut file, &repaired)?;
        self.finish_write(&mut file)?;
        Ok(Some(repaired))
    }

    fn parse_records(&self, data: &[u8]) -> Result<Vec<ScannedRecord>> {
        let mut records = Vec::new();
        let mut pos = self.layout.header_size() as usize;

        while pos < data.len() {
            let offset = pos as u64;
            if data.len() - pos < LEN_PREFIX_SIZE {
                return Err(CellarError::corrupt(
                    &self.path,
                    offset,
                    "truncated length prefix",
                ));
            }

            let body_len = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
            let body_start = pos + LEN_PREFIX_SIZE;
            let body_end = body_start + body_len;
            if body_end > data.len() {
                return Err(CellarError::corrupt(
                    &self.path,
                    offset,
                    format!(
                        "record length {} runs past end of file ({} bytes left)",
                        body_len,
                        data.len() - body_start
                    ),
                ));
            }

            let record =
                Record::decode_body(&data[body_start..body_end], self.layout, &self.path, offset)?;
            records.push(ScannedRecord { offset, record });
            pos = body_end;
        }

        Ok(records)
    }

    fn read_record_at(&self, file: &mut File, offset: u64) -> Result<Record> {
        let file_len = file
            .metadata()
            .io_context("stat data file", &self.path)?
            .len();

        if offset < self.layout.header_size() || offset + LEN_PREFIX_SIZE as u64 > file_len {
            return Err(CellarError::corrupt(
                &self.path,
                offset,
                format!("offset outside record area (file is {} bytes)", file_len),
            ));
        }

        file.seek(SeekFrom::Start(offset))
            .io_context("seek record", &self.path)?;
        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        file.read_exact(&mut prefix)
            .io_context("read length prefix", &self.path)?;

        let body_len = u16::from_le_bytes(prefix) as u64;
        if offset + LEN_PREFIX_SIZE as u64 + body_len > file_len {
            return Err(CellarError::corrupt(
                &self.path,
                offset,
                format!("record length {} runs past end of file", body_len),
            ));
        }

        let mut body = vec![0u8; body_len as usize];
        file.read_exact(&mut body)
            .io_context("read record", &self.path)?;
        Record::decode_body(&body, self.layout, &self.path, offset)
    }

    fn read_header(&self, file: &mut File) -> Result<FileHeader> {
        let mut buf = vec![0u8; self.layout.header_size() as usize];
        file.seek(SeekFrom::Start(0))
            .io_context("seek header", &self.path)?;
        match file.read_exact(&mut buf) {
            Ok(()) => FileHeader::decode(&buf, self.layout, &self.path),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CellarError::corrupt(
                &self.path,
                0,
                "file is shorter than its header",
            )),
            Err(e) => Err(e).io_context("read header", &self.path),
        }
    }

    fn write_header(&self, file: &mut File, header: &FileHeader) -> Result<()> {
        file.seek(SeekFrom::Start(0))
            .io_context("seek header", &self.path)?;
        file.write_all(&header.encode(self.layout))
            .io_context("write header", &self.path)
    }

    /// Write at end of file, returning where the bytes start
    fn append_bytes(&self, file: &mut File, bytes: &[u8]) -> Result<u64> {
        let offset = file
            .seek(SeekFrom::End(0))
            .io_context("seek end of file", &self.path)?;
        file.write_all(bytes).io_context("append record", &self.path)?;
        Ok(offset)
    }

    fn finish_write(&self, file: &mut File) -> Result<()> {
        file.flush().io_context("flush data file", &self.path)?;
        if self.sync_mode == SyncMode::Always {
            file.sync_data().io_context("sync data file", &self.path)?;
        }
        Ok(())
    }

    fn open_rw(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .io_context("open data file", &self.path)
    }

    fn encode_file<'a>(
        &self,
        header: &FileHeader,
        records: impl Iterator<Item = &'a Record>,
    ) -> Result<Vec<u8>> {
        let mut bytes = header.encode(self.layout);
        for record in records {
            bytes.extend_from_slice(&record.encode()?);
        }
        Ok(bytes)
    }

    fn require_layout(&self, layout: FileLayout) -> Result<()> {
        if self.layout != layout {
            return Err(CellarError::Config(format!(
                "{} file uses {:?} layout, operation needs {:?}",
                self.entity, self.layout, layout
            )));
        }
        Ok(())
    }
}
