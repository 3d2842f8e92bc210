//! Per-account CSV collection: `<data_dir>/<account>/tweets.csv`.
//!
//! The file is append-only from the fetcher's point of view. Each append is
//! flushed and fsynced before returning, so an interrupted run loses at
//! most the page it was writing. A row cut short by a crash is cut off by
//! [`TweetStore::repair_tail`] before anything else is appended; rows that
//! fail to parse on load are skipped with a warning.
use crate::checkpoint::Checkpoint;
use perch_common::Account;
use perch_social::twitter::TweetRecord;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const COLLECTION_FILE: &str = "tweets.csv";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("no collection at {0}; run `perch fetch` first")]
    Missing(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> StoreError + '_ {
    move |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct TweetStore {
    root: PathBuf,
}

impl TweetStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    /// Directory holding every file for the account, derived outputs included.
    pub fn account_dir(&self, account: &Account) -> PathBuf {
        self.root.join(account.as_str())
    }

    pub fn collection_path(&self, account: &Account) -> PathBuf {
        self.account_dir(account).join(COLLECTION_FILE)
    }

    /// Read the existing collection, if any, into a [`Checkpoint`].
    ///
    /// Returns `None` when there is no file or it holds no valid rows.
    pub fn load_checkpoint(&self, account: &Account) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.collection_path(account);
        if !path.exists() {
            return Ok(None);
        }

        let mut checkpoint = Checkpoint::default();
        read_rows(&path, |record| checkpoint.observe(&record))?;

        if checkpoint.duplicate_rows() > 0 {
            tracing::warn!(
                account=%account,
                duplicates=checkpoint.duplicate_rows(),
                "store.checkpoint.duplicate_rows"
            );
        }
        tracing::debug!(
            account=%account,
            tweets=checkpoint.len(),
            oldest=?checkpoint.oldest,
            newest=?checkpoint.newest,
            "store.checkpoint.loaded"
        );

        Ok((!checkpoint.is_empty()).then_some(checkpoint))
    }

    /// Load every record, first occurrence of each id wins.
    pub fn load_records(&self, account: &Account) -> Result<Vec<TweetRecord>, StoreError> {
        let path = self.collection_path(account);
        if !path.exists() {
            return Err(StoreError::Missing(path));
        }
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        read_rows(&path, |record| {
            if seen.insert(record.id.clone()) {
                records.push(record);
            }
        })?;
        Ok(records)
    }

    /// Append records and make them durable. Writes the header when the
    /// file is new or empty. No file is created for an empty batch.
    pub fn append(&self, account: &Account, records: &[TweetRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let dir = self.account_dir(account);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let path = self.collection_path(account);

        if !ends_with_newline(&path).map_err(io_err(&path))? {
            self.repair_tail(account)?;
        }
        let existing_len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(io_err(&path)(e)),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(existing_len == 0)
            .from_writer(file);
        for record in records {
            writer.serialize(record).map_err(csv_err(&path))?;
        }
        writer.flush().map_err(io_err(&path))?;
        let file = writer
            .into_inner()
            .map_err(|e| io_err(&path)(e.into_error()))?;
        file.sync_all().map_err(io_err(&path))?;

        tracing::debug!(path=%path.display(), appended=records.len(), "store.append");
        Ok(())
    }

    /// Cut the collection back to its last complete row.
    ///
    /// A crash can leave a row half written, possibly inside an open quoted
    /// field. Anything after the last newline outside quotes is dropped so
    /// the next append starts on a record boundary. Returns the number of
    /// bytes removed.
    pub fn repair_tail(&self, account: &Account) -> Result<u64, StoreError> {
        let path = self.collection_path(account);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&path)(e)),
        };
        let complete = complete_len(&path).map_err(io_err(&path))?;
        if complete == len {
            return Ok(0);
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(io_err(&path))?;
        file.set_len(complete).map_err(io_err(&path))?;
        file.sync_all().map_err(io_err(&path))?;

        let dropped = len - complete;
        tracing::warn!(path=%path.display(), kept=complete, dropped, "store.repair.partial_row");
        Ok(dropped)
    }
}

fn read_rows(path: &Path, mut on_record: impl FnMut(TweetRecord)) -> Result<(), StoreError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_err(path))?;
    for (idx, row) in reader.deserialize::<TweetRecord>().enumerate() {
        match row {
            Ok(record) => on_record(record),
            Err(e) if e.is_io_error() => return Err(csv_err(path)(e)),
            Err(e) => {
                tracing::warn!(
                    path=%path.display(),
                    row=idx + 1,
                    error=%e,
                    "store.read.skipping_bad_row"
                );
            }
        }
    }
    Ok(())
}

/// Byte length up to and including the last record terminator, tracking
/// quoted fields so embedded newlines do not count.
fn complete_len(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8192];
    let mut offset = 0u64;
    let mut complete = 0u64;
    let mut in_quotes = false;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for (i, &b) in buf[..n].iter().enumerate() {
            match b {
                b'"' => in_quotes = !in_quotes,
                b'\n' if !in_quotes => complete = offset + i as u64 + 1,
                _ => {}
            }
        }
        offset += n as u64;
    }
    Ok(complete)
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
