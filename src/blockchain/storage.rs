use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::Account;
use super::block::{Block, BlockFs};
use super::crypto::Hash;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record on line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Genesis file not found: {0}")]
    GenesisNotFound(PathBuf),

    #[error("Block store is closed")]
    Closed,
}

/// Initial balances every replay starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub balances: BTreeMap<Account, u64>,
}

impl Default for Genesis {
    fn default() -> Self {
        Genesis {
            balances: BTreeMap::from([(Account::from("andrej"), 1_000_000)]),
        }
    }
}

impl Genesis {
    /// Reads a genesis file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the genesis JSON file
    ///
    /// # Returns
    ///
    /// The parsed genesis record
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::GenesisNotFound(path.to_path_buf()));
        }

        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Layout of a node's data directory
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DataDir {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }

    pub fn genesis_path(&self) -> PathBuf {
        self.database_dir().join("genesis.json")
    }

    pub fn block_db_path(&self) -> PathBuf {
        self.database_dir().join("block.db")
    }

    /// Creates the database directory with a default genesis and an empty
    /// block store unless a genesis file is already present
    pub fn init_if_missing(&self) -> Result<(), StorageError> {
        if self.genesis_path().exists() {
            return Ok(());
        }

        fs::create_dir_all(self.database_dir())?;
        Genesis::default().save(self.genesis_path())?;
        if !self.block_db_path().exists() {
            File::create(self.block_db_path())?;
        }

        info!("Initialized data directory at {}", self.root.display());
        Ok(())
    }
}

/// Write-side view of a `BlockFs` record
#[derive(Serialize)]
struct RecordRef<'a> {
    hash: &'a Hash,
    block: &'a Block,
}

/// Append-only block store: one JSON `BlockFs` record per line
pub struct BlockStore {
    path: PathBuf,
    file: File,
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore").field("path", &self.path).finish()
    }
}

impl BlockStore {
    /// Opens the store for appending, creating the file if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(BlockStore { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and flushes it to the OS
    ///
    /// # Arguments
    ///
    /// * `hash` - The block's hash
    /// * `block` - The block to persist
    ///
    /// # Returns
    ///
    /// Result indicating success or failure. On failure the file is cut back
    /// to its previous length, so a torn line never precedes later records.
    pub fn append(&mut self, hash: &Hash, block: &Block) -> Result<(), StorageError> {
        self.append_with(&RecordRef { hash, block }, |file, line| {
            file.write_all(line)?;
            file.flush()
        })
    }

    fn append_with<R, F>(&mut self, record: &R, write: F) -> Result<(), StorageError>
    where
        R: Serialize,
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let len = self.file.metadata()?.len();
        if let Err(err) = write(&mut self.file, &line) {
            if let Err(truncate_err) = self.file.set_len(len) {
                error!(
                    "Failed to drop partial record from {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(err.into());
        }

        Ok(())
    }

    /// Reads every record in file order
    ///
    /// # Returns
    ///
    /// All records, or `StorageError::Corrupt` naming the first line that
    /// does not parse
    pub fn read_records(&self) -> Result<Vec<BlockFs>, StorageError> {
        Self::read_prefix(&self.path, usize::MAX)
    }

    /// Reads at most `limit` records from the start of the file at `path`
    ///
    /// Uses its own handle, so it never waits on the writer. Lines past
    /// `limit` are not read, which keeps a record still being appended out
    /// of the result.
    pub fn read_prefix<P: AsRef<Path>>(path: P, limit: usize) -> Result<Vec<BlockFs>, StorageError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            if records.len() >= limit {
                break;
            }

            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record = serde_json::from_str::<BlockFs>(&line).map_err(|e| StorageError::Corrupt {
                line: index + 1,
                reason: e.to_string(),
            })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Flushes outstanding writes to disk
    pub fn sync(&self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}
