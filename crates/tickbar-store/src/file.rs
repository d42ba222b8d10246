//! JSON file bar store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use directories::ProjectDirs;
use tickbar_types::{Bar, BarKey};
use tracing::debug;

use crate::{BarStore, Result, StoreError, Upsert, resolve};

/// Bar store that keeps one JSON document per symbol per UTC day.
///
/// Bars are stored in `<base>/bars/<SYMBOL>/<YYYY-MM-DD>.json` as an array
/// ordered by interval start. Every write replaces the document through a
/// temporary file and a rename, so readers never see a partial file.
#[derive(Debug)]
pub struct FileBarStore {
    /// Base directory for storage.
    base_path: PathBuf,
    /// Directory holding one subdirectory per symbol.
    bars_path: PathBuf,
    /// Write locks, one per day file.
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileBarStore {
    /// Creates a store rooted at `base_path`.
    ///
    /// Creates the necessary subdirectories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let bars_path = base_path.join("bars");
        fs::create_dir_all(&bars_path).map_err(|e| StoreError::CreateDir {
            path: bars_path.clone(),
            source: e,
        })?;

        Ok(Self {
            base_path,
            bars_path,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the default path for tickbar storage.
    ///
    /// Uses the `directories` crate to find the appropriate location:
    /// - Linux: `~/.local/share/tickbar/`
    /// - macOS: `~/Library/Application Support/tickbar/`
    /// - Windows: `C:\Users\<User>\AppData\Roaming\tickbar\`
    ///
    /// Falls back to `~/.tickbar/` if the platform-specific location
    /// cannot be determined.
    #[must_use]
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "tickbar").map_or_else(dirs_fallback, |proj_dirs| {
            proj_dirs.data_dir().to_path_buf()
        })
    }

    /// Creates a store at the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn with_default_path() -> Result<Self> {
        Self::new(Self::default_path())
    }

    /// Returns the base path for storage.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the directory holding a symbol's day files.
    #[must_use]
    pub fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.bars_path.join(sanitize_symbol(symbol))
    }

    /// Returns the day file a key is stored in.
    #[must_use]
    pub fn day_path(&self, key: &BarKey) -> PathBuf {
        self.symbol_dir(&key.symbol)
            .join(format!("{}.json", key.interval_start.format("%Y-%m-%d")))
    }

    fn file_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}

#[async_trait]
impl BarStore for FileBarStore {
    async fn upsert(&self, bar: &Bar) -> Result<Upsert> {
        let path = self.day_path(&bar.key());
        let lock = self.file_lock(&path);
        let _guard = lock.lock().await;

        let bar = bar.clone();
        let outcome = tokio::task::spawn_blocking(move || upsert_in_file(&path, &bar))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        Ok(outcome)
    }

    async fn get(&self, key: &BarKey) -> Result<Option<Bar>> {
        let path = self.day_path(key);
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            let bars = read_day(&path)?;
            Ok(bars.into_iter().find(|bar| bar.key() == key))
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn bars(&self, symbol: &str) -> Result<Vec<Bar>> {
        let dir = self.symbol_dir(symbol);
        let symbol = symbol.to_string();
        tokio::task::spawn_blocking(move || read_symbol(&dir, &symbol))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn upsert_in_file(path: &Path, bar: &Bar) -> Result<Upsert> {
    let mut bars = read_day(path)?;
    let position = bars.iter().position(|row| row.key() == bar.key());
    let (row, outcome) = resolve(position.map(|i| &bars[i]), bar);

    if !outcome.is_write() {
        return Ok(outcome);
    }

    match position {
        Some(i) => bars[i] = row,
        None => {
            let at = bars.partition_point(|b| b.interval_start() < row.interval_start());
            bars.insert(at, row);
        }
    }

    write_day(path, &bars)?;
    debug!(
        symbol = bar.symbol(),
        interval_start = %bar.interval_start(),
        path = %path.display(),
        ?outcome,
        "Wrote bar"
    );
    Ok(outcome)
}

fn read_day(path: &Path) -> Result<Vec<Bar>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|e| StoreError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| StoreError::ParseJson {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_day(path: &Path, bars: &[Bar]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    let json = serde_json::to_string_pretty(bars)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, json).map_err(|e| StoreError::WriteFile {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| StoreError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_symbol(dir: &Path, symbol: &str) -> Result<Vec<Bar>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| StoreError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut days = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            days.push(path);
        }
    }

    // Day files are named by ISO date, so lexical order is time order.
    days.sort();

    let mut bars = Vec::new();
    for day in days {
        bars.extend(read_day(&day)?.into_iter().filter(|bar| bar.symbol() == symbol));
    }
    Ok(bars)
}

/// Maps a symbol to a safe directory name.
fn sanitize_symbol(symbol: &str) -> String {
    let name: String = symbol
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.chars().all(|c| c == '.') {
        name.replace('.', "_")
    } else {
        name
    }
}

/// Fallback for determining home directory.
fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".tickbar")
}
