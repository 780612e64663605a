use std::collections::{BTreeMap, HashSet};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::HistoryError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Track ids selected per calendar day, keyed by `YYYY-MM-DD`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryRecord {
    entries: BTreeMap<String, Vec<String>>,
}

impl HistoryRecord {
    #[cfg(test)]
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        HistoryRecord {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    #[cfg(test)]
    pub fn entries(&self) -> &BTreeMap<String, Vec<String>> {
        &self.entries
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Vec<String>> {
        self.entries.get(&date_key(date))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// JSON file holding the [`HistoryRecord`]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HistoryStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store. A missing file is an empty history.
    pub fn load(&self) -> Result<HistoryRecord, HistoryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no history file yet");
                return Ok(HistoryRecord::default());
            }
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Replace the whole store. The new content is written to a temporary
    /// file beside the target and renamed over it.
    pub fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let write_error = |source: std::io::Error| HistoryError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let json = serde_json::to_string_pretty(record).map_err(|e| write_error(e.into()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(json.as_bytes()).map_err(write_error)?;
        file.flush().map_err(write_error)?;
        file.persist(&self.path).map_err(|e| write_error(e.error))?;
        Ok(())
    }

    /// Keep entries dated on or after `today - retention_days`.
    /// Keys that are not dates are dropped. A window reaching past the
    /// earliest representable date keeps every dated entry.
    pub fn prune(record: HistoryRecord, retention_days: u32, today: NaiveDate) -> HistoryRecord {
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(retention_days)))
            .unwrap_or(NaiveDate::MIN);

        let entries = record
            .entries
            .into_iter()
            .filter(|(key, _)| match NaiveDate::parse_from_str(key, DATE_FORMAT) {
                Ok(date) => date >= cutoff,
                Err(_) => {
                    debug!(key = %key, "dropping malformed history date");
                    false
                }
            })
            .collect();

        HistoryRecord { entries }
    }

    /// Every id recorded on any retained day
    pub fn excluded_ids(record: &HistoryRecord) -> HashSet<String> {
        record.entries.values().flatten().cloned().collect()
    }

    /// Set the selection for `date`, replacing whatever was recorded that day
    pub fn record_selection(
        mut record: HistoryRecord,
        date: NaiveDate,
        ids: Vec<String>,
    ) -> HistoryRecord {
        record.entries.insert(date_key(date), ids);
        record
    }
}
