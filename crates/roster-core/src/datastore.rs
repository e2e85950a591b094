use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::filter::Filter;
use crate::item::ScheduledItem;
use crate::status::{ReminderLedger, ReminderMark};

/// What the engine needs from persistence. Results keep insertion order,
/// which is the arrival order lane stacking relies on.
pub trait ItemStore {
    fn query_in_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        filter: &Filter,
    ) -> anyhow::Result<Vec<ScheduledItem>>;

    fn all(&self, filter: &Filter) -> anyhow::Result<Vec<ScheduledItem>>;

    fn get(&self, id: Uuid) -> anyhow::Result<Option<ScheduledItem>>;

    fn insert(&self, item: ScheduledItem) -> anyhow::Result<()>;

    fn update(&self, item: ScheduledItem) -> anyhow::Result<()>;

    fn delete(&self, id: Uuid) -> anyhow::Result<Option<ScheduledItem>>;
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub items_path: PathBuf,
    pub reminders_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let items_path = data_dir.join("items.data");
        let reminders_path = data_dir.join("reminders.data");

        if !items_path.exists() {
            fs::write(&items_path, "")?;
        }
        if !reminders_path.exists() {
            fs::write(&reminders_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            items = %items_path.display(),
            reminders = %reminders_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            items_path,
            reminders_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_items(&self) -> anyhow::Result<Vec<ScheduledItem>> {
        load_jsonl(&self.items_path).context("failed to load items.data")
    }

    #[tracing::instrument(skip(self, items))]
    pub fn save_items(&self, items: &[ScheduledItem]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.items_path, items).context("failed to save items.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_ledger(&self) -> anyhow::Result<ReminderLedger> {
        let marks: Vec<ReminderMark> =
            load_jsonl(&self.reminders_path).context("failed to load reminders.data")?;
        Ok(ReminderLedger::from_marks(marks))
    }

    #[tracing::instrument(skip(self, ledger))]
    pub fn save_ledger(&self, ledger: &ReminderLedger) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.reminders_path, ledger.marks())
            .context("failed to save reminders.data")
    }

    /// Resolves a full id or a unique prefix of its simple form.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, token: &str) -> anyhow::Result<ScheduledItem> {
        let needle = token.trim().to_ascii_lowercase().replace('-', "");
        if needle.is_empty() {
            return Err(anyhow!("an item id is required"));
        }

        let mut matches = self
            .load_items()?
            .into_iter()
            .filter(|item| item.id.simple().to_string().starts_with(&needle));
        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no item matches id {token}"))?;
        if matches.next().is_some() {
            return Err(anyhow!("id prefix {token} is ambiguous"));
        }
        Ok(first)
    }
}

impl ItemStore for DataStore {
    #[tracing::instrument(skip(self, filter))]
    fn query_in_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        filter: &Filter,
    ) -> anyhow::Result<Vec<ScheduledItem>> {
        let items: Vec<ScheduledItem> = self
            .load_items()?
            .into_iter()
            .filter(|item| {
                item.windows()
                    .iter()
                    .any(|w| w.effective_start() <= end && w.effective_end() >= start)
            })
            .filter(|item| filter.matches(item))
            .collect();
        debug!(count = items.len(), "items in range");
        Ok(items)
    }

    #[tracing::instrument(skip(self, filter))]
    fn all(&self, filter: &Filter) -> anyhow::Result<Vec<ScheduledItem>> {
        Ok(self
            .load_items()?
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect())
    }

    fn get(&self, id: Uuid) -> anyhow::Result<Option<ScheduledItem>> {
        Ok(self.load_items()?.into_iter().find(|item| item.id == id))
    }

    #[tracing::instrument(skip(self, item), fields(id = %item.id))]
    fn insert(&self, item: ScheduledItem) -> anyhow::Result<()> {
        let mut items = self.load_items()?;
        if items.iter().any(|existing| existing.id == item.id) {
            return Err(anyhow!("item {} already exists", item.id));
        }
        items.push(item);
        self.save_items(&items)
    }

    #[tracing::instrument(skip(self, item), fields(id = %item.id))]
    fn update(&self, item: ScheduledItem) -> anyhow::Result<()> {
        let mut items = self.load_items()?;
        let slot = items
            .iter_mut()
            .find(|existing| existing.id == item.id)
            .ok_or_else(|| anyhow!("item not found: {}", item.id))?;
        *slot = item;
        self.save_items(&items)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete(&self, id: Uuid) -> anyhow::Result<Option<ScheduledItem>> {
        let mut items = self.load_items()?;
        let Some(idx) = items.iter().position(|item| item.id == id) else {
            return Ok(None);
        };
        let removed = items.remove(idx);
        self.save_items(&items)?;

        let mut ledger = self.load_ledger()?;
        let dropped = ledger.forget_item(id);
        if dropped > 0 {
            self.save_ledger(&ledger)?;
        }
        info!(dropped_marks = dropped, "deleted item");
        Ok(Some(removed))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
