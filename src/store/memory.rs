//! In-process store with optional JSON snapshot persistence.
//!
//! Uniqueness (content hash, URL) and the "already extracted" / "already
//! classified" markers are kept as explicit indexes, so the unprocessed and
//! unanalyzed queries never scan the outputs table.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ContentStore, InsertOutcome};
use crate::error::StoreError;
use crate::model::{
    AnalysisOutput, AnalysisRole, CreditBalanceSnapshot, CreditProvider, ExtractedText,
    NewAnalysisOutput, NewExtract, NewRawContent, RawContent, SourceType, TrendCounter,
    TrendSource, UsageCounter,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    raw: Vec<RawContent>,
    #[serde(default)]
    extracts: Vec<ExtractedText>,
    #[serde(default)]
    outputs: Vec<AnalysisOutput>,
    #[serde(default)]
    trends: Vec<TrendCounter>,
    #[serde(default)]
    usage: Vec<UsageCounter>,
    #[serde(default)]
    balances: Vec<CreditBalanceSnapshot>,
    #[serde(skip)]
    idx: Indexes,
}

#[derive(Debug, Default)]
struct Indexes {
    hashes: HashSet<String>,
    urls: HashSet<String>,
    extracted_raw: HashSet<Uuid>,
    classified: HashSet<Uuid>,
    trends: HashMap<(NaiveDate, String, TrendSource), usize>,
    usage: HashMap<(NaiveDate, String), usize>,
}

impl Tables {
    fn rebuild_indexes(&mut self) {
        let mut idx = Indexes::default();
        for r in &self.raw {
            idx.hashes.insert(r.content_hash.clone());
            idx.urls.insert(r.url.clone());
        }
        for e in &self.extracts {
            idx.extracted_raw.insert(e.raw_content_id);
        }
        for o in &self.outputs {
            if o.role == AnalysisRole::Classify {
                idx.classified.insert(o.extracted_text_id);
            }
        }
        for (i, t) in self.trends.iter().enumerate() {
            idx.trends.insert((t.date, t.keyword.clone(), t.source), i);
        }
        for (i, u) in self.usage.iter().enumerate() {
            idx.usage.insert((u.day, u.model_name.clone()), i);
        }
        self.idx = idx;
    }

    /// Cost accumulates unrounded; readers round. Returns the row as it was
    /// before this call so a failed commit can restore it.
    fn add_usage(&mut self, day: NaiveDate, output: &AnalysisOutput) -> Option<UsageCounter> {
        let key = (day, output.model_name.clone());
        match self.idx.usage.get(&key) {
            Some(&i) => {
                let row = &mut self.usage[i];
                let prev = row.clone();
                row.calls += 1;
                row.tokens_in += output.tokens_in;
                row.tokens_out += output.tokens_out;
                row.cost_usd += output.cost_usd;
                Some(prev)
            }
            None => {
                self.usage.push(UsageCounter {
                    day,
                    model_name: output.model_name.clone(),
                    calls: 1,
                    tokens_in: output.tokens_in,
                    tokens_out: output.tokens_out,
                    cost_usd: output.cost_usd,
                });
                self.idx.usage.insert(key, self.usage.len() - 1);
                None
            }
        }
    }

    fn undo_usage(&mut self, day: NaiveDate, model_name: &str, prev: Option<UsageCounter>) {
        let key = (day, model_name.to_string());
        match prev {
            Some(p) => {
                if let Some(&i) = self.idx.usage.get(&key) {
                    self.usage[i] = p;
                }
            }
            None => {
                self.usage.pop();
                self.idx.usage.remove(&key);
            }
        }
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    snapshot: Option<PathBuf>,
    offset: FixedOffset,
}

impl MemoryStore {
    /// Purely in-memory; `offset` decides which calendar day usage lands on.
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            snapshot: None,
            offset,
        }
    }

    /// Load `path` if it exists and rewrite it after every mutation.
    pub fn open<P: AsRef<Path>>(path: P, offset: FixedOffset) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut tables = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<Tables>(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        tables.rebuild_indexes();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(Self {
            tables: Mutex::new(tables),
            snapshot: Some(path),
            offset,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn today(&self) -> NaiveDate {
        crate::dates::today(self.offset)
    }

    fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(tables)?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Persist a mutation already applied to `tables`; on failure run `undo`
    /// so memory never holds state the snapshot does not.
    fn commit<F>(&self, tables: &mut Tables, undo: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Tables),
    {
        if let Err(e) = self.persist(tables) {
            undo(tables);
            warn!(error = %e, "snapshot write failed, mutation rolled back");
            return Err(e);
        }
        Ok(())
    }
}

fn newest_first<T, F>(rows: &[T], created: F) -> Vec<&T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut v: Vec<&T> = rows.iter().collect();
    // Stable sort keeps later inserts ahead on equal timestamps once reversed.
    v.sort_by_key(|r| created(r));
    v.reverse();
    v
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_raw(&self, item: NewRawContent) -> Result<InsertOutcome, StoreError> {
        let mut t = self.lock();
        if t.idx.hashes.contains(&item.content_hash) || t.idx.urls.contains(&item.url) {
            debug!(hash = %item.content_hash, "duplicate content, not inserted");
            return Ok(InsertOutcome::Duplicate);
        }
        let row = RawContent {
            id: Uuid::new_v4(),
            source_type: item.source_type,
            url: item.url,
            fetched_at: Utc::now(),
            content: item.content,
            content_hash: item.content_hash,
            metadata: item.metadata,
        };
        t.idx.hashes.insert(row.content_hash.clone());
        t.idx.urls.insert(row.url.clone());
        t.raw.push(row.clone());
        self.commit(&mut t, |t| {
            t.raw.pop();
            t.idx.hashes.remove(&row.content_hash);
            t.idx.urls.remove(&row.url);
        })?;
        Ok(InsertOutcome::Inserted(row))
    }

    async fn has_content_hash(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.lock().idx.hashes.contains(hash))
    }

    async fn get_raw(&self, id: Uuid) -> Result<Option<RawContent>, StoreError> {
        Ok(self.lock().raw.iter().find(|r| r.id == id).cloned())
    }

    async fn list_existing_urls(
        &self,
        source_type: Option<SourceType>,
    ) -> Result<HashSet<String>, StoreError> {
        let t = self.lock();
        Ok(match source_type {
            None => t.idx.urls.clone(),
            Some(st) => t
                .raw
                .iter()
                .filter(|r| r.source_type == st)
                .map(|r| r.url.clone())
                .collect(),
        })
    }

    async fn list_unprocessed_raw(&self, limit: usize) -> Result<Vec<RawContent>, StoreError> {
        let t = self.lock();
        Ok(newest_first(&t.raw, |r| r.fetched_at)
            .into_iter()
            .filter(|r| !t.idx.extracted_raw.contains(&r.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_extract(&self, item: NewExtract) -> Result<ExtractedText, StoreError> {
        let mut t = self.lock();
        let row = ExtractedText {
            id: Uuid::new_v4(),
            raw_content_id: item.raw_content_id,
            text: item.text,
            tables: item.tables,
            images: item.images,
            extractor_used: item.extractor_used,
            extractor_version: item.extractor_version,
            created_at: Utc::now(),
        };
        let first_extract = t.idx.extracted_raw.insert(row.raw_content_id);
        t.extracts.push(row.clone());
        self.commit(&mut t, |t| {
            t.extracts.pop();
            if first_extract {
                t.idx.extracted_raw.remove(&row.raw_content_id);
            }
        })?;
        Ok(row)
    }

    async fn get_extract(&self, id: Uuid) -> Result<Option<ExtractedText>, StoreError> {
        Ok(self.lock().extracts.iter().find(|e| e.id == id).cloned())
    }

    async fn list_unanalyzed_extracts(
        &self,
        limit: usize,
    ) -> Result<Vec<ExtractedText>, StoreError> {
        let t = self.lock();
        Ok(newest_first(&t.extracts, |e| e.created_at)
            .into_iter()
            .filter(|e| !t.idx.classified.contains(&e.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_output(&self, item: NewAnalysisOutput) -> Result<AnalysisOutput, StoreError> {
        if item.model_name.trim().is_empty() {
            return Err(StoreError::Validation("model_name is empty".into()));
        }
        if let Some(s) = &item.output_structured {
            if s.role() != item.role {
                return Err(StoreError::Validation(format!(
                    "{} payload stored under role {}",
                    s.role().as_str(),
                    item.role.as_str()
                )));
            }
        }
        if !item.cost_usd.is_finite() || item.cost_usd < 0.0 {
            return Err(StoreError::Validation(format!(
                "invalid cost_usd {}",
                item.cost_usd
            )));
        }

        let today = self.today();
        let mut t = self.lock();
        let row = AnalysisOutput {
            id: Uuid::new_v4(),
            extracted_text_id: item.extracted_text_id,
            role: item.role,
            model_name: item.model_name,
            output_markdown: item.output_markdown,
            output_structured: item.output_structured,
            tokens_in: item.tokens_in,
            tokens_out: item.tokens_out,
            cost_usd: item.cost_usd,
            created_at: Utc::now(),
        };
        let first_classify =
            row.role == AnalysisRole::Classify && t.idx.classified.insert(row.extracted_text_id);
        let prev_usage = t.add_usage(today, &row);
        t.outputs.push(row.clone());
        self.commit(&mut t, |t| {
            t.outputs.pop();
            t.undo_usage(today, &row.model_name, prev_usage);
            if first_classify {
                t.idx.classified.remove(&row.extracted_text_id);
            }
        })?;
        Ok(row)
    }

    async fn list_outputs_by_role(
        &self,
        role: AnalysisRole,
        limit: usize,
    ) -> Result<Vec<AnalysisOutput>, StoreError> {
        let t = self.lock();
        Ok(newest_first(&t.outputs, |o| o.created_at)
            .into_iter()
            .filter(|o| o.role == role)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_recent_outputs(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalysisOutput>, StoreError> {
        let t = self.lock();
        Ok(newest_first(&t.outputs, |o| o.created_at)
            .into_iter()
            .filter(|o| o.created_at >= since)
            .cloned()
            .collect())
    }

    async fn upsert_trend_counter(
        &self,
        date: NaiveDate,
        keyword: &str,
        source: TrendSource,
        delta: i64,
    ) -> Result<TrendCounter, StoreError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(StoreError::Validation("empty trend keyword".into()));
        }
        let mut t = self.lock();
        let key = (date, keyword.to_string(), source);
        let existing = t.idx.trends.get(&key).copied();
        let row = match existing {
            Some(i) => {
                t.trends[i].count += delta;
                t.trends[i].clone()
            }
            None => {
                let row = TrendCounter {
                    date,
                    keyword: keyword.to_string(),
                    source,
                    count: delta,
                };
                t.trends.push(row.clone());
                let i = t.trends.len() - 1;
                t.idx.trends.insert(key.clone(), i);
                row
            }
        };
        self.commit(&mut t, |t| match existing {
            Some(i) => t.trends[i].count -= delta,
            None => {
                t.trends.pop();
                t.idx.trends.remove(&key);
            }
        })?;
        Ok(row)
    }

    async fn list_trend_counters(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<TrendCounter>, StoreError> {
        let t = self.lock();
        let mut rows: Vec<TrendCounter> =
            t.trends.iter().filter(|r| r.date >= since).cloned().collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.count.cmp(&a.count)));
        Ok(rows)
    }

    async fn list_usage_since(&self, since: NaiveDate) -> Result<Vec<UsageCounter>, StoreError> {
        let t = self.lock();
        Ok(t.usage.iter().filter(|u| u.day >= since).cloned().collect())
    }

    async fn insert_credit_balance(
        &self,
        provider: CreditProvider,
        balance_usd: f64,
    ) -> Result<CreditBalanceSnapshot, StoreError> {
        if !balance_usd.is_finite() {
            return Err(StoreError::Validation("balance must be finite".into()));
        }
        let mut t = self.lock();
        let row = CreditBalanceSnapshot {
            provider,
            captured_at: Utc::now(),
            balance_usd,
        };
        t.balances.push(row.clone());
        self.commit(&mut t, |t| {
            t.balances.pop();
        })?;
        Ok(row)
    }

    async fn latest_credit_balance(
        &self,
        provider: CreditProvider,
    ) -> Result<Option<CreditBalanceSnapshot>, StoreError> {
        let t = self.lock();
        // Append-only, so the last matching row is the most recent one.
        Ok(t.balances
            .iter()
            .rev()
            .find(|b| b.provider == provider)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::offset_hours;
    use crate::model::{Classification, ContentType, ExtractorKind, StructuredOutput};
    use serde_json::Map;

    fn raw(url: &str, content: &str) -> NewRawContent {
        NewRawContent {
            source_type: SourceType::Media,
            url: url.to_string(),
            content: content.to_string(),
            content_hash: crate::dedup::fingerprint(content),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_hash_or_url_is_soft_rejected() {
        let store = MemoryStore::new(offset_hours(9));
        assert!(store.insert_raw(raw("https://a", "x")).await.unwrap().is_inserted());
        assert_eq!(
            store.insert_raw(raw("https://b", "x")).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(
            store.insert_raw(raw("https://a", "y")).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.list_existing_urls(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn role_payload_mismatch_is_rejected() {
        let store = MemoryStore::new(offset_hours(9));
        let err = store
            .insert_output(NewAnalysisOutput {
                extracted_text_id: Uuid::new_v4(),
                role: AnalysisRole::Trend,
                model_name: "m".into(),
                output_markdown: None,
                output_structured: Some(StructuredOutput::Classification(Classification {
                    content_type: ContentType::Price,
                    company: String::new(),
                    product: None,
                    price_band: None,
                    specs: vec![],
                    topic_tags: vec![],
                })),
                tokens_in: 0,
                tokens_out: 0,
                cost_usd: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.list_usage_since(NaiveDate::MIN).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_round_trips_rows_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let raw_id;
        {
            let store = MemoryStore::open(&path, offset_hours(9)).unwrap();
            let InsertOutcome::Inserted(r) = store.insert_raw(raw("https://a", "x")).await.unwrap()
            else {
                panic!("expected insert");
            };
            raw_id = r.id;
            store
                .insert_extract(NewExtract {
                    raw_content_id: r.id,
                    text: "x".into(),
                    tables: vec![],
                    images: vec![],
                    extractor_used: ExtractorKind::Rule,
                    extractor_version: "v1".into(),
                })
                .await
                .unwrap();
        }

        let reopened = MemoryStore::open(&path, offset_hours(9)).unwrap();
        assert!(reopened.get_raw(raw_id).await.unwrap().is_some());
        assert!(reopened.list_unprocessed_raw(10).await.unwrap().is_empty());
        assert_eq!(
            reopened.insert_raw(raw("https://c", "x")).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(reopened.list_unanalyzed_extracts(10).await.unwrap().len(), 1);
    }

    fn compare_output(cost_usd: f64) -> NewAnalysisOutput {
        NewAnalysisOutput {
            extracted_text_id: Uuid::new_v4(),
            role: AnalysisRole::Compare,
            model_name: "m".into(),
            output_markdown: Some("md".into()),
            output_structured: None,
            tokens_in: 10,
            tokens_out: 5,
            cost_usd,
        }
    }

    #[tokio::test]
    async fn sub_cent_costs_accumulate_without_rounding_loss() {
        let store = MemoryStore::new(offset_hours(9));
        for _ in 0..10 {
            store.insert_output(compare_output(0.00004)).await.unwrap();
        }
        let usage = store.list_usage_since(NaiveDate::MIN).await.unwrap();
        assert_eq!(usage[0].calls, 10);
        assert!((usage[0].cost_usd - 0.0004).abs() < 1e-12);

        let m = store
            .read_usage_metrics(crate::dates::today(offset_hours(9)), 5.0)
            .await
            .unwrap();
        assert_eq!(m.today_cost, 0.0004);
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("data");
        let store = MemoryStore::open(sub.join("store.json"), offset_hours(9)).unwrap();
        store.insert_output(compare_output(0.5)).await.unwrap();

        // Parent directory replaced by a plain file: every write now fails.
        fs::remove_dir_all(&sub).unwrap();
        fs::write(&sub, b"not a dir").unwrap();

        assert!(store.insert_raw(raw("https://a", "x")).await.is_err());
        assert!(store.list_unprocessed_raw(10).await.unwrap().is_empty());
        assert!(!store.has_content_hash(&crate::dedup::fingerprint("x")).await.unwrap());
        assert!(store.list_existing_urls(None).await.unwrap().is_empty());

        let extract_for = Uuid::new_v4();
        let mut classify = compare_output(0.25);
        classify.role = AnalysisRole::Classify;
        classify.extracted_text_id = extract_for;
        assert!(store.insert_output(classify).await.is_err());
        assert!(store.list_outputs_by_role(AnalysisRole::Classify, 10).await.unwrap().is_empty());
        let usage = store.list_usage_since(NaiveDate::MIN).await.unwrap();
        assert_eq!((usage.len(), usage[0].calls), (1, 1));
        assert_eq!(usage[0].cost_usd, 0.5);

        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert!(store
            .upsert_trend_counter(day, "ZEH", TrendSource::Media, 2)
            .await
            .is_err());
        assert!(store.list_trend_counters(day).await.unwrap().is_empty());

        assert!(store
            .insert_credit_balance(CreditProvider::Anthropic, 4.0)
            .await
            .is_err());
        assert!(store
            .latest_credit_balance(CreditProvider::Anthropic)
            .await
            .unwrap()
            .is_none());
    }
}
