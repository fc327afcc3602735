//! The deduplicated, durable sink for collected listings.
//!
//! One row per listing in an append-only CSV file, plus the identity hash in
//! a `unique_id` column. All existing identities load at open, so a restarted
//! run never reintroduces duplicates. Each batch lands via a temp file and
//! atomic rename — a crash mid-write leaves the previous file intact.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use vansweep_common::types::identity_from_fields;
use vansweep_common::ListingRecord;

use crate::error::{Result, StoreError};

const COLUMNS: [&str; 14] = [
    "title",
    "year",
    "mileage",
    "price",
    "description",
    "image_url",
    "url",
    "postcode",
    "source",
    "listing_type",
    "vat_included",
    "scraped_at",
    "age",
    "unique_id",
];

pub struct CanonicalStore {
    path: PathBuf,
    known: HashSet<String>,
}

impl CanonicalStore {
    /// Open the store, loading every existing identity before accepting
    /// writes. Rows persisted without a `unique_id` get one derived from
    /// their columns.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut known = HashSet::new();

        if path.exists() {
            let mut reader = csv::Reader::from_path(&path)?;
            let headers = reader.headers()?.clone();
            let col = |name: &str| headers.iter().position(|h| h == name);
            let (id_col, url_col) = (col("unique_id"), col("url"));
            let (title_col, price_col) = (col("title"), col("price"));
            let (mileage_col, year_col) = (col("mileage"), col("year"));
            let source_col = col("source");

            for row in reader.records() {
                let row = row?;
                let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("");
                let id = match field(id_col) {
                    "" => identity_from_fields(
                        field(url_col),
                        field(title_col),
                        field(price_col),
                        field(mileage_col),
                        field(year_col),
                        field(source_col),
                    ),
                    id => id.to_string(),
                };
                known.insert(id);
            }
            info!(path = %path.display(), identities = known.len(), "Loaded existing identities");
        }

        Ok(Self { path, known })
    }

    /// Append a batch, skipping records whose identity is already stored
    /// (including repeats within the batch itself). Returns the number of
    /// newly inserted rows. The write is all-or-nothing: on any error the
    /// previous file and the in-memory identity set are unchanged.
    pub fn append_batch(&mut self, records: &[ListingRecord]) -> Result<usize> {
        let mut fresh: Vec<(&ListingRecord, String)> = Vec::new();
        let mut batch_ids: HashSet<String> = HashSet::new();
        for record in records {
            let id = record.identity();
            if !self.known.contains(&id) && batch_ids.insert(id.clone()) {
                fresh.push((record, id));
            }
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        self.write_atomically(&fresh)?;
        self.known.extend(batch_ids);

        info!(
            path = %self.path.display(),
            inserted = fresh.len(),
            skipped = records.len() - fresh.len(),
            "Appended batch"
        );
        Ok(fresh.len())
    }

    fn write_atomically(&self, fresh: &[(&ListingRecord, String)]) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

        // Carry the existing file over verbatim so the rename replaces it
        // with a superset.
        if self.path.exists() {
            let mut existing = std::fs::read(&self.path)?;
            if !existing.ends_with(b"\n") && !existing.is_empty() {
                existing.push(b'\n');
            }
            tmp.write_all(&existing)?;
        } else {
            let mut header = csv::Writer::from_writer(&mut tmp);
            header.write_record(COLUMNS)?;
            header.flush()?;
        }

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut tmp);
            for (record, id) in fresh {
                writer.write_record(row_fields(record, id))?;
            }
            writer.flush()?;
        }

        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Write(format!("persisting {}: {}", self.path.display(), e)))?;
        Ok(())
    }

    pub fn total_records(&self) -> usize {
        self.known.len()
    }

    /// Aggregates over the whole file: total count, per-source breakdown,
    /// and min/median/max of the numeric columns.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        if !self.path.exists() {
            return Ok(stats);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h == name);
        let (source_col, price_col) = (col("source"), col("price"));
        let (mileage_col, year_col) = (col("mileage"), col("year"));

        let mut prices = Vec::new();
        let mut mileages = Vec::new();
        let mut years = Vec::new();

        for row in reader.records() {
            let row = row?;
            stats.total_records += 1;

            if let Some(source) = source_col.and_then(|i| row.get(i)) {
                if !source.is_empty() {
                    *stats.by_source.entry(source.to_string()).or_default() += 1;
                }
            }
            let numeric = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i))
                    .and_then(|v| v.parse::<f64>().ok())
            };
            prices.extend(numeric(price_col));
            mileages.extend(numeric(mileage_col));
            years.extend(numeric(year_col));
        }

        stats.price = FieldSummary::from_values(prices);
        stats.mileage = FieldSummary::from_values(mileages);
        stats.year = FieldSummary::from_values(years);
        Ok(stats)
    }
}

fn row_fields(record: &ListingRecord, id: &str) -> Vec<String> {
    let opt_int = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
    vec![
        record.title.clone(),
        opt_int(record.year.map(i64::from)),
        opt_int(record.mileage),
        record.price.map(|p| p.to_string()).unwrap_or_default(),
        record.description.clone(),
        record.image_url.clone(),
        record.url.clone(),
        record.search_key.clone(),
        record.source.as_str().to_string(),
        record.listing_type.as_str().to_string(),
        record
            .vat_included
            .map(|v| v.to_string())
            .unwrap_or_default(),
        record.scraped_at.to_rfc3339(),
        opt_int(record.age.map(i64::from)),
        id.to_string(),
    ]
}

/// min/median/max over one numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl FieldSummary {
    fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        Some(Self {
            min: values[0],
            median,
            max: values[values.len() - 1],
        })
    }
}

#[derive(Debug, Default)]
pub struct StoreStats {
    pub total_records: usize,
    pub by_source: BTreeMap<String, usize>,
    pub price: Option<FieldSummary>,
    pub mileage: Option<FieldSummary>,
    pub year: Option<FieldSummary>,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total records: {}", self.total_records)?;
        if !self.by_source.is_empty() {
            writeln!(f, "By source:")?;
            for (source, count) in &self.by_source {
                writeln!(f, "  {source}: {count}")?;
            }
        }
        let summary = |label: &str, s: &Option<FieldSummary>| match s {
            Some(s) => format!(
                "{label}: min {:.0} / median {:.0} / max {:.0}",
                s.min, s.median, s.max
            ),
            None => format!("{label}: no data"),
        };
        writeln!(f, "{}", summary("Price", &self.price))?;
        writeln!(f, "{}", summary("Mileage", &self.mileage))?;
        write!(f, "{}", summary("Year", &self.year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vansweep_common::{ListingType, Source};

    fn record(url: &str, title: &str, price: Option<f64>, source: Source) -> ListingRecord {
        ListingRecord {
            title: title.to_string(),
            year: Some(2019),
            mileage: Some(60_000),
            price,
            description: "panel van".to_string(),
            image_url: String::new(),
            url: url.to_string(),
            search_key: "M1 1AA".to_string(),
            source,
            listing_type: ListingType::FixedPrice,
            vat_included: Some(true),
            scraped_at: Utc::now(),
            age: Some(7),
        }
    }

    fn temp_store() -> (tempfile::TempDir, CanonicalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CanonicalStore::open(dir.path().join("listings.csv")).unwrap();
        (dir, store)
    }

    #[test]
    fn same_url_in_one_batch_stores_one_row() {
        let (_dir, mut store) = temp_store();
        let batch = vec![
            record("http://x/1", "Transit A", Some(10_000.0), Source::Ebay),
            record("http://x/1", "Transit A again", Some(10_000.0), Source::Ebay),
        ];
        assert_eq!(store.append_batch(&batch).unwrap(), 1);
        assert_eq!(store.stats().unwrap().total_records, 1);
    }

    #[test]
    fn replaying_a_batch_inserts_nothing() {
        let (_dir, mut store) = temp_store();
        let batch = vec![
            record("http://x/1", "A", Some(8_000.0), Source::AutoTrader),
            record("http://x/2", "B", Some(9_000.0), Source::AutoTrader),
        ];
        assert_eq!(store.append_batch(&batch).unwrap(), 2);
        assert_eq!(store.append_batch(&batch).unwrap(), 0);
        assert_eq!(store.stats().unwrap().total_records, 2);
    }

    #[test]
    fn disjoint_batches_sum() {
        let (_dir, mut store) = temp_store();
        let first = vec![
            record("http://x/1", "A", Some(8_000.0), Source::Gumtree),
            record("http://x/2", "B", None, Source::Gumtree),
        ];
        let second = vec![
            record("http://x/3", "C", Some(11_000.0), Source::Facebook),
            // Cross-batch duplicate of x/1.
            record("http://x/1", "A", Some(8_000.0), Source::Gumtree),
        ];
        assert_eq!(store.append_batch(&first).unwrap(), 2);
        assert_eq!(store.append_batch(&second).unwrap(), 1);
        assert_eq!(store.stats().unwrap().total_records, 3);
    }

    #[test]
    fn reopen_preserves_identities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.csv");
        let batch = vec![record("http://x/1", "A", Some(8_000.0), Source::Ebay)];

        let mut store = CanonicalStore::open(&path).unwrap();
        assert_eq!(store.append_batch(&batch).unwrap(), 1);
        drop(store);

        let mut reopened = CanonicalStore::open(&path).unwrap();
        assert_eq!(reopened.append_batch(&batch).unwrap(), 0);
        assert_eq!(reopened.total_records(), 1);
    }

    #[test]
    fn stats_summarize_numeric_fields() {
        let (_dir, mut store) = temp_store();
        let batch = vec![
            record("http://x/1", "A", Some(5_000.0), Source::Ebay),
            record("http://x/2", "B", Some(10_000.0), Source::Ebay),
            record("http://x/3", "C", Some(20_000.0), Source::Gumtree),
            record("http://x/4", "D", None, Source::Gumtree),
        ];
        store.append_batch(&batch).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.by_source.get("ebay"), Some(&2));
        assert_eq!(stats.by_source.get("gumtree"), Some(&2));

        let price = stats.price.unwrap();
        assert_eq!(price.min, 5_000.0);
        assert_eq!(price.median, 10_000.0);
        assert_eq!(price.max, 20_000.0);
    }

    #[test]
    fn field_tuple_identity_dedups_without_urls() {
        let (_dir, mut store) = temp_store();
        let batch = vec![
            record("", "Transit LWB", Some(7_500.0), Source::Facebook),
            record("", "Transit LWB", Some(7_500.0), Source::Facebook),
        ];
        assert_eq!(store.append_batch(&batch).unwrap(), 1);
    }
}
