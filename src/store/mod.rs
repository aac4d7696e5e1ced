//! Record store: per-dataset record streams, their category domains and
//! time extents.
//!
//! The store is populated once from fully loaded datasets and is read-only
//! afterwards. Ingestion is the only place records are checked; everything
//! downstream trusts that metrics are finite and non-negative.
//!
//! # Bundle format
//!
//! ```json
//! {
//!   "ads":         [{ "date": "2020-01-06", "party": "Democratic", "spend": 1200.0 }],
//!   "requests":    [{ "date": "2019-12-31", "requests": 51000, "accounts": 90000, "disclosure_rate": 85.0 }],
//!   "removals":    [{ "date": "2019-12-31", "reason": "Defamation", "total": 310 }],
//!   "state_spend": [{ "state": "Ohio", "spend": 1500000.0 }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::types::{ACCOUNTS_FIELD, DISCLOSURE_RATE_FIELD, REQUESTS_FIELD};
use crate::model::{
    AdRecord, CategoryKey, DatasetId, Party, Record, RemovalRecord, RequestRecord,
    StateSpendRecord, TimeRange,
};

/// Errors raised while loading or querying datasets.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dataset '{0}' has not been loaded")]
    DatasetNotFound(DatasetId),

    #[error("failed to read dataset bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse dataset bundle: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid {dataset} record #{index}: {reason}")]
    InvalidRecord {
        dataset: DatasetId,
        index: usize,
        reason: String,
    },

    #[error("loading dataset '{dataset}' failed: {message}")]
    Load { dataset: DatasetId, message: String },
}

/// A pending dataset load, resolved by `Session::init`.
pub type DatasetLoad = LocalBoxFuture<'static, Result<(DatasetId, Vec<Record>), StoreError>>;

// ---------------------------------------------------------------------------
// CategoryDomain
// ---------------------------------------------------------------------------

/// Ordered, duplicate-free category set of one dataset, fixed at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategoryDomain(Vec<CategoryKey>);

impl CategoryDomain {
    pub fn new<I: IntoIterator<Item = CategoryKey>>(keys: I) -> Self {
        Self(keys.into_iter().unique().collect())
    }

    /// Domain for a dataset's records, in the dataset's canonical order.
    fn for_dataset(id: DatasetId, records: &[Record]) -> Self {
        match id {
            DatasetId::Ads => Self::new(Party::ALL.into_iter().map(CategoryKey::from)),
            DatasetId::Requests => Self::new(
                [REQUESTS_FIELD, ACCOUNTS_FIELD, DISCLOSURE_RATE_FIELD]
                    .into_iter()
                    .map(CategoryKey::from),
            ),
            DatasetId::Removals | DatasetId::StateSpend => {
                Self::new(records.iter().filter_map(Record::category))
            }
        }
    }

    pub fn keys(&self) -> &[CategoryKey] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CategoryKey> {
        self.0.iter()
    }

    pub fn contains(&self, key: &CategoryKey) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Bundle loading
// ---------------------------------------------------------------------------

/// All four datasets as typed JSON arrays. Missing arrays load as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetBundle {
    #[serde(default)]
    pub ads: Vec<AdRecord>,
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default)]
    pub removals: Vec<RemovalRecord>,
    #[serde(default, alias = "states")]
    pub state_spend: Vec<StateSpendRecord>,
}

impl DatasetBundle {
    /// Split into per-dataset record streams.
    pub fn into_datasets(self) -> Vec<(DatasetId, Vec<Record>)> {
        vec![
            (DatasetId::Ads, self.ads.into_iter().map(Record::Ad).collect()),
            (
                DatasetId::Requests,
                self.requests.into_iter().map(Record::Request).collect(),
            ),
            (
                DatasetId::Removals,
                self.removals.into_iter().map(Record::Removal).collect(),
            ),
            (
                DatasetId::StateSpend,
                self.state_spend.into_iter().map(Record::StateSpend).collect(),
            ),
        ]
    }

    /// One already-resolved load per dataset.
    pub fn into_loads(self) -> Vec<DatasetLoad> {
        self.into_datasets()
            .into_iter()
            .map(|loaded| futures::future::ready(Ok(loaded)).boxed_local())
            .collect()
    }
}

/// Parse a bundle from JSON text.
pub fn parse_bundle(json: &str) -> Result<DatasetBundle, StoreError> {
    Ok(serde_json::from_str(json)?)
}

/// Read and parse a bundle file.
pub fn load_bundle(path: &Path) -> Result<DatasetBundle, StoreError> {
    let content = std::fs::read_to_string(path)?;
    let bundle = parse_bundle(&content)?;
    debug!(
        path = %path.display(),
        ads = bundle.ads.len(),
        requests = bundle.requests.len(),
        removals = bundle.removals.len(),
        state_spend = bundle.state_spend.len(),
        "bundle parsed"
    );
    Ok(bundle)
}

/// Reject records the aggregator must never see.
fn check_record(dataset: DatasetId, index: usize, record: &Record) -> Result<(), StoreError> {
    let invalid = |reason: String| StoreError::InvalidRecord {
        dataset,
        index,
        reason,
    };
    if record.dataset() != dataset {
        return Err(invalid(format!(
            "record belongs to dataset '{}'",
            record.dataset()
        )));
    }
    for (name, value) in record.metrics() {
        if !value.is_finite() {
            return Err(invalid(format!("{name} is not finite")));
        }
        if value < 0.0 {
            return Err(invalid(format!("{name} is negative ({value})")));
        }
    }
    if let Some(req) = record.as_request()
        && req.disclosure_rate > 100.0
    {
        return Err(invalid(format!(
            "{DISCLOSURE_RATE_FIELD} exceeds 100 ({})",
            req.disclosure_rate
        )));
    }
    if let Some(key) = record.category()
        && key.as_str().trim().is_empty()
    {
        return Err(invalid("empty category".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Dataset {
    records: Vec<Record>,
    domain: CategoryDomain,
    extent: Option<TimeRange>,
}

/// Loaded datasets, keyed by id. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    datasets: BTreeMap<DatasetId, Dataset>,
}

impl RecordStore {
    /// Build a store from fully loaded record streams.
    ///
    /// Records are sorted ascending by timestamp (stable for ties). A dataset
    /// listed twice keeps its last stream.
    pub fn from_datasets<I>(loaded: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (DatasetId, Vec<Record>)>,
    {
        let mut datasets = BTreeMap::new();
        for (id, mut records) in loaded {
            for (index, record) in records.iter().enumerate() {
                check_record(id, index, record)?;
            }
            // Domain reflects source order, so it is taken before sorting.
            let domain = CategoryDomain::for_dataset(id, &records);
            records.sort_by_key(Record::timestamp);
            let extent = TimeRange::covering(records.iter().filter_map(Record::timestamp));
            debug!(
                dataset = %id,
                records = records.len(),
                categories = domain.len(),
                extent = ?extent,
                "dataset loaded"
            );
            datasets.insert(
                id,
                Dataset {
                    records,
                    domain,
                    extent,
                },
            );
        }
        Ok(Self { datasets })
    }

    pub fn from_bundle(bundle: DatasetBundle) -> Result<Self, StoreError> {
        Self::from_datasets(bundle.into_datasets())
    }

    fn dataset(&self, id: DatasetId) -> Result<&Dataset, StoreError> {
        self.datasets
            .get(&id)
            .ok_or(StoreError::DatasetNotFound(id))
    }

    /// Records of a dataset, ascending by timestamp.
    pub fn load(&self, id: DatasetId) -> Result<&[Record], StoreError> {
        Ok(&self.dataset(id)?.records)
    }

    /// `[min, max]` timestamp; `None` for empty or non-temporal datasets.
    pub fn extent(&self, id: DatasetId) -> Result<Option<TimeRange>, StoreError> {
        Ok(self.dataset(id)?.extent)
    }

    pub fn domain(&self, id: DatasetId) -> Result<&CategoryDomain, StoreError> {
        Ok(&self.dataset(id)?.domain)
    }

    /// Union of the extents of `ids` (the shared x-domain of aligned views).
    pub fn combined_extent(&self, ids: &[DatasetId]) -> Result<Option<TimeRange>, StoreError> {
        let mut combined: Option<TimeRange> = None;
        for id in ids {
            if let Some(extent) = self.extent(*id)? {
                combined = Some(match combined {
                    Some(c) => c.union(&extent),
                    None => extent,
                });
            }
        }
        Ok(combined)
    }

    /// Union extent across every loaded dataset.
    pub fn full_extent(&self) -> Option<TimeRange> {
        self.datasets
            .values()
            .filter_map(|d| d.extent)
            .reduce(|a, b| a.union(&b))
    }

    /// Every category of every loaded dataset, duplicates removed, in
    /// dataset order.
    ///
    /// Keys are not namespaced by dataset: a removal reason spelled like a
    /// party (`Other`) is one visible-set entry, toggled for both views.
    pub fn all_categories(&self) -> Vec<CategoryKey> {
        self.datasets
            .values()
            .flat_map(|d| d.domain.iter().cloned())
            .unique()
            .collect()
    }

    pub fn is_loaded(&self, id: DatasetId) -> bool {
        self.datasets.contains_key(&id)
    }

    pub fn loaded(&self) -> impl Iterator<Item = DatasetId> + '_ {
        self.datasets.keys().copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn removal(d: NaiveDate, reason: &str, total: f64) -> Record {
        Record::Removal(RemovalRecord {
            date: d,
            reason: reason.into(),
            total,
        })
    }

    #[test]
    fn unloaded_dataset_is_not_found() {
        let store = RecordStore::default();
        assert!(matches!(
            store.load(DatasetId::Ads),
            Err(StoreError::DatasetNotFound(DatasetId::Ads))
        ));
        assert!(store.extent(DatasetId::Removals).is_err());
    }

    #[test]
    fn records_sorted_stably_and_domain_in_source_order() {
        let store = RecordStore::from_datasets([(
            DatasetId::Removals,
            vec![
                removal(date(2020, 12, 31), "Privacy", 3.0),
                removal(date(2019, 12, 31), "Defamation", 1.0),
                removal(date(2019, 12, 31), "Copyright", 2.0),
            ],
        )])
        .unwrap();
        let records = store.load(DatasetId::Removals).unwrap();
        let reasons: Vec<_> = records
            .iter()
            .map(|r| r.category().unwrap().to_string())
            .collect();
        assert_eq!(reasons, vec!["Defamation", "Copyright", "Privacy"]);
        let domain: Vec<_> = store
            .domain(DatasetId::Removals)
            .unwrap()
            .iter()
            .map(CategoryKey::to_string)
            .collect();
        assert_eq!(domain, vec!["Privacy", "Defamation", "Copyright"]);
        let extent = store.extent(DatasetId::Removals).unwrap().unwrap();
        assert_eq!(extent.start(), date(2019, 12, 31));
        assert_eq!(extent.end(), date(2020, 12, 31));
    }

    #[test]
    fn ads_domain_is_party_order_even_when_absent() {
        let store = RecordStore::from_datasets([(DatasetId::Ads, vec![])]).unwrap();
        let domain = store.domain(DatasetId::Ads).unwrap();
        assert_eq!(domain.keys(), &[
            CategoryKey::from("Democratic"),
            CategoryKey::from("Republican"),
            CategoryKey::from("Other"),
        ]);
        assert_eq!(store.extent(DatasetId::Ads).unwrap(), None);
    }

    #[test]
    fn state_totals_have_no_extent() {
        let store = RecordStore::from_datasets([(
            DatasetId::StateSpend,
            vec![Record::StateSpend(StateSpendRecord {
                state: "Ohio".into(),
                spend: 10.0,
            })],
        )])
        .unwrap();
        assert_eq!(store.extent(DatasetId::StateSpend).unwrap(), None);
        assert_eq!(store.domain(DatasetId::StateSpend).unwrap().len(), 1);
    }

    #[test]
    fn ingestion_rejects_bad_metrics() {
        let err = RecordStore::from_datasets([(
            DatasetId::Removals,
            vec![removal(date(2020, 1, 1), "Spam", f64::NAN)],
        )])
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { index: 0, .. }));

        let err = RecordStore::from_datasets([(
            DatasetId::Removals,
            vec![
                removal(date(2020, 1, 1), "Spam", 1.0),
                removal(date(2020, 1, 1), "Spam", -1.0),
            ],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn ingestion_rejects_wrong_dataset_tag() {
        let err = RecordStore::from_datasets([(
            DatasetId::Ads,
            vec![removal(date(2020, 1, 1), "Spam", 1.0)],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("removals"));
    }

    #[test]
    fn combined_extent_unions_datasets() {
        let bundle = parse_bundle(
            r#"{
                "ads": [{"date": "2019-01-07", "party": "Democratic", "spend": 1}],
                "removals": [{"date": "2012-12-31", "reason": "Spam", "total": 4}]
            }"#,
        )
        .unwrap();
        let store = RecordStore::from_bundle(bundle).unwrap();
        let r = store
            .combined_extent(&[DatasetId::Ads, DatasetId::Removals])
            .unwrap()
            .unwrap();
        assert_eq!(r.start(), date(2012, 12, 31));
        assert_eq!(r.end(), date(2019, 1, 7));
        assert_eq!(store.full_extent(), Some(r));
        // Every bundle dataset is registered, even when empty.
        assert!(store.is_loaded(DatasetId::Requests));
    }

    #[test]
    fn all_categories_spans_domains() {
        let store = RecordStore::from_bundle(DatasetBundle::default()).unwrap();
        // Party keys plus request metric names; removals/states are empty.
        assert_eq!(store.all_categories().len(), 6);
    }

    #[test]
    fn same_named_keys_share_one_entry() {
        let bundle = parse_bundle(
            r#"{"removals": [{"date": "2019-12-31", "reason": "Other", "total": 4}]}"#,
        )
        .unwrap();
        let store = RecordStore::from_bundle(bundle).unwrap();
        let all = store.all_categories();
        let others = all.iter().filter(|k| k.as_str() == "Other").count();
        assert_eq!(others, 1);
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn bundle_parse_errors_surface() {
        assert!(matches!(parse_bundle("{ nope"), Err(StoreError::Parse(_))));
    }
}
