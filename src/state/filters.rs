/// Filter selections for the gallery
///
/// A `FilterSet` is the query identity: two fetches belong to the same
/// feed iff their filter sets are equal. The `FilterStateStore` holds the
/// current selection per scope and is owned by the composition root, so
/// a selection survives as long as the root that owns the store.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Well-known filter keys (camelCase, as sent to the query source)
pub mod keys {
    pub const SORT: &str = "sort";
    pub const PERIOD: &str = "period";
    pub const MODEL_ID: &str = "modelId";
    pub const MODEL_VERSION_ID: &str = "modelVersionId";
    pub const USERNAME: &str = "username";
    pub const EXCLUDE_CROSS_POSTS: &str = "excludeCrossPosts";
}

/// A single filter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl FilterValue {
    /// Empty text carries no filter meaning and never reaches a query source
    pub fn is_empty(&self) -> bool {
        matches!(self, FilterValue::Text(text) if text.is_empty())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Flag(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<ImageSort> for FilterValue {
    fn from(value: ImageSort) -> Self {
        FilterValue::Text(value.as_str().to_string())
    }
}

impl From<MetricPeriod> for FilterValue {
    fn from(value: MetricPeriod) -> Self {
        FilterValue::Text(value.as_str().to_string())
    }
}

/// Ordered mapping from filter key to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, FilterValue>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<FilterValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Insert when `value` is present, drop the key otherwise
    pub fn set_optional<V: Into<FilterValue>>(&mut self, key: &str, value: Option<V>) {
        match value {
            Some(value) => self.insert(key, value),
            None => {
                self.0.remove(key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(FilterValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn number(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(FilterValue::Number(number)) => Some(*number),
            _ => None,
        }
    }

    /// Flag value, `false` when absent
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(FilterValue::Flag(true)))
    }

    pub fn sort(&self) -> Option<ImageSort> {
        self.text(keys::SORT).and_then(|s| s.parse().ok())
    }

    pub fn period(&self) -> Option<MetricPeriod> {
        self.text(keys::PERIOD).and_then(|s| s.parse().ok())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Shallow merge: keys in `patch` overwrite, `None` clears
    pub fn apply(&mut self, patch: &FilterPatch) {
        for (key, value) in &patch.0 {
            match value {
                Some(value) => {
                    self.0.insert(key.clone(), value.clone());
                }
                None => {
                    self.0.remove(key);
                }
            }
        }
    }

    /// Copy with every empty-valued key removed
    pub fn without_empty(&self) -> FilterSet {
        FilterSet(
            self.0
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}

/// Partial update for a `FilterSet`.
///
/// `Some(value)` overwrites a key, `None` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterPatch(BTreeMap<String, Option<FilterValue>>);

impl FilterPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<FilterValue>) -> Self {
        self.0.insert(key.to_string(), Some(value.into()));
        self
    }

    pub fn clear(mut self, key: &str) -> Self {
        self.0.insert(key.to_string(), None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` on top of this patch
    fn absorb(&mut self, other: &FilterPatch) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

/// Named filter scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterScope {
    /// Images shown on a model page
    ModelImages,
    /// Global image feed
    Images,
    /// Global post feed
    Posts,
}

/// Image ordering offered by the gallery sort picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSort {
    #[serde(rename = "Most Reactions")]
    MostReactions,
    #[serde(rename = "Most Comments")]
    MostComments,
    #[serde(rename = "Most Collected")]
    MostCollected,
    Newest,
    Oldest,
}

impl ImageSort {
    pub const ALL: [ImageSort; 5] = [
        ImageSort::MostReactions,
        ImageSort::MostComments,
        ImageSort::MostCollected,
        ImageSort::Newest,
        ImageSort::Oldest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSort::MostReactions => "Most Reactions",
            ImageSort::MostComments => "Most Comments",
            ImageSort::MostCollected => "Most Collected",
            ImageSort::Newest => "Newest",
            ImageSort::Oldest => "Oldest",
        }
    }
}

impl fmt::Display for ImageSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageSort::ALL
            .into_iter()
            .find(|sort| sort.as_str() == s)
            .ok_or_else(|| format!("unknown sort: {}", s))
    }
}

/// Time window for metric-based filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricPeriod {
    Day,
    Week,
    Month,
    Year,
    AllTime,
}

impl MetricPeriod {
    pub const ALL: [MetricPeriod; 5] = [
        MetricPeriod::Day,
        MetricPeriod::Week,
        MetricPeriod::Month,
        MetricPeriod::Year,
        MetricPeriod::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricPeriod::Day => "Day",
            MetricPeriod::Week => "Week",
            MetricPeriod::Month => "Month",
            MetricPeriod::Year => "Year",
            MetricPeriod::AllTime => "AllTime",
        }
    }

    /// Length of the window, `None` for all time
    pub fn window(&self) -> Option<chrono::Duration> {
        match self {
            MetricPeriod::Day => Some(chrono::Duration::days(1)),
            MetricPeriod::Week => Some(chrono::Duration::weeks(1)),
            MetricPeriod::Month => Some(chrono::Duration::days(30)),
            MetricPeriod::Year => Some(chrono::Duration::days(365)),
            MetricPeriod::AllTime => None,
        }
    }
}

impl fmt::Display for MetricPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricPeriod::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| format!("unknown period: {}", s))
    }
}

#[derive(Debug, Clone, Default)]
struct ScopeState {
    defaults: FilterSet,
    overrides: FilterPatch,
    revision: u64,
}

/// Serialized form of the store (revisions are not persisted)
#[derive(Serialize, Deserialize)]
struct ScopeSnapshot {
    scope: FilterScope,
    overrides: FilterPatch,
}

/// Current filter selection per scope
#[derive(Debug, Clone, Default)]
pub struct FilterStateStore {
    scopes: HashMap<FilterScope, ScopeState>,
}

impl FilterStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mount-time defaults for a scope. Overrides are kept.
    pub fn register_defaults(&mut self, scope: FilterScope, defaults: FilterSet) {
        let state = self.scopes.entry(scope).or_default();
        state.defaults = defaults;
        state.revision += 1;
    }

    /// The scope's effective filters: defaults with overrides applied
    pub fn get(&self, scope: FilterScope) -> FilterSet {
        match self.scopes.get(&scope) {
            Some(state) => {
                let mut filters = state.defaults.clone();
                filters.apply(&state.overrides);
                filters
            }
            None => FilterSet::new(),
        }
    }

    /// Shallow-merge `patch` into the scope and bump its revision
    pub fn set(&mut self, scope: FilterScope, patch: FilterPatch) {
        let state = self.scopes.entry(scope).or_default();
        state.overrides.absorb(&patch);
        state.revision += 1;
        debug!(?scope, revision = state.revision, "filters updated");
    }

    /// Drop every override, returning the scope to its defaults
    pub fn reset(&mut self, scope: FilterScope) {
        if let Some(state) = self.scopes.get_mut(&scope) {
            state.overrides = FilterPatch::new();
            state.revision += 1;
        }
    }

    /// Monotonic counter, changes on every `set`, `reset` or new defaults
    pub fn revision(&self, scope: FilterScope) -> u64 {
        self.scopes.get(&scope).map_or(0, |state| state.revision)
    }

    /// Convert the user's selections to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut snapshot: Vec<ScopeSnapshot> = self
            .scopes
            .iter()
            .filter(|(_, state)| !state.overrides.is_empty())
            .map(|(scope, state)| ScopeSnapshot {
                scope: *scope,
                overrides: state.overrides.clone(),
            })
            .collect();
        snapshot.sort_by_key(|entry| format!("{:?}", entry.scope));
        serde_json::to_string(&snapshot)
    }

    /// Restore selections saved with `to_json`. Defaults start empty.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let snapshot: Vec<ScopeSnapshot> = serde_json::from_str(json)?;
        let mut store = Self::new();
        for entry in snapshot {
            store.set(entry.scope, entry.overrides);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_image_defaults() -> FilterSet {
        FilterSet::new()
            .with(keys::SORT, ImageSort::Newest)
            .with(keys::PERIOD, MetricPeriod::AllTime)
    }

    #[test]
    fn test_set_merges_shallowly() {
        let mut store = FilterStateStore::new();
        store.register_defaults(FilterScope::ModelImages, model_image_defaults());

        store.set(
            FilterScope::ModelImages,
            FilterPatch::new().set(keys::PERIOD, MetricPeriod::Week),
        );
        store.set(
            FilterScope::ModelImages,
            FilterPatch::new().set(keys::EXCLUDE_CROSS_POSTS, true),
        );

        let filters = store.get(FilterScope::ModelImages);
        assert_eq!(filters.sort(), Some(ImageSort::Newest));
        assert_eq!(filters.period(), Some(MetricPeriod::Week));
        assert!(filters.flag(keys::EXCLUDE_CROSS_POSTS));
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut store = FilterStateStore::new();
        store.set(FilterScope::Images, FilterPatch::new().set(keys::SORT, ImageSort::Oldest));

        assert_eq!(store.get(FilterScope::Images).sort(), Some(ImageSort::Oldest));
        assert!(store.get(FilterScope::Posts).is_empty());
        assert_eq!(store.revision(FilterScope::Posts), 0);
    }

    #[test]
    fn test_revision_bumps_on_every_change() {
        let mut store = FilterStateStore::new();
        store.register_defaults(FilterScope::ModelImages, model_image_defaults());
        let before = store.revision(FilterScope::ModelImages);

        store.set(FilterScope::ModelImages, FilterPatch::new().set(keys::USERNAME, "ayman"));
        assert!(store.revision(FilterScope::ModelImages) > before);

        let mid = store.revision(FilterScope::ModelImages);
        store.reset(FilterScope::ModelImages);
        assert!(store.revision(FilterScope::ModelImages) > mid);
        assert_eq!(store.get(FilterScope::ModelImages), model_image_defaults());
    }

    #[test]
    fn test_clearing_a_default_key() {
        let mut store = FilterStateStore::new();
        store.register_defaults(FilterScope::ModelImages, model_image_defaults());
        store.set(FilterScope::ModelImages, FilterPatch::new().clear(keys::PERIOD));

        assert_eq!(store.get(FilterScope::ModelImages).period(), None);
    }

    #[test]
    fn test_without_empty_drops_blank_text() {
        let filters = FilterSet::new()
            .with(keys::USERNAME, "")
            .with(keys::MODEL_ID, 42i64)
            .with(keys::EXCLUDE_CROSS_POSTS, false);

        let cleaned = filters.without_empty();
        assert_eq!(cleaned.get(keys::USERNAME), None);
        assert_eq!(cleaned.number(keys::MODEL_ID), Some(42));
        // false is a real value, not an empty one
        assert_eq!(cleaned.get(keys::EXCLUDE_CROSS_POSTS), Some(&FilterValue::Flag(false)));
    }

    #[test]
    fn test_json_snapshot() {
        let mut store = FilterStateStore::new();
        store.register_defaults(FilterScope::ModelImages, model_image_defaults());
        store.set(
            FilterScope::ModelImages,
            FilterPatch::new().set(keys::SORT, ImageSort::MostReactions).clear(keys::PERIOD),
        );

        let json = store.to_json().unwrap();
        let mut restored = FilterStateStore::from_json(&json).unwrap();
        restored.register_defaults(FilterScope::ModelImages, model_image_defaults());

        assert_eq!(restored.get(FilterScope::ModelImages), store.get(FilterScope::ModelImages));
    }

    #[test]
    fn test_sort_and_period_parse() {
        assert_eq!("Most Comments".parse::<ImageSort>(), Ok(ImageSort::MostComments));
        assert_eq!("AllTime".parse::<MetricPeriod>(), Ok(MetricPeriod::AllTime));
        assert!("Forever".parse::<MetricPeriod>().is_err());
        assert_eq!(MetricPeriod::AllTime.window(), None);
    }
}
