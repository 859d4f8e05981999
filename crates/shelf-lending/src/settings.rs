use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use shelf_types::TimeUnit;
use tracing::{debug, info};

use crate::error::{LendingError, LendingResult};
use crate::fine::FinePolicy;

/// Longest borrow period, in days, that settings may configure.
pub const MAX_BORROW_DAYS: i64 = 36_500;

/// Configuration keys read by the lending service.
pub mod keys {
    pub const BORROW_DURATION: &str = "borrow_duration";
    pub const BORROW_DURATION_UNIT: &str = "borrow_duration_unit";
    pub const FINE_AMOUNT: &str = "fine_amount";
    /// Legacy name for `fine_amount`, read only when `fine_amount` is absent.
    pub const FINE_PER_DAY: &str = "fine_per_day";
    pub const FINE_UNIT: &str = "fine_unit";
    pub const FINE_DURATION: &str = "fine_duration";
    pub const MAX_BORROW_LIMIT: &str = "max_borrow_limit";
}

/// Key-value configuration store. Values are stored as strings and parsed
/// by [`SettingsProvider`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> LendingResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> LendingResult<()>;

    async fn all(&self) -> LendingResult<BTreeMap<String, String>>;
}

/// Process-local [`ConfigStore`].
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding exactly `values`.
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// A store seeded with [`Settings::default`] and then `overrides`.
    ///
    /// If `overrides` sets the legacy `fine_per_day` without `fine_amount`,
    /// the default `fine_amount` is not seeded so the legacy value is used.
    pub fn with_defaults(overrides: BTreeMap<String, String>) -> Self {
        let mut values = Settings::default().to_values();
        if overrides.contains_key(keys::FINE_PER_DAY) && !overrides.contains_key(keys::FINE_AMOUNT) {
            values.remove(keys::FINE_AMOUNT);
        }
        values.extend(overrides);
        Self::from_values(values)
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> LendingResult<Option<String>> {
        let values = self.values.read().map_err(|_| LendingError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> LendingResult<()> {
        let mut values = self.values.write().map_err(|_| LendingError::LockPoisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn all(&self) -> LendingResult<BTreeMap<String, String>> {
        let values = self.values.read().map_err(|_| LendingError::LockPoisoned)?;
        Ok(values.clone())
    }
}

/// Typed view over the configuration store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub borrow_duration: i64,
    pub borrow_duration_unit: TimeUnit,
    pub fine_amount: i64,
    pub fine_unit: TimeUnit,
    pub fine_duration: i64,
    pub max_borrow_limit: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            borrow_duration: 7,
            borrow_duration_unit: TimeUnit::Day,
            fine_amount: 1000,
            fine_unit: TimeUnit::Day,
            fine_duration: 1,
            max_borrow_limit: 3,
        }
    }
}

impl Settings {
    /// How long a new borrow runs before it is due. Fails when the
    /// configured period exceeds [`MAX_BORROW_DAYS`].
    pub fn borrow_period(&self) -> LendingResult<Duration> {
        borrow_period(self.borrow_duration, self.borrow_duration_unit)
            .ok_or(LendingError::OutOfRange("borrow period"))
    }

    pub fn fine_policy(&self) -> FinePolicy {
        FinePolicy {
            amount: self.fine_amount,
            unit: self.fine_unit,
            duration: self.fine_duration,
        }
    }

    fn to_values(&self) -> BTreeMap<String, String> {
        [
            (keys::BORROW_DURATION, self.borrow_duration.to_string()),
            (keys::BORROW_DURATION_UNIT, self.borrow_duration_unit.to_string()),
            (keys::FINE_AMOUNT, self.fine_amount.to_string()),
            (keys::FINE_UNIT, self.fine_unit.to_string()),
            (keys::FINE_DURATION, self.fine_duration.to_string()),
            (keys::MAX_BORROW_LIMIT, self.max_borrow_limit.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Partial settings update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub borrow_duration: Option<i64>,
    pub borrow_duration_unit: Option<String>,
    pub fine_amount: Option<i64>,
    pub fine_unit: Option<String>,
    pub fine_duration: Option<i64>,
    pub max_borrow_limit: Option<i64>,
}

impl SettingsUpdate {
    /// Validate every supplied field against `current` and return the
    /// key/value writes.
    fn to_writes(&self, current: &Settings) -> LendingResult<Vec<(&'static str, String)>> {
        let mut writes = Vec::new();

        if let Some(v) = self.borrow_duration {
            writes.push((keys::BORROW_DURATION, at_least(keys::BORROW_DURATION, v, 1)?));
        }
        let mut borrow_unit = None;
        if let Some(unit) = &self.borrow_duration_unit {
            let parsed = parse_unit(keys::BORROW_DURATION_UNIT, unit)?;
            if !parsed.is_borrow_unit() {
                return Err(LendingError::InvalidSetting {
                    key: keys::BORROW_DURATION_UNIT,
                    reason: "must be one of minute, hour, day".into(),
                });
            }
            writes.push((keys::BORROW_DURATION_UNIT, parsed.to_string()));
            borrow_unit = Some(parsed);
        }
        if self.borrow_duration.is_some() || borrow_unit.is_some() {
            let duration = self.borrow_duration.unwrap_or(current.borrow_duration);
            let unit = borrow_unit.unwrap_or(current.borrow_duration_unit);
            if borrow_period(duration, unit).is_none() {
                return Err(LendingError::InvalidSetting {
                    key: keys::BORROW_DURATION,
                    reason: format!("borrow period must not exceed {MAX_BORROW_DAYS} days"),
                });
            }
        }
        if let Some(v) = self.fine_amount {
            writes.push((keys::FINE_AMOUNT, at_least(keys::FINE_AMOUNT, v, 0)?));
        }
        if let Some(unit) = &self.fine_unit {
            writes.push((keys::FINE_UNIT, parse_unit(keys::FINE_UNIT, unit)?.to_string()));
        }
        if let Some(v) = self.fine_duration {
            writes.push((keys::FINE_DURATION, at_least(keys::FINE_DURATION, v, 1)?));
        }
        if let Some(v) = self.max_borrow_limit {
            writes.push((keys::MAX_BORROW_LIMIT, at_least(keys::MAX_BORROW_LIMIT, v, 1)?));
        }

        Ok(writes)
    }
}

fn borrow_period(duration: i64, unit: TimeUnit) -> Option<Duration> {
    duration
        .checked_mul(unit.minutes())
        .filter(|minutes| *minutes <= MAX_BORROW_DAYS * TimeUnit::Day.minutes())
        .and_then(Duration::try_minutes)
}

fn at_least(key: &'static str, value: i64, min: i64) -> LendingResult<String> {
    if value < min {
        return Err(LendingError::InvalidSetting {
            key,
            reason: format!("must be at least {min}"),
        });
    }
    Ok(value.to_string())
}

fn parse_unit(key: &'static str, value: &str) -> LendingResult<TimeUnit> {
    TimeUnit::from_str(value).map_err(|e| LendingError::InvalidSetting {
        key,
        reason: e.to_string(),
    })
}

/// Reads [`Settings`] from a [`ConfigStore`], applying defaults for missing
/// or unparsable values.
#[derive(Clone)]
pub struct SettingsProvider {
    store: Arc<dyn ConfigStore>,
}

impl SettingsProvider {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub async fn load(&self) -> LendingResult<Settings> {
        let defaults = Settings::default();

        let borrow_duration = self
            .int(keys::BORROW_DURATION, |v| v > 0)
            .await?
            .unwrap_or(defaults.borrow_duration);
        let borrow_duration_unit = self
            .text(keys::BORROW_DURATION_UNIT)
            .await?
            .map(|s| TimeUnit::parse_borrow_lossy(&s))
            .unwrap_or(defaults.borrow_duration_unit);

        let fine_amount = match self.store.get(keys::FINE_AMOUNT).await? {
            Some(raw) => parse_int(&raw, |v| v >= 0).unwrap_or(defaults.fine_amount),
            None => self
                .int(keys::FINE_PER_DAY, |v| v >= 0)
                .await?
                .unwrap_or(defaults.fine_amount),
        };
        let fine_unit = self
            .text(keys::FINE_UNIT)
            .await?
            .map(|s| TimeUnit::parse_lossy(&s))
            .unwrap_or(defaults.fine_unit);
        let fine_duration = self
            .int(keys::FINE_DURATION, |v| v > 0)
            .await?
            .unwrap_or(defaults.fine_duration);
        let max_borrow_limit = self
            .int(keys::MAX_BORROW_LIMIT, |v| v > 0)
            .await?
            .unwrap_or(defaults.max_borrow_limit);

        let settings = Settings {
            borrow_duration,
            borrow_duration_unit,
            fine_amount,
            fine_unit,
            fine_duration,
            max_borrow_limit,
        };
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    /// Validate `update` as a whole, then write only the supplied fields.
    pub async fn update(&self, update: &SettingsUpdate) -> LendingResult<Settings> {
        let current = self.load().await?;
        let writes = update.to_writes(&current)?;
        for (key, value) in &writes {
            self.store.set(key, value.clone()).await?;
        }
        info!(fields = writes.len(), "settings updated");
        self.load().await
    }

    async fn int(&self, key: &str, valid: impl Fn(i64) -> bool) -> LendingResult<Option<i64>> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|raw| parse_int(&raw, valid)))
    }

    async fn text(&self, key: &str) -> LendingResult<Option<String>> {
        Ok(self.store.get(key).await?.filter(|s| !s.trim().is_empty()))
    }
}

fn parse_int(raw: &str, valid: impl Fn(i64) -> bool) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|v| valid(*v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(values: &[(&str, &str)]) -> SettingsProvider {
        SettingsProvider::new(Arc::new(InMemoryConfigStore::from_values(
            values.iter().map(|(k, v)| (*k, *v)),
        )))
    }

    #[tokio::test]
    async fn empty_store_yields_defaults() {
        assert_eq!(provider(&[]).load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn reads_typed_values() {
        let s = provider(&[
            ("borrow_duration", "2"),
            ("borrow_duration_unit", "hour"),
            ("fine_amount", "250"),
            ("fine_unit", "month"),
            ("fine_duration", "3"),
            ("max_borrow_limit", "5"),
        ])
        .load()
        .await
        .unwrap();
        assert_eq!(s.borrow_period().unwrap(), Duration::hours(2));
        assert_eq!(s.fine_policy(), FinePolicy { amount: 250, unit: TimeUnit::Month, duration: 3 });
        assert_eq!(s.max_borrow_limit, 5);
    }

    #[tokio::test]
    async fn garbage_falls_back_to_defaults() {
        let s = provider(&[
            ("borrow_duration", "soon"),
            ("borrow_duration_unit", "fortnight"),
            ("fine_unit", ""),
            ("fine_duration", "0"),
            ("max_borrow_limit", "-1"),
        ])
        .load()
        .await
        .unwrap();
        assert_eq!(s, Settings::default());
    }

    #[tokio::test]
    async fn month_is_not_a_borrow_unit() {
        let s = provider(&[("borrow_duration_unit", "month")]).load().await.unwrap();
        assert_eq!(s.borrow_duration_unit, TimeUnit::Day);
    }

    #[tokio::test]
    async fn legacy_fine_per_day_used_only_when_fine_amount_absent() {
        let legacy = provider(&[("fine_per_day", "700")]).load().await.unwrap();
        assert_eq!(legacy.fine_amount, 700);

        let both = provider(&[("fine_per_day", "700"), ("fine_amount", "0")])
            .load()
            .await
            .unwrap();
        assert_eq!(both.fine_amount, 0);
    }

    #[tokio::test]
    async fn update_writes_only_supplied_fields() {
        let store = Arc::new(InMemoryConfigStore::new());
        let provider = SettingsProvider::new(store.clone());

        let update = SettingsUpdate {
            max_borrow_limit: Some(5),
            fine_unit: Some("Hour".into()),
            ..SettingsUpdate::default()
        };
        let s = provider.update(&update).await.unwrap();
        assert_eq!(s.max_borrow_limit, 5);
        assert_eq!(s.fine_unit, TimeUnit::Hour);

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["fine_unit"], "hour");
    }

    #[tokio::test]
    async fn invalid_update_writes_nothing() {
        let store = Arc::new(InMemoryConfigStore::new());
        let provider = SettingsProvider::new(store.clone());

        let update = SettingsUpdate {
            max_borrow_limit: Some(4),
            borrow_duration_unit: Some("month".into()),
            ..SettingsUpdate::default()
        };
        let err = provider.update(&update).await.unwrap_err();
        assert!(matches!(
            err,
            LendingError::InvalidSetting { key: "borrow_duration_unit", .. }
        ));
        assert!(store.all().await.unwrap().is_empty());

        let negative = SettingsUpdate {
            fine_amount: Some(-5),
            ..SettingsUpdate::default()
        };
        assert!(provider.update(&negative).await.is_err());
    }

    #[tokio::test]
    async fn oversized_borrow_period_is_never_stored() {
        let store = Arc::new(InMemoryConfigStore::new());
        let provider = SettingsProvider::new(store.clone());

        let huge = SettingsUpdate {
            borrow_duration: Some(1_000_000_000),
            ..SettingsUpdate::default()
        };
        let err = provider.update(&huge).await.unwrap_err();
        assert!(matches!(err, LendingError::InvalidSetting { key: "borrow_duration", .. }));
        assert!(store.all().await.unwrap().is_empty());

        // Fits in minutes, but not once the stored unit becomes days.
        let minutes = SettingsUpdate {
            borrow_duration: Some(1_000_000),
            borrow_duration_unit: Some("minute".into()),
            ..SettingsUpdate::default()
        };
        provider.update(&minutes).await.unwrap();
        let days = SettingsUpdate {
            borrow_duration_unit: Some("day".into()),
            ..SettingsUpdate::default()
        };
        assert!(provider.update(&days).await.is_err());
        assert_eq!(store.get("borrow_duration_unit").await.unwrap().as_deref(), Some("minute"));

        let at_cap = SettingsUpdate {
            borrow_duration: Some(MAX_BORROW_DAYS),
            borrow_duration_unit: Some("day".into()),
            ..SettingsUpdate::default()
        };
        let s = provider.update(&at_cap).await.unwrap();
        assert_eq!(s.borrow_period().unwrap(), Duration::days(MAX_BORROW_DAYS));
    }

    #[tokio::test]
    async fn stored_oversized_period_is_an_error_not_a_panic() {
        let s = provider(&[("borrow_duration", "9223372036854775807")])
            .load()
            .await
            .unwrap();
        assert_eq!(s.borrow_period().unwrap_err(), LendingError::OutOfRange("borrow period"));
    }

    #[tokio::test]
    async fn defaults_seed_respects_legacy_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert("fine_per_day".to_string(), "300".to_string());
        let store = InMemoryConfigStore::with_defaults(overrides);
        assert!(store.get("fine_amount").await.unwrap().is_none());
        assert_eq!(store.get("max_borrow_limit").await.unwrap().as_deref(), Some("3"));

        let provider = SettingsProvider::new(Arc::new(store));
        assert_eq!(provider.load().await.unwrap().fine_amount, 300);
    }

    #[test]
    fn settings_wire_format() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["borrow_duration_unit"], "day");
        assert_eq!(json["fine_amount"], 1000);
    }
}
