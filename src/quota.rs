//! Monthly quota cycle bookkeeping. Adding a month clamps to the last day of a
//! shorter target month and the clamped day carries into later cycles.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Locale;
use crate::store::{SharedStore, LAST_RESET_KEY, RENEWAL_AT_KEY, USAGE_ANCHOR_KEY};
use crate::usage::UsageCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RolloverPolicy {
    #[default]
    Anchored,
    Calendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverCheck {
    pub renews_at: Option<DateTime<Utc>>,
    pub rolled_over: bool,
}

pub struct QuotaClock {
    store: SharedStore,
    policy: RolloverPolicy,
}

impl QuotaClock {
    pub fn new(store: SharedStore, policy: RolloverPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RolloverPolicy {
        self.policy
    }

    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.read_instant(USAGE_ANCHOR_KEY)
    }

    /// Next renewal instant, or `None` before the first credited second.
    pub fn renews_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.policy {
            RolloverPolicy::Anchored => {
                let anchor = self.anchor()?;
                Some(
                    self.read_instant(RENEWAL_AT_KEY)
                        .unwrap_or_else(|| add_month(anchor)),
                )
            }
            RolloverPolicy::Calendar => {
                self.store.get(LAST_RESET_KEY)?;
                Some(next_month_start(now))
            }
        }
    }

    /// Starts the cycle at `now` unless one is already running.
    pub fn establish_anchor(&self, now: DateTime<Utc>) -> bool {
        match self.policy {
            RolloverPolicy::Anchored => {
                if self.anchor().is_some() {
                    return false;
                }
                self.start_cycle(now);
            }
            RolloverPolicy::Calendar => {
                if self.store.get(LAST_RESET_KEY).is_some() {
                    return false;
                }
                self.start_cycle(now);
            }
        }
        info!("Usage cycle anchored at {}", now.to_rfc3339());
        true
    }

    /// Resets `usage` and restarts the cycle when the current one has lapsed.
    /// Running it again with the same `now` changes nothing.
    ///
    /// Usage found without a cycle (lost anchor, legacy data) is kept and a
    /// cycle is started at `now`, so the allowance renews a month later.
    pub fn check_rollover(&self, now: DateTime<Utc>, usage: &mut UsageCounter) -> RolloverCheck {
        let lapsed = match self.policy {
            RolloverPolicy::Anchored => self.renews_at(now).map(|renews_at| now >= renews_at),
            RolloverPolicy::Calendar => self
                .store
                .get(LAST_RESET_KEY)
                .map(|marker| marker != month_key(now)),
        };

        let Some(lapsed) = lapsed else {
            if usage.used_secs() > 0 {
                warn!(
                    "Found {}s of usage without a cycle, anchoring at {}",
                    usage.used_secs(),
                    now.to_rfc3339()
                );
                self.start_cycle(now);
            }
            return RolloverCheck {
                renews_at: self.renews_at(now),
                rolled_over: false,
            };
        };

        if lapsed {
            usage.reset();
            self.start_cycle(now);
            info!(
                "Usage cycle rolled over at {}, renews at {:?}",
                now.to_rfc3339(),
                self.renews_at(now).map(|t| t.to_rfc3339())
            );
        } else {
            debug!("Usage cycle still active at {}", now.to_rfc3339());
        }

        RolloverCheck {
            renews_at: self.renews_at(now),
            rolled_over: lapsed,
        }
    }

    fn start_cycle(&self, now: DateTime<Utc>) {
        self.write(USAGE_ANCHOR_KEY, &now.to_rfc3339());
        match self.policy {
            RolloverPolicy::Anchored => self.write(RENEWAL_AT_KEY, &add_month(now).to_rfc3339()),
            RolloverPolicy::Calendar => self.write(LAST_RESET_KEY, &month_key(now)),
        }
    }

    fn read_instant(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.store.get(key)?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!("Ignoring corrupt timestamp under {}: {}", key, e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}

/// One calendar month later, clamped to the end of a shorter month.
pub fn add_month(t: DateTime<Utc>) -> DateTime<Utc> {
    t.checked_add_months(Months::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn month_key(t: DateTime<Utc>) -> String {
    t.format("%Y-%m").to_string()
}

const MONTHS_ES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio",
    "julio", "agosto", "septiembre", "octubre", "noviembre", "diciembre",
];

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

/// Day and month of the renewal, e.g. `17 de noviembre`.
pub fn format_renewal_date(t: DateTime<Utc>, locale: Locale) -> String {
    let month = t.month0() as usize;
    match locale {
        Locale::Es => format!("{} de {}", t.day(), MONTHS_ES[month]),
        Locale::En => format!("{} {}", t.day(), MONTHS_EN[month]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore, MONTHLY_USAGE_KEY};
    use std::sync::Arc;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn setup(policy: RolloverPolicy) -> (SharedStore, QuotaClock, UsageCounter) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock = QuotaClock::new(store.clone(), policy);
        let usage = UsageCounter::new(MONTHLY_USAGE_KEY, store.clone());
        (store, clock, usage)
    }

    #[test]
    fn anchor_is_set_once() {
        let (_, clock, _) = setup(RolloverPolicy::Anchored);
        let t0 = at(2025, 3, 10, 12, 0, 0);

        assert!(clock.establish_anchor(t0));
        assert!(!clock.establish_anchor(at(2025, 3, 11, 0, 0, 0)));
        assert_eq!(clock.anchor(), Some(t0));
        assert_eq!(clock.renews_at(t0), Some(at(2025, 4, 10, 12, 0, 0)));
    }

    #[test]
    fn no_anchor_and_no_usage_is_a_no_op() {
        let (_, clock, mut usage) = setup(RolloverPolicy::Anchored);
        let check = clock.check_rollover(at(2030, 1, 1, 0, 0, 0), &mut usage);
        assert_eq!(check.renews_at, None);
        assert!(!check.rolled_over);
        assert_eq!(clock.anchor(), None);
    }

    #[test]
    fn orphaned_usage_starts_a_cycle() {
        let (store, clock, mut usage) = setup(RolloverPolicy::Anchored);
        store.set(MONTHLY_USAGE_KEY, "3600").unwrap();
        store.set(USAGE_ANCHOR_KEY, "not a timestamp").unwrap();
        usage.load();

        let now = at(2025, 6, 1, 12, 0, 0);
        let check = clock.check_rollover(now, &mut usage);
        assert!(!check.rolled_over);
        assert_eq!(usage.used_secs(), 3600);
        assert_eq!(clock.anchor(), Some(now));
        assert_eq!(check.renews_at, Some(at(2025, 7, 1, 12, 0, 0)));

        let later = at(2027, 6, 1, 12, 0, 0);
        let check = clock.check_rollover(later, &mut usage);
        assert!(check.rolled_over);
        assert_eq!(usage.used_secs(), 0);
    }

    #[test]
    fn orphaned_usage_starts_a_calendar_cycle() {
        let (store, clock, mut usage) = setup(RolloverPolicy::Calendar);
        usage.tick();
        let check = clock.check_rollover(at(2025, 6, 10, 0, 0, 0), &mut usage);
        assert!(!check.rolled_over);
        assert_eq!(store.get(LAST_RESET_KEY).as_deref(), Some("2025-06"));
        assert_eq!(check.renews_at, Some(at(2025, 7, 1, 0, 0, 0)));
        assert_eq!(usage.used_secs(), 1);
    }

    #[test]
    fn rollover_after_one_month_resets_and_reanchors() {
        let (store, clock, mut usage) = setup(RolloverPolicy::Anchored);
        let t0 = at(2025, 5, 14, 9, 30, 0);
        clock.establish_anchor(t0);
        for _ in 0..120 {
            usage.tick();
        }

        let before = clock.check_rollover(at(2025, 6, 14, 9, 29, 59), &mut usage);
        assert!(!before.rolled_over);
        assert_eq!(usage.used_secs(), 120);

        let now = at(2025, 6, 14, 9, 30, 1);
        let check = clock.check_rollover(now, &mut usage);
        assert!(check.rolled_over);
        assert_eq!(usage.used_secs(), 0);
        assert_eq!(store.get(MONTHLY_USAGE_KEY).as_deref(), Some("0"));
        assert_eq!(clock.anchor(), Some(now));
        assert_eq!(check.renews_at, Some(at(2025, 7, 14, 9, 30, 1)));
    }

    #[test]
    fn rollover_is_idempotent_for_same_instant() {
        let (_, clock, mut usage) = setup(RolloverPolicy::Anchored);
        clock.establish_anchor(at(2025, 1, 1, 0, 0, 0));
        let now = at(2025, 2, 1, 0, 0, 0);

        let first = clock.check_rollover(now, &mut usage);
        let second = clock.check_rollover(now, &mut usage);
        assert!(first.rolled_over);
        assert!(!second.rolled_over);
        assert_eq!(first.renews_at, second.renews_at);
        assert_eq!(clock.anchor(), Some(now));
    }

    #[test]
    fn month_end_anchor_clamps() {
        assert_eq!(add_month(at(2025, 1, 31, 8, 0, 0)), at(2025, 2, 28, 8, 0, 0));
        assert_eq!(add_month(at(2024, 1, 31, 8, 0, 0)), at(2024, 2, 29, 8, 0, 0));
        assert_eq!(add_month(at(2025, 2, 28, 8, 0, 0)), at(2025, 3, 28, 8, 0, 0));
        assert_eq!(add_month(at(2025, 12, 15, 8, 0, 0)), at(2026, 1, 15, 8, 0, 0));
    }

    #[test]
    fn missing_renewal_is_derived_from_anchor() {
        let (store, clock, _) = setup(RolloverPolicy::Anchored);
        let t0 = at(2025, 8, 2, 0, 0, 0);
        store.set(USAGE_ANCHOR_KEY, &t0.to_rfc3339()).unwrap();
        assert_eq!(clock.renews_at(t0), Some(at(2025, 9, 2, 0, 0, 0)));

        store.set(RENEWAL_AT_KEY, "yesterday-ish").unwrap();
        assert_eq!(clock.renews_at(t0), Some(at(2025, 9, 2, 0, 0, 0)));
    }

    #[test]
    fn corrupt_anchor_reads_as_absent() {
        let (store, clock, _) = setup(RolloverPolicy::Anchored);
        store.set(USAGE_ANCHOR_KEY, "???").unwrap();
        assert_eq!(clock.anchor(), None);
        assert!(clock.establish_anchor(at(2025, 4, 4, 4, 4, 4)));
    }

    #[test]
    fn calendar_policy_resets_on_month_change() {
        let (store, clock, mut usage) = setup(RolloverPolicy::Calendar);
        assert!(clock.establish_anchor(at(2025, 3, 30, 10, 0, 0)));
        assert_eq!(store.get(LAST_RESET_KEY).as_deref(), Some("2025-03"));
        usage.tick();

        let same = clock.check_rollover(at(2025, 3, 31, 23, 59, 59), &mut usage);
        assert!(!same.rolled_over);
        assert_eq!(same.renews_at, Some(at(2025, 4, 1, 0, 0, 0)));
        assert_eq!(usage.used_secs(), 1);

        let next = clock.check_rollover(at(2025, 4, 1, 0, 0, 0), &mut usage);
        assert!(next.rolled_over);
        assert_eq!(usage.used_secs(), 0);
        assert_eq!(store.get(LAST_RESET_KEY).as_deref(), Some("2025-04"));
        assert_eq!(next.renews_at, Some(at(2025, 5, 1, 0, 0, 0)));
    }

    #[test]
    fn renewal_date_strings() {
        let t = at(2025, 11, 17, 6, 0, 0);
        assert_eq!(format_renewal_date(t, Locale::Es), "17 de noviembre");
        assert_eq!(format_renewal_date(t, Locale::En), "17 November");
    }
}
