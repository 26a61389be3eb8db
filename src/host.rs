//! Host page side of the engine: authenticated usage, quota clock and rollover poll.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::clock::{Clock, SharedClock};
use crate::config::{Config, Locale};
use crate::gating::{format_allowance, GatingResult, Mode};
use crate::metrics::EngineMetrics;
use crate::quota::{format_renewal_date, QuotaClock, RolloverCheck};
use crate::schedule::Schedule;
use crate::store::{SharedStore, MONTHLY_USAGE_KEY};
use crate::usage::UsageCounter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    UsageChanged { used_secs: u64, remaining_secs: u64 },
    QuotaRenewed { renews_at: DateTime<Utc> },
    SessionExpired { mode: Mode },
    UpgradeRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Credited { used_secs: u64, gating: GatingResult },
    Rejected { gating: GatingResult },
}

impl TickOutcome {
    pub fn gating(&self) -> GatingResult {
        match self {
            TickOutcome::Credited { gating, .. } | TickOutcome::Rejected { gating } => *gating,
        }
    }
}

struct AccountLedger {
    quota: QuotaClock,
    usage: UsageCounter,
}

pub struct QuotaHost {
    ledger: Mutex<AccountLedger>,
    clock: SharedClock,
    events: mpsc::UnboundedSender<HostEvent>,
    metrics: Arc<EngineMetrics>,
    locale: Locale,
}

impl QuotaHost {
    /// Loads the persisted allowance and runs the mount-time rollover check.
    pub fn new(
        config: &Config,
        store: SharedStore,
        clock: SharedClock,
        events: mpsc::UnboundedSender<HostEvent>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let ledger = AccountLedger {
            quota: QuotaClock::new(store.clone(), config.quota.policy),
            usage: UsageCounter::new(MONTHLY_USAGE_KEY, store),
        };
        let host = Self {
            ledger: Mutex::new(ledger),
            clock,
            events,
            metrics,
            locale: config.widget.locale,
        };
        host.check_rollover();
        info!(
            "Quota host mounted: {}s used of monthly allowance",
            host.used_secs()
        );
        host
    }

    pub fn used_secs(&self) -> u64 {
        self.ledger.lock().usage.used_secs()
    }

    pub fn gating(&self) -> GatingResult {
        GatingResult::evaluate(Mode::Authenticated, self.used_secs())
    }

    /// Remaining allowance for the navigation bar.
    pub fn allowance_display(&self) -> String {
        format_allowance(self.gating().remaining_secs)
    }

    pub fn renews_at(&self) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.ledger.lock().quota.renews_at(now)
    }

    pub fn renewal_display(&self) -> Option<String> {
        self.renews_at().map(|t| format_renewal_date(t, self.locale))
    }

    pub fn check_rollover(&self) -> RolloverCheck {
        let now = self.clock.now();
        let (check, used_secs) = {
            let mut ledger = self.ledger.lock();
            let AccountLedger { quota, usage } = &mut *ledger;
            let check = quota.check_rollover(now, usage);
            (check, usage.used_secs())
        };

        if check.rolled_over {
            self.publish_rollover(&check);
            self.emit(HostEvent::UsageChanged {
                used_secs,
                remaining_secs: GatingResult::evaluate(Mode::Authenticated, used_secs).remaining_secs,
            });
        }
        check
    }

    /// Credits one second to the monthly allowance unless it is exhausted.
    ///
    /// A lapsed cycle is rolled over first, under the same lock, so a second
    /// counted after the renewal instant lands in the new cycle. The cycle
    /// anchor is written before the first counted second.
    pub fn record_tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let (rollover, outcome) = {
            let mut ledger = self.ledger.lock();
            let AccountLedger { quota, usage } = &mut *ledger;
            let rollover = quota.check_rollover(now, usage);
            let before = GatingResult::evaluate(Mode::Authenticated, usage.used_secs());
            let outcome = if before.expired {
                TickOutcome::Rejected { gating: before }
            } else {
                quota.establish_anchor(now);
                let used_secs = usage.tick();
                TickOutcome::Credited {
                    used_secs,
                    gating: GatingResult::evaluate(Mode::Authenticated, used_secs),
                }
            };
            (rollover, outcome)
        };

        if rollover.rolled_over {
            self.publish_rollover(&rollover);
        }
        match outcome {
            TickOutcome::Credited { used_secs, gating } => {
                self.metrics.inc_credited();
                self.emit(HostEvent::UsageChanged {
                    used_secs,
                    remaining_secs: gating.remaining_secs,
                });
            }
            TickOutcome::Rejected { .. } => {
                self.metrics.inc_rejected();
                debug!("Dropped tick on exhausted monthly allowance");
            }
        }
        outcome
    }

    fn publish_rollover(&self, check: &RolloverCheck) {
        self.metrics.inc_rollovers();
        if let Some(renews_at) = check.renews_at {
            self.emit(HostEvent::QuotaRenewed { renews_at });
        }
    }

    /// Re-checks rollover every `period` until the returned schedule is dropped.
    pub fn spawn_rollover_poll(self: &Arc<Self>, period: Duration) -> Schedule {
        let host = Arc::downgrade(self);
        Schedule::spawn("rollover-poll", period, move || match host.upgrade() {
            Some(host) => {
                host.check_rollover();
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        })
    }

    pub fn emit(&self, event: HostEvent) {
        debug!("Host event: {:?}", event);
        let _ = self.events.send(event);
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }
}
