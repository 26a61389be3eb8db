use parking_lot::Mutex;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::gating::{format_countdown, GatingResult, Mode, DEMO_LIMIT_SECS};
use crate::host::{HostEvent, QuotaHost};
use crate::store::{SharedStore, DEMO_USAGE_KEY};
use crate::timer::SessionTimer;
use crate::usage::UsageCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalState {
    Closed,
    Interactive,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRequest {
    pub mode: Mode,
    pub agent_id: Option<String>,
}

impl ScenarioRequest {
    pub fn demo() -> Self {
        Self { mode: Mode::Demo, agent_id: None }
    }

    pub fn authenticated(agent_id: impl Into<String>) -> Self {
        Self {
            mode: Mode::Authenticated,
            agent_id: Some(agent_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum ModalView {
    Closed,
    Interactive {
        mode: Mode,
        agent_id: String,
        engaged: bool,
        remaining_secs: u64,
        /// Demo only.
        countdown: Option<String>,
    },
    Expired(ExpiredView),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "offer", rename_all = "lowercase")]
pub enum ExpiredView {
    /// Demo trial used up; offers the subscription flow.
    Upgrade { limit_secs: u64 },
    /// Monthly allowance used up; shows when it comes back.
    Renewal { renews_on: Option<String> },
}

struct ModalInner {
    state: ModalState,
    mode: Mode,
    agent_id: String,
    session_id: Option<Uuid>,
    timer: SessionTimer,
    demo: UsageCounter,
    host: Arc<QuotaHost>,
    default_agent_id: String,
}

#[derive(Clone)]
pub struct WidgetModal {
    inner: Arc<Mutex<ModalInner>>,
}

impl WidgetModal {
    pub fn new(config: &Config, store: SharedStore, host: Arc<QuotaHost>) -> Self {
        let inner = ModalInner {
            state: ModalState::Closed,
            mode: Mode::Demo,
            agent_id: config.widget.default_agent_id.clone(),
            session_id: None,
            timer: SessionTimer::new(Duration::from_millis(config.timer.tick_interval_ms)),
            demo: UsageCounter::new(DEMO_USAGE_KEY, store),
            host,
            default_agent_id: config.widget.default_agent_id.clone(),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Opens a scenario. Re-opening an open modal closes it first, so the
    /// timer always starts `Idle`.
    pub fn open(&self, request: ScenarioRequest) -> ModalView {
        let mut inner = self.inner.lock();
        inner.open(request);
        inner.view()
    }

    /// User interaction with the widget surface: toggles the timer.
    /// Returns false when the modal is not interactive.
    pub fn interact(&self) -> bool {
        let weak = Arc::downgrade(&self.inner);
        let mut inner = self.inner.lock();
        inner.reconcile();
        inner.toggle(weak)
    }

    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// Upgrade action on the demo expired view. Closes the modal and hands
    /// control back to the host.
    pub fn request_upgrade(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ModalState::Expired || inner.mode != Mode::Demo {
            return false;
        }
        inner.close();
        inner.host.emit(HostEvent::UpgradeRequested);
        true
    }

    pub fn view(&self) -> ModalView {
        let mut inner = self.inner.lock();
        inner.reconcile();
        inner.view()
    }

    pub fn state(&self) -> ModalState {
        let mut inner = self.inner.lock();
        inner.reconcile();
        inner.state
    }

    pub fn is_engaged(&self) -> bool {
        self.inner.lock().timer.is_engaged()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().session_id
    }
}

impl ModalInner {
    fn open(&mut self, request: ScenarioRequest) {
        if self.state != ModalState::Closed {
            self.close();
        }
        self.timer.disengage();

        self.mode = request.mode;
        self.agent_id = request
            .agent_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.default_agent_id.clone());
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);

        match self.mode {
            Mode::Demo => {
                self.demo.load();
            }
            Mode::Authenticated => {
                self.host.check_rollover();
            }
        }
        self.host.metrics().inc_opens();

        let gating = self.gating();
        self.state = if gating.expired {
            ModalState::Expired
        } else {
            ModalState::Interactive
        };
        info!(
            "Modal {} opened: mode={}, agent={}, remaining={}s, state={:?}",
            session_id, self.mode, self.agent_id, gating.remaining_secs, self.state
        );
    }

    fn toggle(&mut self, weak: Weak<Mutex<ModalInner>>) -> bool {
        if self.state != ModalState::Interactive {
            debug!("Ignoring widget interaction while {:?}", self.state);
            return false;
        }
        if self.timer.disengage() {
            info!("Session {:?} paused", self.session_id);
            return true;
        }

        let engaged = self.timer.engage(move |epoch| match weak.upgrade() {
            Some(inner) => inner.lock().on_tick(epoch),
            None => ControlFlow::Break(()),
        });
        if engaged.is_some() {
            info!("Session {:?} engaged", self.session_id);
        }
        engaged.is_some()
    }

    fn on_tick(&mut self, epoch: u64) -> ControlFlow<()> {
        if self.state != ModalState::Interactive || !self.timer.is_current(epoch) {
            debug!("Dropping stale tick from epoch {}", epoch);
            return ControlFlow::Break(());
        }

        let gating = match self.mode {
            Mode::Demo => {
                let before = GatingResult::evaluate(Mode::Demo, self.demo.used_secs());
                if before.expired {
                    self.host.metrics().inc_rejected();
                    before
                } else {
                    let used_secs = self.demo.tick();
                    self.host.metrics().inc_credited();
                    GatingResult::evaluate(Mode::Demo, used_secs)
                }
            }
            Mode::Authenticated => self.host.record_tick().gating(),
        };

        if gating.expired {
            self.expire();
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// An exhausted monthly allowance can come back through a rollover on
    /// the host while the modal sits on its expired view.
    fn reconcile(&mut self) {
        if self.state == ModalState::Expired
            && self.mode == Mode::Authenticated
            && !self.host.gating().expired
        {
            info!("Session {:?} allowance renewed, back to interactive", self.session_id);
            self.state = ModalState::Interactive;
        }
    }

    fn expire(&mut self) {
        self.timer.disengage();
        self.state = ModalState::Expired;
        self.host.metrics().inc_expirations();
        info!("Session {:?} expired in {} mode", self.session_id, self.mode);
        self.host.emit(HostEvent::SessionExpired { mode: self.mode });
    }

    fn close(&mut self) {
        self.timer.disengage();
        if self.state != ModalState::Closed {
            info!("Modal {:?} closed", self.session_id);
        }
        self.state = ModalState::Closed;
        self.session_id = None;
    }

    fn gating(&self) -> GatingResult {
        match self.mode {
            Mode::Demo => GatingResult::evaluate(Mode::Demo, self.demo.used_secs()),
            Mode::Authenticated => self.host.gating(),
        }
    }

    fn view(&self) -> ModalView {
        match self.state {
            ModalState::Closed => ModalView::Closed,
            ModalState::Interactive => {
                let gating = self.gating();
                ModalView::Interactive {
                    mode: self.mode,
                    agent_id: self.agent_id.clone(),
                    engaged: self.timer.is_engaged(),
                    remaining_secs: gating.remaining_secs,
                    countdown: match self.mode {
                        Mode::Demo => Some(format_countdown(gating.remaining_secs)),
                        Mode::Authenticated => None,
                    },
                }
            }
            ModalState::Expired => ModalView::Expired(match self.mode {
                Mode::Demo => ExpiredView::Upgrade {
                    limit_secs: DEMO_LIMIT_SECS,
                },
                Mode::Authenticated => ExpiredView::Renewal {
                    renews_on: self.host.renewal_display(),
                },
            }),
        }
    }
}
