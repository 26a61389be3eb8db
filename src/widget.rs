use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::modal::{ScenarioRequest, WidgetModal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// The host starts a scenario.
    Open(ScenarioRequest),
    /// Click or tap captured on the widget surface.
    Interact,
    /// The modal backdrop or close button.
    Dismiss,
    /// Upgrade button on the demo expired view.
    Upgrade,
}

#[derive(Debug, Clone)]
pub struct SurfaceHandle {
    tx: mpsc::UnboundedSender<SurfaceSignal>,
}

impl SurfaceHandle {
    pub fn open(&self, request: ScenarioRequest) -> bool {
        self.tx.send(SurfaceSignal::Open(request)).is_ok()
    }

    pub fn interact(&self) -> bool {
        self.tx.send(SurfaceSignal::Interact).is_ok()
    }

    pub fn dismiss(&self) -> bool {
        self.tx.send(SurfaceSignal::Dismiss).is_ok()
    }

    pub fn upgrade(&self) -> bool {
        self.tx.send(SurfaceSignal::Upgrade).is_ok()
    }
}

pub struct SurfaceSignals {
    rx: mpsc::UnboundedReceiver<SurfaceSignal>,
}

pub fn surface() -> (SurfaceHandle, SurfaceSignals) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SurfaceHandle { tx }, SurfaceSignals { rx })
}

/// Feeds surface signals into `modal` until every handle is gone, then
/// closes it.
pub async fn drive(modal: WidgetModal, mut signals: SurfaceSignals) {
    while let Some(signal) = signals.rx.recv().await {
        debug!("Surface signal {:?}", signal);
        match signal {
            SurfaceSignal::Open(request) => {
                let view = modal.open(request);
                info!("Modal view: {:?}", view);
            }
            SurfaceSignal::Interact => {
                modal.interact();
            }
            SurfaceSignal::Dismiss => modal.close(),
            SurfaceSignal::Upgrade => {
                if !modal.request_upgrade() {
                    debug!("Upgrade ignored, demo has not expired");
                }
            }
        }
    }
    debug!("Widget surface detached");
    modal.close();
}
