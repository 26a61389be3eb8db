//! Usage quota and session timer engine for an embedded practice widget.

pub mod clock;
pub mod config;
pub mod error;
pub mod gating;
pub mod host;
pub mod metrics;
pub mod modal;
pub mod quota;
pub mod schedule;
pub mod store;
pub mod timer;
pub mod usage;
pub mod widget;

pub use error::EngineError;
pub use gating::{GatingResult, Mode};
pub use host::{HostEvent, QuotaHost};
pub use modal::{ModalView, ScenarioRequest, WidgetModal};
