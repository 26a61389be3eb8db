use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    pub ticks_credited: AtomicU64,
    pub ticks_rejected: AtomicU64,
    pub rollovers: AtomicU64,
    pub expirations: AtomicU64,
    pub modal_opens: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_credited(&self) {
        self.ticks_credited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.ticks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollovers(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_expirations(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_opens(&self) {
        self.modal_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn format_prometheus(&self) -> String {
        format!(
            "# HELP quota_ticks_credited Seconds credited to a usage counter\n\
             # TYPE quota_ticks_credited counter\n\
             quota_ticks_credited {}\n\
             # HELP quota_ticks_rejected Ticks dropped because the quota was exhausted\n\
             # TYPE quota_ticks_rejected counter\n\
             quota_ticks_rejected {}\n\
             # HELP quota_rollovers Monthly cycles rolled over\n\
             # TYPE quota_rollovers counter\n\
             quota_rollovers {}\n\
             # HELP quota_expirations Sessions stopped by an exhausted quota\n\
             # TYPE quota_expirations counter\n\
             quota_expirations {}\n\
             # HELP quota_modal_opens Widget modal openings\n\
             # TYPE quota_modal_opens counter\n\
             quota_modal_opens {}\n",
            self.ticks_credited.load(Ordering::Relaxed),
            self.ticks_rejected.load(Ordering::Relaxed),
            self.rollovers.load(Ordering::Relaxed),
            self.expirations.load(Ordering::Relaxed),
            self.modal_opens.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_text_reflects_counters() {
        let metrics = EngineMetrics::new();
        metrics.inc_credited();
        metrics.inc_credited();
        metrics.inc_rollovers();
        let text = metrics.format_prometheus();
        assert!(text.contains("quota_ticks_credited 2\n"));
        assert!(text.contains("quota_rollovers 1\n"));
        assert!(text.contains("quota_ticks_rejected 0\n"));
    }
}
