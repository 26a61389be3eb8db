use serde::Serialize;
use std::fmt;

/// Free trial budget for unauthenticated visitors.
pub const DEMO_LIMIT_SECS: u64 = 60;
/// Monthly allowance for signed-in users.
pub const MONTHLY_LIMIT_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Demo,
    Authenticated,
}

impl Mode {
    pub fn limit_secs(self) -> u64 {
        match self {
            Mode::Demo => DEMO_LIMIT_SECS,
            Mode::Authenticated => MONTHLY_LIMIT_SECS,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Demo => f.write_str("demo"),
            Mode::Authenticated => f.write_str("authenticated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatingResult {
    pub remaining_secs: u64,
    pub expired: bool,
}

impl GatingResult {
    pub fn evaluate(mode: Mode, used_secs: u64) -> Self {
        Self::with_limit(mode.limit_secs(), used_secs)
    }

    pub fn with_limit(limit_secs: u64, used_secs: u64) -> Self {
        Self {
            remaining_secs: limit_secs.saturating_sub(used_secs),
            expired: used_secs >= limit_secs,
        }
    }
}

/// `m:ss`, as shown in the modal countdown.
pub fn format_countdown(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// `m:ss min`, as shown in the navigation bar.
pub fn format_allowance(secs: u64) -> String {
    format!("{} min", format_countdown(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_plus_used_equals_limit_below_limit() {
        for mode in [Mode::Demo, Mode::Authenticated] {
            let limit = mode.limit_secs();
            for used in 0..=limit {
                let result = GatingResult::evaluate(mode, used);
                assert_eq!(result.remaining_secs + used, limit);
                assert_eq!(result.expired, used == limit);
            }
        }
    }

    #[test]
    fn over_limit_is_expired_with_nothing_left() {
        let result = GatingResult::evaluate(Mode::Demo, 75);
        assert_eq!(result.remaining_secs, 0);
        assert!(result.expired);
    }

    #[test]
    fn demo_boundary() {
        let before = GatingResult::evaluate(Mode::Demo, 59);
        assert!(!before.expired);
        assert_eq!(before.remaining_secs, 1);

        let at = GatingResult::evaluate(Mode::Demo, 60);
        assert!(at.expired);
        assert_eq!(at.remaining_secs, 0);
    }

    #[test]
    fn display_formats() {
        assert_eq!(format_countdown(0), "0:00");
        assert_eq!(format_countdown(59), "0:59");
        assert_eq!(format_countdown(60), "1:00");
        assert_eq!(format_countdown(3599), "59:59");
        assert_eq!(format_allowance(3600), "60:00 min");
        assert_eq!(format_allowance(65), "1:05 min");
    }
}
