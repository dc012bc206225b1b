use crate::panels::MAX_PANELS;
use crate::transport::{MAX_CONNECT_ATTEMPTS, RETRY_DELAY};
use std::time::Duration;

pub const NAV_POLL_INTERVAL: Duration = Duration::from_millis(330);
pub const RELOAD_DELAY: Duration = Duration::from_secs(2);
/// Viewport pixels per table column.
pub const COLUMN_WIDTH_PX: u32 = 160;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub max_attempts: u32,
    pub max_panels: usize,
    pub reload_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: NAV_POLL_INTERVAL,
            retry_delay: RETRY_DELAY,
            max_attempts: MAX_CONNECT_ATTEMPTS,
            max_panels: MAX_PANELS,
            reload_delay: RELOAD_DELAY,
        }
    }
}

/// Column cap for a viewport `width` pixels wide, never below two.
pub fn max_columns(width: u32) -> usize {
    let cols = (f64::from(width) / f64::from(COLUMN_WIDTH_PX)).round() as usize;
    cols.max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_cap_from_width() {
        assert_eq!(max_columns(1920), 12);
        assert_eq!(max_columns(1000), 6);
        assert_eq!(max_columns(100), 2);
        assert_eq!(max_columns(0), 2);
    }
}
