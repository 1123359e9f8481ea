use std::time::Duration;

/// Default invoke timeout in scheduler ticks.
pub const DEFAULT_INVOKE_TIMEOUT_TICKS: u32 = 20;

/// Default wall-clock length of one tick (20 ticks per second).
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Router behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Frame limit override. `None` uses the transport's own limit.
    pub max_frame_len: Option<usize>,
    /// Ticks an invoke waits for its reply.
    pub invoke_timeout_ticks: u32,
    /// Length of one tick for the default scheduler.
    pub tick: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_frame_len: None,
            invoke_timeout_ticks: DEFAULT_INVOKE_TIMEOUT_TICKS,
            tick: DEFAULT_TICK,
        }
    }
}

impl RouterConfig {
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = Some(max_frame_len);
        self
    }

    pub fn with_invoke_timeout_ticks(mut self, ticks: u32) -> Self {
        self.invoke_timeout_ticks = ticks;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Wall-clock invoke window under the default scheduler.
    ///
    /// Saturates at `Duration::MAX`.
    pub fn invoke_timeout(&self) -> Duration {
        self.tick
            .checked_mul(self.invoke_timeout_ticks)
            .unwrap_or(Duration::MAX)
    }
}

/// Per-call options for send and invoke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Skip the frame size and target id checks.
    pub force: bool,
    /// Return a delivered [`Failure`](scriptbus_frame::Failure) as
    /// [`RouterError::Failure`](crate::RouterError::Failure) instead of a value.
    pub throw_failures: bool,
}

impl SendOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn throwing() -> Self {
        Self {
            throw_failures: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_one_second() {
        let config = RouterConfig::default();
        assert_eq!(config.invoke_timeout_ticks, 20);
        assert_eq!(config.invoke_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn builders_override_fields() {
        let config = RouterConfig::default()
            .with_max_frame_len(256)
            .with_invoke_timeout_ticks(4)
            .with_tick(Duration::from_millis(10));
        assert_eq!(config.max_frame_len, Some(256));
        assert_eq!(config.invoke_timeout(), Duration::from_millis(40));
    }

    #[test]
    fn oversized_window_saturates() {
        let config = RouterConfig::default().with_tick(Duration::from_millis(u64::MAX));
        assert_eq!(config.invoke_timeout(), Duration::MAX);
    }

    #[test]
    fn option_shorthands() {
        assert!(SendOptions::forced().force);
        assert!(!SendOptions::forced().throw_failures);
        assert!(SendOptions::throwing().throw_failures);
    }
}
