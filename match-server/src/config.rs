use std::time::Duration;

/// Runtime settings for one match process
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Address the match listener binds to
    pub bind_addr: String,
    /// Room this match was launched for, echoed in the result report
    pub room_id: u64,
    /// Lobby endpoint that receives the result report; `None` skips reporting
    pub lobby_addr: Option<String>,
    pub tick_duration: Duration,
    pub snapshot_interval: Duration,
    /// Delay between the `start` broadcast and the first simulated tick
    pub start_delay: Duration,
    /// Seats silent for longer than this lose; `None` disables the check
    pub idle_timeout: Option<Duration>,
    /// Piece seed; a random one is drawn when unset
    pub seed: Option<u64>,
    pub report_timeout: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            room_id: 0,
            lobby_addr: None,
            tick_duration: Duration::from_millis(1000 / 60),
            snapshot_interval: Duration::from_millis(100),
            start_delay: Duration::from_secs(1),
            idle_timeout: Some(Duration::from_secs(120)),
            seed: None,
            report_timeout: Duration::from_secs(5),
        }
    }
}

impl MatchConfig {
    /// Tick length for a rate in updates per second
    pub fn tick_from_rate(tick_rate: u32) -> Duration {
        Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64)
    }

    /// Seconds-based idle timeout where 0 means disabled
    pub fn idle_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}
