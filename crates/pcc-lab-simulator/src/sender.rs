use pcc_lab_abstract::ControlConfig;

use crate::engine::{LinkId, SenderId};
use crate::error::{Result, SimError};
use crate::monitor::{Feature, MonitorInterval, SenderHistory};

/// One flow: its path, pacing rate, congestion window and packet accounting.
#[derive(Debug, Clone)]
pub struct Sender {
    id: SenderId,
    path: Vec<LinkId>,
    /// Index into `path` of the last hop before the packet turns around.
    dest: usize,
    control: ControlConfig,
    packet_size: u64,

    starting_rate: f64,
    rate: f64,
    cwnd: u32,

    // Counters of the current observation window.
    sent: u64,
    acked: u64,
    lost: u64,
    rtt_samples: Vec<f64>,
    obs_start_time: f64,

    // Episode totals; in-flight bytes are derived from these.
    total_sent: u64,
    total_acked: u64,
    total_lost: u64,
    bytes_in_flight: u64,
    min_latency: Option<f64>,

    history_len: usize,
    features: Vec<Feature>,
    history: SenderHistory,
}

/// Options for adding a sender to a [`Topology`](crate::engine::Topology).
#[derive(Debug, Clone)]
pub struct SenderSpec {
    pub starting_rate: f64,
    pub path: Vec<LinkId>,
    pub dest: usize,
    pub control: ControlConfig,
    pub history_len: usize,
    pub features: Vec<Feature>,
}

impl Sender {
    pub(crate) fn new(id: SenderId, spec: SenderSpec, packet_size: u64) -> Self {
        let history = SenderHistory::new(spec.history_len, spec.features.clone(), id, packet_size);
        Self {
            id,
            path: spec.path,
            dest: spec.dest,
            control: spec.control,
            packet_size,
            starting_rate: spec.starting_rate,
            rate: spec.starting_rate,
            cwnd: spec.control.initial_cwnd,
            sent: 0,
            acked: 0,
            lost: 0,
            rtt_samples: Vec::new(),
            obs_start_time: 0.0,
            total_sent: 0,
            total_acked: 0,
            total_lost: 0,
            bytes_in_flight: 0,
            min_latency: None,
            history_len: spec.history_len,
            features: spec.features,
            history,
        }
    }

    pub fn id(&self) -> SenderId {
        self.id
    }

    pub fn path(&self) -> &[LinkId] {
        &self.path
    }

    pub fn dest(&self) -> usize {
        self.dest
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn starting_rate(&self) -> f64 {
        self.starting_rate
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn packet_size(&self) -> u64 {
        self.packet_size
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn acked(&self) -> u64 {
        self.acked
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Episode totals as `(sent, acked, lost)`.
    pub fn totals(&self) -> (u64, u64, u64) {
        (self.total_sent, self.total_acked, self.total_lost)
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn packets_in_flight(&self) -> u64 {
        self.bytes_in_flight / self.packet_size
    }

    pub fn min_latency(&self) -> Option<f64> {
        self.min_latency
    }

    pub fn rtt_samples(&self) -> &[f64] {
        &self.rtt_samples
    }

    pub fn history(&self) -> &SenderHistory {
        &self.history
    }

    pub fn can_send(&self) -> bool {
        if self.control.use_cwnd {
            self.packets_in_flight() < u64::from(self.cwnd)
        } else {
            true
        }
    }

    pub fn on_sent(&mut self) {
        self.sent += 1;
        self.total_sent += 1;
        self.bytes_in_flight += self.packet_size;
    }

    pub fn on_acked(&mut self, rtt: f64) {
        self.acked += 1;
        self.total_acked += 1;
        self.rtt_samples.push(rtt);
        if self.min_latency.is_none_or(|min| rtt < min) {
            self.min_latency = Some(rtt);
        }
        self.bytes_in_flight -= self.packet_size;
    }

    pub fn on_lost(&mut self) {
        self.lost += 1;
        self.total_lost += 1;
        self.bytes_in_flight -= self.packet_size;
    }

    fn scaled_update(&self, current: f64, delta: f64) -> Result<f64> {
        if delta.is_nan() {
            return Err(SimError::InvalidDelta {
                sender: self.id,
                value: delta,
            });
        }
        let delta = delta * self.control.delta_scale;
        if delta >= 0.0 {
            Ok(current * (1.0 + delta))
        } else {
            Ok(current / (1.0 - delta))
        }
    }

    /// Scale the pacing rate by `delta` and clamp it into the configured range.
    pub fn apply_rate_delta(&mut self, delta: f64) -> Result<f64> {
        let rate = self.scaled_update(self.rate, delta)?;
        self.rate = rate.clamp(self.control.min_rate, self.control.max_rate);
        Ok(self.rate)
    }

    /// Scale the congestion window by `delta`; the window stays a whole
    /// number of packets.
    pub fn apply_window_delta(&mut self, delta: f64) -> Result<u32> {
        let cwnd = self.scaled_update(f64::from(self.cwnd), delta)?;
        let min = f64::from(self.control.min_cwnd);
        let max = f64::from(self.control.max_cwnd);
        self.cwnd = cwnd.trunc().clamp(min, max) as u32;
        Ok(self.cwnd)
    }

    pub fn snapshot_interval(&self, now: f64) -> MonitorInterval {
        MonitorInterval {
            sender: self.id,
            bytes_sent: self.sent * self.packet_size,
            bytes_acked: self.acked * self.packet_size,
            bytes_lost: self.lost * self.packet_size,
            send_start: self.obs_start_time,
            send_end: now,
            recv_start: self.obs_start_time,
            recv_end: now,
            rtt_samples: self.rtt_samples.clone(),
            packet_size: self.packet_size,
        }
    }

    /// Fold the current window into the observation history.
    pub fn record_interval(&mut self, now: f64) {
        let interval = self.snapshot_interval(now);
        self.history.step(interval);
    }

    pub fn observation(&self) -> Vec<f64> {
        self.history.as_vector()
    }

    pub fn reset_observation_window(&mut self, now: f64) {
        self.sent = 0;
        self.acked = 0;
        self.lost = 0;
        self.rtt_samples.clear();
        self.obs_start_time = now;
    }

    pub fn reset_episode(&mut self, now: f64) {
        self.rate = self.starting_rate;
        self.cwnd = self.control.initial_cwnd;
        self.total_sent = 0;
        self.total_acked = 0;
        self.total_lost = 0;
        self.bytes_in_flight = 0;
        self.min_latency = None;
        self.reset_observation_window(now);
        self.history = SenderHistory::new(
            self.history_len,
            self.features.clone(),
            self.id,
            self.packet_size,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(rate: f64, control: ControlConfig) -> Sender {
        Sender::new(
            SenderId(0),
            SenderSpec {
                starting_rate: rate,
                path: vec![LinkId(0), LinkId(1)],
                dest: 0,
                control,
                history_len: 2,
                features: vec![Feature::AvgLatency],
            },
            1500,
        )
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "overflow")]
    fn ack_without_send_is_an_accounting_error() {
        let mut s = sender(60.0, ControlConfig::default());
        s.on_sent();
        s.on_acked(0.06);
        s.on_lost();
    }

    #[test]
    fn zero_delta_keeps_rate() {
        for rate in [40.0, 60.0, 137.5, 999.0, 1000.0] {
            let mut s = sender(rate, ControlConfig::default());
            assert_eq!(s.apply_rate_delta(0.0).expect("finite delta"), rate);
        }
    }

    #[test]
    fn rate_stays_in_bounds_under_extreme_deltas() {
        let control = ControlConfig::default();
        let mut s = sender(60.0, control);
        for delta in [1e6, -0.999999, -1e9, 1e6, 3.0, -3.0, f64::INFINITY, f64::NEG_INFINITY] {
            let rate = s.apply_rate_delta(delta).expect("non-NaN delta");
            assert!((control.min_rate..=control.max_rate).contains(&rate));
        }
    }

    #[test]
    fn negative_delta_shrinks_less_than_positive_grows() {
        let mut up = sender(100.0, ControlConfig::default());
        let mut down = sender(100.0, ControlConfig::default());
        let grown = up.apply_rate_delta(4.0).expect("finite") - 100.0;
        let shrunk = 100.0 - down.apply_rate_delta(-4.0).expect("finite");
        assert!((grown - 10.0).abs() < 1e-9);
        assert!(shrunk < grown);
        assert!((down.rate() - 100.0 / 1.1).abs() < 1e-9);
    }

    #[test]
    fn nan_delta_is_rejected_without_side_effects() {
        let mut s = sender(60.0, ControlConfig::default());
        assert!(matches!(
            s.apply_rate_delta(f64::NAN),
            Err(SimError::InvalidDelta { sender: SenderId(0), .. })
        ));
        assert!(s.apply_window_delta(f64::NAN).is_err());
        assert_eq!(s.rate(), 60.0);
        assert_eq!(s.cwnd(), 25);
    }

    #[test]
    fn window_is_whole_and_clamped() {
        let mut s = sender(60.0, ControlConfig::default());
        // 25 * 1.025 = 25.625 truncates to 25
        assert_eq!(s.apply_window_delta(1.0).expect("finite"), 25);
        assert_eq!(s.apply_window_delta(40.0).expect("finite"), 50);
        assert_eq!(s.apply_window_delta(1e9).expect("finite"), 5000);
        assert_eq!(s.apply_window_delta(-1e9).expect("finite"), 4);
    }

    #[test]
    fn window_mode_limits_in_flight() {
        let control = ControlConfig {
            use_cwnd: true,
            initial_cwnd: 4,
            ..ControlConfig::default()
        };
        let mut s = sender(60.0, control);
        for _ in 0..4 {
            assert!(s.can_send());
            s.on_sent();
        }
        assert!(!s.can_send());
        s.on_lost();
        assert!(s.can_send());

        let rate_mode = sender(60.0, ControlConfig::default());
        assert!(rate_mode.can_send());
    }

    #[test]
    fn accounting_matches_in_flight() {
        let mut s = sender(60.0, ControlConfig::default());
        for _ in 0..5 {
            s.on_sent();
        }
        s.on_acked(0.08);
        s.on_acked(0.06);
        s.on_lost();
        let (sent, acked, lost) = s.totals();
        assert_eq!(s.bytes_in_flight(), (sent - acked - lost) * 1500);
        assert_eq!(s.bytes_in_flight(), (5 - 2 - 1) * 1500);
        assert_eq!(s.min_latency(), Some(0.06));
        assert_eq!(s.rtt_samples(), &[0.08, 0.06]);
    }

    #[test]
    fn observation_window_and_episode_reset() {
        let mut s = sender(60.0, ControlConfig::default());
        s.reset_observation_window(1.0);
        s.on_sent();
        s.on_sent();
        s.on_acked(0.1);
        s.apply_rate_delta(10.0).expect("finite");

        let mi = s.snapshot_interval(3.0);
        assert_eq!(mi.bytes_sent, 3000);
        assert_eq!(mi.bytes_acked, 1500);
        assert_eq!((mi.send_start, mi.send_end), (1.0, 3.0));

        s.record_interval(3.0);
        assert_eq!(s.observation(), vec![0.0, 0.1]);

        s.reset_observation_window(3.0);
        assert_eq!((s.sent(), s.acked(), s.lost()), (0, 0, 0));
        assert_eq!(s.bytes_in_flight(), 1500);
        assert_eq!(s.totals(), (2, 1, 0));
        assert!(s.rate() > 60.0);

        s.reset_episode(0.0);
        assert_eq!(s.rate(), 60.0);
        assert_eq!(s.bytes_in_flight(), 0);
        assert_eq!(s.totals(), (0, 0, 0));
        assert_eq!(s.min_latency(), None);
        assert_eq!(s.observation(), vec![0.0, 0.0]);
    }
}
