//! Monitor intervals and the per-sender observation history.
//!
//! A [`MonitorInterval`] is the raw record of one observation window. The
//! [`SenderHistory`] keeps the last few of them and flattens them into the
//! feature vector handed to a controller.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::engine::SenderId;
use crate::error::SimError;

/// A named statistic computed from a [`MonitorInterval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Feature {
    SendRate,
    RecvRate,
    SendDur,
    RecvDur,
    AvgLatency,
    LossRatio,
    SentLatencyInflation,
    AckLatencyInflation,
    ConnMinLatency,
    LatencyIncrease,
    LatencyRatio,
    SendRatio,
}

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::SendRate,
        Feature::RecvRate,
        Feature::SendDur,
        Feature::RecvDur,
        Feature::AvgLatency,
        Feature::LossRatio,
        Feature::SentLatencyInflation,
        Feature::AckLatencyInflation,
        Feature::ConnMinLatency,
        Feature::LatencyIncrease,
        Feature::LatencyRatio,
        Feature::SendRatio,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::SendRate => "send rate",
            Feature::RecvRate => "recv rate",
            Feature::SendDur => "send dur",
            Feature::RecvDur => "recv dur",
            Feature::AvgLatency => "avg latency",
            Feature::LossRatio => "loss ratio",
            Feature::SentLatencyInflation => "sent latency inflation",
            Feature::AckLatencyInflation => "ack latency inflation",
            Feature::ConnMinLatency => "conn min latency",
            Feature::LatencyIncrease => "latency increase",
            Feature::LatencyRatio => "latency ratio",
            Feature::SendRatio => "send ratio",
        }
    }

    pub fn min_value(&self) -> f64 {
        match self {
            Feature::SentLatencyInflation | Feature::AckLatencyInflation => -1.0,
            Feature::LatencyRatio => 1.0,
            _ => 0.0,
        }
    }

    pub fn max_value(&self) -> f64 {
        match self {
            Feature::SendRate | Feature::RecvRate => 1e9,
            Feature::LossRatio => 1.0,
            Feature::SentLatencyInflation | Feature::AckLatencyInflation => 10.0,
            Feature::LatencyRatio => 10000.0,
            Feature::SendRatio => 1000.0,
            _ => 100.0,
        }
    }

    /// Divisor applied before a value enters an observation vector.
    pub fn scale(&self) -> f64 {
        match self {
            Feature::SendRate | Feature::RecvRate => 1e7,
            _ => 1.0,
        }
    }

    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Feature>, SimError> {
        names.iter().map(|name| name.as_ref().parse()).collect()
    }
}

impl FromStr for Feature {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| SimError::UnknownFeature(name.to_string()))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lower bound of each feature, in observation (scaled) units.
pub fn min_vector(features: &[Feature]) -> Vec<f64> {
    features.iter().map(|f| f.min_value() / f.scale()).collect()
}

/// Upper bound of each feature, in observation (scaled) units.
pub fn max_vector(features: &[Feature]) -> Vec<f64> {
    features.iter().map(|f| f.max_value() / f.scale()).collect()
}

/// Counters of one completed observation window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorInterval {
    pub sender: SenderId,
    pub bytes_sent: u64,
    pub bytes_acked: u64,
    pub bytes_lost: u64,
    pub send_start: f64,
    pub send_end: f64,
    pub recv_start: f64,
    pub recv_end: f64,
    pub rtt_samples: Vec<f64>,
    pub packet_size: u64,
}

impl MonitorInterval {
    /// An interval with nothing sent, used to pre-fill a history.
    pub fn empty(sender: SenderId, packet_size: u64) -> Self {
        Self {
            sender,
            bytes_sent: 0,
            bytes_acked: 0,
            bytes_lost: 0,
            send_start: 0.0,
            send_end: 0.0,
            recv_start: 0.0,
            recv_end: 0.0,
            rtt_samples: Vec::new(),
            packet_size,
        }
    }

    pub fn send_dur(&self) -> f64 {
        self.send_end - self.send_start
    }

    pub fn recv_dur(&self) -> f64 {
        self.recv_end - self.recv_start
    }

    /// Bits per second offered to the path.
    pub fn send_rate(&self) -> f64 {
        let dur = self.send_dur();
        if dur > 0.0 {
            8.0 * self.bytes_sent as f64 / dur
        } else {
            0.0
        }
    }

    /// Bits per second acknowledged. The first acknowledged packet only opens
    /// the window and is not counted.
    pub fn recv_rate(&self) -> f64 {
        let dur = self.recv_dur();
        if dur > 0.0 {
            8.0 * self.bytes_acked.saturating_sub(self.packet_size) as f64 / dur
        } else {
            0.0
        }
    }

    pub fn avg_latency(&self) -> f64 {
        if self.rtt_samples.is_empty() {
            return 0.0;
        }
        self.rtt_samples.iter().sum::<f64>() / self.rtt_samples.len() as f64
    }

    pub fn loss_ratio(&self) -> f64 {
        let total = self.bytes_lost + self.bytes_acked;
        if total > 0 {
            self.bytes_lost as f64 / total as f64
        } else {
            0.0
        }
    }

    fn latency_change(&self) -> f64 {
        match (self.rtt_samples.first(), self.rtt_samples.last()) {
            (Some(first), Some(last)) if self.rtt_samples.len() >= 2 => last - first,
            _ => 0.0,
        }
    }

    pub fn sent_latency_inflation(&self) -> f64 {
        let dur = self.send_dur();
        if dur > 0.0 {
            self.latency_change() / dur
        } else {
            0.0
        }
    }

    pub fn ack_latency_inflation(&self) -> f64 {
        let dur = self.recv_dur();
        if dur > 0.0 {
            self.latency_change() / dur
        } else {
            0.0
        }
    }

    /// Mean latency of the second half of the samples minus the first half.
    pub fn latency_increase(&self) -> f64 {
        let half = self.rtt_samples.len() / 2;
        if half == 0 {
            return 0.0;
        }
        let (early, late) = self.rtt_samples.split_at(half);
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        mean(late) - mean(early)
    }

    pub fn send_ratio(&self) -> f64 {
        let thpt = self.recv_rate();
        let send_rate = self.send_rate();
        if thpt > 0.0 && send_rate < 1000.0 * thpt {
            send_rate / thpt
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    interval: MonitorInterval,
    conn_min_latency: f64,
}

impl HistoryEntry {
    fn value(&self, feature: Feature) -> f64 {
        let mi = &self.interval;
        match feature {
            Feature::SendRate => mi.send_rate(),
            Feature::RecvRate => mi.recv_rate(),
            Feature::SendDur => mi.send_dur(),
            Feature::RecvDur => mi.recv_dur(),
            Feature::AvgLatency => mi.avg_latency(),
            Feature::LossRatio => mi.loss_ratio(),
            Feature::SentLatencyInflation => mi.sent_latency_inflation(),
            Feature::AckLatencyInflation => mi.ack_latency_inflation(),
            Feature::ConnMinLatency => self.conn_min_latency,
            Feature::LatencyIncrease => mi.latency_increase(),
            Feature::LatencyRatio => {
                if self.conn_min_latency > 0.0 {
                    mi.avg_latency() / self.conn_min_latency
                } else {
                    1.0
                }
            }
            Feature::SendRatio => mi.send_ratio(),
        }
    }
}

/// Fixed-length window of past monitor intervals for one sender.
#[derive(Debug, Clone)]
pub struct SenderHistory {
    sender: SenderId,
    features: Vec<Feature>,
    entries: VecDeque<HistoryEntry>,
    /// Smallest non-zero average latency seen on this connection.
    conn_min_latency: Option<f64>,
}

impl SenderHistory {
    pub fn new(length: usize, features: Vec<Feature>, sender: SenderId, packet_size: u64) -> Self {
        let entries = (0..length)
            .map(|_| HistoryEntry {
                interval: MonitorInterval::empty(sender, packet_size),
                conn_min_latency: 0.0,
            })
            .collect();
        Self {
            sender,
            features,
            entries,
            conn_min_latency: None,
        }
    }

    pub fn sender(&self) -> SenderId {
        self.sender
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold one completed interval into the history, evicting the oldest.
    pub fn step(&mut self, interval: MonitorInterval) {
        let latency = interval.avg_latency();
        if latency > 0.0 {
            let min = self.conn_min_latency.map_or(latency, |m| m.min(latency));
            self.conn_min_latency = Some(min);
        }
        if self.entries.is_empty() {
            return;
        }
        self.entries.pop_front();
        self.entries.push_back(HistoryEntry {
            interval,
            conn_min_latency: self.conn_min_latency.unwrap_or(0.0),
        });
    }

    /// Flat `len() * features().len()` vector, oldest interval first.
    pub fn as_vector(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.entries.len() * self.features.len());
        for entry in &self.entries {
            for feature in &self.features {
                out.push(entry.value(*feature) / feature.scale());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(acked: u64, lost: u64, rtts: &[f64]) -> MonitorInterval {
        MonitorInterval {
            sender: SenderId(0),
            bytes_sent: (acked + lost) * 1500,
            bytes_acked: acked * 1500,
            bytes_lost: lost * 1500,
            send_start: 1.0,
            send_end: 2.0,
            recv_start: 1.0,
            recv_end: 2.0,
            rtt_samples: rtts.to_vec(),
            packet_size: 1500,
        }
    }

    #[test]
    fn parses_feature_names() {
        let names = ["sent latency inflation", " latency ratio", "send ratio"];
        let features = Feature::parse_list(&names).expect("known names");
        assert_eq!(
            features,
            vec![
                Feature::SentLatencyInflation,
                Feature::LatencyRatio,
                Feature::SendRatio
            ]
        );
        assert!(matches!(
            "jitter".parse::<Feature>(),
            Err(SimError::UnknownFeature(name)) if name == "jitter"
        ));
    }

    #[test]
    fn interval_rates_and_ratios() {
        let mi = interval(10, 10, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(mi.send_rate(), 8.0 * 20.0 * 1500.0);
        assert_eq!(mi.recv_rate(), 8.0 * 9.0 * 1500.0);
        assert_eq!(mi.loss_ratio(), 0.5);
        assert!((mi.avg_latency() - 0.25).abs() < 1e-12);
        assert!((mi.sent_latency_inflation() - 0.3).abs() < 1e-12);
        assert!((mi.latency_increase() - 0.2).abs() < 1e-12);
        assert!((mi.send_ratio() - 20.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn empty_interval_is_all_neutral() {
        let mi = MonitorInterval::empty(SenderId(3), 1500);
        assert_eq!(mi.send_rate(), 0.0);
        assert_eq!(mi.recv_rate(), 0.0);
        assert_eq!(mi.loss_ratio(), 0.0);
        assert_eq!(mi.avg_latency(), 0.0);
        assert_eq!(mi.send_ratio(), 1.0);
    }

    #[test]
    fn history_vector_shape_and_order() {
        let features = vec![Feature::AvgLatency, Feature::LatencyRatio];
        let mut history = SenderHistory::new(3, features.clone(), SenderId(0), 1500);
        assert_eq!(history.as_vector(), vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);

        history.step(interval(5, 0, &[0.2, 0.2]));
        history.step(interval(5, 0, &[0.4, 0.4]));
        let v = history.as_vector();
        assert_eq!(v.len(), 3 * features.len());
        // Oldest pre-filled slot, then 0.2 (ratio 1), then 0.4 (ratio 2).
        assert_eq!(&v[..2], &[0.0, 1.0]);
        assert!((v[2] - 0.2).abs() < 1e-12);
        assert!((v[3] - 1.0).abs() < 1e-12);
        assert!((v[4] - 0.4).abs() < 1e-12);
        assert!((v[5] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_are_scaled_like_observations() {
        let features = [Feature::SendRate, Feature::LatencyRatio];
        assert_eq!(min_vector(&features), vec![0.0, 1.0]);
        assert_eq!(max_vector(&features), vec![100.0, 10000.0]);
    }
}
