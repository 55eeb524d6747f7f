use pcc_lab_abstract::RewardConfig;

use crate::monitor::MonitorInterval;

/// Weight applied to the throughput term for a loss excess `x`.
///
/// Decreasing in `x`: `1 / (1 + e^(10x))`.
pub fn penalty_weight(x: f64) -> f64 {
    1.0 / (1.0 + (10.0 * x).exp())
}

/// Reward of one completed observation window.
pub fn interval_reward(interval: &MonitorInterval, config: &RewardConfig) -> f64 {
    let loss = interval.loss_ratio();
    let throughput = config.throughput_coeff * interval.recv_rate();
    let send = config.throughput_coeff * interval.send_rate();
    (throughput * penalty_weight(loss - config.loss_threshold) - send * loss) * config.reward_scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SenderId;

    fn interval(acked: u64, lost: u64) -> MonitorInterval {
        MonitorInterval {
            bytes_sent: (acked + lost) * 1500,
            bytes_acked: acked * 1500,
            bytes_lost: lost * 1500,
            send_start: 0.0,
            send_end: 1.0,
            recv_start: 0.0,
            recv_end: 1.0,
            rtt_samples: vec![0.06; acked as usize],
            ..MonitorInterval::empty(SenderId(0), 1500)
        }
    }

    #[test]
    fn penalty_weight_strictly_decreases_with_loss() {
        let threshold = RewardConfig::default().loss_threshold;
        let weights: Vec<f64> = (0..=20)
            .map(|i| penalty_weight(i as f64 / 20.0 - threshold))
            .collect();
        for pair in weights.windows(2) {
            assert!(pair[1] < pair[0], "{pair:?}");
        }
        assert_eq!(penalty_weight(0.0), 0.5);
    }

    #[test]
    fn lossless_reward_tracks_throughput() {
        let config = RewardConfig::default();
        let mi = interval(101, 0);
        let expected = config.throughput_coeff
            * mi.recv_rate()
            * penalty_weight(-config.loss_threshold)
            * config.reward_scale;
        assert!((interval_reward(&mi, &config) - expected).abs() < 1e-15);
        assert!(interval_reward(&mi, &config) > 0.0);
    }

    #[test]
    fn total_loss_is_negative() {
        let config = RewardConfig::default();
        assert!(interval_reward(&interval(0, 50), &config) < 0.0);
        assert_eq!(interval_reward(&MonitorInterval::empty(SenderId(0), 1500), &config), 0.0);
    }

    #[test]
    fn more_loss_means_less_reward() {
        let config = RewardConfig::default();
        let low = interval_reward(&interval(95, 5), &config);
        let high = interval_reward(&interval(60, 40), &config);
        assert!(high < low);
    }
}
