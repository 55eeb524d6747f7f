use serde::{Deserialize, Serialize};

/// Size of every simulated packet, in bytes.
pub const BYTES_PER_PACKET: u64 = 1500;

/// Parameters of a single directional link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Packets per second.
    pub bandwidth: f64,
    /// One-way propagation delay in seconds.
    pub delay: f64,
    /// Queue capacity in packets.
    pub queue_packets: f64,
    pub loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bandwidth: 400.0,
            delay: 0.03,
            queue_packets: 10.0,
            loss_rate: 0.0,
        }
    }
}

/// Ranges link parameters are drawn from when `random_link` is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRanges {
    pub bandwidth: (f64, f64),
    pub delay: (f64, f64),
    /// The queue size is `1 + floor(e^u)` with `u` drawn from this range.
    pub queue_exponent: (f64, f64),
    pub loss_rate: (f64, f64),
}

impl Default for LinkRanges {
    fn default() -> Self {
        Self {
            bandwidth: (100.0, 500.0),
            delay: (0.05, 0.5),
            queue_exponent: (0.0, 8.0),
            loss_rate: (0.0, 0.05),
        }
    }
}

/// How control actions map onto sender rate and window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub delta_scale: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub initial_cwnd: u32,
    pub min_cwnd: u32,
    pub max_cwnd: u32,
    /// Admit packets by congestion window instead of pacing alone.
    pub use_cwnd: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            delta_scale: 0.025,
            min_rate: 40.0,
            max_rate: 1000.0,
            initial_cwnd: 25,
            min_cwnd: 4,
            max_cwnd: 5000,
            use_cwnd: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Converts a bit rate into a normalized packet rate.
    pub throughput_coeff: f64,
    pub loss_threshold: f64,
    pub reward_scale: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            throughput_coeff: 10.0 / (8.0 * BYTES_PER_PACKET as f64),
            loss_threshold: 0.05,
            reward_scale: 1e-6,
        }
    }
}

/// Timing and randomization knobs of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub packet_size: u64,
    /// Multiply every hop latency by `Uniform(1, max_latency_noise)`.
    pub latency_noise: bool,
    pub max_latency_noise: f64,
    /// Perturb the inter-send period with clamped gaussian noise.
    pub send_period_noise: bool,
    pub send_period_noise_std: f64,
    pub reward: RewardConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            packet_size: BYTES_PER_PACKET,
            latency_noise: true,
            max_latency_noise: 1.1,
            send_period_noise: true,
            send_period_noise_std: 0.1,
            reward: RewardConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Configuration with every source of timing noise turned off.
    pub fn noiseless() -> Self {
        Self {
            latency_noise: false,
            send_period_noise: false,
            ..Self::default()
        }
    }
}

/// Environment configuration: topology, episode shape and observation features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub num_senders: usize,
    pub random_link: bool,
    pub link: LinkConfig,
    pub link_ranges: LinkRanges,
    pub history_len: usize,
    pub features: Vec<String>,
    pub max_steps: u32,
    /// Simulated seconds per control step.
    pub step_duration: f64,
    /// Starting rate is drawn as a fraction of the link bandwidth.
    pub starting_rate_fraction: (f64, f64),
    pub network: NetworkConfig,
    pub control: ControlConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_senders: 2,
            random_link: false,
            link: LinkConfig::default(),
            link_ranges: LinkRanges::default(),
            history_len: 10,
            features: vec![
                "sent latency inflation".to_string(),
                "latency ratio".to_string(),
                "send ratio".to_string(),
            ],
            max_steps: 400,
            step_duration: 2.0,
            starting_rate_fraction: (0.1, 0.2),
            network: NetworkConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: SimConfig = toml::from_str(
            r#"
            seed = 7
            num_senders = 3

            [link]
            bandwidth = 250.0

            [control]
            use_cwnd = true
            "#,
        )
        .expect("valid config");

        assert_eq!(config.seed, 7);
        assert_eq!(config.num_senders, 3);
        assert_eq!(config.link.bandwidth, 250.0);
        assert_eq!(config.link.delay, 0.03);
        assert!(config.control.use_cwnd);
        assert_eq!(config.control.max_rate, 1000.0);
        assert_eq!(config.features.len(), 3);
    }

    #[test]
    fn noiseless_only_disables_noise() {
        let config = NetworkConfig::noiseless();
        assert!(!config.latency_noise);
        assert!(!config.send_period_noise);
        assert_eq!(config.packet_size, BYTES_PER_PACKET);
        assert_eq!(config.reward, RewardConfig::default());
    }
}
