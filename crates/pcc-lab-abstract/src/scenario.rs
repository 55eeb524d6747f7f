use crate::config::SimConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default = "default_episodes")]
    pub episodes: u32,
    pub policy: PolicySpec,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

fn default_episodes() -> u32 {
    1
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub seed: Option<u64>,
    pub num_senders: Option<usize>,
    pub random_link: Option<bool>,
    pub bandwidth: Option<f64>,
    pub delay: Option<f64>,
    pub queue_packets: Option<f64>,
    pub loss_rate: Option<f64>,
    pub history_len: Option<usize>,
    pub max_steps: Option<u32>,
    pub step_duration: Option<f64>,
    pub use_cwnd: Option<bool>,
    pub latency_noise: Option<bool>,
    pub send_period_noise: Option<bool>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.num_senders {
            config.num_senders = v;
        }
        if let Some(v) = self.random_link {
            config.random_link = v;
        }
        if let Some(v) = self.bandwidth {
            config.link.bandwidth = v;
        }
        if let Some(v) = self.delay {
            config.link.delay = v;
        }
        if let Some(v) = self.queue_packets {
            config.link.queue_packets = v;
        }
        if let Some(v) = self.loss_rate {
            config.link.loss_rate = v;
        }
        if let Some(v) = self.history_len {
            config.history_len = v;
        }
        if let Some(v) = self.max_steps {
            config.max_steps = v;
        }
        if let Some(v) = self.step_duration {
            config.step_duration = v;
        }
        if let Some(v) = self.use_cwnd {
            config.control.use_cwnd = v;
        }
        if let Some(v) = self.latency_noise {
            config.network.latency_noise = v;
        }
        if let Some(v) = self.send_period_noise {
            config.network.send_period_noise = v;
        }
    }
}

/// Built-in controller driving every sender in a scenario.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicySpec {
    /// Apply the same deltas at every step
    Constant {
        rate_delta: f64,
        #[serde(default)]
        cwnd_delta: Option<f64>,
    },
    /// Cycle through a fixed list of rate deltas
    Schedule { rate_deltas: Vec<f64> },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Every step's loss ratio stays at or below `max`
    MaxLossRatio { max: f64 },
    /// Mean per-step throughput (bits/s) of every sender is at least `min`
    MinThroughput { min: f64 },
    /// Mean per-step latency (seconds) of every sender is at most `max`
    MaxAvgLatency { max: f64 },
    /// Mean per-step reward over all senders is at least `min`
    MinMeanReward { min: f64 },
}
