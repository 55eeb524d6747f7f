use pcc_lab_abstract::{Action, LinkConfig, SimConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::engine::{Network, SenderId, Topology};
use crate::error::{Result, SimError};
use crate::monitor::{self, Feature};
use crate::sender::SenderSpec;
use crate::trace::StepRecord;

/// Inclusive lower and upper bounds of a vector space.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

/// Per-sender results of one control step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observations: Vec<Vec<f64>>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub records: Vec<StepRecord>,
}

/// Multi-sender control environment over a two-link shared path.
///
/// Every sender routes over `[link0, link1]` with its destination at hop 0,
/// so link 0 carries the outbound leg and link 1 the return leg.
pub struct NetworkEnv<R = StdRng> {
    config: SimConfig,
    features: Vec<Feature>,
    network: Network<R>,
    link: LinkConfig,
    episodes_run: u32,
    steps_taken: u32,
}

impl NetworkEnv<StdRng> {
    pub fn new(config: SimConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> NetworkEnv<R> {
    pub fn with_rng(config: SimConfig, mut rng: R) -> Result<Self> {
        if config.num_senders == 0 {
            return Err(SimError::InvalidConfig("num_senders must be at least 1".into()));
        }
        if !(config.step_duration > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "step_duration {} must be positive",
                config.step_duration
            )));
        }
        let features = Feature::parse_list(&config.features)?;
        let link = draw_link(&config, &mut rng);
        let topology = build_topology(&config, &features, link, &mut rng);
        let network = Network::new(topology, config.network, rng)?;
        Ok(Self {
            config,
            features,
            network,
            link,
            episodes_run: 0,
            steps_taken: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn network(&self) -> &Network<R> {
        &self.network
    }

    /// Parameters shared by both links of the current episode.
    pub fn link(&self) -> &LinkConfig {
        &self.link
    }

    pub fn episodes_run(&self) -> u32 {
        self.episodes_run
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn num_senders(&self) -> usize {
        self.network.senders().len()
    }

    pub fn action_bounds(&self) -> Bounds {
        if self.config.control.use_cwnd {
            Bounds {
                low: vec![-1e12, -1e12],
                high: vec![1e12, 1e12],
            }
        } else {
            let max = self.config.control.max_rate;
            Bounds {
                low: vec![-max],
                high: vec![max],
            }
        }
    }

    pub fn observation_bounds(&self) -> Bounds {
        let tile = |v: Vec<f64>| v.repeat(self.config.history_len);
        Bounds {
            low: tile(monitor::min_vector(&self.features)),
            high: tile(monitor::max_vector(&self.features)),
        }
    }

    pub fn observations(&self) -> Vec<Vec<f64>> {
        self.network.senders().iter().map(|s| s.observation()).collect()
    }

    /// Start a new episode on freshly drawn links and return the first
    /// observation of every sender.
    pub fn reset(&mut self) -> Result<Vec<Vec<f64>>> {
        let link = draw_link(&self.config, self.network.rng_mut());
        let topology = build_topology(&self.config, &self.features, link, self.network.rng_mut());
        self.network.rebuild(topology)?;
        self.link = link;
        self.steps_taken = 0;
        self.episodes_run += 1;

        let warmup = 3.0 * link.delay;
        self.network.run_for_duration(warmup)?;
        self.network.run_for_duration(warmup)?;

        info!(
            "Episode {} on links bw={:.1} delay={:.3} queue={} loss={:.4}",
            self.episodes_run, link.bandwidth, link.delay, link.queue_packets, link.loss_rate
        );
        Ok(self.observations())
    }

    /// Apply one action per sender, simulate one step, and report.
    ///
    /// Actions are validated before any sender is touched, so a rejected
    /// step leaves the environment unchanged.
    pub fn step(&mut self, actions: &[Action]) -> Result<StepOutcome> {
        let expected = self.num_senders();
        if actions.len() != expected {
            return Err(SimError::ActionCountMismatch {
                expected,
                got: actions.len(),
            });
        }
        let use_cwnd = self.config.control.use_cwnd;
        for (idx, action) in actions.iter().enumerate() {
            let sender = SenderId(idx);
            if action.rate_delta.is_nan() {
                return Err(SimError::InvalidDelta {
                    sender,
                    value: action.rate_delta,
                });
            }
            if use_cwnd {
                match action.cwnd_delta {
                    None => return Err(SimError::MissingWindowDelta(sender)),
                    Some(value) if value.is_nan() => {
                        return Err(SimError::InvalidDelta { sender, value });
                    }
                    Some(_) => {}
                }
            }
        }

        for (idx, action) in actions.iter().enumerate() {
            let id = SenderId(idx);
            let sender = self
                .network
                .sender_mut(id)
                .ok_or_else(|| SimError::InvalidTopology(format!("{id} does not exist")))?;
            sender.apply_rate_delta(action.rate_delta)?;
            if use_cwnd && let Some(delta) = action.cwnd_delta {
                sender.apply_window_delta(delta)?;
            }
        }

        let rewards = self.network.run_for_duration(self.config.step_duration)?;
        self.steps_taken += 1;

        let now = self.network.current_time();
        let episode = self.episodes_run;
        let step = self.steps_taken;
        let mut records = Vec::with_capacity(expected);
        for idx in 0..expected {
            let Some(sender) = self.network.sender_mut(SenderId(idx)) else {
                continue;
            };
            sender.record_interval(now);
            let mi = sender.snapshot_interval(now);
            records.push(StepRecord {
                sender: idx,
                episode,
                step,
                reward: rewards[idx],
                rate: sender.rate(),
                cwnd: sender.cwnd(),
                send_rate: mi.send_rate(),
                throughput: mi.recv_rate(),
                latency: mi.avg_latency(),
                loss_ratio: mi.loss_ratio(),
            });
        }
        debug!("Step {} of episode {}: rewards {:?}", step, episode, rewards);

        let done = self.steps_taken >= self.config.max_steps;
        Ok(StepOutcome {
            observations: self.observations(),
            rewards,
            dones: vec![done; expected],
            records,
        })
    }
}

fn uniform<R: Rng>(rng: &mut R, (low, high): (f64, f64)) -> f64 {
    if high > low {
        rng.random_range(low..high)
    } else {
        low
    }
}

fn draw_link<R: Rng>(config: &SimConfig, rng: &mut R) -> LinkConfig {
    if !config.random_link {
        return config.link;
    }
    let ranges = &config.link_ranges;
    let bandwidth = uniform(rng, ranges.bandwidth);
    let delay = uniform(rng, ranges.delay);
    let queue_packets = 1.0 + uniform(rng, ranges.queue_exponent).exp().floor();
    let loss_rate = uniform(rng, ranges.loss_rate);
    LinkConfig {
        bandwidth,
        delay,
        queue_packets,
        loss_rate,
    }
}

fn build_topology<R: Rng>(
    config: &SimConfig,
    features: &[Feature],
    link: LinkConfig,
    rng: &mut R,
) -> Topology {
    let mut topology = Topology::new();
    let outbound = topology.add_link(link);
    let back = topology.add_link(link);

    let starting_rate =
        (uniform(rng, config.starting_rate_fraction) * link.bandwidth).max(config.control.min_rate);
    for _ in 0..config.num_senders {
        topology.add_sender(SenderSpec {
            starting_rate,
            path: vec![outbound, back],
            dest: 0,
            control: config.control,
            history_len: config.history_len,
            features: features.to_vec(),
        });
    }
    topology
}
