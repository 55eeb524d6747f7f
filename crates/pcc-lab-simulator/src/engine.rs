use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use pcc_lab_abstract::{ControlConfig, LinkConfig, NetworkConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Result, SimError};
use crate::link::Link;
use crate::reward::interval_reward;
use crate::sender::{Sender, SenderSpec};

/// Send-period noise is clamped to this many standard deviations.
const SEND_NOISE_CLAMP_SIGMAS: f64 = 3.0;

/// Largest relative change noise may make to a send period, keeping it
/// strictly positive.
const SEND_NOISE_MAX_FRACTION: f64 = 0.9;

/// Handle of a sender within one [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SenderId(pub usize);

/// Handle of a link within one [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LinkId(pub usize);

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender#{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Which half of the folded round trip a packet is in.
///
/// A packet travels `Outbound` up to and including its sender's destination
/// hop, where admission (loss and queue) is checked. It then turns around and
/// travels the rest of the path as `Return`, accruing latency only. The
/// declaration order is part of the event tie-break: `Return` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Return,
    Outbound,
}

/// A scheduled step of one packet, or a sender's send tick when
/// `phase == Outbound && hop == 0`.
///
/// Events are ordered by `(time, sender, phase, hop, latency, dropped)`.
/// Floats compare by IEEE total order so the order is total and a fixed
/// seed replays the same sequence.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Event {
    pub time: f64,
    pub sender: SenderId,
    pub phase: Phase,
    /// Index into the sender's path of the next link to traverse.
    pub hop: usize,
    /// Latency accumulated so far.
    pub latency: f64,
    pub dropped: bool,
}

impl Event {
    fn send_tick(time: f64, sender: SenderId) -> Self {
        Self {
            time,
            sender,
            phase: Phase::Outbound,
            hop: 0,
            latency: 0.0,
            dropped: false,
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.sender.cmp(&other.sender))
            .then_with(|| self.phase.cmp(&other.phase))
            .then_with(|| self.hop.cmp(&other.hop))
            .then_with(|| self.latency.total_cmp(&other.latency))
            .then_with(|| self.dropped.cmp(&other.dropped))
    }
}

/// Links and senders of one episode, before they are handed to a [`Network`].
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: Vec<LinkConfig>,
    senders: Vec<SenderSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&mut self, config: LinkConfig) -> LinkId {
        self.links.push(config);
        LinkId(self.links.len() - 1)
    }

    pub fn add_sender(&mut self, spec: SenderSpec) -> SenderId {
        self.senders.push(spec);
        SenderId(self.senders.len() - 1)
    }

    fn validate(&self) -> Result<()> {
        for (idx, link) in self.links.iter().enumerate() {
            let valid = link.bandwidth > 0.0
                && link.bandwidth.is_finite()
                && link.delay >= 0.0
                && link.queue_packets >= 0.0
                && (0.0..=1.0).contains(&link.loss_rate);
            if !valid {
                return Err(SimError::InvalidTopology(format!(
                    "link#{idx} has invalid parameters {link:?}"
                )));
            }
        }
        for (idx, spec) in self.senders.iter().enumerate() {
            if spec.path.is_empty() {
                return Err(SimError::InvalidTopology(format!(
                    "sender#{idx} has an empty path"
                )));
            }
            if let Some(link) = spec.path.iter().find(|l| l.0 >= self.links.len()) {
                return Err(SimError::InvalidTopology(format!(
                    "sender#{idx} routes over unknown {link}"
                )));
            }
            if spec.dest >= spec.path.len() {
                return Err(SimError::InvalidTopology(format!(
                    "sender#{idx} destination {} is past its {}-hop path",
                    spec.dest,
                    spec.path.len()
                )));
            }
            validate_control(idx, &spec.control)?;
            if !(spec.starting_rate > 0.0 && spec.starting_rate.is_finite()) {
                return Err(SimError::InvalidTopology(format!(
                    "sender#{idx} starting rate {} must be positive",
                    spec.starting_rate
                )));
            }
        }
        Ok(())
    }
}

fn validate_control(sender: usize, control: &ControlConfig) -> Result<()> {
    if !(control.min_rate > 0.0 && control.min_rate <= control.max_rate) {
        return Err(SimError::InvalidConfig(format!(
            "sender#{sender} rate bounds [{}, {}] must satisfy 0 < min <= max",
            control.min_rate, control.max_rate
        )));
    }
    if control.min_cwnd > control.max_cwnd {
        return Err(SimError::InvalidConfig(format!(
            "sender#{sender} window bounds [{}, {}] must satisfy min <= max",
            control.min_cwnd, control.max_cwnd
        )));
    }
    if !control.delta_scale.is_finite() {
        return Err(SimError::InvalidConfig(format!(
            "sender#{sender} delta_scale {} must be finite",
            control.delta_scale
        )));
    }
    Ok(())
}

/// The discrete-event engine: simulated time, the event queue, and the
/// links and senders packets move through.
pub struct Network<R = StdRng> {
    time: f64,
    event_queue: BinaryHeap<Reverse<Event>>,
    events_processed: u64,

    links: Vec<Link>,
    senders: Vec<Sender>,

    config: NetworkConfig,
    send_noise: Option<Normal<f64>>,
    rng: R,

    /// Processed events, recorded only when enabled.
    event_log: Option<Vec<Event>>,
}

impl Network<StdRng> {
    pub fn from_seed(topology: Topology, config: NetworkConfig, seed: u64) -> Result<Self> {
        Self::new(topology, config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Network<R> {
    pub fn new(topology: Topology, config: NetworkConfig, rng: R) -> Result<Self> {
        if !(config.max_latency_noise >= 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "max_latency_noise {} must be at least 1",
                config.max_latency_noise
            )));
        }
        if config.packet_size == 0 {
            return Err(SimError::InvalidConfig("packet_size must be non-zero".into()));
        }
        let send_noise = if config.send_period_noise {
            let normal = Normal::new(0.0, config.send_period_noise_std)
                .map_err(|e| SimError::InvalidConfig(format!("send period noise: {e}")))?;
            Some(normal)
        } else {
            None
        };

        let mut network = Self {
            time: 0.0,
            event_queue: BinaryHeap::new(),
            events_processed: 0,
            links: Vec::new(),
            senders: Vec::new(),
            config,
            send_noise,
            rng,
            event_log: None,
        };
        network.rebuild(topology)?;
        Ok(network)
    }

    /// Swap in a new topology and start a fresh episode on it.
    pub fn rebuild(&mut self, topology: Topology) -> Result<()> {
        topology.validate()?;
        let packet_size = self.config.packet_size;
        self.links = topology.links.iter().map(Link::new).collect();
        self.senders = topology
            .senders
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| Sender::new(SenderId(idx), spec, packet_size))
            .collect();
        self.reset();
        Ok(())
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn peek_next_event_time(&self) -> Option<f64> {
        self.event_queue.peek().map(|Reverse(e)| e.time)
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn senders(&self) -> &[Sender] {
        &self.senders
    }

    pub fn sender(&self, id: SenderId) -> Option<&Sender> {
        self.senders.get(id.0)
    }

    pub fn sender_mut(&mut self, id: SenderId) -> Option<&mut Sender> {
        self.senders.get_mut(id.0)
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Start recording every processed event.
    pub fn enable_event_log(&mut self) {
        self.event_log.get_or_insert_with(Vec::new);
    }

    /// Drain the recorded events, keeping recording enabled.
    pub fn take_event_log(&mut self) -> Vec<Event> {
        self.event_log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Start a new episode: time zero, empty queues, and one pending send
    /// tick per sender.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.event_queue.clear();
        self.links.iter_mut().for_each(Link::reset);
        let now = self.time;
        for sender in &mut self.senders {
            sender.reset_episode(now);
        }
        self.queue_initial_packets();
    }

    fn queue_initial_packets(&mut self) {
        for idx in 0..self.senders.len() {
            let rate = self.senders[idx].rate();
            let time = self.time + self.send_period(rate);
            self.push_event(Event::send_tick(time, SenderId(idx)));
        }
    }

    fn push_event(&mut self, event: Event) {
        self.event_queue.push(Reverse(event));
    }

    /// Mean `1 / rate`, optionally perturbed by clamped zero-mean noise.
    /// Always positive, so time never runs backwards.
    fn send_period(&mut self, rate: f64) -> f64 {
        let period = 1.0 / rate;
        match &self.send_noise {
            Some(normal) => {
                let bound =
                    (SEND_NOISE_CLAMP_SIGMAS * normal.std_dev()).min(SEND_NOISE_MAX_FRACTION);
                let noise = normal.sample(&mut self.rng).clamp(-bound, bound);
                period + period * noise
            }
            None => period,
        }
    }

    fn hop_latency(&mut self, link: LinkId) -> f64 {
        let latency = self.links[link.0].current_latency(self.time);
        if self.config.latency_noise {
            latency * self.rng.random_range(1.0..=self.config.max_latency_noise)
        } else {
            latency
        }
    }

    /// Move a packet across the link at `event.hop` and return its successor.
    fn traverse(&mut self, event: Event) -> Event {
        let sender = &self.senders[event.sender.0];
        let link = sender.path()[event.hop];
        let dest = sender.dest();

        let latency = self.hop_latency(link);
        let mut phase = event.phase;
        let mut dropped = event.dropped;
        if phase == Phase::Outbound {
            if !dropped && !self.links[link.0].packet_enters_link(self.time, &mut self.rng) {
                debug!(
                    "t={:.6} {} packet dropped entering {}",
                    self.time, event.sender, link
                );
                dropped = true;
            }
            if event.hop == dest {
                phase = Phase::Return;
            }
        }

        Event {
            time: self.time + latency,
            sender: event.sender,
            phase,
            hop: event.hop + 1,
            latency: event.latency + latency,
            dropped,
        }
    }

    /// Process the earliest pending event and return it.
    ///
    /// An empty queue means some sender lost its send tick, which is an
    /// internal consistency failure.
    pub fn step(&mut self) -> Result<Event> {
        let Reverse(event) = self
            .event_queue
            .pop()
            .ok_or(SimError::EventQueueExhausted { time: self.time })?;
        self.time = event.time;
        trace!("Processing event at {:.6}: {:?}", self.time, event);

        let idx = event.sender.0;
        let path_len = self.senders[idx].path().len();
        match event.phase {
            Phase::Return if event.hop == path_len => {
                let sender = &mut self.senders[idx];
                if event.dropped {
                    sender.on_lost();
                } else {
                    sender.on_acked(event.latency);
                }
            }
            Phase::Return => {
                let next = self.traverse(event);
                self.push_event(next);
            }
            Phase::Outbound if event.hop == 0 => {
                let rate = self.senders[idx].rate();
                let next_tick = self.time + self.send_period(rate);
                self.push_event(Event::send_tick(next_tick, event.sender));
                if self.senders[idx].can_send() {
                    self.senders[idx].on_sent();
                    let next = self.traverse(event);
                    self.push_event(next);
                }
            }
            Phase::Outbound => {
                let next = self.traverse(event);
                self.push_event(next);
            }
        }

        self.events_processed += 1;
        if let Some(log) = &mut self.event_log {
            log.push(event);
        }
        Ok(event)
    }

    /// Run one observation window of `dur` simulated seconds and return one
    /// reward per sender, in sender order.
    pub fn run_for_duration(&mut self, dur: f64) -> Result<Vec<f64>> {
        let start = self.time;
        let end_time = start + dur;
        for sender in &mut self.senders {
            sender.reset_observation_window(start);
        }

        let processed_before = self.events_processed;
        while self.time < end_time {
            self.step()?;
        }

        let now = self.time;
        let rewards: Vec<f64> = self
            .senders
            .iter()
            .map(|s| interval_reward(&s.snapshot_interval(now), &self.config.reward))
            .collect();
        debug!(
            "Window [{:.4}, {:.4}) processed {} events, rewards {:?}",
            start,
            now,
            self.events_processed - processed_before,
            rewards
        );
        Ok(rewards)
    }
}
