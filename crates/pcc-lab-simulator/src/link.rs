use pcc_lab_abstract::LinkConfig;
use rand::Rng;

/// A directional link with leaky-bucket queueing and random early loss.
///
/// The queue is tracked as the delay a newly admitted packet would wait. It
/// drains at one second of delay per simulated second.
#[derive(Debug, Clone)]
pub struct Link {
    bandwidth: f64,
    delay: f64,
    loss_rate: f64,
    max_queue_delay: f64,
    queue_delay: f64,
    queue_delay_update_time: f64,
}

impl Link {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            bandwidth: config.bandwidth,
            delay: config.delay,
            loss_rate: config.loss_rate,
            max_queue_delay: config.queue_packets / config.bandwidth,
            queue_delay: 0.0,
            queue_delay_update_time: 0.0,
        }
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    pub fn max_queue_delay(&self) -> f64 {
        self.max_queue_delay
    }

    /// Queue delay as last committed, without decay.
    pub fn stored_queue_delay(&self) -> f64 {
        self.queue_delay
    }

    pub fn current_queue_delay(&self, at_time: f64) -> f64 {
        (self.queue_delay - (at_time - self.queue_delay_update_time)).max(0.0)
    }

    pub fn current_latency(&self, at_time: f64) -> f64 {
        self.delay + self.current_queue_delay(at_time)
    }

    /// Try to admit one packet. Returns `false` on random loss or tail drop.
    pub fn packet_enters_link<R: Rng>(&mut self, at_time: f64, rng: &mut R) -> bool {
        if rng.random::<f64>() < self.loss_rate {
            return false;
        }
        self.queue_delay = self.current_queue_delay(at_time);
        self.queue_delay_update_time = at_time;
        let extra_delay = 1.0 / self.bandwidth;
        if self.queue_delay + extra_delay > self.max_queue_delay {
            return false;
        }
        self.queue_delay += extra_delay;
        true
    }

    pub fn reset(&mut self) {
        self.queue_delay = 0.0;
        self.queue_delay_update_time = 0.0;
    }
}
