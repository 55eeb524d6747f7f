use serde::{Deserialize, Serialize};

/// One control decision for one sender.
///
/// `rate_delta` is always applied. `cwnd_delta` is only consulted when the
/// environment runs in window mode, where it is required.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Action {
    pub rate_delta: f64,
    #[serde(default)]
    pub cwnd_delta: Option<f64>,
}

impl Action {
    pub fn rate(delta: f64) -> Self {
        Self {
            rate_delta: delta,
            cwnd_delta: None,
        }
    }

    pub fn rate_and_window(rate_delta: f64, cwnd_delta: f64) -> Self {
        Self {
            rate_delta,
            cwnd_delta: Some(cwnd_delta),
        }
    }
}

/// The interface a controller implements to drive the environment.
pub trait ControlPolicy {
    /// Called at the start of every episode.
    fn reset(&mut self) {}

    /// Choose the next action for `sender` from its latest observation vector.
    fn act(&mut self, sender: usize, observation: &[f64]) -> Action;
}
