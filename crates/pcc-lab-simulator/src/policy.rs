use pcc_lab_abstract::{Action, ControlPolicy, PolicySpec};

/// Same action for every sender at every step.
#[derive(Debug, Clone)]
pub struct ConstantPolicy {
    action: Action,
}

impl ConstantPolicy {
    pub fn new(action: Action) -> Self {
        Self { action }
    }
}

impl ControlPolicy for ConstantPolicy {
    fn act(&mut self, _sender: usize, _observation: &[f64]) -> Action {
        self.action
    }
}

/// Cycles through a list of rate deltas, one position per sender.
#[derive(Debug, Clone)]
pub struct ScheduledPolicy {
    deltas: Vec<f64>,
    cursors: Vec<usize>,
}

impl ScheduledPolicy {
    pub fn new(deltas: Vec<f64>) -> Self {
        Self {
            deltas,
            cursors: Vec::new(),
        }
    }
}

impl ControlPolicy for ScheduledPolicy {
    fn reset(&mut self) {
        self.cursors.clear();
    }

    fn act(&mut self, sender: usize, _observation: &[f64]) -> Action {
        if self.deltas.is_empty() {
            return Action::rate(0.0);
        }
        if self.cursors.len() <= sender {
            self.cursors.resize(sender + 1, 0);
        }
        let cursor = &mut self.cursors[sender];
        let delta = self.deltas[*cursor % self.deltas.len()];
        *cursor += 1;
        Action::rate(delta)
    }
}

pub fn build_policy(spec: &PolicySpec) -> Box<dyn ControlPolicy> {
    match spec {
        PolicySpec::Constant {
            rate_delta,
            cwnd_delta,
        } => Box::new(ConstantPolicy::new(Action {
            rate_delta: *rate_delta,
            cwnd_delta: *cwnd_delta,
        })),
        PolicySpec::Schedule { rate_deltas } => Box::new(ScheduledPolicy::new(rate_deltas.clone())),
    }
}
