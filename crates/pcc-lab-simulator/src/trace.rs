use pcc_lab_abstract::SimConfig;
use serde::Serialize;

/// What one sender did during one control step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub sender: usize,
    pub episode: u32,
    pub step: u32,
    pub reward: f64,
    /// Pacing rate after the step's action, packets per second.
    pub rate: f64,
    pub cwnd: u32,
    /// Offered load over the step, bits per second.
    pub send_rate: f64,
    pub throughput: f64,
    pub latency: f64,
    pub loss_ratio: f64,
}

/// Per-sender aggregate over one episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub episode: u32,
    pub sender: usize,
    pub steps: usize,
    pub total_reward: f64,
    pub mean_rate: f64,
    pub mean_throughput: f64,
    pub mean_latency: f64,
    pub mean_loss_ratio: f64,
}

impl EpisodeSummary {
    /// Group `records` by `(episode, sender)`, in first-seen order.
    pub fn from_records(records: &[StepRecord]) -> Vec<EpisodeSummary> {
        let mut keys: Vec<(u32, usize)> = Vec::new();
        for r in records {
            if !keys.contains(&(r.episode, r.sender)) {
                keys.push((r.episode, r.sender));
            }
        }
        keys.into_iter()
            .map(|(episode, sender)| {
                let rows: Vec<&StepRecord> = records
                    .iter()
                    .filter(|r| r.episode == episode && r.sender == sender)
                    .collect();
                let n = rows.len() as f64;
                let mean = |f: fn(&StepRecord) -> f64| rows.iter().map(|r| f(r)).sum::<f64>() / n;
                EpisodeSummary {
                    episode,
                    sender,
                    steps: rows.len(),
                    total_reward: rows.iter().map(|r| r.reward).sum(),
                    mean_rate: mean(|r| r.rate),
                    mean_throughput: mean(|r| r.throughput),
                    mean_latency: mean(|r| r.latency),
                    mean_loss_ratio: mean(|r| r.loss_ratio),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub scenario: Option<String>,
    pub episodes: Vec<EpisodeSummary>,
    pub steps: Vec<StepRecord>,
}

impl SimulationReport {
    pub fn new(config: SimConfig, scenario: Option<String>, steps: Vec<StepRecord>) -> Self {
        Self {
            config,
            scenario,
            episodes: EpisodeSummary::from_records(&steps),
            steps,
        }
    }

    pub fn mean_reward(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.steps.iter().map(|r| r.reward).sum::<f64>() / self.steps.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(episode: u32, sender: usize, reward: f64, latency: f64) -> StepRecord {
        StepRecord {
            sender,
            episode,
            step: 1,
            reward,
            rate: 100.0,
            cwnd: 25,
            send_rate: 0.0,
            throughput: 0.0,
            latency,
            loss_ratio: 0.0,
        }
    }

    #[test]
    fn summaries_group_by_episode_and_sender() {
        let steps = vec![
            record(1, 0, 1.0, 0.1),
            record(1, 1, 2.0, 0.2),
            record(1, 0, 3.0, 0.3),
            record(2, 0, -1.0, 0.4),
        ];
        let report = SimulationReport::new(SimConfig::default(), None, steps);
        assert_eq!(report.episodes.len(), 3);

        let first = &report.episodes[0];
        assert_eq!((first.episode, first.sender, first.steps), (1, 0, 2));
        assert_eq!(first.total_reward, 4.0);
        assert!((first.mean_latency - 0.2).abs() < 1e-12);
        assert_eq!(report.episodes[2].episode, 2);
        assert_eq!(report.mean_reward(), 1.25);
    }
}
