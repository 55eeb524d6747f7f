use anyhow::{Context, anyhow};
use pcc_lab_abstract::{Action, ControlPolicy, SimConfig, TestAssertion, TestScenario};
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::env::NetworkEnv;
use crate::error::Result;
use crate::policy::build_policy;
use crate::trace::{SimulationReport, StepRecord};

/// Drive `env` with `policy` for `episodes` full episodes.
pub fn run_episodes<R: Rng>(
    env: &mut NetworkEnv<R>,
    policy: &mut dyn ControlPolicy,
    episodes: u32,
) -> Result<Vec<StepRecord>> {
    let mut records = Vec::new();
    for _ in 0..episodes {
        policy.reset();
        let mut observations = env.reset()?;
        loop {
            let actions: Vec<Action> = observations
                .iter()
                .enumerate()
                .map(|(sender, obs)| policy.act(sender, obs))
                .collect();
            let outcome = env.step(&actions)?;
            records.extend(outcome.records);
            observations = outcome.observations;
            if outcome.dones.iter().all(|d| *d) {
                break;
            }
        }
    }
    Ok(records)
}

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario file")
}

pub fn run_scenario(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_loaded_scenario(&scenario, SimConfig::default())
}

/// Run `scenario` on top of `base`, then check its assertions.
pub fn run_loaded_scenario(
    scenario: &TestScenario,
    base: SimConfig,
) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut config = base;
    scenario.config.apply_to(&mut config);

    let mut env = NetworkEnv::new(config.clone()).context("Failed to build environment")?;
    let mut policy = build_policy(&scenario.policy);
    let steps = run_episodes(&mut env, policy.as_mut(), scenario.episodes)
        .context("Simulation failed")?;
    let report = SimulationReport::new(config, Some(scenario.name.clone()), steps);

    for assertion in &scenario.assertions {
        check_assertion(assertion, &report)?;
    }

    info!("Test Scenario Passed!");
    Ok(report)
}

fn check_assertion(assertion: &TestAssertion, report: &SimulationReport) -> anyhow::Result<()> {
    match assertion {
        TestAssertion::MaxLossRatio { max } => {
            if let Some(r) = report.steps.iter().find(|r| r.loss_ratio > *max) {
                return Err(anyhow!(
                    "Assertion Failed: sender {} step {} loss ratio {:.4} > {}",
                    r.sender,
                    r.step,
                    r.loss_ratio,
                    max
                ));
            }
        }
        TestAssertion::MinThroughput { min } => {
            if let Some(s) = report.episodes.iter().find(|s| s.mean_throughput < *min) {
                return Err(anyhow!(
                    "Assertion Failed: sender {} episode {} throughput {:.1} < {}",
                    s.sender,
                    s.episode,
                    s.mean_throughput,
                    min
                ));
            }
        }
        TestAssertion::MaxAvgLatency { max } => {
            if let Some(s) = report.episodes.iter().find(|s| s.mean_latency > *max) {
                return Err(anyhow!(
                    "Assertion Failed: sender {} episode {} latency {:.4} > {}",
                    s.sender,
                    s.episode,
                    s.mean_latency,
                    max
                ));
            }
        }
        TestAssertion::MinMeanReward { min } => {
            let mean = report.mean_reward();
            if mean < *min {
                return Err(anyhow!(
                    "Assertion Failed: mean reward {:.6} < {}",
                    mean,
                    min
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcc_lab_abstract::{PolicySpec, SimConfigOverride};

    fn scenario(over: SimConfigOverride, assertions: Vec<TestAssertion>) -> TestScenario {
        TestScenario {
            name: "test".into(),
            description: "inline".into(),
            config: over,
            episodes: 2,
            policy: PolicySpec::Constant {
                rate_delta: 0.0,
                cwnd_delta: None,
            },
            assertions,
        }
    }

    fn short() -> SimConfigOverride {
        SimConfigOverride {
            seed: Some(3),
            num_senders: Some(1),
            max_steps: Some(4),
            step_duration: Some(0.3),
            ..Default::default()
        }
    }

    #[test]
    fn lossless_scenario_passes() {
        let report = run_loaded_scenario(
            &scenario(
                short(),
                vec![
                    TestAssertion::MaxLossRatio { max: 0.0 },
                    TestAssertion::MinThroughput { min: 1.0 },
                    TestAssertion::MaxAvgLatency { max: 0.2 },
                ],
            ),
            SimConfig::default(),
        )
        .expect("scenario passes");
        assert_eq!(report.steps.len(), 2 * 4);
        assert_eq!(report.episodes.len(), 2);
        assert_eq!(report.scenario.as_deref(), Some("test"));
    }

    #[test]
    fn total_loss_fails_loss_assertion() {
        let over = SimConfigOverride {
            loss_rate: Some(1.0),
            ..short()
        };
        let err = run_loaded_scenario(
            &scenario(over, vec![TestAssertion::MaxLossRatio { max: 0.5 }]),
            SimConfig::default(),
        )
        .expect_err("every packet is lost");
        assert!(err.to_string().contains("loss ratio"));
    }

    #[test]
    fn bundled_scenarios_pass() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
        for name in ["shared_bottleneck.toml", "lossy_link.toml"] {
            let report = run_scenario(&dir.join(name)).expect("bundled scenario passes");
            assert!(!report.steps.is_empty());
        }
    }

    #[test]
    fn run_episodes_stops_at_max_steps() {
        let mut config = SimConfig::default();
        short().apply_to(&mut config);
        let mut env = NetworkEnv::new(config).expect("valid");
        let mut policy = crate::policy::ScheduledPolicy::new(vec![1.0, -1.0]);
        let records = run_episodes(&mut env, &mut policy, 3).expect("run");
        assert_eq!(records.len(), 3 * 4);
        assert_eq!(records.last().map(|r| (r.episode, r.step)), Some((3, 4)));
    }
}
