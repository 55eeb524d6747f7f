use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use pcc_lab_abstract::{Action, SimConfig};
use pcc_lab_simulator::policy::ConstantPolicy;
use pcc_lab_simulator::scenario_runner::{self, load_scenario};
use pcc_lab_simulator::{NetworkEnv, SimulationReport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Packet-level congestion control simulator")]
struct Args {
    /// Load a scenario from disk.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Load a base configuration (TOML) applied before scenario overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    senders: Option<usize>,

    /// Steps per episode.
    #[arg(long)]
    steps: Option<u32>,

    #[arg(long, default_value_t = 1)]
    episodes: u32,

    /// Draw link parameters at random every episode.
    #[arg(long, default_value_t = false)]
    random_link: bool,

    /// Rate delta applied at every step of the default run.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    rate_delta: f64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("pcc-lab-sim-cli starting…");

    let config = args.base_config()?;
    let report = if let Some(path) = &args.scenario {
        let scenario = load_scenario(path)?;
        scenario_runner::run_loaded_scenario(&scenario, config)?
    } else {
        run_default_sim(config, args.episodes, args.rate_delta)?
    };
    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn base_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&content).context("Failed to parse config file")?
            }
            None => SimConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.senders {
            config.num_senders = n;
        }
        if let Some(steps) = self.steps {
            config.max_steps = steps;
        }
        if self.random_link {
            config.random_link = true;
        }
        Ok(config)
    }
}

fn run_default_sim(config: SimConfig, episodes: u32, rate_delta: f64) -> Result<SimulationReport> {
    info!("Starting default headless simulation…");
    let mut env = NetworkEnv::new(config.clone()).context("Failed to build environment")?;
    let action = if config.control.use_cwnd {
        Action::rate_and_window(rate_delta, 0.0)
    } else {
        Action::rate(rate_delta)
    };
    let mut policy = ConstantPolicy::new(action);
    let steps = scenario_runner::run_episodes(&mut env, &mut policy, episodes)
        .context("Simulation failed")?;
    info!("Simulation complete.");
    Ok(SimulationReport::new(config, None, steps))
}

fn log_summary(report: &SimulationReport) {
    for summary in &report.episodes {
        info!(
            "Episode {} sender {} | steps: {} | reward: {:.6} | rate: {:.1} pkt/s | throughput: {:.0} bps | latency: {:.4} s | loss: {:.4}",
            summary.episode,
            summary.sender,
            summary.steps,
            summary.total_reward,
            summary.mean_rate,
            summary.mean_throughput,
            summary.mean_latency,
            summary.mean_loss_ratio
        );
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
