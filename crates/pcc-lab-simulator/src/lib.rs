pub mod engine;
pub mod env;
pub mod error;
pub mod link;
pub mod monitor;
pub mod policy;
pub mod reward;
pub mod scenario_runner;
pub mod sender;
pub mod trace;

pub use engine::{Event, LinkId, Network, Phase, SenderId, Topology};
pub use env::{Bounds, NetworkEnv, StepOutcome};
pub use error::SimError;
pub use link::Link;
pub use monitor::{Feature, MonitorInterval, SenderHistory};
pub use sender::{Sender, SenderSpec};
pub use trace::{EpisodeSummary, SimulationReport, StepRecord};
