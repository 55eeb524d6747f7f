pub mod config;
pub mod interface;
pub mod scenario;

pub use interface::{Action, ControlPolicy};

pub use config::{
    BYTES_PER_PACKET, ControlConfig, LinkConfig, LinkRanges, NetworkConfig, RewardConfig,
    SimConfig,
};
pub use scenario::{PolicySpec, SimConfigOverride, TestAssertion, TestScenario};
