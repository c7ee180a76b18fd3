mod abort;
mod config;
mod scenario;
mod shutdown;

pub mod prelude {
    pub use crate::abort::RunAbortError;
    pub use crate::config::{load_scenarios, parse_toml, parse_yaml};
    pub use crate::scenario::{HttpMethod, Scenario, ScenarioError, ScenarioKind};
    pub use crate::shutdown::{ShutdownHandle, ShutdownListener};
}
