mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod shutdown;
mod types;
mod virtual_user;

pub mod prelude {
    pub use crate::cli::{ReporterOpt, StampedeScenarioCli};
    pub use crate::config::{InvalidConfig, RunConfig, DEFAULT_GRACE_PERIOD};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{RunnerContext, VirtualUserContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::run;
    pub use crate::types::StampedeResult;

    pub use stampede_core::prelude::VirtualUserBailError;
    pub use stampede_instruments::{CheckCounts, CheckResult, MetricsSink, Outcome, Summary};
}
