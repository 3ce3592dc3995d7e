use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct StampedeScenarioCli {
    /// A connection string for the service to test
    #[clap(short, long)]
    pub connection_string: Option<String>,

    /// The number of virtual users to run
    #[clap(long, visible_alias = "vus")]
    pub virtual_users: Option<usize>,

    /// The number of seconds to run the scenario for
    #[clap(long)]
    pub duration: Option<u64>,

    /// The number of milliseconds each virtual user pauses between iterations
    #[clap(long)]
    pub iteration_delay_ms: Option<u64>,

    /// How long, in milliseconds, to wait for in-flight iterations once the run duration is up.
    ///
    /// Virtual users that are still running an iteration after this are abandoned and their
    /// iteration is reported separately from failures.
    #[clap(long)]
    pub grace_period_ms: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// The reporter to use.
    #[arg(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// The directory to write outcome files to when using the `outcome-file` reporter.
    #[arg(long, default_value = "outcomes")]
    pub outcome_dir: PathBuf,

    /// Set the ID of this run
    ///
    /// If not set, a random ID is used.
    #[arg(long, short)]
    pub run_id: Option<String>,

    /// Append a summary of the run, as a JSON line, to this file.
    #[arg(long)]
    pub summary_file: Option<PathBuf>,
}

impl Default for StampedeScenarioCli {
    fn default() -> Self {
        Self {
            connection_string: None,
            virtual_users: None,
            duration: None,
            iteration_delay_ms: None,
            grace_period_ms: None,
            no_progress: false,
            reporter: ReporterOpt::InMemory,
            outcome_dir: PathBuf::from("outcomes"),
            run_id: None,
            summary_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Print a summary of the run to the console when it finishes.
    #[default]
    InMemory,
    /// Write every outcome as a JSON line to a file in `--outcome-dir`, then print the summary.
    OutcomeFile,
    /// Report nothing.
    Noop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_command_line() {
        let cli = StampedeScenarioCli::parse_from([
            "scenario",
            "--connection-string",
            "http://localhost:8080",
            "--vus",
            "25",
            "--duration",
            "90",
            "--iteration-delay-ms",
            "250",
            "--reporter",
            "outcome-file",
            "--no-progress",
        ]);

        assert_eq!(Some("http://localhost:8080".to_string()), cli.connection_string);
        assert_eq!(Some(25), cli.virtual_users);
        assert_eq!(Some(90), cli.duration);
        assert_eq!(Some(250), cli.iteration_delay_ms);
        assert_eq!(None, cli.grace_period_ms);
        assert_eq!(ReporterOpt::OutcomeFile, cli.reporter);
        assert!(cli.no_progress);
    }

    #[test]
    fn defaults_match_parsed_empty_command_line() {
        let cli = StampedeScenarioCli::parse_from(["scenario"]);
        let default = StampedeScenarioCli::default();

        assert_eq!(default.reporter, cli.reporter);
        assert_eq!(default.outcome_dir, cli.outcome_dir);
        assert_eq!(default.no_progress, cli.no_progress);
        assert_eq!(default.virtual_users, cli.virtual_users);
    }
}
