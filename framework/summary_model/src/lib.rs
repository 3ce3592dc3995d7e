use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner unless one is supplied on the command line.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The duration that the run was configured with, in milliseconds
    pub run_duration_ms: u64,
    /// The pause each virtual user took between iterations, in milliseconds
    pub iteration_delay_ms: u64,
    /// The number of virtual users configured
    pub virtual_users: usize,
    /// The number of virtual users still running when the run was stopped
    ///
    /// Virtual users that bailed or failed their setup stop early, so this can be less than
    /// [RunSummary::virtual_users].
    pub virtual_users_end_count: usize,
    /// Completed iterations, successful or not
    pub total_iterations: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Iterations still in flight when the grace period ran out
    pub abandoned_iterations: u64,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Stampede that was used for this run
    pub stampede_version: String,
}

impl RunSummary {
    /// Create a new run summary with no results yet
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        run_duration_ms: u64,
        iteration_delay_ms: u64,
        virtual_users: usize,
        stampede_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration_ms,
            iteration_delay_ms,
            virtual_users,
            virtual_users_end_count: 0,
            total_iterations: 0,
            success_count: 0,
            failure_count: 0,
            abandoned_iterations: 0,
            env: HashMap::with_capacity(0),
            stampede_version,
        }
    }

    /// Set the final iteration counts
    pub fn set_results(
        &mut self,
        total_iterations: u64,
        success_count: u64,
        failure_count: u64,
        abandoned_iterations: u64,
    ) {
        self.total_iterations = total_iterations;
        self.success_count = success_count;
        self.failure_count = failure_count;
        self.abandoned_iterations = abandoned_iterations;
    }

    /// Set the virtual user end count
    pub fn set_virtual_users_end_count(&mut self, virtual_users_end_count: usize) {
        self.virtual_users_end_count = virtual_users_end_count;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to identify the configuration used to run the scenario, so that
    /// runs with the same configuration can be compared. It uses the
    ///     - Scenario name
    ///     - Run duration
    ///     - Iteration delay
    ///     - Virtual user count
    ///     - Selected environment variables
    ///     - Stampede version
    ///
    /// Results are not part of the fingerprint. The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.run_duration_ms.to_le_bytes());
        Digest::update(&mut hasher, self.iteration_delay_ms.to_le_bytes());
        Digest::update(&mut hasher, (self.virtual_users as u64).to_le_bytes());
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.stampede_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary]. Blank lines are skipped.
pub fn load_summary_runs(path: impl AsRef<Path>) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample(run_id: &str) -> RunSummary {
        RunSummary::new(
            run_id.to_string(),
            "scrape_api".to_string(),
            1_700_000_000,
            60_000,
            1_000,
            10,
            "0.1.0".to_string(),
        )
    }

    #[test]
    fn fingerprint_ignores_run_id_and_results() {
        let first = sample("first");
        let mut second = sample("second");
        second.set_results(20, 19, 1, 0);
        second.set_virtual_users_end_count(10);

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_env_insertion_order() {
        let mut first = sample("first");
        first.add_env("A".to_string(), "1".to_string());
        first.add_env("B".to_string(), "2".to_string());

        let mut second = sample("second");
        second.add_env("B".to_string(), "2".to_string());
        second.add_env("A".to_string(), "1".to_string());

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_configuration() {
        let first = sample("first");
        let mut second = sample("first");
        second.virtual_users = 11;

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn appended_summaries_load_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");

        let mut first = sample("first");
        first.set_results(10, 8, 2, 1);
        let second = sample("second");

        append_run_summary(&first, &path).unwrap();
        append_run_summary(&second, &path).unwrap();

        let runs = load_summary_runs(&path).unwrap();
        assert_eq!(vec![first, second], runs);
    }

    #[test]
    fn store_and_load_single_summary() {
        let mut summary = sample("single");
        summary.add_env("RUST_LOG".to_string(), "info".to_string());

        let mut buf = Vec::new();
        store_run_summary(&summary, &mut buf).unwrap();

        assert_eq!(summary, load_run_summary(buf.as_slice()).unwrap());
    }
}
