use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::{ensure, ResultExt, Snafu};

use crate::process::{args, CommandOutput, CommandRunner};

use super::models::{parse_job_listing, parse_request_id, JobId, JobStatus, QueueRequest, QueueStatus};

const ERROR_LOG_LINES: usize = 10;

/// The print-spooling subsystem as seen by the lifecycle.
/// Implementations turn CLI text into typed values, callers never inspect raw output.
pub trait Spooler: Send + Sync {
    fn delete_queue(&self, queue: &str) -> Result<(), CupsError>;
    fn cancel_jobs(&self, queue: &str) -> Result<(), CupsError>;
    fn add_queue(&self, request: &QueueRequest) -> Result<(), CupsError>;
    fn enable_queue(&self, queue: &str) -> Result<(), CupsError>;
    fn accept_jobs(&self, queue: &str) -> Result<(), CupsError>;
    fn queue_status(&self, queue: &str) -> Result<QueueStatus, CupsError>;
    /// `Ok(None)` when the submission succeeded but no job id could be read back.
    fn submit_job(&self, queue: &str, options: &[String], file: &Path) -> Result<Option<JobId>, CupsError>;
    fn job_status(&self, job: &JobId) -> Result<JobStatus, CupsError>;
    /// Spooler log lines mentioning `job`, most recent last.
    fn error_log_lines(&self, job: &JobId) -> Result<Vec<String>, CupsError>;
}

/// CUPS driven through its command line tools.
pub struct CupsCli {
    runner: Arc<dyn CommandRunner>,
    error_log: PathBuf,
}

impl CupsCli {
    pub fn new(runner: Arc<dyn CommandRunner>, error_log: impl Into<PathBuf>) -> Self {
        Self { runner, error_log: error_log.into() }
    }

    fn run(&self, program: &str, arguments: Vec<String>) -> Result<CommandOutput, CupsError> {
        self.runner.run(program, &arguments).context(SpawnSnafu { program })
    }

    /// Runs `program` and turns a non-zero exit code into [`CupsError::CommandFailed`].
    fn run_checked(&self, program: &str, arguments: Vec<String>) -> Result<CommandOutput, CupsError> {
        let output = self.run(program, arguments)?;
        ensure!(output.success(), CommandFailedSnafu { program, code: output.code, stderr: output.stderr.trim().to_owned() });
        Ok(output)
    }
}

impl Spooler for CupsCli {
    fn delete_queue(&self, queue: &str) -> Result<(), CupsError> {
        self.run_checked("lpadmin", args(["-x", queue])).map(drop)
    }

    fn cancel_jobs(&self, queue: &str) -> Result<(), CupsError> {
        self.run_checked("cancel", args(["-a", queue])).map(drop)
    }

    fn add_queue(&self, request: &QueueRequest) -> Result<(), CupsError> {
        self.run_checked(
            "lpadmin",
            args([
                "-p", request.name.as_str(),
                "-E",
                "-v", request.device_uri.as_str(),
                "-m", request.driver.as_str(),
                "-L", request.location.as_str(),
                "-D", request.description.as_str(),
            ]),
        )
        .map(drop)
    }

    fn enable_queue(&self, queue: &str) -> Result<(), CupsError> {
        self.run_checked("cupsenable", args([queue])).map(drop)
    }

    fn accept_jobs(&self, queue: &str) -> Result<(), CupsError> {
        self.run_checked("cupsaccept", args([queue])).map(drop)
    }

    fn queue_status(&self, queue: &str) -> Result<QueueStatus, CupsError> {
        let printer = self.run_checked("lpstat", args(["-p", queue]))?;
        let accepting = self.run_checked("lpstat", args(["-a", queue]))?;
        Ok(QueueStatus::parse(&format!("{}\n{}", printer.stdout, accepting.stdout)))
    }

    fn submit_job(&self, queue: &str, options: &[String], file: &Path) -> Result<Option<JobId>, CupsError> {
        let mut arguments = args(["-d", queue]);
        for option in options {
            arguments.push("-o".to_owned());
            arguments.push(option.clone());
        }
        arguments.push(file.to_string_lossy().into_owned());

        let output = self.run_checked("lp", arguments)?;
        Ok(parse_request_id(queue, &output.stdout))
    }

    fn job_status(&self, job: &JobId) -> Result<JobStatus, CupsError> {
        if let Some(status) = self.completed_job_status(job)? {
            return Ok(status);
        }

        let pending = self.run("lpstat", args(["-l", "-o", job.as_str()]))?;
        if !pending.success() {
            return Ok(JobStatus::Missing);
        }
        if let Some(status) = parse_job_listing(job, &pending.stdout, false) {
            return Ok(status);
        }

        // The job may have finished between the two listings.
        Ok(self.completed_job_status(job)?.unwrap_or(JobStatus::Pending))
    }

    fn error_log_lines(&self, job: &JobId) -> Result<Vec<String>, CupsError> {
        let log = std::fs::read_to_string(&self.error_log).context(ErrorLogSnafu { path: self.error_log.clone() })?;
        Ok(matching_log_lines(&log, job))
    }
}

impl CupsCli {
    fn completed_job_status(&self, job: &JobId) -> Result<Option<JobStatus>, CupsError> {
        let completed = self.run("lpstat", args(["-W", "completed", "-l", "-o", job.as_str()]))?;
        if !completed.success() {
            return Ok(None);
        }
        Ok(parse_job_listing(job, &completed.stdout, true))
    }
}

fn matching_log_lines(log: &str, job: &JobId) -> Vec<String> {
    let job_tag = job.number().map(|number| format!("[Job {number}]"));
    let mut lines: Vec<String> = log
        .lines()
        .filter(|line| line.contains(job.as_str()) || job_tag.as_deref().is_some_and(|tag| line.contains(tag)))
        .map(str::to_owned)
        .collect();

    let skip = lines.len().saturating_sub(ERROR_LOG_LINES);
    lines.drain(..skip);
    lines
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum CupsError {
    #[snafu(display("Could not run {program}"))]
    Spawn { program: String, source: std::io::Error },

    #[snafu(display("{program} exited with {code:?}: {stderr}"))]
    CommandFailed { program: String, code: Option<i32>, stderr: String },

    #[snafu(display("Could not read spooler log {}", path.display()))]
    ErrorLog { path: PathBuf, source: std::io::Error },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::test_support::ScriptedRunner;

    use super::*;

    fn cups(runner: &Arc<ScriptedRunner>) -> CupsCli {
        CupsCli::new(runner.clone(), "/nonexistent/error_log")
    }

    #[test]
    fn add_queue_passes_every_field() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpadmin", 0, "", "");

        cups(&runner)
            .add_queue(&QueueRequest {
                name: "prig_dnp_qw410".to_owned(),
                device_uri: "usb:///DNP/DNP%20QW410".to_owned(),
                driver: "raw".to_owned(),
                location: "PRig Test Rig - DNP QW410".to_owned(),
                description: "Auto-detected DNP QW410".to_owned(),
            })
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec!["lpadmin -p prig_dnp_qw410 -E -v usb:///DNP/DNP%20QW410 -m raw -L PRig Test Rig - DNP QW410 -D Auto-detected DNP QW410"]
        );
    }

    #[test]
    fn add_queue_failure_carries_stderr() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpadmin", 1, "", "lpadmin: Bad device-uri scheme \"usb\".\n");

        let error = cups(&runner)
            .add_queue(&QueueRequest {
                name: "q".to_owned(),
                device_uri: "usb:///a/b".to_owned(),
                driver: "raw".to_owned(),
                location: String::new(),
                description: String::new(),
            })
            .unwrap_err();

        match error {
            CupsError::CommandFailed { stderr, code, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "lpadmin: Bad device-uri scheme \"usb\".");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn submit_appends_options_and_reads_job_id() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lp", 0, "request id is prig_dnp_qw410-12 (1 file(s))\n", "");

        let options = vec!["media=w288h432".to_owned(), "fit-to-page".to_owned()];
        let job = cups(&runner).submit_job("prig_dnp_qw410", &options, Path::new("/tmp/card.png")).unwrap();

        assert_eq!(job, Some(JobId::new("prig_dnp_qw410-12")));
        assert_eq!(runner.calls(), vec!["lp -d prig_dnp_qw410 -o media=w288h432 -o fit-to-page /tmp/card.png"]);
    }

    #[test]
    fn job_status_checks_completed_jobs_first() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpstat -W completed", 0, "prig_dnp_qw410-12 root 1024 Mon\n", "");

        let status = cups(&runner).job_status(&JobId::new("prig_dnp_qw410-12")).unwrap();
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn job_status_falls_back_to_pending_listing() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpstat -W completed", 0, "", "");
        runner.respond("lpstat -l -o", 0, "prig_dnp_qw410-12 root 1024 Mon\n\tStatus: Sending data to printer.\n", "");

        let job = JobId::new("prig_dnp_qw410-12");
        assert_eq!(cups(&runner).job_status(&job).unwrap(), JobStatus::Pending);
    }

    #[test]
    fn vanished_job_is_missing() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpstat -W completed", 0, "", "");
        runner.respond("lpstat -l -o", 1, "", "lpstat: Invalid destination name in list");

        let job = JobId::new("prig_dnp_qw410-12");
        assert_eq!(cups(&runner).job_status(&job).unwrap(), JobStatus::Missing);
    }

    #[test]
    fn job_absent_from_both_listings_is_still_pending() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpstat -W completed", 0, "", "");
        runner.respond("lpstat -l -o", 0, "", "");

        let job = JobId::new("prig_dnp_qw410-12");
        assert_eq!(cups(&runner).job_status(&job).unwrap(), JobStatus::Pending);
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn job_finishing_between_listings_is_completed() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpstat -W completed", 0, "", "");
        runner.respond("lpstat -W completed", 0, "prig_dnp_qw410-12 root 1024 Mon\n\tAlerts: job-completed-successfully\n", "");
        runner.respond("lpstat -l -o", 0, "", "");

        let job = JobId::new("prig_dnp_qw410-12");
        assert_eq!(cups(&runner).job_status(&job).unwrap(), JobStatus::Completed);
    }

    #[test]
    fn queue_status_combines_both_listings() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("lpstat -p", 0, "printer prig_dnp_qw410 is idle.  enabled since Mon\n", "");
        runner.respond("lpstat -a", 0, "prig_dnp_qw410 not accepting requests since Mon -\n", "");

        let status = cups(&runner).queue_status("prig_dnp_qw410").unwrap();
        assert!(status.enabled);
        assert!(!status.accepting);
    }

    #[test]
    fn log_lines_are_filtered_by_job() {
        let log = "\
E [01/Jan/2024:10:00:00 +0000] [Job 11] Printer not responding
E [01/Jan/2024:10:00:01 +0000] [Job 12] Backend returned status 1 (failed)
I [01/Jan/2024:10:00:02 +0000] Job prig_dnp_qw410-12 stopped
";
        let lines = matching_log_lines(log, &JobId::new("prig_dnp_qw410-12"));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Backend returned status 1"));
    }
}
