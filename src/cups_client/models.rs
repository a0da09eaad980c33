use std::fmt::{self, Display, Formatter};

use serde_derive::Serialize;

/// Job identifier as assigned by the spooler, e.g. `prig_dnp_qw410-42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part, which is how the CUPS error log refers to a job.
    pub fn number(&self) -> Option<&str> {
        let (_, number) = self.0.rsplit_once('-')?;
        is_number(number).then_some(number)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything `lpadmin` needs to create a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRequest {
    pub name: String,
    pub device_uri: String,
    pub driver: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueState {
    Idle,
    Processing,
    Stopped,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub state: QueueState,
    pub enabled: bool,
    pub accepting: bool,
}

impl QueueStatus {
    /// Reads the combined `lpstat -p` / `lpstat -a` output for one queue.
    pub fn parse(text: &str) -> Self {
        let text = text.to_ascii_lowercase();
        let enabled = !text.contains("disabled");
        let accepting = !text.contains("not accepting");
        let state = if !enabled {
            QueueState::Stopped
        } else if text.contains("now printing") {
            QueueState::Processing
        } else if text.contains("is idle") {
            QueueState::Idle
        } else {
            QueueState::Unknown
        };

        Self { state, enabled, accepting }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Pending,
    Completed,
    Aborted,
    Canceled,
    Stopped,
    /// The spooler no longer knows the job.
    Missing,
}

/// Finds `job` in an `lpstat -l -o` listing and classifies it.
///
/// # Arguments
///
/// * `job`: Job to look for
/// * `text`: Listing output, one header line per job followed by indented detail lines
/// * `completed_listing`: Whether the listing came from `lpstat -W completed`
///
/// returns: `None` when the job is not in the listing
pub fn parse_job_listing(job: &JobId, text: &str, completed_listing: bool) -> Option<JobStatus> {
    let mut lines = text.lines().skip_while(|line| line.split_whitespace().next() != Some(job.as_str()));
    lines.next()?;
    let details = lines.take_while(|line| line.starts_with(char::is_whitespace));

    // Only the `job-*` keywords on the Alerts lines are trusted, `Status:` is free text.
    let alerts: Vec<String> = details
        .map(|line| line.trim().to_ascii_lowercase())
        .filter_map(|line| line.strip_prefix("alerts:").map(|alerts| alerts.split_whitespace().map(str::to_owned).collect::<Vec<_>>()))
        .flatten()
        .filter(|keyword| keyword.starts_with("job-"))
        .collect();
    let has = |words: &[&str]| alerts.iter().any(|keyword| words.iter().any(|word| keyword.contains(word)));

    let status = if has(&["abort"]) {
        JobStatus::Aborted
    } else if has(&["canceled", "cancelled"]) {
        JobStatus::Canceled
    } else if has(&["stopped"]) {
        JobStatus::Stopped
    } else if completed_listing {
        JobStatus::Completed
    } else {
        JobStatus::Pending
    };

    Some(status)
}

/// Extracts the job id from `lp` output such as `request id is prig_dnp_qw410-42 (1 file(s))`.
pub fn parse_request_id(queue: &str, text: &str) -> Option<JobId> {
    let is_job_token = |token: &str| match token.rsplit_once('-') {
        Some((prefix, number)) => !prefix.is_empty() && is_number(number),
        None => false,
    };

    let mut tokens = text.split_whitespace().filter(|token| is_job_token(token));
    let queued_here = text.split_whitespace().find(|token| token.starts_with(&format!("{queue}-")) && is_job_token(token));

    queued_here.or_else(|| tokens.next()).map(JobId::new)
}

fn is_number(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}
