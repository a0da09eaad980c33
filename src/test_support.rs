//! In-memory stand-ins for the external tools, shared by the unit tests.

use std::{
    collections::VecDeque,
    io,
    path::Path,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{
    clock::{Clock, StopSignal},
    cups_client::{
        models::{QueueState, QueueStatus},
        CupsError, JobId, JobStatus, QueueRequest, Spooler,
    },
    process::{CommandOutput, CommandRunner},
    usb::{UsbDeviceRecord, UsbInventory},
};

// ////////////// //
// Command runner //
// ////////////// //

struct Rule {
    prefix: Vec<String>,
    outputs: VecDeque<CommandOutput>,
}

/// Answers command lines by prefix. Unknown commands fail as if the program were missing.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Queues an answer for every invocation starting with `prefix`.
    /// The last queued answer for a prefix repeats forever.
    pub fn respond(&self, prefix: &str, code: i32, stdout: &str, stderr: &str) {
        let prefix: Vec<String> = prefix.split_whitespace().map(str::to_owned).collect();
        let output = CommandOutput { code: Some(code), stdout: stdout.to_owned(), stderr: stderr.to_owned() };

        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|rule| rule.prefix == prefix) {
            Some(rule) => rule.outputs.push_back(output),
            None => rules.push(Rule { prefix, outputs: VecDeque::from([output]) }),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let line: Vec<String> = std::iter::once(program.to_owned()).chain(args.iter().cloned()).collect();
        self.calls.lock().unwrap().push(line.join(" "));

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .filter(|rule| line.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{program}: not found")))?;

        let output = if rule.outputs.len() > 1 { rule.outputs.pop_front() } else { rule.outputs.front().cloned() };
        Ok(output.unwrap_or_default())
    }
}

// ///////////// //
// USB inventory //
// ///////////// //

/// Reports a fixed set of devices, optionally only for a limited number of polls.
pub struct FakeInventory {
    devices: Mutex<Vec<UsbDeviceRecord>>,
    polls_left: Mutex<Option<usize>>,
    polls: Mutex<usize>,
}

impl FakeInventory {
    pub fn with_ids(ids: &[&str]) -> Self {
        let devices = ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let (vendor_id, product_id) = id.split_once(':').unwrap();
                UsbDeviceRecord {
                    bus: 1,
                    device: index as u16 + 2,
                    vendor_id: vendor_id.to_owned(),
                    product_id: product_id.to_owned(),
                    description: "fake".to_owned(),
                    device_path: None,
                }
            })
            .collect();

        Self { devices: Mutex::new(devices), polls_left: Mutex::new(None), polls: Mutex::new(0) }
    }

    /// Devices vanish after `polls` more enumerations.
    pub fn unplug_after(self, polls: usize) -> Self {
        *self.polls_left.lock().unwrap() = Some(polls);
        self
    }

    pub fn unplug(&self) {
        *self.polls_left.lock().unwrap() = Some(0);
    }

    pub fn replug(&self) {
        *self.polls_left.lock().unwrap() = None;
    }

    /// Devices are back, for `polls` more enumerations.
    pub fn replug_for(&self, polls: usize) {
        *self.polls_left.lock().unwrap() = Some(polls);
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

impl UsbInventory for FakeInventory {
    fn list_connected_devices(&self) -> Vec<UsbDeviceRecord> {
        *self.polls.lock().unwrap() += 1;

        let mut polls_left = self.polls_left.lock().unwrap();
        match polls_left.as_mut() {
            Some(0) => Vec::new(),
            Some(left) => {
                *left -= 1;
                self.devices.lock().unwrap().clone()
            }
            None => self.devices.lock().unwrap().clone(),
        }
    }
}

// /////// //
// Spooler //
// /////// //

/// Records every call. Everything succeeds unless scripted otherwise.
#[derive(Default)]
pub struct FakeSpooler {
    pub calls: Mutex<Vec<String>>,
    pub add_queue_error: Mutex<Option<String>>,
    pub queue_statuses: Mutex<VecDeque<QueueStatus>>,
    /// `false` entries make the matching submission fail. Missing entries succeed.
    pub submissions: Mutex<VecDeque<bool>>,
    pub always_fail_submissions: Mutex<bool>,
    pub omit_job_ids: Mutex<bool>,
    /// Status answers in order. The last one repeats, `Completed` when empty.
    pub job_statuses: Mutex<VecDeque<JobStatus>>,
    pub submitted: Mutex<usize>,
    /// Raised while handling the n-th submission, failed ones included.
    pub stop_on_submission: Mutex<Option<(usize, StopSignal)>>,
}

impl FakeSpooler {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|call| call.starts_with(prefix)).collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn failed(program: &str, stderr: &str) -> CupsError {
    CupsError::CommandFailed { program: program.to_owned(), code: Some(1), stderr: stderr.to_owned() }
}

impl Spooler for FakeSpooler {
    fn delete_queue(&self, queue: &str) -> Result<(), CupsError> {
        self.record(format!("delete {queue}"));
        Err(failed("lpadmin", "The printer or class does not exist."))
    }

    fn cancel_jobs(&self, queue: &str) -> Result<(), CupsError> {
        self.record(format!("cancel {queue}"));
        Ok(())
    }

    fn add_queue(&self, request: &QueueRequest) -> Result<(), CupsError> {
        self.record(format!("add {} {} {}", request.name, request.device_uri, request.driver));
        match self.add_queue_error.lock().unwrap().as_deref() {
            Some(stderr) => Err(failed("lpadmin", stderr)),
            None => Ok(()),
        }
    }

    fn enable_queue(&self, queue: &str) -> Result<(), CupsError> {
        self.record(format!("enable {queue}"));
        Ok(())
    }

    fn accept_jobs(&self, queue: &str) -> Result<(), CupsError> {
        self.record(format!("accept {queue}"));
        Ok(())
    }

    fn queue_status(&self, queue: &str) -> Result<QueueStatus, CupsError> {
        self.record(format!("status {queue}"));
        Ok(self.queue_statuses.lock().unwrap().pop_front().unwrap_or(QueueStatus {
            state: QueueState::Idle,
            enabled: true,
            accepting: true,
        }))
    }

    fn submit_job(&self, queue: &str, _options: &[String], file: &Path) -> Result<Option<JobId>, CupsError> {
        self.record(format!("submit {queue} {}", file.display()));
        if let Some((nth, stop)) = self.stop_on_submission.lock().unwrap().as_ref() {
            if self.calls_starting_with("submit ").len() == *nth {
                stop.trigger();
            }
        }

        let succeeds = !*self.always_fail_submissions.lock().unwrap() && self.submissions.lock().unwrap().pop_front().unwrap_or(true);
        if !succeeds {
            return Err(failed("lp", "lp: Destination is not accepting jobs."));
        }

        let number = {
            let mut submitted = self.submitted.lock().unwrap();
            *submitted += 1;
            *submitted
        };
        if *self.omit_job_ids.lock().unwrap() {
            return Ok(None);
        }
        Ok(Some(JobId::new(format!("{queue}-{number}"))))
    }

    fn job_status(&self, job: &JobId) -> Result<JobStatus, CupsError> {
        self.record(format!("job {job}"));
        let mut statuses = self.job_statuses.lock().unwrap();
        let status = if statuses.len() > 1 { statuses.pop_front() } else { statuses.front().copied() };
        Ok(status.unwrap_or(JobStatus::Completed))
    }

    fn error_log_lines(&self, job: &JobId) -> Result<Vec<String>, CupsError> {
        self.record(format!("log {job}"));
        Ok(vec![format!("E [Job {}] Backend returned status 1 (failed)", job.number().unwrap_or("?"))])
    }
}

// ///// //
// Clock //
// ///// //

/// Virtual time: `sleep` returns immediately and moves `now` forward.
pub struct FakeClock {
    base: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self { base: Instant::now(), offset: Mutex::new(Duration::ZERO), sleeps: Mutex::new(Vec::new()) }
    }
}

impl FakeClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}
