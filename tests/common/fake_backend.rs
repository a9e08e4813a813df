#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use pipedag::errors::Result;
use pipedag::exec::{Backend, SubmitRequest};
use pipedag::fs::FileSystem;
use pipedag::store::{LogsLayout, TagKind};

/// What the fake runner should do with a job.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Write the declared outputs, the log, the profile, and the
    /// `.finished` tag.
    Finish { outputs: Vec<PathBuf> },
    /// Write the log and the `.failed` tag.
    Fail,
    /// Write only the `.exit` tag (a wrapper whose runner crashed).
    ExitOnly,
    /// Write the `.running` tag and nothing else (a job that never ends).
    Hang,
}

/// A fake backend that plays the runner's side of the tag-file protocol.
///
/// On every submission it records the job name, tracks how many earlier
/// submissions are still un-ingested (their tag files still exist), and then
/// writes the tag files for the configured outcome. Jobs without a
/// configured outcome finish with no outputs.
pub struct TagWritingBackend {
    fs: Arc<dyn FileSystem>,
    layout: LogsLayout,
    outcomes: HashMap<String, FakeOutcome>,
    submitted: Arc<Mutex<Vec<String>>>,
    max_in_flight: Arc<Mutex<usize>>,
}

impl TagWritingBackend {
    pub fn new(fs: Arc<dyn FileSystem>, layout: LogsLayout) -> Self {
        Self {
            fs,
            layout,
            outcomes: HashMap::new(),
            submitted: Arc::new(Mutex::new(Vec::new())),
            max_in_flight: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_outcome(mut self, job: &str, outcome: FakeOutcome) -> Self {
        self.outcomes.insert(job.to_string(), outcome);
        self
    }

    /// Shared handle to the submission log (order preserved).
    pub fn submitted(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.submitted)
    }

    /// Shared handle to the highest number of simultaneously in-flight
    /// jobs observed at submission time.
    pub fn max_in_flight(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.max_in_flight)
    }

    fn has_any_tag(&self, job: &str) -> bool {
        TagKind::ALL
            .iter()
            .any(|&kind| self.fs.exists(&self.layout.tag(job, kind)))
    }

    fn play_runner(&self, job: &str) {
        let outcome = self
            .outcomes
            .get(job)
            .cloned()
            .unwrap_or(FakeOutcome::Finish {
                outputs: Vec::new(),
            });

        match outcome {
            FakeOutcome::Finish { outputs } => {
                for out in outputs {
                    self.fs.write(&out, format!("{job} output data").as_bytes()).unwrap();
                }
                self.fs
                    .write(&self.layout.job_log(job), format!("{job}: ok\n").as_bytes())
                    .unwrap();
                self.fs
                    .write(
                        &self.layout.job_profile(job),
                        br#"{"elapsed_secs": 0.1}"#,
                    )
                    .unwrap();
                self.fs
                    .write(&self.layout.tag(job, TagKind::Finished), b"")
                    .unwrap();
            }
            FakeOutcome::Fail => {
                self.fs
                    .write(
                        &self.layout.job_log(job),
                        format!("{job}: boom\n").as_bytes(),
                    )
                    .unwrap();
                self.fs
                    .write(&self.layout.tag(job, TagKind::Failed), b"")
                    .unwrap();
            }
            FakeOutcome::ExitOnly => {
                self.fs
                    .write(&self.layout.tag(job, TagKind::Exit), b"")
                    .unwrap();
            }
            FakeOutcome::Hang => {
                self.fs
                    .write(&self.layout.tag(job, TagKind::Running), b"")
                    .unwrap();
            }
        }
    }
}

impl Backend for TagWritingBackend {
    fn submit(
        &mut self,
        req: SubmitRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let in_flight = {
                let mut submitted = self.submitted.lock().unwrap();
                let earlier_active = submitted
                    .iter()
                    .filter(|name| self.has_any_tag(name))
                    .count();
                submitted.push(req.job.clone());
                earlier_active + 1
            };
            {
                let mut max = self.max_in_flight.lock().unwrap();
                if in_flight > *max {
                    *max = in_flight;
                }
            }

            self.play_runner(&req.job);
            Ok(())
        })
    }
}
