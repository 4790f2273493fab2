use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, error, info};
use psd2img_domain::ProjectId;

use crate::{ApplicationError, CancellationToken};

type Registry = Arc<Mutex<HashMap<ProjectId, JobHandle>>>;

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn fire(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .signal
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Clone)]
struct JobHandle {
    generation: u64,
    token: CancellationToken,
    completion: Arc<Completion>,
}

/// Deregisters the job and fires its completion exactly once, including when
/// the job body panics.
struct FinishGuard {
    project_id: ProjectId,
    generation: u64,
    registry: Registry,
    completion: Arc<Completion>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        {
            let mut jobs = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let is_current = jobs
                .get(&self.project_id)
                .is_some_and(|handle| handle.generation == self.generation);
            if is_current {
                jobs.remove(&self.project_id);
            }
        }
        self.completion.fire();
    }
}

/// Runs at most one export job per project id on its own thread.
///
/// Starting a job for an id that already has one cancels the old job and
/// waits for it to finish before the new one is installed. Waiting always
/// happens with the registry lock released, since a finishing job needs that
/// lock to deregister itself.
#[derive(Default)]
pub struct TaskRunner {
    jobs: Registry,
    next_generation: AtomicU64,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<F>(&self, project_id: ProjectId, job: F) -> Result<(), ApplicationError>
    where
        F: FnOnce(CancellationToken) -> Result<(), ApplicationError> + Send + 'static,
    {
        loop {
            let mut jobs = self.lock_jobs()?;
            if let Some(existing) = jobs.get(&project_id).cloned() {
                drop(jobs);
                info!("superseding running export for project {project_id}");
                existing.token.cancel();
                existing.completion.wait();
                continue;
            }

            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
            let handle = JobHandle {
                generation,
                token: CancellationToken::new(),
                completion: Arc::new(Completion::default()),
            };
            let registry = Arc::clone(&self.jobs);
            let completion = Arc::clone(&handle.completion);
            let token = handle.token.clone();
            jobs.insert(project_id, handle);

            let spawned = thread::Builder::new()
                .name(format!("export-project-{project_id}"))
                .spawn(move || {
                    let _guard = FinishGuard {
                        project_id,
                        generation,
                        registry,
                        completion,
                    };
                    run_job(project_id, &token, job);
                });

            if let Err(error) = spawned {
                jobs.remove(&project_id);
                return Err(ApplicationError::Io(format!(
                    "failed to spawn export job for project {project_id}: {error}"
                )));
            }
            return Ok(());
        }
    }

    /// Cancels the job for `project_id` and blocks until it has finished.
    /// Returns false when no job was running.
    pub fn stop(&self, project_id: ProjectId) -> Result<bool, ApplicationError> {
        let Some(handle) = self.handle(project_id)? else {
            return Ok(false);
        };
        handle.token.cancel();
        handle.completion.wait();
        Ok(true)
    }

    /// Blocks until the job for `project_id` finishes on its own. Returns false
    /// when no job was running.
    pub fn wait(&self, project_id: ProjectId) -> Result<bool, ApplicationError> {
        let Some(handle) = self.handle(project_id)? else {
            return Ok(false);
        };
        handle.completion.wait();
        Ok(true)
    }

    pub fn is_running(&self, project_id: ProjectId) -> bool {
        self.lock_jobs()
            .map(|jobs| jobs.contains_key(&project_id))
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.lock_jobs().map(|jobs| jobs.len()).unwrap_or(0)
    }

    fn handle(&self, project_id: ProjectId) -> Result<Option<JobHandle>, ApplicationError> {
        Ok(self.lock_jobs()?.get(&project_id).cloned())
    }

    fn lock_jobs(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ProjectId, JobHandle>>, ApplicationError> {
        self.jobs
            .lock()
            .map_err(|_| ApplicationError::Io("task registry lock poisoned".to_string()))
    }
}

fn run_job<F>(project_id: ProjectId, token: &CancellationToken, job: F)
where
    F: FnOnce(CancellationToken) -> Result<(), ApplicationError>,
{
    match job(token.clone()) {
        Ok(()) => debug!("export job for project {project_id} finished"),
        Err(error) if error.is_cancelled() || token.is_cancelled() => {
            info!("export job for project {project_id} cancelled")
        }
        Err(error) => error!("export job for project {project_id} failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn project(id: i64) -> ProjectId {
        ProjectId::new(id).expect("id")
    }

    #[test]
    fn finished_job_deregisters_itself() {
        let runner = TaskRunner::new();
        let (tx, rx) = mpsc::channel();

        runner
            .start(project(1), move |_token| {
                tx.send("ran").expect("send");
                Ok(())
            })
            .expect("start");

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("ran"));
        runner.wait(project(1)).expect("wait");
        assert!(!runner.is_running(project(1)));
        assert_eq!(runner.running_count(), 0);
    }

    #[test]
    fn superseding_start_cancels_previous_job_first() {
        let runner = TaskRunner::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = mpsc::channel();

        let first_events = Arc::clone(&events);
        runner
            .start(project(1), move |token| {
                started_tx.send(()).expect("send");
                while !token.is_cancelled() {
                    thread::sleep(Duration::from_millis(2));
                }
                first_events.lock().expect("events").push("a-cancelled");
                Err(ApplicationError::Cancelled)
            })
            .expect("start a");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("job a started");

        let second_events = Arc::clone(&events);
        runner
            .start(project(1), move |_token| {
                second_events.lock().expect("events").push("b-started");
                Ok(())
            })
            .expect("start b");
        runner.wait(project(1)).expect("wait");

        assert_eq!(
            *events.lock().expect("events"),
            vec!["a-cancelled", "b-started"]
        );
    }

    #[test]
    fn stop_reports_whether_a_job_was_running() {
        let runner = TaskRunner::new();
        assert!(!runner.stop(project(9)).expect("stop"));

        let (started_tx, started_rx) = mpsc::channel();
        let (seen_tx, seen_rx) = mpsc::channel();
        runner
            .start(project(9), move |token| {
                started_tx.send(()).expect("send");
                while token.check().is_ok() {
                    thread::sleep(Duration::from_millis(2));
                }
                seen_tx.send(()).expect("send");
                token.check()
            })
            .expect("start");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("started");
        assert!(runner.is_running(project(9)));

        assert!(runner.stop(project(9)).expect("stop"));
        assert!(seen_rx.try_recv().is_ok());
        assert!(!runner.is_running(project(9)));
    }

    #[test]
    fn different_projects_run_concurrently() {
        let runner = TaskRunner::new();
        let (one_tx, one_rx) = mpsc::channel::<()>();
        let (two_tx, two_rx) = mpsc::channel::<()>();

        runner
            .start(project(1), move |_token| {
                one_tx.send(()).expect("send");
                two_rx
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|error| ApplicationError::Io(error.to_string()))
            })
            .expect("start 1");
        runner
            .start(project(2), move |_token| {
                one_rx
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|error| ApplicationError::Io(error.to_string()))?;
                two_tx.send(()).expect("send");
                Ok(())
            })
            .expect("start 2");

        runner.wait(project(1)).expect("wait 1");
        runner.wait(project(2)).expect("wait 2");
        assert_eq!(runner.running_count(), 0);
    }

    #[test]
    fn panicking_job_still_releases_its_slot() {
        let runner = TaskRunner::new();
        runner
            .start(project(4), |_token| panic!("renderer exploded"))
            .expect("start");

        runner.wait(project(4)).expect("wait");
        assert!(!runner.is_running(project(4)));

        let (tx, rx) = mpsc::channel();
        runner
            .start(project(4), move |_token| {
                tx.send(()).expect("send");
                Ok(())
            })
            .expect("restart");
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
