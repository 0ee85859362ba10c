//! **OrchestratorRuntime**: owns the background worker and the shutdown authority.
//!
//! The worker thread builds its turn loop through a factory closure (audio device handles
//! cannot cross threads), then runs it until the [`CancellationSignal`] is set. The
//! foreground only ever sees [`StatusUpdate`]s; it never reaches into worker state.

use crate::error::{AssistantError, AssistantResult};
use crate::status::{status_channel, Severity, StatusReporter, StatusUpdate};
use crate::turn::{ExitReason, RunSummary, TurnLoop};
use std::thread::JoinHandle;
use tamva_voice::CancellationSignal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const WORKER_THREAD_NAME: &str = "tamva-worker";

/// How the worker thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Completed(RunSummary),
    InitFailed(String),
    Panicked,
}

pub struct OrchestratorRuntime;

impl OrchestratorRuntime {
    /// Spawn the worker. `factory` runs on the worker thread; an `Err` from it is reported
    /// as a `Fatal` status and ends the worker without running any turn.
    pub fn start<F, L>(
        factory: F,
    ) -> AssistantResult<(RuntimeHandle, mpsc::UnboundedReceiver<StatusUpdate>)>
    where
        F: FnOnce(StatusReporter, CancellationSignal) -> AssistantResult<L> + Send + 'static,
        L: TurnLoop,
    {
        let (reporter, status_rx) = status_channel();
        let cancel = CancellationSignal::new();
        let worker_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_main(factory, reporter, worker_cancel))
            .map_err(|e| AssistantError::FatalInitError(format!("spawn worker thread: {}", e)))?;

        info!("Worker thread started");
        Ok((
            RuntimeHandle {
                cancel,
                thread: Some(thread),
            },
            status_rx,
        ))
    }
}

fn worker_main<F, L>(factory: F, status: StatusReporter, cancel: CancellationSignal) -> WorkerExit
where
    F: FnOnce(StatusReporter, CancellationSignal) -> AssistantResult<L>,
    L: TurnLoop,
{
    status.update("Initializing...", Severity::Thinking);
    let mut turn_loop = match factory(status.clone(), cancel) {
        Ok(turn_loop) => turn_loop,
        Err(e) => {
            error!("Initialization failed: {}", e);
            status.update(format!("FATAL: {}", e), Severity::Fatal);
            return WorkerExit::InitFailed(e.to_string());
        }
    };

    let summary = turn_loop.run();
    if summary.exit == ExitReason::Cancelled {
        status.update("Assistant stopped.", Severity::Idle);
    }
    WorkerExit::Completed(summary)
}

/// Foreground handle to a running worker. Dropping it shuts the worker down.
pub struct RuntimeHandle {
    cancel: CancellationSignal,
    thread: Option<JoinHandle<WorkerExit>>,
}

impl RuntimeHandle {
    pub fn cancellation(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    /// Set the shutdown signal without waiting.
    pub fn request_shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutdown requested");
        }
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel and wait for the worker. There is no timeout: blocking stages observe the
    /// signal within one frame or poll interval.
    pub fn shutdown(mut self) -> WorkerExit {
        self.request_shutdown();
        self.join()
    }

    fn join(&mut self) -> WorkerExit {
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(exit) => {
                    info!("Worker thread joined: {:?}", exit);
                    exit
                }
                Err(_) => {
                    error!("Worker thread panicked");
                    WorkerExit::Panicked
                }
            },
            None => {
                warn!("Worker thread already joined");
                WorkerExit::Panicked
            }
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.cancel();
            let _ = self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct WaitForCancel {
        cancel: CancellationSignal,
        status: StatusReporter,
    }

    impl TurnLoop for WaitForCancel {
        fn run(&mut self) -> RunSummary {
            self.status.update("Listening", Severity::Listening);
            let mut turns = 0;
            while !self.cancel.wait_timeout(Duration::from_millis(10)) {
                turns += 1;
            }
            RunSummary {
                turns,
                responses: 0,
                sessions: 0,
                failures: 0,
                exit: ExitReason::Cancelled,
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StatusUpdate>) -> Vec<StatusUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    #[test]
    fn shutdown_cancels_and_joins() {
        let (handle, mut rx) = OrchestratorRuntime::start(|status, cancel| {
            Ok(WaitForCancel { cancel, status })
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());

        let exit = handle.shutdown();
        assert!(matches!(exit, WorkerExit::Completed(ref s) if s.exit == ExitReason::Cancelled));

        let severities: Vec<Severity> = drain(&mut rx).into_iter().map(|u| u.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Thinking, Severity::Listening, Severity::Idle]
        );
        // Every reporter lived on the worker, so the channel is closed.
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn init_failure_is_fatal_status() {
        let (handle, mut rx) = OrchestratorRuntime::start(|_, _| -> AssistantResult<WaitForCancel> {
            Err(AssistantError::FatalInitError("no microphone".to_string()))
        })
        .unwrap();
        let exit = handle.shutdown();
        assert!(matches!(exit, WorkerExit::InitFailed(ref m) if m.contains("no microphone")));
        let last = drain(&mut rx).pop().unwrap();
        assert_eq!(last.severity, Severity::Fatal);
    }

    #[test]
    fn worker_panic_is_reported_on_join() {
        struct Boom;
        impl TurnLoop for Boom {
            fn run(&mut self) -> RunSummary {
                panic!("boom");
            }
        }
        let (handle, _rx) = OrchestratorRuntime::start(|_, _| Ok(Boom)).unwrap();
        assert_eq!(handle.shutdown(), WorkerExit::Panicked);
    }

    #[test]
    fn drop_stops_the_worker() {
        let observed = CancellationSignal::new();
        let observer = observed.clone();
        let (handle, _rx) = OrchestratorRuntime::start(move |status, cancel| {
            let watcher = cancel.clone();
            std::thread::spawn(move || {
                while !watcher.wait_timeout(Duration::from_millis(5)) {}
                observer.cancel();
            });
            Ok(WaitForCancel { cancel, status })
        })
        .unwrap();
        drop(handle);
        assert!(observed.wait_timeout(Duration::from_secs(2)));
    }
}
