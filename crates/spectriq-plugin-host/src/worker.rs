use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use spectriq_core::RecordEvent;
use spectriq_plugin_sdk::{HostInfo, PluginRequest, PluginResponse, ProcessorPlugin};

use crate::loader::describe_panic;

/// Messages travelling host → worker on the request queue.
///
/// `Disconnect` is the reserved shutdown sentinel; it is a dedicated arm so
/// it can never collide with a payload.
#[derive(Debug)]
pub(crate) enum HostCommand {
    Process(PluginRequest),
    Action { field: String, command: String },
    Record(RecordEvent),
    Disconnect,
}

/// Messages travelling worker → host on the response queue.
///
/// `Fatal` is the reserved poison sentinel: it is emitted exactly once,
/// after which the worker thread is gone and the session cannot be resumed.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Response(PluginResponse),
    Fatal { diagnostic: String },
}

/// Outcome of the connect hook, reported on a one-shot probe channel.
type ConnectReport = Result<(), String>;

/// Host-side handle to a running worker thread.
///
/// Dropping the handle detaches the thread: a hook still running inside the
/// plugin keeps running to completion in the background, but with both
/// queues gone anything it produces afterwards is discarded, so a late
/// response can never leak into a later session.
pub(crate) struct WorkerHandle {
    requests: Sender<HostCommand>,
    responses: Receiver<WorkerEvent>,
    connect_probe: Receiver<ConnectReport>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker owning `plugin` for one session.
    pub(crate) fn spawn(
        plugin: Arc<Mutex<Box<dyn ProcessorPlugin>>>,
        host_info: HostInfo,
        poll_interval: Duration,
    ) -> Self {
        let (request_tx, request_rx) = unbounded();
        let (response_tx, response_rx) = unbounded();
        let (probe_tx, probe_rx) = bounded(1);

        let thread = thread::spawn(move || {
            run_worker(plugin, host_info, poll_interval, request_rx, response_tx, probe_tx)
        });

        Self {
            requests: request_tx,
            responses: response_rx,
            connect_probe: probe_rx,
            thread: Some(thread),
        }
    }

    /// Wait up to `grace` for the connect hook to fail fast.
    ///
    /// `Ok(())` either means the hook reported success or is still running
    /// when the window closes; a slow but ultimately healthy plugin must
    /// not fail the connect.
    pub(crate) fn await_connect(&mut self, grace: Duration) -> Result<(), String> {
        match self.connect_probe.recv_timeout(grace) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(diagnostic)) => {
                // The thread is already on its way out; reap it so no
                // worker outlives a failed connect.
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                Err(diagnostic)
            }
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                Err("worker ended before reporting its connect outcome".to_string())
            }
        }
    }

    /// Diagnostic from a connect hook that failed after the grace window,
    /// if one has been reported since.
    pub(crate) fn late_connect_failure(&self) -> Option<String> {
        match self.connect_probe.try_recv() {
            Ok(Err(diagnostic)) => Some(diagnostic),
            _ => None,
        }
    }

    pub(crate) fn send(&self, command: HostCommand) -> bool {
        self.requests.send(command).is_ok()
    }

    pub(crate) fn try_recv(&self) -> Option<WorkerEvent> {
        self.responses.try_recv().ok()
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<WorkerEvent, RecvTimeoutError> {
        self.responses.recv_timeout(timeout)
    }
}

fn run_worker(
    plugin: Arc<Mutex<Box<dyn ProcessorPlugin>>>,
    host_info: HostInfo,
    poll_interval: Duration,
    requests: Receiver<HostCommand>,
    responses: Sender<WorkerEvent>,
    probe: Sender<ConnectReport>,
) {
    match guarded("connect hook", || plugin.lock().connect(&host_info)) {
        Ok(true) => {
            let _ = probe.send(Ok(()));
        }
        Ok(false) => {
            let _ = probe.send(Err("plugin declined the connection".to_string()));
            return;
        }
        Err(diagnostic) => {
            let _ = probe.send(Err(diagnostic));
            return;
        }
    }

    let mut poll_events = match catch_unwind(AssertUnwindSafe(|| {
        plugin.lock().supports_event_responses()
    })) {
        Ok(supported) => supported,
        Err(_) => false,
    };

    loop {
        if poll_events {
            match guarded("event-response hook", || plugin.lock().take_event_responses()) {
                Ok(events) => {
                    let mut released = false;
                    for event in events {
                        if responses.send(WorkerEvent::Response(event)).is_err() {
                            released = true;
                            break;
                        }
                    }
                    if released {
                        break;
                    }
                }
                Err(diagnostic) => {
                    // Treat the capability as unsupported from here on
                    // instead of failing once per iteration.
                    warn!("disabling event-response polling: {diagnostic}");
                    poll_events = false;
                }
            }
        }

        match requests.recv_timeout(poll_interval) {
            Ok(HostCommand::Process(request)) => {
                let id = request.id;
                match guarded("processing hook", || plugin.lock().process_request(&request)) {
                    Ok(response) => {
                        if responses.send(WorkerEvent::Response(response)).is_err() {
                            debug!("host released the session while request {id} was in flight");
                            break;
                        }
                    }
                    Err(diagnostic) => {
                        fail_session(&plugin, &responses, diagnostic);
                        return;
                    }
                }
            }
            Ok(HostCommand::Action { field, command }) => {
                match guarded("action hook", || plugin.lock().handle_action(&command)) {
                    Ok(Some(response)) => {
                        if responses.send(WorkerEvent::Response(response)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(diagnostic) => {
                        fail_session(
                            &plugin,
                            &responses,
                            format!("action `{field}`: {diagnostic}"),
                        );
                        return;
                    }
                }
            }
            Ok(HostCommand::Record(event)) => {
                // Courtesy notification; a failing handler is not worth a
                // session.
                if let Err(diagnostic) = guarded("record-event hook", || {
                    plugin.lock().on_record_event(&event)
                }) {
                    warn!("record-event hook ignored: {diagnostic}");
                }
            }
            Ok(HostCommand::Disconnect) => {
                debug!("worker received disconnect");
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Quiet shutdown: no response of any kind is emitted past this point.
    best_effort_disconnect(&plugin);
}

/// Fatal-error path: disconnect best-effort, emit the poison exactly once,
/// and let the thread end.
fn fail_session(
    plugin: &Arc<Mutex<Box<dyn ProcessorPlugin>>>,
    responses: &Sender<WorkerEvent>,
    diagnostic: String,
) {
    warn!("plugin session failed: {diagnostic}");
    best_effort_disconnect(plugin);
    let _ = responses.send(WorkerEvent::Fatal { diagnostic });
}

fn best_effort_disconnect(plugin: &Arc<Mutex<Box<dyn ProcessorPlugin>>>) {
    if let Err(diagnostic) = guarded("disconnect hook", || plugin.lock().disconnect()) {
        warn!("disconnect hook ignored: {diagnostic}");
    }
}

/// Run one plugin hook with full containment: both `Err` returns and
/// panics become a captured diagnostic string. Nothing escapes the worker
/// as an unwind.
fn guarded<T>(label: &str, hook: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{label} failed: {err:#}")),
        Err(payload) => Err(format!("{label} panicked: {}", describe_panic(payload.as_ref()))),
    }
}
