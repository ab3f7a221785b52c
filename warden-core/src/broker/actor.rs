//! The broker event loop
//!
//! Single owner of the [`Registry`]. Every state change happens here, one
//! event at a time, so admission and teardown never race. Anything that can
//! block (launching a sandbox, killing and removing it) runs on a separate
//! task that reports back with another event.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::config::BrokerConfig;
use super::events::{BrokerEvent, SessionIo, SessionSignal, SessionTicket, TerminateReason};
use crate::error::BrokerError;
use crate::sandbox::{ProcessControl, SandboxEngine, SandboxError, SandboxProcess};
use crate::session::{AdmissionOutcome, BrokerStats, Registry, SessionId, SessionState};
use crate::watchdog::IdleWatchdog;

/// Per-session resources that live outside the registry
struct Live {
    signals: mpsc::UnboundedSender<SessionSignal>,
    instance: String,
    control: Option<ProcessControl>,
    watchdog: Option<IdleWatchdog>,
    launching: bool,
    last_position: Option<usize>,
}

impl Live {
    fn notify(&self, signal: SessionSignal) {
        // The connection may already be gone
        let _ = self.signals.send(signal);
    }
}

pub(crate) struct BrokerActor {
    config: BrokerConfig,
    engine: Arc<dyn SandboxEngine>,
    registry: Registry,
    live: HashMap<SessionId, Live>,
    events: mpsc::UnboundedSender<BrokerEvent>,
    stats: watch::Sender<BrokerStats>,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
    stopped: bool,
}

impl BrokerActor {
    pub(crate) fn new(
        config: BrokerConfig,
        engine: Arc<dyn SandboxEngine>,
        events: mpsc::UnboundedSender<BrokerEvent>,
        stats: watch::Sender<BrokerStats>,
    ) -> Self {
        let registry = Registry::new(config.max_concurrent_sessions, config.max_sessions_per_ip);
        Self {
            config,
            engine,
            registry,
            live: HashMap::new(),
            events,
            stats,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
            stopped: false,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BrokerEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
            self.publish_stats();
            if self.stopped {
                break;
            }
        }

        match self.engine.reap_orphans().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Removed leftover sandboxes"),
            Err(e) => tracing::warn!("Failed to reap sandboxes after shutdown: {}", e),
        }
        tracing::info!("Broker stopped");
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn handle(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Admit {
                client,
                label,
                reply,
            } => self.admit(client, label, reply),
            BrokerEvent::Spawned { id, result } => self.spawned(id, result),
            BrokerEvent::Terminate { id, reason } => self.terminate(id, reason),
            BrokerEvent::TeardownFinished { id } => self.finish(id),
            BrokerEvent::ListSessions { reply } => {
                let _ = reply.send(self.registry.summaries());
            }
            BrokerEvent::Shutdown { reply } => self.shutdown(reply),
        }
    }

    fn publish_stats(&self) {
        let stats = self.registry.stats();
        self.stats.send_if_modified(|current| {
            if *current == stats {
                return false;
            }
            *current = stats;
            true
        });
    }

    fn admit(
        &mut self,
        client: IpAddr,
        label: Option<String>,
        reply: oneshot::Sender<Result<SessionTicket, BrokerError>>,
    ) {
        if self.shutting_down {
            let _ = reply.send(Err(BrokerError::ShuttingDown));
            return;
        }

        let admitted = match self.registry.admit(client, label) {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::info!(%client, "Rejected session: {}", e);
                let _ = reply.send(Err(e));
                return;
            }
        };
        let id = admitted.id;

        let (signals, rx) = mpsc::unbounded_channel();
        let last_position = match admitted.outcome {
            AdmissionOutcome::Queued { position } => Some(position),
            AdmissionOutcome::Started => None,
        };
        self.live.insert(
            id,
            Live {
                signals,
                instance: self.engine.instance_name(&id),
                control: None,
                watchdog: None,
                launching: false,
                last_position,
            },
        );

        tracing::info!(session_id = %id, %client, outcome = ?admitted.outcome, "Admitted session");

        let ticket = SessionTicket {
            id,
            outcome: admitted.outcome,
            signals: rx,
        };
        if reply.send(Ok(ticket)).is_err() {
            tracing::debug!(session_id = %id, "Connection left during admission");
            self.terminate(id, TerminateReason::ClientDisconnect);
            return;
        }

        if admitted.outcome == AdmissionOutcome::Started {
            self.launch(id);
        }
    }

    /// Start the sandbox for an active session off the event loop
    fn launch(&mut self, id: SessionId) {
        let Some(live) = self.live.get_mut(&id) else {
            return;
        };
        live.launching = true;
        live.last_position = None;

        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        let instance = live.instance.clone();
        tracing::debug!(session_id = %id, %instance, "Launching sandbox");

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || engine.launch(&instance))
                .await
                .unwrap_or_else(|e| Err(SandboxError::SpawnFailed(e.to_string())));
            let _ = events.send(BrokerEvent::Spawned { id, result });
        });
    }

    fn spawned(&mut self, id: SessionId, result: Result<SandboxProcess, SandboxError>) {
        let Some(live) = self.live.get_mut(&id) else {
            // Unknown session; never leave a process behind
            if let Ok(process) = result {
                let (control, _io) = process.into_parts();
                self.spawn_teardown(id, control.name().to_string(), Some(control));
            }
            return;
        };
        live.launching = false;

        if self.registry.state(id) == Some(SessionState::Closing) {
            // Terminated while launching: tear down whatever came up
            match result {
                Ok(process) => {
                    let (control, _io) = process.into_parts();
                    live.control = Some(control);
                    self.start_teardown(id);
                }
                Err(_) => self.start_teardown(id),
            }
            return;
        }

        match result {
            Ok(process) => {
                tracing::info!(session_id = %id, instance = %process.name, pid = ?process.pid(), "Sandbox started");
                let (control, io) = process.into_parts();

                let events = self.events.clone();
                let watchdog = IdleWatchdog::spawn(self.config.idle_timeout, move || {
                    let _ = events.send(BrokerEvent::Terminate {
                        id,
                        reason: TerminateReason::IdleTimeout,
                    });
                });
                let activity = watchdog.activity();

                live.control = Some(control);
                live.watchdog = Some(watchdog);
                live.notify(SessionSignal::Started(SessionIo {
                    io,
                    activity: activity.clone(),
                }));
                self.registry.attach_activity(id, activity);
            }
            Err(e) => {
                tracing::warn!(session_id = %id, "Sandbox failed to start: {}", e);
                live.notify(SessionSignal::SpawnFailed(e.to_string()));
                self.terminate(id, TerminateReason::SpawnFailure);
            }
        }
    }

    /// Begin teardown. Later calls for the same session are no-ops.
    fn terminate(&mut self, id: SessionId, reason: TerminateReason) {
        let Some(prior) = self.registry.begin_teardown(id) else {
            return;
        };
        tracing::info!(session_id = %id, from = %prior, %reason, "Closing session");

        let Some(live) = self.live.get_mut(&id) else {
            self.finish(id);
            return;
        };
        match reason {
            TerminateReason::IdleTimeout => {
                live.notify(SessionSignal::IdleTimeout(self.config.idle_timeout))
            }
            TerminateReason::Shutdown => live.notify(SessionSignal::Shutdown),
            _ => {}
        }
        live.watchdog = None;

        if prior == SessionState::Queued {
            self.finish(id);
            self.notify_positions();
        } else if live.launching {
            tracing::debug!(session_id = %id, "Teardown waits for launch to finish");
        } else {
            self.start_teardown(id);
        }
    }

    fn start_teardown(&mut self, id: SessionId) {
        let Some(live) = self.live.get_mut(&id) else {
            return;
        };
        let control = live.control.take();
        let instance = live.instance.clone();
        self.spawn_teardown(id, instance, control);
    }

    /// Kill, reap and remove the sandbox, then report back
    fn spawn_teardown(&self, id: SessionId, instance: String, control: Option<ProcessControl>) {
        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(control) = control {
                match tokio::task::spawn_blocking(move || control.kill_and_reap()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(session_id = %id, "Failed to kill sandbox process: {}", e),
                    Err(e) => tracing::warn!(session_id = %id, "Kill task failed: {}", e),
                }
            }
            if let Err(e) = engine.force_remove(&instance).await {
                tracing::warn!(session_id = %id, %instance, "Failed to remove sandbox: {}", e);
            }
            let _ = events.send(BrokerEvent::TeardownFinished { id });
        });
    }

    /// Release capacity and quota, drop the session, refill from the queue
    fn finish(&mut self, id: SessionId) {
        let promoted = self.registry.finish_teardown(id, !self.shutting_down);
        if self.live.remove(&id).is_some() {
            tracing::info!(session_id = %id, "Session closed");
        }

        for next in &promoted {
            tracing::info!(session_id = %next, "Promoted from queue");
            self.launch(*next);
        }
        if !promoted.is_empty() {
            self.notify_positions();
        }

        self.check_shutdown_complete();
    }

    /// Tell queued connections their position when it changed
    fn notify_positions(&mut self) {
        for (id, position) in self.registry.queue_positions() {
            if let Some(live) = self.live.get_mut(&id) {
                if live.last_position != Some(position) {
                    live.last_position = Some(position);
                    live.notify(SessionSignal::Queued { position });
                }
            }
        }
    }

    fn shutdown(&mut self, reply: oneshot::Sender<()>) {
        self.shutdown_waiters.push(reply);
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        let open = self.registry.open_sessions();
        tracing::info!(sessions = open.len(), "Shutting down broker");
        for id in open {
            self.terminate(id, TerminateReason::Shutdown);
        }
        self.check_shutdown_complete();
    }

    fn check_shutdown_complete(&mut self) {
        if self.shutting_down && self.registry.is_empty() {
            self.stopped = true;
        }
    }
}
