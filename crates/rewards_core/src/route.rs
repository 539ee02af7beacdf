use std::{collections::VecDeque, sync::Arc};

use shared::{
    domain::Stop,
    protocol::{RouteSnapshot, RouteStatus, SessionEvent},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{config::RouteSettings, error::RouteError, timer::ScopedTask};

/// Agent pickup queue with the scan-and-complete cycle.
pub struct AgentRoute {
    settings: RouteSettings,
    inner: Mutex<RouteState>,
    events: broadcast::Sender<SessionEvent>,
}

struct RouteState {
    queue: VecDeque<Stop>,
    earnings_cents: u64,
    completed_stops: u32,
    phase: Phase,
    closed: bool,
}

enum Phase {
    Idle,
    Scanning {
        capture: Option<ScopedTask>,
        camera_error: Option<String>,
    },
    Completed {
        auto_return: Option<ScopedTask>,
    },
}

impl RouteState {
    fn status(&self) -> RouteStatus {
        match self.phase {
            Phase::Idle if self.queue.is_empty() => RouteStatus::AllCaughtUp,
            Phase::Idle => RouteStatus::Idle,
            Phase::Scanning { .. } => RouteStatus::Scanning,
            Phase::Completed { .. } => RouteStatus::Completed,
        }
    }
}

fn status_name(status: RouteStatus) -> &'static str {
    match status {
        RouteStatus::Idle => "idle",
        RouteStatus::AllCaughtUp => "all caught up",
        RouteStatus::Scanning => "scanning",
        RouteStatus::Completed => "completed",
    }
}

impl AgentRoute {
    pub fn new(
        settings: RouteSettings,
        stops: Vec<Stop>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        let earnings_cents = settings.starting_earnings_cents;
        Arc::new(Self {
            settings,
            inner: Mutex::new(RouteState {
                queue: stops.into(),
                earnings_cents,
                completed_stops: 0,
                phase: Phase::Idle,
                closed: false,
            }),
            events,
        })
    }

    pub async fn snapshot(&self) -> RouteSnapshot {
        let state = self.inner.lock().await;
        let camera_error = match &state.phase {
            Phase::Scanning { camera_error, .. } => camera_error.clone(),
            _ => None,
        };
        RouteSnapshot {
            status: state.status(),
            queue: state.queue.iter().cloned().collect(),
            earnings_cents: state.earnings_cents,
            completed_stops: state.completed_stops,
            camera_error,
        }
    }

    pub async fn status(&self) -> RouteStatus {
        self.inner.lock().await.status()
    }

    pub async fn queue(&self) -> Vec<Stop> {
        self.inner.lock().await.queue.iter().cloned().collect()
    }

    pub async fn current_stop(&self) -> Option<Stop> {
        self.inner.lock().await.queue.front().cloned()
    }

    pub async fn earnings_cents(&self) -> u64 {
        self.inner.lock().await.earnings_cents
    }

    pub async fn begin_scan(&self) -> Result<(), RouteError> {
        let mut state = self.inner.lock().await;
        if state.closed {
            return Err(RouteError::Closed);
        }
        match state.status() {
            RouteStatus::Idle => {}
            RouteStatus::AllCaughtUp => return Err(RouteError::QueueEmpty),
            status => {
                return Err(RouteError::InvalidTransition {
                    action: "begin scan",
                    status: status_name(status),
                })
            }
        }
        state.phase = Phase::Scanning {
            capture: None,
            camera_error: None,
        };
        let stop_id = state.queue.front().map(|stop| stop.id.to_string());
        drop(state);

        debug!("route: scanning stop={}", stop_id.unwrap_or_default());
        self.emit_status(RouteStatus::Scanning);
        Ok(())
    }

    /// Records that the camera could not be opened. The flow stays in
    /// scanning so the operator can cancel.
    pub async fn report_camera_unavailable(&self, reason: impl Into<String>) -> Result<(), RouteError> {
        let mut state = self.inner.lock().await;
        let status = state.status();
        let Phase::Scanning { camera_error, .. } = &mut state.phase else {
            return Err(RouteError::InvalidTransition {
                action: "report camera error",
                status: status_name(status),
            });
        };
        let reason = reason.into();
        warn!("route: camera unavailable reason={reason}");
        *camera_error = Some(reason);
        Ok(())
    }

    /// Starts the simulated capture; it ends in [`AgentRoute::complete_scan`].
    /// A capture already in flight makes this a no-op.
    pub async fn capture(self: &Arc<Self>) -> Result<(), RouteError> {
        let mut state = self.inner.lock().await;
        if state.closed {
            return Err(RouteError::Closed);
        }
        let status = state.status();
        let Phase::Scanning {
            capture,
            camera_error,
        } = &mut state.phase
        else {
            return Err(RouteError::InvalidTransition {
                action: "capture",
                status: status_name(status),
            });
        };

        if let Some(reason) = camera_error {
            return Err(RouteError::CameraUnavailable(reason.clone()));
        }
        if capture.is_some() {
            debug!("route: capture already in flight");
            return Ok(());
        }

        let route = Arc::clone(self);
        *capture = Some(ScopedTask::spawn_after(
            self.settings.capture_latency(),
            async move {
                if let Err(err) = route.finish_capture().await {
                    warn!("route: capture finished without completing stop error={err}");
                }
            },
        ));
        Ok(())
    }

    async fn finish_capture(self: &Arc<Self>) -> Result<Stop, RouteError> {
        let mut state = self.inner.lock().await;
        if let Phase::Scanning { capture, .. } = &mut state.phase {
            if let Some(task) = capture.take() {
                task.disarm();
            }
        }
        self.complete_locked(&mut state)
    }

    /// Completes the current stop: dequeues it, credits the per-stop reward
    /// and shows the completion until it times out or is dismissed.
    pub async fn complete_scan(self: &Arc<Self>) -> Result<Stop, RouteError> {
        let mut state = self.inner.lock().await;
        self.complete_locked(&mut state)
    }

    fn complete_locked(self: &Arc<Self>, state: &mut RouteState) -> Result<Stop, RouteError> {
        if state.closed {
            return Err(RouteError::Closed);
        }
        let status = state.status();
        if !matches!(state.phase, Phase::Scanning { .. }) {
            return Err(RouteError::InvalidTransition {
                action: "complete scan",
                status: status_name(status),
            });
        }
        let stop = state.queue.pop_front().ok_or(RouteError::QueueEmpty)?;

        state.earnings_cents += self.settings.per_stop_reward_cents;
        state.completed_stops += 1;

        let route = Arc::clone(self);
        let auto_return = ScopedTask::spawn_after(self.settings.completed_display(), async move {
            route.return_to_idle().await;
        });
        // Replacing the scanning phase drops any capture still in flight.
        state.phase = Phase::Completed {
            auto_return: Some(auto_return),
        };

        info!(
            "route: completed stop={} earnings_cents={} remaining={}",
            stop.id,
            state.earnings_cents,
            state.queue.len()
        );
        let _ = self.events.send(SessionEvent::StopCompleted {
            stop_id: stop.id.clone(),
            earnings_cents: state.earnings_cents,
            remaining: state.queue.len(),
        });
        self.emit_status(RouteStatus::Completed);
        Ok(stop)
    }

    async fn return_to_idle(&self) {
        let mut state = self.inner.lock().await;
        let Phase::Completed { auto_return } = &mut state.phase else {
            return;
        };
        if let Some(task) = auto_return.take() {
            task.disarm();
        }
        state.phase = Phase::Idle;
        let status = state.status();
        drop(state);
        self.emit_status(status);
    }

    pub async fn cancel_scan(&self) -> Result<(), RouteError> {
        let mut state = self.inner.lock().await;
        let status = state.status();
        if !matches!(state.phase, Phase::Scanning { .. }) {
            return Err(RouteError::InvalidTransition {
                action: "cancel scan",
                status: status_name(status),
            });
        }
        state.phase = Phase::Idle;
        let status = state.status();
        drop(state);

        debug!("route: scan cancelled");
        self.emit_status(status);
        Ok(())
    }

    /// Leaves the completion display before the auto-return fires.
    pub async fn dismiss(&self) -> Result<(), RouteError> {
        let mut state = self.inner.lock().await;
        let status = state.status();
        if !matches!(state.phase, Phase::Completed { .. }) {
            return Err(RouteError::InvalidTransition {
                action: "dismiss",
                status: status_name(status),
            });
        }
        state.phase = Phase::Idle;
        let status = state.status();
        drop(state);
        self.emit_status(status);
        Ok(())
    }

    /// Drops every pending capture or auto-return timer. Scanning can not be
    /// started again afterwards.
    pub async fn shutdown(&self) {
        let mut state = self.inner.lock().await;
        state.closed = true;
        if !matches!(state.phase, Phase::Idle) {
            debug!("route: shutdown while {}", status_name(state.status()));
        }
        state.phase = Phase::Idle;
    }

    fn emit_status(&self, status: RouteStatus) {
        let _ = self.events.send(SessionEvent::RouteStatusChanged { status });
    }
}

#[cfg(test)]
#[path = "tests/route_tests.rs"]
mod tests;
