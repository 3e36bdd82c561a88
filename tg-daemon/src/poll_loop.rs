//! Poll Loop
//!
//! Owns the `Monitor` and the state store. Ticks on a fixed interval and
//! services control commands between ticks.
//!
//! # Safety Features
//! - **Single owner**: nothing outside this task touches sensors or subsystems
//! - **Between ticks only**: commands and exit requests never interrupt a tick
//! - **Park**: after a confirmed emergency the loop never ticks again

use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use tg_core::constants::timing::PARK_INTERVAL;
use tg_core::{Monitor, StateStore, TickOutcome};
use tg_protocol::SensorSnapshot;

/// Requests the control server forwards to the poll loop
#[derive(Debug)]
pub enum ControlCommand {
    Dump {
        reply: oneshot::Sender<String>,
    },
    ListSensors {
        reply: oneshot::Sender<Vec<SensorSnapshot>>,
    },
    TestOverride {
        sensor: String,
        millidegrees: i32,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Exit {
        reply: oneshot::Sender<Result<(), String>>,
    },
}

/// Why the loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// `Exit` command from the control socket
    Requested,
    /// Shutdown signal
    Signal,
}

enum Serviced {
    Continue,
    Wake,
    Exit,
}

pub async fn run_poll_loop<S: StateStore>(
    mut monitor: Monitor,
    mut store: S,
    interval: Duration,
    mut commands: mpsc::Receiver<ControlCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> LoopExit {
    info!(
        platform = %monitor.platform(),
        interval_secs = interval.as_secs(),
        "Poll loop starting"
    );
    let mut commands_open = true;

    loop {
        if *shutdown.borrow() {
            info!("Poll loop shutting down");
            return LoopExit::Signal;
        }

        match monitor.tick(&mut store) {
            TickOutcome::Synced { rows, .. } => {
                if rows > 0 {
                    debug!(rows, "Tick synced");
                }
            }
            TickOutcome::Paused(state) => debug!(state = ?state, "Tick paused"),
            TickOutcome::EmergencyShutdown { sensor } => {
                return park(monitor, &sensor, &mut commands).await;
            }
            TickOutcome::Parked => return park(monitor, "unknown", &mut commands).await,
        }

        let deadline = Instant::now() + interval;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Poll loop shutting down");
                        return LoopExit::Signal;
                    }
                }
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => match service(&mut monitor, cmd) {
                        Serviced::Continue => {}
                        Serviced::Wake => break,
                        Serviced::Exit => {
                            info!("Exit requested over control socket");
                            return LoopExit::Requested;
                        }
                    },
                    None => {
                        warn!("Control channel closed, continuing without commands");
                        commands_open = false;
                    }
                },
            }
        }
    }
}

fn service(monitor: &mut Monitor, cmd: ControlCommand) -> Serviced {
    match cmd {
        ControlCommand::Dump { reply } => {
            let _ = reply.send(monitor.dump());
            Serviced::Continue
        }
        ControlCommand::ListSensors { reply } => {
            let _ = reply.send(monitor.snapshots());
            Serviced::Continue
        }
        ControlCommand::TestOverride {
            sensor,
            millidegrees,
            reply,
        } => {
            let result = monitor
                .set_test_override(&sensor, millidegrees)
                .map_err(|e| e.to_string());
            let applied = result.is_ok();
            let _ = reply.send(result);
            // Re-read right away so the forced value shows up without waiting
            if applied {
                Serviced::Wake
            } else {
                Serviced::Continue
            }
        }
        ControlCommand::Exit { reply } => {
            let _ = reply.send(Ok(()));
            Serviced::Exit
        }
    }
}

/// Terminal state after a confirmed emergency. Read-only commands are still
/// answered; nothing else is ever done again. Takes the monitor by value so
/// the loop future stays `Send`.
async fn park(
    monitor: Monitor,
    sensor: &str,
    commands: &mut mpsc::Receiver<ControlCommand>,
) -> LoopExit {
    error!(sensor = %sensor, "Emergency shutdown requested, poll loop parked");

    loop {
        match commands.recv().await {
            Some(ControlCommand::Dump { reply }) => {
                let _ = reply.send(monitor.dump());
            }
            Some(ControlCommand::ListSensors { reply }) => {
                let _ = reply.send(monitor.snapshots());
            }
            Some(ControlCommand::TestOverride { reply, .. }) | Some(ControlCommand::Exit { reply }) => {
                let _ = reply.send(Err("Daemon is parked after an emergency shutdown".into()));
            }
            None => loop {
                tokio::time::sleep(PARK_INTERVAL).await;
            },
        }
    }
}
