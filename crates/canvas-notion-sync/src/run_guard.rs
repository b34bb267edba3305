use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::AppError;
use crate::sync::{RunState, SyncReport};

/// What `GET /` reports between runs.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    pub last_error: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            last_started: None,
            last_finished: None,
            last_report: None,
            last_error: None,
        }
    }
}

/// Admits at most one sync run at a time. A second trigger is turned away instead of queued.
#[derive(Clone, Default)]
pub struct RunGuard {
    gate: Arc<Mutex<()>>,
    status: Arc<StdMutex<StatusSnapshot>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Result<RunTicket, AppError> {
        let permit = self.gate.clone().try_lock_owned().map_err(|_| AppError::Busy)?;
        {
            let mut status = lock(&self.status);
            status.state = RunState::Running;
            status.last_started = Some(Utc::now());
        }
        Ok(RunTicket {
            status: self.status.clone(),
            finished: false,
            _permit: permit,
        })
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        lock(&self.status).clone()
    }
}

fn lock(status: &StdMutex<StatusSnapshot>) -> std::sync::MutexGuard<'_, StatusSnapshot> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

/// Held for the duration of a run; releases the guard on drop.
pub struct RunTicket {
    status: Arc<StdMutex<StatusSnapshot>>,
    finished: bool,
    _permit: OwnedMutexGuard<()>,
}

impl RunTicket {
    pub fn finish(mut self, result: &Result<SyncReport, AppError>) {
        let mut status = lock(&self.status);
        status.last_finished = Some(Utc::now());
        match result {
            Ok(report) => {
                status.state = report.state;
                status.last_report = Some(report.clone());
                status.last_error = None;
            }
            Err(e) => {
                status.state = RunState::Idle;
                status.last_error = Some(e.to_string());
            }
        }
        drop(status);
        self.finished = true;
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Run was cancelled mid-flight (client went away).
        let mut status = lock(&self.status);
        if status.state == RunState::Running {
            status.state = RunState::Idle;
        }
    }
}
