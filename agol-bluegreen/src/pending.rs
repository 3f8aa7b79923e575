//! Handles for admin operations the platform executes asynchronously.

use std::thread;
use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};
use log::debug;
use serde_json::Value as JsonValue;

use crate::{Error, Portal};

/// Admin endpoints disagree on the capitalization of this field.
const STATUS_URL_FIELDS: &[&str] = &["statusURL", "statusUrl"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed(String),
}

impl OperationStatus {
    fn from_response(json: &JsonValue) -> Self {
        let status = json
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match status.as_str() {
            "completed" => Self::Completed,
            "inprogress" | "in progress" | "processing" | "executing" => Self::InProgress,
            "failed" | "cancelled" | "canceled" => Self::Failed(
                json.get("message")
                    .or_else(|| json.get("statusMessage"))
                    .and_then(|m| m.as_str())
                    .unwrap_or(status.as_str())
                    .to_string(),
            ),
            _ => Self::Pending,
        }
    }
}

/// An admin edit that the platform accepted but has not yet finished
/// executing. Poll it with [`PendingOperation::status`] or block on it with
/// [`PendingOperation::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    status_url: String,
}

impl PendingOperation {
    pub fn new<S: AsRef<str>>(status_url: S) -> Self {
        Self {
            status_url: status_url.as_ref().to_string(),
        }
    }

    /// Extracts a handle from an admin response, if the response describes an
    /// asynchronous job.
    pub fn from_response(json: &JsonValue) -> Option<Self> {
        STATUS_URL_FIELDS
            .iter()
            .find_map(|field| json.get(*field).and_then(|u| u.as_str()))
            .map(Self::new)
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub fn status(&self, portal: &dyn Portal) -> Result<OperationStatus> {
        let response = portal
            .get(&self.status_url, &[])
            .wrap_err_with(|| format!("failed to poll {}", self.status_url))?;
        let status = OperationStatus::from_response(&response);
        debug!("{} is {:?}", self.status_url, status);
        Ok(status)
    }

    /// Poll until the operation completes, fails, or the timeout elapses.
    pub fn wait(&self, portal: &dyn Portal, interval: Duration, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            match self.status(portal)? {
                OperationStatus::Completed => return Ok(()),
                OperationStatus::Failed(message) => {
                    return Err(Error::OperationFailed(self.status_url.clone(), message).into())
                }
                _ => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(
                            Error::OperationTimedOut(self.status_url.clone(), timeout).into()
                        );
                    }
                    // Never sleep past the deadline.
                    thread::sleep(interval.min(timeout - elapsed));
                }
            }
        }
    }
}

/// Interprets the response to an admin operation that either completes
/// synchronously with `{"success": true}` or hands back a status URL.
pub(crate) fn accepted_or_pending(
    operation: &str,
    response: &JsonValue,
) -> Result<Option<PendingOperation>> {
    if let Some(pending) = PendingOperation::from_response(response) {
        return Ok(Some(pending));
    }
    match response.get("success").and_then(|s| s.as_bool()) {
        Some(true) => Ok(None),
        _ => Err(Error::EditRejected(operation.to_string(), response.to_string()).into()),
    }
}

impl std::fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status_url)
    }
}
