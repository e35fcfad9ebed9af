//! Domain records held by the entity store.
//!
//! Field names on the wire follow the demo frontend: a session's device is
//! `device_info`, a build's size is `size` and its storage location is
//! `file_path`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use appmirror_core::Platform;

pub type DeviceId = String;

pub type BuildId = String;

pub type SessionId = String;

// ── Device ────────────────────────────────────────────────────────

/// A simulated mobile device. Never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub platform: Platform,
    pub os_version: String,
    pub available: bool,
}

// ── Build ─────────────────────────────────────────────────────────

/// An uploaded application artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Build {
    pub id: BuildId,
    /// Uploaded filename without its extension.
    pub name: String,
    pub platform: Platform,
    pub version: String,
    /// Bytes actually written to the blob store.
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// Where the blob store put the artifact.
    #[serde(rename = "file_path")]
    pub storage_location: String,
    pub uploaded_at: DateTime<Utc>,
    pub compatible: bool,
}

// ── Session ───────────────────────────────────────────────────────

/// Lifecycle status of a session. Only ever moves forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Preparing,
    Ready,
    Installing,
    Running,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Preparing => "preparing",
            SessionStatus::Ready => "ready",
            SessionStatus::Installing => "installing",
            SessionStatus::Running => "running",
        }
    }

    /// The only status this one may advance to.
    pub fn next(&self) -> Option<SessionStatus> {
        match self {
            SessionStatus::Preparing => Some(SessionStatus::Ready),
            SessionStatus::Ready => Some(SessionStatus::Installing),
            SessionStatus::Installing => Some(SessionStatus::Running),
            SessionStatus::Running => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// A device session tracked by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    #[serde(rename = "device_info")]
    pub device: Device,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<BuildId>,
}

impl Session {
    /// A fresh session in `preparing`.
    pub fn new(id: SessionId, device: Device, now: DateTime<Utc>) -> Self {
        Self {
            id,
            device,
            status: SessionStatus::Preparing,
            created_at: now,
            updated_at: now,
            build_id: None,
        }
    }

    /// Move to `to`, which must be the direct successor of the current status.
    pub fn advance(&mut self, to: SessionStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if self.status.next() != Some(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Point the session at a build.
    pub fn attach_build(&mut self, build_id: &str, now: DateTime<Utc>) {
        self.build_id = Some(build_id.to_string());
        self.updated_at = now;
    }
}
