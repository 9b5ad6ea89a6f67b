//! JSONL (JSON Lines) logging for structured log events
//!
//! Each log entry is written as a single JSON object on one line, append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Log event kinds for the structured diagnostic sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    /// Server started listening
    ServerStart,
    /// Server stopped listening
    ServerStop,
    /// Client connected
    ClientConnect,
    /// Client disconnected
    ClientDisconnect,
    /// Peer credentials resolved
    PeerResolved,
    /// Policy loaded from auth-dir/pubkey-dir
    PolicyLoad,
    /// Identities request forwarded unmodified
    IdentitiesRequest,
    /// Sign request decided (allowed or denied)
    SignRequest,
    /// Error occurred
    Error,
}

impl std::fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogEventKind::ServerStart => write!(f, "server_start"),
            LogEventKind::ServerStop => write!(f, "server_stop"),
            LogEventKind::ClientConnect => write!(f, "client_connect"),
            LogEventKind::ClientDisconnect => write!(f, "client_disconnect"),
            LogEventKind::PeerResolved => write!(f, "peer_resolved"),
            LogEventKind::PolicyLoad => write!(f, "policy_load"),
            LogEventKind::IdentitiesRequest => write!(f, "identities_request"),
            LogEventKind::SignRequest => write!(f, "sign_request"),
            LogEventKind::Error => write!(f, "error"),
        }
    }
}

/// Decision result for sign requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

/// A structured log event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub kind: LogEventKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// SSH key fingerprint involved in the event, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Diagnostic-only reason for a decision; never sent over the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Number of fingerprints indexed (for policy_load events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEvent {
    pub fn new(kind: LogEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            socket: None,
            client_id: None,
            user: None,
            fingerprint: None,
            decision: None,
            reason: None,
            key_count: None,
            error: None,
        }
    }

    pub fn with_socket(mut self, name: impl Into<String>) -> Self {
        self.socket = Some(name.into());
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_fingerprint(mut self, fp: impl Into<String>) -> Self {
        self.fingerprint = Some(fp.into());
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_key_count(mut self, count: u32) -> Self {
        self.key_count = Some(count);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn server_start(socket_path: impl Into<String>) -> Self {
        Self::new(LogEventKind::ServerStart).with_socket(socket_path)
    }

    pub fn server_stop(socket_path: impl Into<String>) -> Self {
        Self::new(LogEventKind::ServerStop).with_socket(socket_path)
    }

    pub fn client_connect(socket_path: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientConnect)
            .with_socket(socket_path)
            .with_client_id(client_id)
    }

    pub fn client_disconnect(socket_path: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientDisconnect)
            .with_socket(socket_path)
            .with_client_id(client_id)
    }

    pub fn policy_load(key_count: u32) -> Self {
        Self::new(LogEventKind::PolicyLoad).with_key_count(key_count)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error).with_error(message)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSONL file writer with thread-safe buffered output
pub struct JsonlWriter {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    /// Opens the file for appending. Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn write(&self, event: &LogEvent) -> std::io::Result<()> {
        let json = event
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    pub fn flush(&self) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writer.flush()
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
