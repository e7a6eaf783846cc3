//! Control protocol between `mediaq serve` and client subcommands.
//!
//! One request per line: `submit <url>`, `status <job-id>`, `cancel <job-id>`
//! or `stats`. Each request gets exactly one JSON reply line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::EngineStats;
use crate::job::{JobId, Progress};
use crate::service::{DownloadService, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Submit { url: String },
    Status { job_id: JobId },
    Cancel { job_id: JobId },
    Stats,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("empty request")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
    #[error("unexpected trailing input {0:?}")]
    TrailingInput(String),
}

impl FromStr for Request {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().ok_or(ControlError::Empty)?;
        let mut arg = |name: &'static str| {
            parts
                .next()
                .map(str::to_string)
                .ok_or(ControlError::MissingArgument(name))
        };
        let req = match cmd {
            "submit" => Request::Submit { url: arg("submit")? },
            "status" => Request::Status { job_id: arg("status")? },
            "cancel" => Request::Cancel { job_id: arg("cancel")? },
            "stats" => Request::Stats,
            other => return Err(ControlError::UnknownCommand(other.to_string())),
        };
        let rest: Vec<&str> = parts.collect();
        if !rest.is_empty() {
            return Err(ControlError::TrailingInput(rest.join(" ")));
        }
        Ok(req)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Submit { url } => write!(f, "submit {url}"),
            Request::Status { job_id } => write!(f, "status {job_id}"),
            Request::Cancel { job_id } => write!(f, "cancel {job_id}"),
            Request::Stats => write!(f, "stats"),
        }
    }
}

/// Machine-readable failure category, mirroring HTTP status classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    InvalidUrl,
    NotFound,
    AlreadyTerminal,
    Unavailable,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::BadRequest | ErrorCode::InvalidUrl => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::AlreadyTerminal => 409,
            ErrorCode::Unavailable => 503,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Submitted {
        job_id: JobId,
        artifact_id: String,
    },
    Status {
        job_id: JobId,
        progress: Progress,
        state: String,
    },
    Cancelled {
        job_id: JobId,
        previous: Progress,
    },
    Stats(EngineStats),
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Reply {
    pub fn error(code: ErrorCode, message: impl fmt::Display) -> Self {
        Reply::Error {
            code,
            message: message.to_string(),
        }
    }

    /// Serialize to a single line (no trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"kind":"error","code":"unavailable","message":"encode reply: {e}"}}"#)
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

impl From<ServiceError> for Reply {
    fn from(e: ServiceError) -> Self {
        let code = match &e {
            ServiceError::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::AlreadyTerminal { .. } => ErrorCode::AlreadyTerminal,
            ServiceError::Unavailable => ErrorCode::Unavailable,
        };
        Reply::error(code, e)
    }
}

/// Execute one request against the service.
pub async fn handle(service: &DownloadService, request: Request) -> Reply {
    let result = match request {
        Request::Submit { url } => service.submit(&url).await.map(|s| Reply::Submitted {
            job_id: s.job_id,
            artifact_id: s.artifact_id,
        }),
        Request::Status { job_id } => service.status(&job_id).map(|progress| Reply::Status {
            job_id,
            progress,
            state: progress.as_str().to_string(),
        }),
        Request::Cancel { job_id } => service
            .cancel(&job_id)
            .map(|previous| Reply::Cancelled { job_id, previous }),
        Request::Stats => Ok(Reply::Stats(service.engine().stats())),
    };
    result.unwrap_or_else(Reply::from)
}

/// Parse and execute one raw request line.
pub async fn handle_line(service: &DownloadService, line: &str) -> Reply {
    match line.parse::<Request>() {
        Ok(req) => handle(service, req).await,
        Err(e) => Reply::error(ErrorCode::BadRequest, e),
    }
}

/// Default path for the control socket, under the XDG state dir.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mediaq")?.get_state_home();
    Ok(dir.join("control.sock"))
}
