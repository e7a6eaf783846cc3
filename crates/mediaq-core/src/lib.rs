pub mod config;
pub mod logging;

pub mod artifact;
pub mod command;
pub mod control;
pub mod download;
pub mod engine;
pub mod job;
pub mod retry;
pub mod service;
pub mod storage;

pub use engine::{Admission, EngineError, EngineStats, JobEngine};
pub use job::{Job, JobId, Progress};
