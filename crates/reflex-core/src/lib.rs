//! Core types for Reflex
//!
//! This crate provides the fundamental types used throughout the Reflex
//! reactive remediation engine: Context, EngineEvent, ActionContext,
//! ExecutionRecord, and the NoticeBus.

mod context;
mod event;
mod notice;
mod record;

pub use context::Context;
pub use event::{ActionContext, EngineEvent, EventPayload, Severity, TriggerKind};
pub use notice::{EngineNotice, NoticeBus, DEFAULT_NOTICE_CAPACITY};
pub use record::{ExecutionRecord, ExecutionStatus};
