//! Fotoflow Worker
//!
//! Event-driven processing: a bounded worker pool claims durable queue rows
//! (woken by LISTEN/NOTIFY, with polling as fallback) and dispatches each
//! event to the media handler, which drives the item state machine
//! `pending → processing → {active, failed}`.

pub mod handler;
pub mod queue;

pub use handler::MediaWorker;
pub use queue::{EventHandler, QueueWorkerConfig, QueueWorkerPool};
