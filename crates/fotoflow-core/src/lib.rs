//! Fotoflow Core Library
//!
//! This crate provides the domain models, error types, and configuration
//! shared across all fotoflow components.

pub mod config;
pub mod error;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AppConfig, SweepConfig, UploadPolicy};
pub use error::AppError;
