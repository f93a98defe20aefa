//! Fotoflow Transfer
//!
//! Client-side bulk upload executor: takes local files paired with transfer
//! plans (presigned single PUTs or multipart sessions) and turns them into
//! verified storage objects with a bounded worker pool and per-attempt
//! retry.

pub mod executor;

pub use executor::{TransferConfig, TransferError, TransferExecutor, TransferJob};
