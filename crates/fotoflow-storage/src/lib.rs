//! Fotoflow Storage Library
//!
//! Uniform client for the two logical object-storage namespaces the pipeline
//! uses: a private `originals` area holding untransformed uploads and a
//! public `assets` area holding derivatives. Backends implement the
//! [`ObjectStorage`] trait; S3 and local filesystem are provided.
//!
//! # Key format
//!
//! Keys are namespace-relative and never contain `..` or a leading `/`:
//!
//! - originals: `{owner_id}/{uuid}.{ext}`
//! - assets: `{media_id}/{generation}/{variant}` where `generation` is a
//!   fresh UUID per processing run and `variant` is one of
//!   `small.jpg`, `medium.jpg`, `large.jpg`, `playback.mp4`, `preview.mp4`
//!
//! Key generation is centralized in the `keys` module so producers and the
//! worker stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::{create_storage, StorageSettings};
pub use keys::DerivativeVariant;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Namespace, ObjectStorage, StorageError, StorageResult};
