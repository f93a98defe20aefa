//! Domain models shared across fotoflow components.

mod album;
mod event;
mod media;
mod tag;
mod transfer;
mod user;

pub use album::Album;
pub use event::ProcessingEvent;
pub use media::{DerivativeKeys, MediaItem, MediaKind, MediaStatus, NewMediaItem};
pub use tag::Tag;
pub use transfer::{CompletedPart, PartUpload, TransferMode, TransferPlan};
pub use user::User;
