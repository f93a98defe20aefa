//! Database repositories for the fotoflow pipeline.
//!
//! Each repository owns one entity's queries. Multi-row operations that must
//! be atomic (intake batches, purges, bulk deletes) run inside a caller-held
//! transaction via the `_in_tx` methods; everything else goes through the
//! pool directly.

pub mod album;
pub mod media;
pub mod queue;
pub mod tag;
pub mod transaction;
pub mod user;

pub use album::AlbumRepository;
pub use media::MediaRepository;
pub use queue::{QueueRepository, QueueRow, QueueStatus, EVENT_NOTIFY_CHANNEL};
pub use tag::TagRepository;
pub use transaction::{with_transaction, TransactionGuard};
pub use user::UserRepository;
