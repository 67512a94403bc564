//! # Spool Core
//!
//! Shared vocabulary for the spool telemetry queue.
//!
//! The storage crate persists opaque payloads; everything that turns a
//! domain object into a payload (and back) lives behind the [`Codec`]
//! trait defined here so the store never depends on a concrete encoding.
//!
//! ## Key Types
//!
//! - [`RecordId`]: Store-wide, insertion-ordered record identifier
//! - [`Record`]: One persisted payload tagged with its group
//! - [`BatchId`]: Opaque token naming a checked-out batch
//! - [`Checkout`]: A batch handed to a consumer
//! - [`Codec`]: Encode/decode step supplied by the caller

pub mod codec;
pub mod error;
pub mod group;
pub mod record;

pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, GroupNameError};
pub use group::validate_group;
pub use record::{BatchId, Checkout, Record, RecordId};
