//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the consumer engine:
//! configuration models, topic expectations, record and decision types, and the
//! collaborator traits (broker metadata, broker consumer, deserializer, handler,
//! error handler). Business crates depend on this crate only, never the reverse.
//!
//! ## Offset model
//! - Offsets are broker offsets within one partition (`i64`)
//! - A committed offset is always "next offset to consume", i.e. processed + 1

mod broker;
mod consumer;
mod decision;
mod deserializers;
mod error;
mod handler;
mod listener;
mod record;
mod settings;
mod topic;
mod topic_name;

pub use broker::*;
pub use consumer::*;
pub use decision::*;
pub use deserializers::*;
pub use error::*;
pub use handler::*;
pub use listener::*;
pub use record::*;
pub use settings::*;
pub use topic::*;
pub use topic_name::TopicName;
