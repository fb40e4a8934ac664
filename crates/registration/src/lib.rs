//! # Registration
//!
//! Declarative description of one consumer: which topics, which
//! configuration, how records are decoded and handled, and what happens when
//! that fails.
//!
//! Registrations are assembled by a staged builder. Each stage is its own
//! type and is consumed by value, so steps cannot be skipped, repeated or
//! reordered, and `build()` can run at most once.
//!
//! ```
//! use contracts::{ConsumerRecord, DispatchContext, HandlerError, StringDeserializer};
//! use registration::Registration;
//!
//! let registration = Registration::<String, String>::builder()
//!     .with_default_listener_config()
//!     .for_topic("orders")
//!     .with_default_consumer()
//!     .with_key_deserializer(StringDeserializer)
//!     .with_value_deserializer(StringDeserializer)
//!     .with_handler_fn(|record: &ConsumerRecord<String, String>, _: &DispatchContext| {
//!         println!("{}", record.value);
//!         Ok::<(), HandlerError>(())
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(registration.topic_names(), vec!["orders"]);
//! ```

mod builder;
mod config_ref;
mod registration;

pub use builder::{ConsumerStage, FinalStage, HandlerStage, ListenerStage, TopicStage};
pub use config_ref::ConfigRef;
pub use registration::Registration;
