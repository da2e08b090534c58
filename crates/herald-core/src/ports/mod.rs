//! Ports - the seams to everything outside the engine.
//!
//! The item store is the source of truth; the delay queue only carries hints;
//! the publish API, credential store and activity log are external
//! collaborators seen at their boundary.

pub mod activity_log;
pub mod clock;
pub mod credential_store;
pub mod delay_queue;
pub mod id_generator;
pub mod item_store;
pub mod publish_api;

pub use self::activity_log::ActivityLog;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::credential_store::CredentialStore;
pub use self::delay_queue::DelayQueue;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::item_store::ItemStore;
pub use self::publish_api::{Credentials, Lookup, PublishApi, PublishRequest};
