//! App - the engine's components, composed from ports.
//!
//! # Components
//! - **PublicationEngine**: wiring plus the shared claim -> publish path
//! - **Enqueuer**: one live delay-queue job per scheduled item
//! - **ClaimGuard**: the conditional `scheduled -> publishing` transition
//! - **Publisher**: the external call and the resulting status move
//! - **QueueConsumer**: sweep over due jobs
//! - **FallbackScanner**: sweep over due items, independent of the queue
//! - **Reconciler**: resolution of ambiguous and abandoned claims
//! - **Introspection**: queue stats plus operator-gated administration
//! - **TriggerGateway**: authenticated entry points

pub mod claim;
pub mod consumer;
pub mod engine;
pub mod enqueuer;
pub mod introspection;
pub mod publisher;
pub mod reconciler;
pub mod scanner;
pub mod triggers;

pub use self::claim::ClaimGuard;
pub use self::consumer::QueueConsumer;
pub use self::engine::{BuildError, EngineBuilder, EngineSettings, PublicationEngine};
pub use self::enqueuer::Enqueuer;
pub use self::introspection::{Introspection, Operator, Page};
pub use self::publisher::Publisher;
pub use self::reconciler::Reconciler;
pub use self::scanner::{FallbackScanner, ScanScope};
pub use self::triggers::{PeriodicReport, Session, TriggerGateway};
