//! IdGenerator port.
//!
//! Ids are minted on whichever process runs a sweep, so they must be unique
//! without coordination. ULIDs take their timestamp from the injected clock,
//! which keeps ids ordered consistently with `FixedClock` in tests.

use crate::domain::ids::{ActivityId, ItemId, JobId};
use crate::ports::Clock;
use ulid::Ulid;

/// Mints ids for items, jobs and activity records.
///
/// # ULID properties
/// - sortable by creation time
/// - safe to generate on several processes without coordination
/// - 128-bit, the same size as a UUID
///
/// # Thread Safety
/// - `Send + Sync` is required; one generator is shared by every sweep.
pub trait IdGenerator: Send + Sync {
    /// Id for a newly created draft.
    fn generate_item_id(&self) -> ItemId;

    /// Id for a delay-queue job. Every schedule or re-create gets a new one.
    fn generate_job_id(&self) -> JobId;

    /// Id for an activity record.
    fn generate_activity_id(&self) -> ActivityId;
}

/// ULID-based generator.
///
/// The timestamp part comes from the clock, so a `FixedClock` in tests yields
/// ids with a predictable timestamp and only the random part differs.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    /// Create a generator reading time from `clock`.
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Clock timestamp (clamped at the epoch) plus 80 random bits.
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_item_id(&self) -> ItemId {
        ItemId::from(self.next_ulid())
    }

    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_activity_id(&self) -> ActivityId {
        ActivityId::from(self.next_ulid())
    }
}
