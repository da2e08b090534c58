//! Domain identifiers (strongly-typed IDs).
//!
//! Generated ids are ULIDs: sortable by creation time and safe to mint on
//! several processes without coordination. `Id<T>` carries a zero-sized marker
//! so an `ItemId` can never be passed where a `JobId` is expected.
//!
//! Owner and external ids are opaque strings handed to us by collaborators, so
//! they are plain newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for id kinds.
///
/// Each kind supplies the prefix used by `Display` ("item-", "job-", "act-").
pub trait IdMarker: Send + Sync + 'static {
    /// Display prefix, e.g. "item-".
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id. Serialized as the bare ULID string.
///
/// `T` lives in a `PhantomData`, so it costs no memory at runtime but keeps
/// id kinds apart at compile time.
///
/// # Example
/// ```ignore
/// let item_id: ItemId = Id::from(Ulid::new());
/// let job_id: JobId = Id::from(Ulid::new());
/// // item_id and job_id are different types and cannot be mixed up
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Wrap an existing ULID. New ids should come from an `IdGenerator`.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// The underlying ULID (its timestamp part is the creation time).
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Storage form: the bare ULID string, no prefix.
    ///
    /// This is what the SQLite tables store and what serde emits.
    pub fn to_key(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the display form (`item-01H…`) and the bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

/// Marker for [`ItemId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

/// Marker for [`JobId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Marker for [`ActivityId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Activity {}

impl IdMarker for Activity {
    fn prefix() -> &'static str {
        "act-"
    }
}

/// Identifier of a schedulable item (owned by the item store).
pub type ItemId = Id<Item>;

/// Identifier of a delay-queue job.
pub type JobId = Id<Job>;

/// Identifier of an activity (audit) record.
pub type ActivityId = Id<Activity>;

/// The user that owns an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap the owner id as issued by the account system.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier returned by the external publishing API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Wrap the post id the publishing service returned.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
