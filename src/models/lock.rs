//! Lock models returned by the backing services.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long a claimed lock stays valid when no duration is given.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30);

/// A lock on a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock<Id> {
    pub item_id: Id,
    pub lock_id: Id,
    pub valid_until: DateTime<Utc>,
}

impl<Id> Lock<Id> {
    pub fn is_valid(&self) -> bool {
        self.valid_until > Utc::now()
    }
}

/// A lock on an item that lives under a master item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveLock<Id> {
    pub master_id: Id,
    pub slave_id: Id,
    pub lock_id: Id,
    pub valid_until: DateTime<Utc>,
}

impl<Id> SlaveLock<Id> {
    pub fn is_valid(&self) -> bool {
        self.valid_until > Utc::now()
    }
}
