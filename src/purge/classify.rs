use chrono::{DateTime, Utc};

use super::Message;

/// Age ceiling, in days, above which the platform refuses bulk deletion.
pub const BULK_DELETE_MAX_AGE_DAYS: u32 = 14;

/// A batch split by deletion path. Both lists keep the batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub bulk_eligible: Vec<String>,
    pub individual: Vec<String>,
}

/// Split a batch into bulk-eligible ids (`now - timestamp < max_age`) and ids
/// that must be deleted one at a time.
///
/// Ages are measured against `now`, not against when the batch was fetched.
pub fn classify(batch: &[Message], now: DateTime<Utc>, max_age: chrono::Duration) -> Partition {
    let mut partition = Partition::default();

    for message in batch {
        let eligible = message
            .timestamp
            .is_some_and(|created| now.signed_duration_since(created) < max_age);

        if eligible {
            partition.bulk_eligible.push(message.id.clone());
        } else {
            partition.individual.push(message.id.clone());
        }
    }

    partition
}
