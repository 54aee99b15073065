//! crates/pact_engine_core/src/lifecycle.rs
//!
//! Pact creation (behind the limit gate), due lookups and archiving.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Cadence, NewPact, Pact, PactStatus, Participant, ScheduleSpec};
use crate::error::{EngineError, EngineResult};
use crate::limits::{can_create_pact, PactCeiling};
use crate::ports::{PactStore, PortError, SubscriptionService};
use crate::schedule;

/// Loads a pact, translating store errors into the engine taxonomy.
pub async fn load_pact(store: &dyn PactStore, pact_id: Uuid) -> EngineResult<Pact> {
    store.get_pact(pact_id).await.map_err(|e| match e {
        PortError::NotFound(_) => EngineError::PactNotFound(pact_id),
        PortError::InvalidRecord(reason) => EngineError::InvalidPactConfiguration(reason),
        other => EngineError::PersistenceFailure(other),
    })
}

pub const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Validates a pact about to be created. `created_on` is the date of `now`
/// in the pact's own offset.
pub fn validate_new_pact(
    group_id: Uuid,
    name: &str,
    spec: &ScheduleSpec,
    participants: Vec<Participant>,
    utc_offset_minutes: i32,
    now: DateTime<Utc>,
) -> EngineResult<NewPact> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidPactConfiguration(
            "pact name must not be empty".to_string(),
        ));
    }
    if participants.is_empty() {
        return Err(EngineError::InvalidPactConfiguration(
            "a pact needs at least one participant".to_string(),
        ));
    }
    let ids: Vec<Uuid> = participants.iter().map(|p| p.user_id).collect();
    let mut seen = HashSet::new();
    if let Some(duplicate) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(EngineError::InvalidPactConfiguration(format!(
            "participant {} is listed more than once",
            duplicate
        )));
    }
    let utc_offset = Some(utc_offset_minutes)
        .filter(|m| (-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(m))
        .and_then(|m| FixedOffset::east_opt(m * 60))
        .ok_or_else(|| {
            EngineError::InvalidPactConfiguration(format!(
                "utc offset must be within +/-{} minutes",
                MAX_OFFSET_MINUTES
            ))
        })?;
    let cadence = Cadence::from_spec(spec, &ids)?;
    Ok(NewPact {
        group_id,
        name: name.to_string(),
        cadence,
        participants,
        created_on: now.with_timezone(&utc_offset).date_naive(),
        utc_offset,
    })
}

/// Creates a pact if the group's limit allows it.
///
/// The gate is advisory: the count and the insert are separate steps, so
/// concurrent creations near the ceiling can both succeed.
pub async fn create_pact(
    store: &dyn PactStore,
    subscriptions: &dyn SubscriptionService,
    free_tier_ceiling: u32,
    pact: NewPact,
) -> EngineResult<Pact> {
    let limit = can_create_pact(store, subscriptions, pact.group_id, free_tier_ceiling).await?;
    if !limit.can_create {
        let max = match limit.max_count {
            PactCeiling::Limited(max) => max,
            PactCeiling::Unlimited => u32::MAX,
        };
        return Err(EngineError::PactLimitReached {
            current: limit.current_count,
            max,
        });
    }

    let pact = store.create_pact(pact).await?;
    info!("Created pact {} in group {}", pact.id, pact.group_id);
    Ok(pact)
}

/// The answer to "is this pact due for me", resolved on the server's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueVerdict {
    pub date: NaiveDate,
    pub due: bool,
}

/// Resolves whether `pact_id` is due for `caller` on `date`, or on today in
/// the pact's offset when no date is given.
///
/// A pact row that cannot be read resolves as not due instead of failing.
pub async fn due_for(
    store: &dyn PactStore,
    caller: Uuid,
    pact_id: Uuid,
    date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> EngineResult<DueVerdict> {
    match load_pact(store, pact_id).await {
        Ok(pact) if !pact.is_participant(caller) => Err(EngineError::NotParticipant),
        Ok(pact) => {
            let date = date.unwrap_or_else(|| pact.local_date(now));
            Ok(DueVerdict {
                date,
                due: schedule::is_due(&pact, caller, date),
            })
        }
        Err(EngineError::InvalidPactConfiguration(reason)) => {
            warn!("Pact {} could not be read, treating as not due: {}", pact_id, reason);
            Ok(DueVerdict {
                date: date.unwrap_or_else(|| now.date_naive()),
                due: false,
            })
        }
        Err(e) => Err(e),
    }
}

/// Moves an active pact to `archived`. Archiving an archived pact is a no-op.
pub async fn archive_pact(store: &dyn PactStore, caller: Uuid, pact_id: Uuid) -> EngineResult<Pact> {
    let mut pact = load_pact(store, pact_id).await?;
    if !pact.is_participant(caller) {
        return Err(EngineError::NotParticipant);
    }
    if pact.status == PactStatus::Archived {
        return Ok(pact);
    }

    store.set_pact_status(pact_id, PactStatus::Archived).await?;
    pact.status = PactStatus::Archived;
    info!("Archived pact {}", pact_id);
    Ok(pact)
}
