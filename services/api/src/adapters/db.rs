//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store, roast-thread, subscription and identity ports from the `core` crate.
//! It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use pact_engine_core::domain::{
    Cadence, CheckIn, CheckInStatus, NewPact, Pact, PactStatus, Participant, RoastThread,
    RoastThreadStatus, ScheduleSpec, SubscriptionTier,
};
use pact_engine_core::ports::{
    IdentityService, PactStore, PortError, PortResult, RoastThreadService, SubscriptionService,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the engine's persistence-backed ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PactRecord {
    id: Uuid,
    group_id: Uuid,
    name: String,
    frequency: String,
    frequency_days: Option<Vec<i16>>,
    pact_type: String,
    relay_days: Option<Json<BTreeMap<Uuid, Vec<i16>>>>,
    status: String,
    created_on: NaiveDate,
    utc_offset_minutes: i32,
}
impl PactRecord {
    fn to_domain(self, participants: Vec<Participant>) -> PortResult<Pact> {
        let spec = ScheduleSpec {
            frequency: self.frequency,
            frequency_days: self.frequency_days,
            pact_type: self.pact_type,
            relay_days: self.relay_days.map(|Json(days)| days),
        };
        let cadence = Cadence::from_stored(&spec);
        if let Cadence::Unreadable { reason, .. } = &cadence {
            warn!("Pact {} has an unreadable schedule and is never due: {}", self.id, reason);
        }
        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            PortError::InvalidRecord(format!(
                "pact {} has utc offset {} minutes",
                self.id, self.utc_offset_minutes
            ))
        })?;
        Ok(Pact {
            id: self.id,
            group_id: self.group_id,
            name: self.name,
            cadence,
            status: parse_pact_status(&self.status)?,
            participants,
            created_on: self.created_on,
            utc_offset,
        })
    }
}

#[derive(FromRow)]
struct ParticipantRecord {
    user_id: Uuid,
    display_name: String,
}
impl ParticipantRecord {
    fn to_domain(self) -> Participant {
        Participant {
            user_id: self.user_id,
            display_name: self.display_name,
        }
    }
}

#[derive(FromRow)]
struct CheckInRecord {
    id: Uuid,
    pact_id: Uuid,
    user_id: Uuid,
    status: String,
    check_in_date: NaiveDate,
    excuse: Option<String>,
    proof_reference: Option<String>,
    is_late: bool,
    was_due: bool,
    created_at: DateTime<Utc>,
}
impl CheckInRecord {
    fn to_domain(self) -> PortResult<CheckIn> {
        let status = match self.status.as_str() {
            "success" => CheckInStatus::Success,
            "fold" => CheckInStatus::Fold,
            other => {
                return Err(PortError::InvalidRecord(format!(
                    "check-in {} has unknown status '{}'",
                    self.id, other
                )))
            }
        };
        Ok(CheckIn {
            id: self.id,
            pact_id: self.pact_id,
            user_id: self.user_id,
            status,
            check_in_date: self.check_in_date,
            excuse: self.excuse,
            proof_reference: self.proof_reference,
            is_late: self.is_late,
            was_due: self.was_due,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct RoastThreadRecord {
    id: Uuid,
    check_in_id: Uuid,
    status: String,
}
impl RoastThreadRecord {
    fn to_domain(self) -> RoastThread {
        RoastThread {
            id: self.id,
            check_in_id: self.check_in_id,
            status: match self.status.as_str() {
                "closed" => RoastThreadStatus::Closed,
                _ => RoastThreadStatus::Open,
            },
        }
    }
}

fn parse_pact_status(raw: &str) -> PortResult<PactStatus> {
    match raw {
        "active" => Ok(PactStatus::Active),
        "archived" => Ok(PactStatus::Archived),
        other => Err(PortError::InvalidRecord(format!("unknown pact status '{}'", other))),
    }
}

const CHECK_IN_COLUMNS: &str = "id, pact_id, user_id, status, check_in_date, excuse, \
     proof_reference, is_late, was_due, created_at";

//=========================================================================================
// `PactStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PactStore for DbAdapter {
    async fn get_pact(&self, pact_id: Uuid) -> PortResult<Pact> {
        let record = sqlx::query_as::<_, PactRecord>(
            "SELECT id, group_id, name, frequency, frequency_days, pact_type, relay_days, status, \
             created_on, utc_offset_minutes FROM pacts WHERE id = $1",
        )
        .bind(pact_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Pact {} not found", pact_id)),
            _ => unexpected(e),
        })?;

        let participants = sqlx::query_as::<_, ParticipantRecord>(
            "SELECT user_id, display_name FROM pact_participants WHERE pact_id = $1 ORDER BY join_order ASC",
        )
        .bind(pact_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(|r| r.to_domain())
        .collect();

        record.to_domain(participants)
    }

    async fn create_pact(&self, pact: NewPact) -> PortResult<Pact> {
        let spec = pact.cadence.to_spec();
        let pact_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO pacts (id, group_id, name, frequency, frequency_days, pact_type, relay_days, \
             status, created_on, utc_offset_minutes) VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $9)",
        )
        .bind(pact_id)
        .bind(pact.group_id)
        .bind(&pact.name)
        .bind(&spec.frequency)
        .bind(&spec.frequency_days)
        .bind(&spec.pact_type)
        .bind(spec.relay_days.map(Json))
        .bind(pact.created_on)
        .bind(pact.utc_offset.local_minus_utc() / 60)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        // One insert per member keeps `join_order` in the submitted order.
        for participant in &pact.participants {
            sqlx::query(
                "INSERT INTO pact_participants (pact_id, user_id, display_name) VALUES ($1, $2, $3)",
            )
            .bind(pact_id)
            .bind(participant.user_id)
            .bind(&participant.display_name)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;

        Ok(Pact {
            id: pact_id,
            group_id: pact.group_id,
            name: pact.name,
            cadence: pact.cadence,
            status: PactStatus::Active,
            participants: pact.participants,
            created_on: pact.created_on,
            utc_offset: pact.utc_offset,
        })
    }

    async fn set_pact_status(&self, pact_id: Uuid, status: PactStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE pacts SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(pact_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Pact {} not found", pact_id)));
        }
        Ok(())
    }

    async fn count_active_pacts(&self, group_id: Uuid) -> PortResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pacts WHERE group_id = $1 AND status = 'active'",
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count as u32)
    }

    async fn insert_check_in(&self, check_in: CheckIn) -> PortResult<Option<CheckIn>> {
        // The unique (pact_id, user_id, check_in_date) constraint settles races.
        let sql = format!(
            "INSERT INTO check_ins ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (pact_id, user_id, check_in_date) DO NOTHING RETURNING {cols}",
            cols = CHECK_IN_COLUMNS
        );
        let record = sqlx::query_as::<_, CheckInRecord>(&sql)
            .bind(check_in.id)
            .bind(check_in.pact_id)
            .bind(check_in.user_id)
            .bind(check_in.status.as_str())
            .bind(check_in.check_in_date)
            .bind(&check_in.excuse)
            .bind(&check_in.proof_reference)
            .bind(check_in.is_late)
            .bind(check_in.was_due)
            .bind(check_in.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        record.map(|r| r.to_domain()).transpose()
    }

    async fn get_check_ins_for_pact(&self, pact_id: Uuid) -> PortResult<Vec<CheckIn>> {
        let sql = format!(
            "SELECT {} FROM check_ins WHERE pact_id = $1 ORDER BY check_in_date ASC, created_at ASC",
            CHECK_IN_COLUMNS
        );
        let records = sqlx::query_as::<_, CheckInRecord>(&sql)
            .bind(pact_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// Collaborator Ports backed by the same database
//=========================================================================================

#[async_trait]
impl RoastThreadService for DbAdapter {
    async fn create_thread(&self, check_in_id: Uuid) -> PortResult<RoastThread> {
        sqlx::query(
            "INSERT INTO roast_threads (id, check_in_id, status) VALUES ($1, $2, 'open') \
             ON CONFLICT (check_in_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(check_in_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let record = sqlx::query_as::<_, RoastThreadRecord>(
            "SELECT id, check_in_id, status FROM roast_threads WHERE check_in_id = $1",
        )
        .bind(check_in_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl SubscriptionService for DbAdapter {
    async fn tier_for_group(&self, group_id: Uuid) -> PortResult<SubscriptionTier> {
        let tier: Option<String> =
            sqlx::query_scalar("SELECT tier FROM group_subscriptions WHERE group_id = $1")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;

        // Groups without a subscription row are on the free tier.
        Ok(match tier.as_deref() {
            Some("unlimited") => SubscriptionTier::Unlimited,
            _ => SubscriptionTier::Free,
        })
    }
}

#[async_trait]
impl IdentityService for DbAdapter {
    async fn resolve_session(&self, token: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        user_id.ok_or(PortError::Unauthorized)
    }
}
