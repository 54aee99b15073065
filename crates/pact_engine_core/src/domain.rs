//! crates/pact_engine_core/src/domain.rs
//!
//! Defines the pure, core data structures for the pact engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc, Weekday};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::EngineError;

//=========================================================================================
// Weekdays and Schedules
//=========================================================================================

/// A set of weekdays, indexed 0=Sunday..6=Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    /// Builds a set from stored weekday indices, rejecting anything outside 0..=6.
    pub fn from_indices<I>(indices: I) -> Result<Self, EngineError>
    where
        I: IntoIterator,
        I::Item: Into<i64>,
    {
        let mut bits = 0u8;
        for index in indices {
            let index = index.into();
            if !(0..=6).contains(&index) {
                return Err(EngineError::InvalidPactConfiguration(format!(
                    "weekday index {} is outside 0..=6",
                    index
                )));
            }
            bits |= 1u8 << index;
        }
        Ok(Self(bits))
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The indices in ascending order, as they are stored.
    pub fn indices(&self) -> Vec<i16> {
        (0..7i16).filter(|i| self.0 & (1u8 << *i) != 0).collect()
    }
}

/// How often a standard pact asks for a check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    /// Anchored to Monday regardless of the creation day.
    Weekly,
    /// Never empty; enforced by `Cadence::from_spec`.
    Custom(WeekdaySet),
}

/// The schedule of a pact. Invalid frequency/type combinations cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    Standard(Frequency),
    /// Each participant is due only on their assigned weekdays. The nominal
    /// frequency is kept for display and plays no part in due-date resolution.
    Relay {
        frequency: Frequency,
        assignments: BTreeMap<Uuid, WeekdaySet>,
    },
    /// A stored schedule that could not be read. Never due for anyone; the
    /// raw spec is kept so it round-trips unchanged.
    Unreadable { spec: ScheduleSpec, reason: String },
}

/// The loosely typed schedule as it is stored and submitted by clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub frequency: String,
    pub frequency_days: Option<Vec<i16>>,
    pub pact_type: String,
    pub relay_days: Option<BTreeMap<Uuid, Vec<i16>>>,
}

impl Cadence {
    /// Validates a submitted schedule against the pact invariants.
    ///
    /// `custom` needs a non-empty day set, and a `relay` pact must assign
    /// days to every participant.
    pub fn from_spec(spec: &ScheduleSpec, participants: &[Uuid]) -> Result<Self, EngineError> {
        let cadence = Self::parse(spec)?;
        if let Cadence::Relay { assignments, .. } = &cadence {
            if let Some(missing) = participants.iter().find(|p| !assignments.contains_key(p)) {
                return Err(EngineError::InvalidPactConfiguration(format!(
                    "relay_days has no assignment for participant {}",
                    missing
                )));
            }
        }
        Ok(cadence)
    }

    /// Reads a schedule that is already persisted. Never fails: a relay
    /// participant without an assignment is simply never due, and anything
    /// else that cannot be read becomes `Unreadable`.
    pub fn from_stored(spec: &ScheduleSpec) -> Self {
        Self::parse(spec).unwrap_or_else(|e| Cadence::Unreadable {
            spec: spec.clone(),
            reason: e.to_string(),
        })
    }

    fn parse(spec: &ScheduleSpec) -> Result<Self, EngineError> {
        let frequency = match spec.frequency.as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "custom" => {
                let days = WeekdaySet::from_indices(
                    spec.frequency_days.iter().flatten().copied(),
                )?;
                if days.is_empty() {
                    return Err(EngineError::InvalidPactConfiguration(
                        "custom frequency requires at least one weekday".to_string(),
                    ));
                }
                Frequency::Custom(days)
            }
            other => {
                return Err(EngineError::InvalidPactConfiguration(format!(
                    "unknown frequency '{}'",
                    other
                )))
            }
        };

        match spec.pact_type.as_str() {
            "standard" => Ok(Cadence::Standard(frequency)),
            "relay" => {
                let raw = spec.relay_days.as_ref().ok_or_else(|| {
                    EngineError::InvalidPactConfiguration(
                        "relay pact is missing relay_days".to_string(),
                    )
                })?;
                let mut assignments = BTreeMap::new();
                for (user_id, days) in raw {
                    assignments.insert(*user_id, WeekdaySet::from_indices(days.iter().copied())?);
                }
                Ok(Cadence::Relay {
                    frequency,
                    assignments,
                })
            }
            other => Err(EngineError::InvalidPactConfiguration(format!(
                "unknown pact type '{}'",
                other
            ))),
        }
    }

    /// The inverse of `from_spec`, used when persisting.
    pub fn to_spec(&self) -> ScheduleSpec {
        let (frequency, pact_type, relay_days) = match self {
            Cadence::Unreadable { spec, .. } => return spec.clone(),
            Cadence::Standard(frequency) => (frequency, "standard", None),
            Cadence::Relay {
                frequency,
                assignments,
            } => (
                frequency,
                "relay",
                Some(
                    assignments
                        .iter()
                        .map(|(user_id, days)| (*user_id, days.indices()))
                        .collect(),
                ),
            ),
        };
        let (frequency, frequency_days) = match frequency {
            Frequency::Daily => ("daily", None),
            Frequency::Weekly => ("weekly", None),
            Frequency::Custom(days) => ("custom", Some(days.indices())),
        };
        ScheduleSpec {
            frequency: frequency.to_string(),
            frequency_days,
            pact_type: pact_type.to_string(),
            relay_days,
        }
    }
}

//=========================================================================================
// Pacts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PactStatus {
    Active,
    Archived,
}

impl PactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PactStatus::Active => "active",
            PactStatus::Archived => "archived",
        }
    }
}

/// A member of a pact, in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: Uuid,
    pub display_name: String,
}

/// An accountability commitment among the participants of a group.
#[derive(Debug, Clone)]
pub struct Pact {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub cadence: Cadence,
    pub status: PactStatus,
    pub participants: Vec<Participant>,
    pub created_on: NaiveDate,
    /// The offset whose calendar decides which day a check-in belongs to.
    pub utc_offset: FixedOffset,
}

impl Pact {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// The calendar date of `at` in the pact's own offset.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }
}

/// A pact that has been validated but not yet persisted.
#[derive(Debug, Clone)]
pub struct NewPact {
    pub group_id: Uuid,
    pub name: String,
    pub cadence: Cadence,
    pub participants: Vec<Participant>,
    pub created_on: NaiveDate,
    pub utc_offset: FixedOffset,
}

//=========================================================================================
// Check-ins and Roast Threads
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInStatus {
    Success,
    Fold,
}

impl CheckInStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInStatus::Success => "success",
            CheckInStatus::Fold => "fold",
        }
    }
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded outcome for a pact by a participant on a calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub id: Uuid,
    pub pact_id: Uuid,
    pub user_id: Uuid,
    pub status: CheckInStatus,
    /// The date the check-in satisfies, in the submitter's local calendar.
    pub check_in_date: NaiveDate,
    pub excuse: Option<String>,
    /// Opaque reference to externally stored media; never interpreted.
    pub proof_reference: Option<String>,
    pub is_late: bool,
    /// Whether the pact was due for this participant on `check_in_date`.
    pub was_due: bool,
    pub created_at: DateTime<Utc>,
}

/// The conversation opened in response to a fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoastThread {
    pub id: Uuid,
    pub check_in_id: Uuid,
    pub status: RoastThreadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoastThreadStatus {
    Open,
    Closed,
}

/// A request to open a roast thread for a fold check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoastRequest {
    pub check_in_id: Uuid,
    pub pact_id: Uuid,
    pub user_id: Uuid,
}

//=========================================================================================
// Subscriptions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    /// Grants an unlimited number of active pacts.
    Unlimited,
}
