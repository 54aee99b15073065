//! crates/pact_engine_core/src/schedule.rs
//!
//! Due-date resolution: whether a pact asks a participant for a check-in on a date.

use chrono::{Datelike, NaiveDate, Weekday};
use uuid::Uuid;

use crate::domain::{Cadence, Frequency, Pact};

/// Whether `pact` is due for `participant` on `date`.
///
/// Relay assignments take precedence over the frequency. A relay participant
/// without an assignment is never due, and neither is anyone on a pact whose
/// stored schedule is unreadable.
pub fn is_due(pact: &Pact, participant: Uuid, date: NaiveDate) -> bool {
    cadence_is_due(&pact.cadence, participant, date)
}

pub fn cadence_is_due(cadence: &Cadence, participant: Uuid, date: NaiveDate) -> bool {
    let weekday = date.weekday();
    match cadence {
        Cadence::Relay { assignments, .. } => assignments
            .get(&participant)
            .map(|days| days.contains(weekday))
            .unwrap_or(false),
        Cadence::Standard(Frequency::Daily) => true,
        Cadence::Standard(Frequency::Weekly) => weekday == Weekday::Mon,
        Cadence::Standard(Frequency::Custom(days)) => days.contains(weekday),
        Cadence::Unreadable { .. } => false,
    }
}

/// Every date in `from..=through` on which `participant` is due.
pub fn due_dates(
    pact: &Pact,
    participant: Uuid,
    from: NaiveDate,
    through: NaiveDate,
) -> impl Iterator<Item = NaiveDate> + '_ {
    from.iter_days()
        .take_while(move |date| *date <= through)
        .filter(move |date| is_due(pact, participant, *date))
}
