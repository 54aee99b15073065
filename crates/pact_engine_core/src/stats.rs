//! crates/pact_engine_core/src/stats.rs
//!
//! Derives per-participant streaks and completion rates from the check-in history.
//! Everything here is a pure read-side computation; nothing is persisted.

use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{CheckIn, CheckInStatus, Pact, Participant};
use crate::schedule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantStats {
    pub user_id: Uuid,
    pub display_name: String,
    /// 0..=100, rounded.
    pub completion_rate: u8,
    pub total_check_ins: u32,
    pub success_count: u32,
    pub fold_count: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PactStats {
    pub pact_id: Uuid,
    pub overall_completion_rate: u8,
    pub total_check_ins: u32,
    /// In the pact's participant order.
    pub participants: Vec<ParticipantStats>,
}

/// How days without a check-in are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedDayPolicy {
    /// Only recorded check-ins count; gaps neither extend nor break a streak.
    #[default]
    Ignore,
    /// A due date up to and including `through` with no check-in counts as a fold.
    CountAsFold { through: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsPolicy {
    /// Whether check-ins made on non-due days count.
    pub include_unscheduled: bool,
    pub missed_days: MissedDayPolicy,
}

impl Default for StatsPolicy {
    fn default() -> Self {
        Self {
            include_unscheduled: true,
            missed_days: MissedDayPolicy::Ignore,
        }
    }
}

/// Computes stats over recorded check-ins only.
pub fn compute_stats(pact: &Pact, check_ins: &[CheckIn]) -> PactStats {
    compute_stats_with(pact, check_ins, &StatsPolicy::default())
}

pub fn compute_stats_with(pact: &Pact, check_ins: &[CheckIn], policy: &StatsPolicy) -> PactStats {
    let participants: Vec<ParticipantStats> = pact
        .participants
        .iter()
        .map(|participant| {
            let history = participant_history(pact, participant.user_id, check_ins, policy);
            ParticipantStats::from_history(participant, &history)
        })
        .collect();

    let successes: u32 = participants.iter().map(|p| p.success_count).sum();
    let total_check_ins: u32 = participants.iter().map(|p| p.total_check_ins).sum();

    PactStats {
        pact_id: pact.id,
        overall_completion_rate: percent(successes, total_check_ins),
        total_check_ins,
        participants,
    }
}

/// The participant's outcomes in ascending date order.
fn participant_history(
    pact: &Pact,
    user_id: Uuid,
    check_ins: &[CheckIn],
    policy: &StatsPolicy,
) -> Vec<CheckInStatus> {
    let mut dated: Vec<(NaiveDate, CheckInStatus)> = check_ins
        .iter()
        .filter(|c| c.pact_id == pact.id && c.user_id == user_id)
        .filter(|c| policy.include_unscheduled || c.was_due)
        .map(|c| (c.check_in_date, c.status))
        .collect();

    if let MissedDayPolicy::CountAsFold { through } = policy.missed_days {
        // Recorded dates are looked up regardless of the unscheduled filter.
        let recorded: HashSet<NaiveDate> = check_ins
            .iter()
            .filter(|c| c.pact_id == pact.id && c.user_id == user_id)
            .map(|c| c.check_in_date)
            .collect();
        dated.extend(
            schedule::due_dates(pact, user_id, pact.created_on, through)
                .filter(|date| !recorded.contains(date))
                .map(|date| (date, CheckInStatus::Fold)),
        );
    }

    dated.sort_by_key(|(date, _)| *date);
    dated.into_iter().map(|(_, status)| status).collect()
}

impl ParticipantStats {
    fn from_history(participant: &Participant, history: &[CheckInStatus]) -> Self {
        let success_count = history.iter().filter(|s| **s == CheckInStatus::Success).count() as u32;
        let fold_count = history.len() as u32 - success_count;
        let (current_streak, longest_streak) = streaks(history);

        Self {
            user_id: participant.user_id,
            display_name: participant.display_name.clone(),
            completion_rate: percent(success_count, success_count + fold_count),
            total_check_ins: success_count + fold_count,
            success_count,
            fold_count,
            current_streak,
            longest_streak,
        }
    }
}

/// (current, longest) runs of consecutive successes in an ascending history.
pub fn streaks(history: &[CheckInStatus]) -> (u32, u32) {
    let current = history
        .iter()
        .rev()
        .take_while(|s| **s == CheckInStatus::Success)
        .count() as u32;

    let mut longest = 0;
    let mut running = 0;
    for status in history {
        match status {
            CheckInStatus::Success => {
                running += 1;
                longest = longest.max(running);
            }
            CheckInStatus::Fold => running = 0,
        }
    }
    (current, longest)
}

fn percent(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) / f64::from(whole) * 100.0).round() as u8
}
