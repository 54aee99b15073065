//! crates/pact_engine_core/src/recorder.rs
//!
//! Records one check-in per pact, participant and day, and requests a roast
//! thread when the outcome is a fold.

use chrono::{DateTime, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{CheckIn, CheckInStatus, PactStatus, RoastRequest};
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::load_pact;
use crate::ports::{PactStore, RoastQueue};
use crate::schedule;

/// Tunables for how submissions are recorded.
#[derive(Debug, Clone, Default)]
pub struct CheckInPolicy {
    /// Submissions at or after this local time are flagged late.
    pub late_after: Option<NaiveTime>,
}

/// A check-in submission. The due date is derived from `submitted_at` in the
/// pact's own offset; callers have no say in which day it lands on.
#[derive(Debug, Clone)]
pub struct CheckInRequest {
    pub pact_id: Uuid,
    /// The authenticated caller, if any.
    pub caller: Option<Uuid>,
    pub status: CheckInStatus,
    pub excuse: Option<String>,
    pub proof_reference: Option<String>,
    /// Server clock at submission.
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordedCheckIn {
    pub check_in: CheckIn,
    /// Whether the pact was due for the caller today. Early check-ins are kept.
    pub due: bool,
}

#[derive(Clone)]
pub struct CheckInRecorder {
    store: Arc<dyn PactStore>,
    roasts: Arc<dyn RoastQueue>,
    policy: CheckInPolicy,
}

impl CheckInRecorder {
    pub fn new(store: Arc<dyn PactStore>, roasts: Arc<dyn RoastQueue>, policy: CheckInPolicy) -> Self {
        Self {
            store,
            roasts,
            policy,
        }
    }

    pub async fn record_check_in(&self, request: CheckInRequest) -> EngineResult<RecordedCheckIn> {
        let user_id = request.caller.ok_or(EngineError::Unauthenticated)?;

        let pact = load_pact(self.store.as_ref(), request.pact_id).await?;
        if pact.status == PactStatus::Archived {
            return Err(EngineError::PactArchived);
        }
        if !pact.is_participant(user_id) {
            return Err(EngineError::NotParticipant);
        }

        let local = request.submitted_at.with_timezone(&pact.utc_offset);
        let today = local.date_naive();
        let due = schedule::is_due(&pact, user_id, today);

        let excuse = match request.status {
            CheckInStatus::Fold => normalize_excuse(request.excuse),
            CheckInStatus::Success => None,
        };
        let is_late = self
            .policy
            .late_after
            .map(|cutoff| local.time() >= cutoff)
            .unwrap_or(false);

        let candidate = CheckIn {
            id: Uuid::new_v4(),
            pact_id: pact.id,
            user_id,
            status: request.status,
            check_in_date: today,
            excuse,
            proof_reference: request.proof_reference,
            is_late,
            was_due: due,
            created_at: request.submitted_at,
        };

        let check_in = self
            .store
            .insert_check_in(candidate)
            .await?
            .ok_or(EngineError::AlreadyCheckedIn)?;

        info!(
            "Recorded {} check-in {} for pact {} on {} (due: {})",
            check_in.status, check_in.id, check_in.pact_id, check_in.check_in_date, due
        );

        if check_in.status == CheckInStatus::Fold {
            self.request_roast(&check_in);
        }

        Ok(RecordedCheckIn { check_in, due })
    }

    /// Fire-and-forget: a failure here never fails the check-in.
    fn request_roast(&self, check_in: &CheckIn) {
        let request = RoastRequest {
            check_in_id: check_in.id,
            pact_id: check_in.pact_id,
            user_id: check_in.user_id,
        };
        if let Err(e) = self.roasts.enqueue(request) {
            let err = EngineError::SideEffectFailure(e.to_string());
            warn!("Roast thread for check-in {} not requested: {}", check_in.id, err);
        }
    }
}

fn normalize_excuse(excuse: Option<String>) -> Option<String> {
    excuse
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cadence, Frequency, ScheduleSpec};
    use crate::testing::{daily_pact, MemoryStore, RecordingQueue};
    use chrono::{FixedOffset, NaiveDate};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn request(pact_id: Uuid, user: Uuid, status: CheckInStatus) -> CheckInRequest {
        CheckInRequest {
            pact_id,
            caller: Some(user),
            status,
            excuse: None,
            proof_reference: None,
            submitted_at: at("2024-03-04T09:00:00+00:00"),
        }
    }

    fn recorder(store: &Arc<MemoryStore>, queue: &Arc<RecordingQueue>) -> CheckInRecorder {
        CheckInRecorder::new(store.clone(), queue.clone(), CheckInPolicy::default())
    }

    #[tokio::test]
    async fn test_success_is_recorded_without_roast() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let recorded = recorder(&store, &queue)
            .record_check_in(request(pact.id, users[0], CheckInStatus::Success))
            .await
            .unwrap();

        assert!(recorded.due);
        assert_eq!(recorded.check_in.check_in_date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(store.check_in_count(), 1);
        assert!(queue.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fold_requests_exactly_one_roast() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let mut req = request(pact.id, users[0], CheckInStatus::Fold);
        req.excuse = Some("  overslept \n".to_string());
        let recorded = recorder(&store, &queue).record_check_in(req).await.unwrap();

        assert_eq!(recorded.check_in.excuse.as_deref(), Some("overslept"));
        let requests = queue.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].check_in_id, recorded.check_in.id);
    }

    #[tokio::test]
    async fn test_duplicate_same_day_is_rejected() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());
        let recorder = recorder(&store, &queue);

        recorder
            .record_check_in(request(pact.id, users[0], CheckInStatus::Success))
            .await
            .unwrap();
        let mut again = request(pact.id, users[0], CheckInStatus::Fold);
        again.submitted_at = at("2024-03-04T21:00:00+00:00");
        let err = recorder.record_check_in(again).await.unwrap_err();

        assert!(matches!(err, EngineError::AlreadyCheckedIn));
        assert_eq!(store.check_in_count(), 1);
        assert!(queue.requests().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_yield_one_record() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());
        let recorder = recorder(&store, &queue);

        let (a, b) = futures::future::join(
            recorder.record_check_in(request(pact.id, users[0], CheckInStatus::Success)),
            recorder.record_check_in(request(pact.id, users[0], CheckInStatus::Fold)),
        )
        .await;

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(EngineError::AlreadyCheckedIn)))
                .count(),
            1
        );
        assert_eq!(store.check_in_count(), 1);
    }

    #[tokio::test]
    async fn test_roast_queue_failure_does_not_fail_check_in() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::failing());

        let recorded = recorder(&store, &queue)
            .record_check_in(request(pact.id, users[0], CheckInStatus::Fold))
            .await;

        assert!(recorded.is_ok());
        assert_eq!(store.check_in_count(), 1);
    }

    #[tokio::test]
    async fn test_due_date_follows_pact_offset() {
        let (mut pact, users) = daily_pact(1);
        pact.utc_offset = FixedOffset::west_opt(8 * 3600).unwrap();
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let mut req = request(pact.id, users[0], CheckInStatus::Success);
        req.submitted_at = at("2024-03-04T23:30:00-08:00");
        let recorded = recorder(&store, &queue).record_check_in(req).await.unwrap();

        assert_eq!(recorded.check_in.check_in_date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[tokio::test]
    async fn test_early_check_in_is_kept_and_flagged() {
        let (mut pact, users) = daily_pact(1);
        pact.cadence = Cadence::Standard(Frequency::Weekly);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let mut req = request(pact.id, users[0], CheckInStatus::Success);
        req.submitted_at = at("2024-03-05T09:00:00+00:00");
        let recorded = recorder(&store, &queue).record_check_in(req).await.unwrap();

        assert!(!recorded.due);
        assert!(!recorded.check_in.was_due);
        assert_eq!(store.check_in_count(), 1);
    }

    #[tokio::test]
    async fn test_late_after_cutoff() {
        let (mut pact, users) = daily_pact(1);
        pact.utc_offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());
        let policy = CheckInPolicy {
            late_after: NaiveTime::from_hms_opt(21, 0, 0),
        };
        let recorder = CheckInRecorder::new(store.clone(), queue.clone(), policy);

        let mut req = request(pact.id, users[0], CheckInStatus::Success);
        req.submitted_at = at("2024-03-04T22:15:00+02:00");
        let recorded = recorder.record_check_in(req).await.unwrap();
        assert!(recorded.check_in.is_late);

        // 20:15 on the pact's clock is on time.
        let mut req = request(pact.id, users[0], CheckInStatus::Success);
        req.submitted_at = at("2024-03-05T18:15:00+00:00");
        let recorded = recorder.record_check_in(req).await.unwrap();
        assert!(!recorded.check_in.is_late);
    }

    #[tokio::test]
    async fn test_same_instant_from_any_offset_yields_one_record() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());
        let recorder = recorder(&store, &queue);

        let mut outcomes = Vec::new();
        for instant in [
            "2024-03-03T22:00:00-14:00",
            "2024-03-04T12:00:00+00:00",
            "2024-03-05T02:00:00+14:00",
        ] {
            let mut req = request(pact.id, users[0], CheckInStatus::Success);
            req.submitted_at = at(instant);
            outcomes.push(recorder.record_check_in(req).await);
        }

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(EngineError::AlreadyCheckedIn)))
                .count(),
            2
        );
        let stored = store.get_check_ins_for_pact(pact.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].check_in_date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[tokio::test]
    async fn test_relay_participant_without_assignment_is_recorded_not_due() {
        let (mut pact, users) = daily_pact(2);
        let spec = ScheduleSpec {
            frequency: "daily".to_string(),
            frequency_days: None,
            pact_type: "relay".to_string(),
            relay_days: Some([(users[0], vec![1i16])].into_iter().collect()),
        };
        pact.cadence = Cadence::from_stored(&spec);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let recorded = recorder(&store, &queue)
            .record_check_in(request(pact.id, users[1], CheckInStatus::Fold))
            .await
            .unwrap();

        assert!(!recorded.due);
        assert!(!recorded.check_in.was_due);
        assert_eq!(queue.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_schedule_still_records_check_in() {
        let (mut pact, users) = daily_pact(1);
        pact.cadence = Cadence::from_stored(&ScheduleSpec {
            frequency: "custom".to_string(),
            frequency_days: Some(vec![]),
            pact_type: "standard".to_string(),
            relay_days: None,
        });
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let recorded = recorder(&store, &queue)
            .record_check_in(request(pact.id, users[0], CheckInStatus::Success))
            .await
            .unwrap();

        assert!(!recorded.due);
        assert_eq!(store.check_in_count(), 1);
    }

    #[tokio::test]
    async fn test_success_drops_excuse() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());

        let mut req = request(pact.id, users[0], CheckInStatus::Success);
        req.excuse = Some("n/a".to_string());
        req.proof_reference = Some("proofs/abc.jpg".to_string());
        let recorded = recorder(&store, &queue).record_check_in(req).await.unwrap();

        assert_eq!(recorded.check_in.excuse, None);
        assert_eq!(recorded.check_in.proof_reference.as_deref(), Some("proofs/abc.jpg"));
    }

    #[tokio::test]
    async fn test_rejections() {
        let (mut pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        let queue = Arc::new(RecordingQueue::default());
        let recorder = recorder(&store, &queue);

        let mut anonymous = request(pact.id, users[0], CheckInStatus::Success);
        anonymous.caller = None;
        assert!(matches!(
            recorder.record_check_in(anonymous).await,
            Err(EngineError::Unauthenticated)
        ));

        let outsider = request(pact.id, Uuid::new_v4(), CheckInStatus::Success);
        assert!(matches!(
            recorder.record_check_in(outsider).await,
            Err(EngineError::NotParticipant)
        ));

        let missing = request(Uuid::new_v4(), users[0], CheckInStatus::Success);
        assert!(matches!(
            recorder.record_check_in(missing).await,
            Err(EngineError::PactNotFound(_))
        ));

        pact.status = PactStatus::Archived;
        store.put_pact(pact.clone());
        assert!(matches!(
            recorder
                .record_check_in(request(pact.id, users[0], CheckInStatus::Success))
                .await,
            Err(EngineError::PactArchived)
        ));
        assert_eq!(store.check_in_count(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_is_a_persistence_failure() {
        let (pact, users) = daily_pact(1);
        let store = Arc::new(MemoryStore::with_pact(pact.clone()));
        store.set_unavailable(true);
        let queue = Arc::new(RecordingQueue::default());

        let err = recorder(&store, &queue)
            .record_check_in(request(pact.id, users[0], CheckInStatus::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PersistenceFailure(_)));
    }
}
