//! In-memory fakes of the ports, shared by the unit tests.

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Cadence, CheckIn, Frequency, NewPact, Pact, PactStatus, Participant, RoastRequest,
    SubscriptionTier,
};
use crate::ports::{PactStore, PortError, PortResult, RoastQueue, SubscriptionService};

/// An active daily pact with `members` participants named p0, p1, ...
pub fn daily_pact(members: usize) -> (Pact, Vec<Uuid>) {
    let users: Vec<Uuid> = (0..members).map(|_| Uuid::new_v4()).collect();
    let pact = Pact {
        id: Uuid::new_v4(),
        group_id: Uuid::new_v4(),
        name: "Run every day".to_string(),
        cadence: Cadence::Standard(Frequency::Daily),
        status: PactStatus::Active,
        participants: users
            .iter()
            .enumerate()
            .map(|(i, user_id)| Participant {
                user_id: *user_id,
                display_name: format!("p{}", i),
            })
            .collect(),
        created_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        utc_offset: FixedOffset::east_opt(0).unwrap(),
    };
    (pact, users)
}

#[derive(Default)]
pub struct MemoryStore {
    pacts: Mutex<HashMap<Uuid, Pact>>,
    check_ins: Mutex<Vec<CheckIn>>,
    corrupt: Mutex<HashSet<Uuid>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn with_pact(pact: Pact) -> Self {
        let store = Self::default();
        store.put_pact(pact);
        store
    }

    pub fn put_pact(&self, pact: Pact) {
        self.pacts.lock().unwrap().insert(pact.id, pact);
    }

    pub fn check_in_count(&self) -> usize {
        self.check_ins.lock().unwrap().len()
    }

    /// Makes `get_pact` report the row as unreadable.
    pub fn mark_corrupt(&self, pact_id: Uuid) {
        self.corrupt.lock().unwrap().insert(pact_id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> PortResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PactStore for MemoryStore {
    async fn get_pact(&self, pact_id: Uuid) -> PortResult<Pact> {
        self.ensure_available()?;
        if self.corrupt.lock().unwrap().contains(&pact_id) {
            return Err(PortError::InvalidRecord(format!("pact {} has an unknown status", pact_id)));
        }
        self.pacts
            .lock()
            .unwrap()
            .get(&pact_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Pact {} not found", pact_id)))
    }

    async fn create_pact(&self, pact: NewPact) -> PortResult<Pact> {
        self.ensure_available()?;
        let pact = Pact {
            id: Uuid::new_v4(),
            group_id: pact.group_id,
            name: pact.name,
            cadence: pact.cadence,
            status: PactStatus::Active,
            participants: pact.participants,
            created_on: pact.created_on,
            utc_offset: pact.utc_offset,
        };
        self.put_pact(pact.clone());
        Ok(pact)
    }

    async fn set_pact_status(&self, pact_id: Uuid, status: PactStatus) -> PortResult<()> {
        self.ensure_available()?;
        let mut pacts = self.pacts.lock().unwrap();
        let pact = pacts
            .get_mut(&pact_id)
            .ok_or_else(|| PortError::NotFound(format!("Pact {} not found", pact_id)))?;
        pact.status = status;
        Ok(())
    }

    async fn count_active_pacts(&self, group_id: Uuid) -> PortResult<u32> {
        self.ensure_available()?;
        let pacts = self.pacts.lock().unwrap();
        Ok(pacts
            .values()
            .filter(|p| p.group_id == group_id && p.status == PactStatus::Active)
            .count() as u32)
    }

    async fn insert_check_in(&self, check_in: CheckIn) -> PortResult<Option<CheckIn>> {
        self.ensure_available()?;
        let mut check_ins = self.check_ins.lock().unwrap();
        let exists = check_ins.iter().any(|c| {
            c.pact_id == check_in.pact_id
                && c.user_id == check_in.user_id
                && c.check_in_date == check_in.check_in_date
        });
        if exists {
            return Ok(None);
        }
        check_ins.push(check_in.clone());
        Ok(Some(check_in))
    }

    async fn get_check_ins_for_pact(&self, pact_id: Uuid) -> PortResult<Vec<CheckIn>> {
        self.ensure_available()?;
        let mut found: Vec<CheckIn> = self
            .check_ins
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.pact_id == pact_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.check_in_date);
        Ok(found)
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    requests: Mutex<Vec<RoastRequest>>,
    fail: bool,
}

impl RecordingQueue {
    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requests(&self) -> Vec<RoastRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl RoastQueue for RecordingQueue {
    fn enqueue(&self, request: RoastRequest) -> PortResult<()> {
        if self.fail {
            return Err(PortError::Unexpected("queue closed".to_string()));
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

pub struct FixedTier(pub SubscriptionTier);

#[async_trait]
impl SubscriptionService for FixedTier {
    async fn tier_for_group(&self, _group_id: Uuid) -> PortResult<SubscriptionTier> {
        Ok(self.0)
    }
}
