//! crates/pact_engine_core/src/limits.rs
//!
//! Counts a group's active pacts against its subscription tier.

use uuid::Uuid;

use crate::domain::SubscriptionTier;
use crate::error::EngineResult;
use crate::ports::{PactStore, SubscriptionService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PactCeiling {
    Limited(u32),
    Unlimited,
}

impl PactCeiling {
    /// `None` when unlimited.
    pub fn as_option(&self) -> Option<u32> {
        match self {
            PactCeiling::Limited(max) => Some(*max),
            PactCeiling::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PactLimit {
    pub current_count: u32,
    pub max_count: PactCeiling,
    pub can_create: bool,
}

pub fn evaluate_limit(current_count: u32, tier: SubscriptionTier, free_tier_ceiling: u32) -> PactLimit {
    let max_count = match tier {
        SubscriptionTier::Unlimited => PactCeiling::Unlimited,
        SubscriptionTier::Free => PactCeiling::Limited(free_tier_ceiling),
    };
    let can_create = match max_count {
        PactCeiling::Unlimited => true,
        PactCeiling::Limited(max) => current_count < max,
    };
    PactLimit {
        current_count,
        max_count,
        can_create,
    }
}

/// Reports whether the group may create another pact. Does not itself block anything.
pub async fn can_create_pact(
    store: &dyn PactStore,
    subscriptions: &dyn SubscriptionService,
    group_id: Uuid,
    free_tier_ceiling: u32,
) -> EngineResult<PactLimit> {
    let current_count = store.count_active_pacts(group_id).await?;
    let tier = subscriptions.tier_for_group(group_id).await?;
    Ok(evaluate_limit(current_count, tier, free_tier_ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PactStatus;
    use crate::testing::{daily_pact, FixedTier, MemoryStore};

    fn group_with_active_pacts(count: usize) -> (MemoryStore, Uuid) {
        let store = MemoryStore::default();
        let group_id = Uuid::new_v4();
        for _ in 0..count {
            let (mut pact, _) = daily_pact(1);
            pact.group_id = group_id;
            store.put_pact(pact);
        }
        (store, group_id)
    }

    #[tokio::test]
    async fn test_free_tier_at_ceiling() {
        let (store, group_id) = group_with_active_pacts(3);
        let limit = can_create_pact(&store, &FixedTier(SubscriptionTier::Free), group_id, 3)
            .await
            .unwrap();
        assert_eq!(
            limit,
            PactLimit {
                current_count: 3,
                max_count: PactCeiling::Limited(3),
                can_create: false,
            }
        );
    }

    #[tokio::test]
    async fn test_unlimited_tier() {
        let (store, group_id) = group_with_active_pacts(3);
        let limit = can_create_pact(&store, &FixedTier(SubscriptionTier::Unlimited), group_id, 3)
            .await
            .unwrap();
        assert!(limit.can_create);
        assert_eq!(limit.max_count, PactCeiling::Unlimited);
        assert_eq!(limit.max_count.as_option(), None);
    }

    #[tokio::test]
    async fn test_archived_pacts_do_not_count() {
        let (store, group_id) = group_with_active_pacts(2);
        let (mut archived, _) = daily_pact(1);
        archived.group_id = group_id;
        archived.status = PactStatus::Archived;
        store.put_pact(archived);

        let limit = can_create_pact(&store, &FixedTier(SubscriptionTier::Free), group_id, 3)
            .await
            .unwrap();
        assert_eq!(limit.current_count, 2);
        assert!(limit.can_create);
    }
}
