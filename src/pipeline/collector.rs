// src/pipeline/collector.rs

//! Read-path fan-out that assembles composite player profiles.
//!
//! Every data source is its own spawned branch sharing one deadline. A branch
//! that fails, panics or overruns the deadline contributes nothing; only a
//! complete absence of Steam summaries fails the whole call.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{
    BdSearchResult, MAX_IDS, PlayerBanState, PlayerSummary, Profile, SbBanRecord, ServemeRecord,
    SteamFriend, SteamId,
};
use crate::services::SteamApi;
use crate::storage::Store;

/// Deadline shared by every branch of one collection.
pub const COLLECT_DEADLINE: Duration = Duration::from_secs(10);

struct Branch<T> {
    name: &'static str,
    handle: JoinHandle<Result<T>>,
}

impl<T: Default + Send + 'static> Branch<T> {
    fn spawn<F>(name: &'static str, fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(fut),
        }
    }

    /// Wait for the branch until `deadline`, degrading every failure to empty.
    async fn settle(mut self, deadline: Instant) -> T {
        match tokio::time::timeout_at(deadline, &mut self.handle).await {
            Ok(Ok(Ok(value))) => value,
            Ok(Ok(Err(e))) => {
                log::warn!("Profile branch {} failed: {e}", self.name);
                T::default()
            }
            Ok(Err(e)) => {
                log::error!("Profile branch {} aborted: {e}", self.name);
                T::default()
            }
            Err(_) => {
                self.handle.abort();
                log::warn!("Profile branch {} missed the deadline", self.name);
                T::default()
            }
        }
    }
}

fn group_by<T>(items: Vec<T>, key: impl Fn(&T) -> SteamId) -> HashMap<SteamId, Vec<T>> {
    let mut out: HashMap<SteamId, Vec<T>> = HashMap::new();
    for item in items {
        out.entry(key(&item)).or_default().push(item);
    }
    out
}

/// Unique ids in input order.
fn dedup(ids: &[SteamId]) -> Vec<SteamId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[derive(Clone)]
pub struct ProfileCollector {
    store: Store,
    steam: Arc<dyn SteamApi>,
    deadline: Duration,
}

impl ProfileCollector {
    pub fn new(store: Store, steam: Arc<dyn SteamApi>) -> Self {
        Self {
            store,
            steam,
            deadline: COLLECT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// One profile per distinct input id, in input order.
    pub async fn collect(&self, ids: &[SteamId], cancel: &CancellationToken) -> Result<Vec<Profile>> {
        if ids.len() > MAX_IDS {
            return Err(AppError::TooMany);
        }
        let ids = Arc::new(dedup(ids));
        if ids.is_empty() {
            return Err(AppError::validation("no steam ids"));
        }

        let deadline = Instant::now() + self.deadline;
        let cancel = cancel.child_token();

        let source_bans = {
            let (store, ids) = (self.store.clone(), ids.clone());
            Branch::spawn("sourcebans", async move { store.sb_bans_for(&ids).await })
        };
        let summaries = {
            let (steam, ids, cancel) = (self.steam.clone(), ids.clone(), cancel.clone());
            Branch::spawn("summaries", async move { steam.summaries(&ids, &cancel).await })
        };
        let bans = {
            let (steam, ids, cancel) = (self.steam.clone(), ids.clone(), cancel.clone());
            Branch::spawn("bans", async move { steam.bans(&ids, &cancel).await })
        };
        let friends = {
            let (steam, ids, cancel) = (self.steam.clone(), ids.clone(), cancel.clone());
            Branch::spawn("friends", async move {
                Ok(collect_friends(steam.as_ref(), &ids, &cancel).await)
            })
        };
        let bot_detector = {
            let (store, ids) = (self.store.clone(), ids.clone());
            Branch::spawn("bd", async move { store.bd_search(&ids, &[]).await })
        };
        let serve_me = {
            let (store, ids) = (self.store.clone(), ids.clone());
            Branch::spawn("serveme", async move { store.serveme_for(&ids).await })
        };
        let log_counts = {
            let (store, ids) = (self.store.clone(), ids.clone());
            Branch::spawn("logs", async move { store.log_counts(&ids).await })
        };

        let source_bans: Vec<SbBanRecord> = source_bans.settle(deadline).await;
        let summaries: Vec<PlayerSummary> = summaries.settle(deadline).await;
        let bans: Vec<PlayerBanState> = bans.settle(deadline).await;
        let mut friends: HashMap<SteamId, Vec<SteamFriend>> = friends.settle(deadline).await;
        let bot_detector: Vec<BdSearchResult> = bot_detector.settle(deadline).await;
        let serve_me: Vec<ServemeRecord> = serve_me.settle(deadline).await;
        let log_counts: HashMap<SteamId, i64> = log_counts.settle(deadline).await;
        cancel.cancel();

        if summaries.is_empty() {
            return Err(AppError::NoResults);
        }

        let mut summaries: HashMap<SteamId, PlayerSummary> = summaries
            .into_iter()
            .filter_map(|s| s.steam_id().map(|id| (id, s)))
            .collect();
        let mut bans: HashMap<SteamId, PlayerBanState> = bans
            .into_iter()
            .filter_map(|b| b.steam_id().map(|id| (id, b)))
            .collect();
        let mut source_bans = group_by(source_bans, |b| b.steam_id);
        let mut bot_detector = group_by(bot_detector, |r| r.entry.steam_id);
        let mut serve_me = group_by(serve_me, |r| r.steam_id);

        let profiles = ids
            .iter()
            .map(|&id| Profile {
                steam_id: id,
                summary: summaries.remove(&id).unwrap_or_default(),
                ban_state: bans.remove(&id).unwrap_or_default(),
                source_bans: source_bans.remove(&id).unwrap_or_default(),
                serve_me: serve_me.remove(&id).unwrap_or_default(),
                logs_count: log_counts.get(&id).copied().unwrap_or_default(),
                bot_detector: bot_detector.remove(&id).unwrap_or_default(),
                // No league season source is wired into the read path yet.
                seasons: Vec::new(),
                friends: friends.remove(&id).unwrap_or_default(),
            })
            .collect();
        Ok(profiles)
    }
}

/// Friend lists fetched concurrently; a failed or private list is empty.
async fn collect_friends(
    steam: &dyn SteamApi,
    ids: &[SteamId],
    cancel: &CancellationToken,
) -> HashMap<SteamId, Vec<SteamFriend>> {
    let lookups = ids.iter().map(|&id| async move {
        match steam.friends(id, cancel).await {
            Ok(friends) => (id, friends),
            Err(e) => {
                log::debug!("Friends of {id} unavailable: {e}");
                (id, Vec::new())
            }
        }
    });
    join_all(lookups).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::models::{SbRecord, Site, SteamServer};
    use crate::storage::test_store;

    use super::*;

    #[derive(Default)]
    struct StubSteam {
        fail_friends: bool,
        fail_summaries: bool,
        slow_friends: bool,
    }

    #[async_trait]
    impl SteamApi for StubSteam {
        async fn summaries(
            &self,
            ids: &[SteamId],
            _cancel: &CancellationToken,
        ) -> Result<Vec<PlayerSummary>> {
            if self.fail_summaries {
                return Err(AppError::Timeout("summaries".into()));
            }
            Ok(ids
                .iter()
                .map(|id| PlayerSummary {
                    steamid: id.to_string(),
                    personaname: format!("name-{}", id.account_id()),
                    ..Default::default()
                })
                .collect())
        }

        async fn bans(
            &self,
            ids: &[SteamId],
            _cancel: &CancellationToken,
        ) -> Result<Vec<PlayerBanState>> {
            Ok(ids
                .iter()
                .map(|id| PlayerBanState {
                    steam_id: id.to_string(),
                    vac_banned: true,
                    ..Default::default()
                })
                .collect())
        }

        async fn friends(&self, id: SteamId, cancel: &CancellationToken) -> Result<Vec<SteamFriend>> {
            if self.fail_friends {
                return Err(AppError::Status {
                    url: "friends".into(),
                    status: 500,
                });
            }
            if self.slow_friends {
                cancel.cancelled().await;
                return Err(AppError::Cancelled);
            }
            Ok(vec![SteamFriend {
                steamid: id.to_string(),
                relationship: "friend".into(),
                friend_since: 1,
            }])
        }

        async fn servers(&self, _cancel: &CancellationToken) -> Result<Vec<SteamServer>> {
            Ok(Vec::new())
        }
    }

    fn sid(account: u32) -> SteamId {
        SteamId::from_account_id(account).unwrap()
    }

    async fn collector(steam: StubSteam) -> (Store, ProfileCollector) {
        let store = test_store().await;
        let collector = ProfileCollector::new(store.clone(), Arc::new(steam))
            .with_deadline(Duration::from_millis(500));
        (store, collector)
    }

    #[tokio::test]
    async fn failed_friends_branch_degrades_to_empty() {
        let (_, collector) = collector(StubSteam {
            fail_friends: true,
            ..Default::default()
        })
        .await;
        let profiles = collector.collect(&[sid(1)], &CancellationToken::new()).await.unwrap();

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].summary.personaname, "name-1");
        assert!(profiles[0].friends.is_empty());
        let body = serde_json::to_value(&profiles).unwrap();
        assert_eq!(body[0]["friends"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn too_many_ids_is_rejected() {
        let (_, collector) = collector(StubSteam::default()).await;
        let ids: Vec<SteamId> = (1..=101).map(sid).collect();
        let err = collector.collect(&ids, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::TooMany));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_json_body(), serde_json::json!("too many"));
    }

    #[tokio::test]
    async fn no_summaries_is_no_results() {
        let (_, collector) = collector(StubSteam {
            fail_summaries: true,
            ..Default::default()
        })
        .await;
        let err = collector.collect(&[sid(1)], &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NoResults));
    }

    #[tokio::test]
    async fn one_profile_per_distinct_id_with_store_data() {
        let (store, collector) = collector(StubSteam::default()).await;
        store
            .sb_bans_store(Site::Skial, &[SbRecord {
                name: "cheater".into(),
                steam_id: sid(2),
                reason: "aimbot".into(),
                created_on: Utc::now(),
                duration: 0,
                permanent: true,
            }])
            .await
            .unwrap();

        let profiles = collector
            .collect(&[sid(1), sid(2), sid(1)], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(profiles.iter().map(|p| p.steam_id).collect::<Vec<_>>(), vec![sid(1), sid(2)]);
        assert!(profiles[0].source_bans.is_empty());
        assert_eq!(profiles[1].source_bans[0].reason, "aimbot");
        assert!(profiles[1].ban_state.vac_banned);
        assert_eq!(profiles[1].friends.len(), 1);
        assert!(profiles.iter().all(|p| p.seasons.is_empty()));
    }

    #[tokio::test]
    async fn branches_past_the_deadline_are_dropped() {
        let (_, collector) = collector(StubSteam {
            slow_friends: true,
            ..Default::default()
        })
        .await;
        let started = Instant::now();
        let profiles = collector.collect(&[sid(1)], &CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(profiles[0].friends.is_empty());
        assert_eq!(profiles[0].summary.personaname, "name-1");
    }
}
