use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vellum_db::FollowerInfo;

/// Where one collection's shard lives: the leader endpoint and the
/// follower set tracking it.
#[derive(Debug, Clone)]
pub struct ShardLocation {
    pub leader: String,
    pub followers: Arc<FollowerInfo>,
}

/// In-memory stand-in for the cluster metadata directory: maps collections
/// to shard servers.
#[derive(Debug, Default)]
pub struct ClusterDirectory {
    entries: RwLock<HashMap<String, ShardLocation>>,
}

impl ClusterDirectory {
    pub fn new() -> ClusterDirectory {
        ClusterDirectory::default()
    }

    pub fn register(
        &self,
        collection: impl Into<String>,
        leader: impl Into<String>,
        followers: Vec<String>,
    ) {
        self.entries.write().unwrap().insert(
            collection.into(),
            ShardLocation {
                leader: leader.into(),
                followers: FollowerInfo::new(followers),
            },
        );
    }

    pub fn leader_of(&self, collection: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap()
            .get(collection)
            .map(|location| location.leader.clone())
    }

    pub fn followers_of(&self, collection: &str) -> Option<Arc<FollowerInfo>> {
        self.entries
            .read()
            .unwrap()
            .get(collection)
            .map(|location| Arc::clone(&location.followers))
    }

    /// The follower sets keyed by collection, as consumed by
    /// [`vellum_db::ReplicationState`].
    pub fn follower_map(&self) -> HashMap<String, Arc<FollowerInfo>> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|(name, location)| (name.clone(), Arc::clone(&location.followers)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let directory = ClusterDirectory::new();
        directory.register("accounts", "http://dbs1:8529", vec!["http://dbs2:8529".into()]);

        assert_eq!(
            directory.leader_of("accounts").as_deref(),
            Some("http://dbs1:8529")
        );
        let followers = directory.followers_of("accounts").unwrap();
        assert_eq!(followers.get(), vec!["http://dbs2:8529".to_string()]);
        assert!(directory.leader_of("missing").is_none());
    }

    #[test]
    fn demotion_is_visible_through_the_directory() {
        let directory = ClusterDirectory::new();
        directory.register(
            "accounts",
            "http://dbs1:8529",
            vec!["http://dbs2:8529".into(), "http://dbs3:8529".into()],
        );

        let followers = directory.followers_of("accounts").unwrap();
        followers.demote("http://dbs2:8529");
        assert_eq!(
            directory.followers_of("accounts").unwrap().get(),
            vec!["http://dbs3:8529".to_string()]
        );
    }
}
