use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bson::Bson;

use vellum_query::OperationOptions;

use crate::error::DbError;
use crate::protocol::{RequestMethod, document_path, options_query};

/// Budget for replaying one write to the follower set.
pub const REPLICATION_TIMEOUT: Duration = Duration::from_secs(60);

/// A write replayed to one follower.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationRequest {
    pub method: RequestMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// The same JSON document body the local operation received.
    pub body: Vec<u8>,
}

/// Client seam for follower writes. Implementations enforce the
/// [`REPLICATION_TIMEOUT`] budget per request.
pub trait ReplicationClient {
    /// Send the write to one follower endpoint; returns the HTTP status.
    fn forward(&self, follower: &str, request: &ReplicationRequest) -> Result<u16, DbError>;
}

/// The current follower set of one shard, shared with the maintenance
/// layer that (re)adds synchronised followers.
#[derive(Debug, Default)]
pub struct FollowerInfo {
    endpoints: RwLock<Vec<String>>,
}

impl FollowerInfo {
    pub fn new(endpoints: Vec<String>) -> Arc<FollowerInfo> {
        Arc::new(FollowerInfo {
            endpoints: RwLock::new(endpoints),
        })
    }

    pub fn get(&self) -> Vec<String> {
        self.endpoints.read().unwrap().clone()
    }

    /// Remove a follower that diverged from the leader's writes.
    pub fn demote(&self, endpoint: &str) {
        self.endpoints.write().unwrap().retain(|e| e != endpoint);
    }
}

/// Leader-side replication state: the follower sets per collection and
/// the wire client.
pub struct ReplicationState {
    client: Box<dyn ReplicationClient>,
    followers: HashMap<String, Arc<FollowerInfo>>,
}

impl ReplicationState {
    pub fn new(
        client: Box<dyn ReplicationClient>,
        followers: HashMap<String, Arc<FollowerInfo>>,
    ) -> ReplicationState {
        ReplicationState { client, followers }
    }

    pub fn followers_of(&self, collection: &str) -> Option<Arc<FollowerInfo>> {
        self.followers.get(collection).cloned()
    }

    /// Replay a successful local write to every follower of the
    /// collection. A follower answering anything but `202 Accepted` or
    /// `201 Created` is demoted and logged; the local write never fails on
    /// account of a follower.
    pub fn replicate_write(
        &self,
        db: &str,
        collection: &str,
        method: RequestMethod,
        key: Option<&str>,
        value: &Bson,
        options: &OperationOptions,
    ) {
        let Some(followers) = self.followers_of(collection) else {
            return;
        };

        let body = match serde_json::to_vec(value) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialise replication body");
                return;
            }
        };
        let request = ReplicationRequest {
            method,
            path: document_path(db, collection, key),
            query: options_query(options),
            body,
        };

        for follower in followers.get() {
            let accepted = matches!(
                self.client.forward(&follower, &request),
                Ok(201) | Ok(202)
            );
            if !accepted {
                followers.demote(&follower);
                tracing::warn!(
                    follower = %follower,
                    collection,
                    path = %request.path,
                    "demoting follower after failed write replication"
                );
            }
        }
    }
}
