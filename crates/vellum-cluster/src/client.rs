use std::sync::Arc;
use std::time::Duration;

use ureq::Agent;

use vellum_db::{
    DbError, REPLICATION_TIMEOUT, ReplicationClient, ReplicationRequest, ShardDispatcher,
    ShardRequest, ShardResponse,
};
use vellum_query::ErrorKind;

use crate::directory::ClusterDirectory;

fn agent_with_timeout(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn query_string(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn run(
    agent: &Agent,
    method: &str,
    url: &str,
    headers: &[(String, String)],
    body: Vec<u8>,
) -> Result<(u16, Vec<(String, String)>, Vec<u8>), DbError> {
    let mut builder = http::Request::builder().method(method).uri(url);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = builder
        .body(body)
        .map_err(|e| DbError::new(ErrorKind::Internal, e.to_string()))?;

    let response = agent
        .run(request)
        .map_err(|e| DbError::new(ErrorKind::Internal, format!("request to {url} failed: {e}")))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();
    let body = response
        .into_body()
        .read_to_vec()
        .map_err(|e| DbError::new(ErrorKind::Internal, e.to_string()))?;
    Ok((status, headers, body))
}

/// Shard dispatcher over HTTP: routes a request to the collection's
/// current shard leader.
pub struct HttpShardDispatcher {
    agent: Agent,
    directory: Arc<ClusterDirectory>,
}

impl HttpShardDispatcher {
    pub fn new(directory: Arc<ClusterDirectory>, timeout: Duration) -> HttpShardDispatcher {
        HttpShardDispatcher {
            agent: agent_with_timeout(timeout),
            directory,
        }
    }
}

impl ShardDispatcher for HttpShardDispatcher {
    fn dispatch(&self, request: ShardRequest) -> Result<ShardResponse, DbError> {
        let leader = self.directory.leader_of(&request.collection).ok_or_else(|| {
            DbError::new(
                ErrorKind::CollectionNotFound,
                format!("no shard location for collection {}", request.collection),
            )
        })?;

        let mut url = format!("{leader}{}", request.path);
        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&query_string(&request.query));
        }

        let (status, headers, body) = run(
            &self.agent,
            request.method.as_str(),
            &url,
            &request.headers,
            request.body.unwrap_or_default(),
        )?;
        Ok(ShardResponse {
            status,
            headers,
            body,
        })
    }
}

/// Follower write client with the fixed replication budget.
pub struct HttpReplicationClient {
    agent: Agent,
}

impl Default for HttpReplicationClient {
    fn default() -> Self {
        HttpReplicationClient {
            agent: agent_with_timeout(REPLICATION_TIMEOUT),
        }
    }
}

impl HttpReplicationClient {
    pub fn new() -> HttpReplicationClient {
        HttpReplicationClient::default()
    }
}

impl ReplicationClient for HttpReplicationClient {
    fn forward(&self, follower: &str, request: &ReplicationRequest) -> Result<u16, DbError> {
        let mut url = format!("{follower}{}", request.path);
        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&query_string(&request.query));
        }
        let (status, _, _) = run(
            &self.agent,
            request.method.as_str(),
            &url,
            &[],
            request.body.clone(),
        )?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_strings_are_encoded() {
        let query = vec![
            ("waitForSync".to_string(), "true".to_string()),
            ("a b".to_string(), "x&y".to_string()),
        ];
        assert_eq!(query_string(&query), "waitForSync=true&a%20b=x%26y");
    }
}
