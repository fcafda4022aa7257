use serde::{Deserialize, Serialize};

/// Per-operation flags carried from the caller down to the storage layer
/// and, on coordinators, onto the shard-dispatch query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperationOptions {
    pub wait_for_sync: bool,
    /// When set, stored revisions are not compared against `_rev` values in
    /// the request.
    pub ignore_revs: bool,
    pub return_old: bool,
    pub return_new: bool,
    /// Suppress result payloads, including the identity recorded on a
    /// revision conflict.
    pub silent: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        OperationOptions {
            wait_for_sync: false,
            ignore_revs: true,
            return_old: false,
            return_new: false,
            silent: false,
        }
    }
}
