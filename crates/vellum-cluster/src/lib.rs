mod client;
mod debug;
mod directory;
mod failpoints;

pub use client::{HttpReplicationClient, HttpShardDispatcher};
pub use debug::DebugHttp;
pub use directory::{ClusterDirectory, ShardLocation};
pub use failpoints::{arm, clear, clear_all, is_armed};
