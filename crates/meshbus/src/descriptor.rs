//! # Node Descriptor
//!
//! Per-node metadata advertised through gossip: identity, the names of the
//! events and requests the node handles, and a few counters.
//!
//! The local node owns its descriptor; copies of remote descriptors are
//! snapshots received inside gossip and are replaced wholesale on merge.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of hex characters of entropy appended to the hostname.
const ID_ENTROPY_CHARS: usize = 12;

/// Globally unique node identifier (`<hostname>-<12 hex chars>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a fresh identifier from the hostname, pid, clock and randomness.
    pub fn generate(hostname: &str, pid: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(hostname.as_bytes());
        hasher.update(b"|");
        hasher.update(pid.to_be_bytes());
        hasher.update(b"|");
        hasher.update(unix_nanos().to_be_bytes());
        hasher.update(b"|");
        hasher.update(rand::thread_rng().gen::<u64>().to_be_bytes());
        let digest = hex::encode(hasher.finalize());

        Self(format!("{}-{}", hostname, &digest[..ID_ENTROPY_CHARS]))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Metadata describing one bus node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Node identity.
    pub id: NodeId,
    /// Event and request names this node has listeners for.
    #[serde(default)]
    pub handled_events: BTreeSet<String>,
    /// Packets this node has processed.
    #[serde(default)]
    pub msg_count: u64,
    /// Packets this node dropped for lack of a route.
    #[serde(default)]
    pub lost_packets: u64,
    /// Host the node runs on.
    #[serde(default)]
    pub hostname: String,
    /// Process id of the node.
    #[serde(default)]
    pub pid: u32,
    /// Milliseconds timestamp of the last advertised change; newer wins on merge.
    #[serde(default)]
    pub last_info_time: u64,
}

impl NodeDescriptor {
    /// Create a descriptor for the local process with a freshly generated id.
    pub fn local(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let pid = std::process::id();
        let id = NodeId::generate(&hostname, pid);

        Self {
            id,
            handled_events: BTreeSet::new(),
            msg_count: 0,
            lost_packets: 0,
            hostname,
            pid,
            last_info_time: unix_millis(),
        }
    }

    /// Create a descriptor with a fixed id and no handled events.
    pub fn with_id(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            handled_events: BTreeSet::new(),
            msg_count: 0,
            lost_packets: 0,
            hostname: String::new(),
            pid: 0,
            last_info_time: 0,
        }
    }

    /// Builder-style helper adding handled event names.
    #[must_use]
    pub fn handling<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handled_events.extend(names.into_iter().map(Into::into));
        self
    }

    /// Whether this node has a listener for `name`.
    #[must_use]
    pub fn handles(&self, name: &str) -> bool {
        self.handled_events.contains(name)
    }

    /// Advance `last_info_time`, never moving it backwards.
    pub fn touch(&mut self) -> u64 {
        self.last_info_time = unix_millis().max(self.last_info_time + 1);
        self.last_info_time
    }
}

/// The machine's hostname, or `localhost` if the OS reports none.
pub fn detect_hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().into_owned();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
