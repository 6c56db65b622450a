//! Key-shape contract for the dl-dht store.
//!
//! Every stored key looks like `/<namespace>/<rest...>`. [`make_key`] builds
//! keys in the `/<group>/<root>/<path...>` layout the node expects, and
//! [`validate_key`] guards every get/put/del before any network I/O.

use crate::error::{DhtError, DhtResult};
use std::fmt;

/// Namespace tags understood by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyGroup {
    /// Name records.
    Ns,
    /// Certificates.
    Cert,
    /// Agent descriptors.
    Agent,
    /// Network statistics.
    Netstats,
}

impl KeyGroup {
    /// The tag as it appears in a key.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyGroup::Ns => "ns",
            KeyGroup::Cert => "cert",
            KeyGroup::Agent => "agent",
            KeyGroup::Netstats => "netstats",
        }
    }
}

impl fmt::Display for KeyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyGroup {
    type Err = DhtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ns" => Ok(KeyGroup::Ns),
            "cert" => Ok(KeyGroup::Cert),
            "agent" => Ok(KeyGroup::Agent),
            "netstats" => Ok(KeyGroup::Netstats),
            other => Err(DhtError::KeyShape(format!("unknown key group {other:?}"))),
        }
    }
}

/// Build a well-formed key: `/<group>/<root>/<path...>`.
///
/// Accidental runs of `/` (for example from path pieces that carry their own
/// slashes) collapse to a single separator.
pub fn make_key(group: KeyGroup, root: &str, path: &[&str]) -> DhtResult<String> {
    if root.is_empty() {
        return Err(DhtError::KeyShape("root required".to_string()));
    }
    let joined = format!("/{}/{}/{}", group.as_str(), root, path.join("/"));
    Ok(collapse_slashes(&joined))
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Check that `key` has the `/<namespace>/<key>` shape.
///
/// The namespace must be non-empty and free of whitespace, and something must
/// follow the separating slash.
pub fn validate_key(key: &str) -> DhtResult<()> {
    let s = key.trim();
    let Some(rest) = s.strip_prefix('/') else {
        return Err(DhtError::KeyShape(format!(
            "key must start with \"/\" (got {key:?})"
        )));
    };
    match rest.find('/') {
        Some(i) if i > 0 && i < rest.len() - 1 => {
            let ns = &rest[..i];
            if ns.chars().any(char::is_whitespace) {
                return Err(DhtError::KeyShape(format!(
                    "namespace must not contain spaces (got {key:?})"
                )));
            }
            Ok(())
        }
        _ => Err(DhtError::KeyShape(format!(
            "key must look like /<namespace>/<key> (got {key:?})"
        ))),
    }
}
