//! The filter: a pure decision function over a client message and the
//! peer's groups.

use crate::policy::fingerprint::both_fingerprints;
use crate::policy::Policy;
use crate::protocol::{AgentMessage, MessageType, SignRequest};
use std::collections::HashSet;

/// The filter's verdict on a client-originated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the original frame to the agent unmodified.
    Forward,
    /// Do not forward; the session answers with a synthesized failure
    /// frame instead. Carries a human-readable reason for diagnostics only,
    /// the wire response is identical regardless of reason.
    Reject { reason: &'static str },
}

/// Decide what to do with a client-originated message. Pure: no I/O, no
/// mutation, no session state.
pub fn decide(msg: &AgentMessage, peer_groups: &HashSet<String>, policy: &Policy) -> Decision {
    match msg.msg_type() {
        MessageType::RequestRsaIdentities | MessageType::RequestIdentities => {
            if msg.body.is_empty() {
                Decision::Forward
            } else {
                Decision::Reject {
                    reason: "list-identities request carried a non-empty body",
                }
            }
        }
        MessageType::SignRequest => decide_sign(&msg.body, peer_groups, policy),
        _ => Decision::Reject {
            reason: "unrecognized client message code",
        },
    }
}

fn decide_sign(body: &[u8], peer_groups: &HashSet<String>, policy: &Policy) -> Decision {
    let request = match SignRequest::decode(body) {
        Ok(req) => req,
        Err(_) => {
            return Decision::Reject {
                reason: "sign request body did not parse or had bad flags",
            };
        }
    };

    let (md5, sha256) = both_fingerprints(&request.key_blob);
    let allowed_md5 = policy.get(&md5);
    let allowed_sha256 = policy.get(&sha256);

    let intersects = |allowed: Option<&std::collections::HashSet<String>>| {
        allowed.is_some_and(|groups| groups.iter().any(|g| peer_groups.contains(g)))
    };

    if intersects(allowed_md5) || intersects(allowed_sha256) {
        Decision::Forward
    } else {
        Decision::Reject {
            reason: "no policy group intersects the peer's groups for this key",
        }
    }
}
