//! The proxy session: one upstream connection per client, shuttling framed
//! messages in both directions while applying the filter to client-origin
//! traffic.

use crate::agent::Upstream;
use crate::error::Result;
use crate::filter::{self, Decision};
use crate::logging::{JsonlWriter, LogEvent, LogEventKind};
use crate::peer::{self, PeerIdentity};
use crate::policy::Policy;
use crate::protocol::{write_message, AgentMessage, FrameReader, MessageType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Shared, per-listener proxy configuration. One `Proxy` serves every
/// connection accepted on a given bind socket.
pub struct Proxy {
    upstream: Upstream,
    policy: Arc<Policy>,
    socket_name: String,
    logger: Option<Arc<JsonlWriter>>,
    connection_counter: AtomicU64,
}

impl Proxy {
    pub fn new(upstream: Upstream, policy: Arc<Policy>) -> Self {
        Self {
            upstream,
            policy,
            socket_name: String::new(),
            logger: None,
            connection_counter: AtomicU64::new(0),
        }
    }

    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = name.into();
        self
    }

    pub fn with_logger(mut self, logger: Arc<JsonlWriter>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            let _ = logger.write(&event);
        }
    }

    /// Handle one accepted client connection end-to-end: resolve the
    /// peer, open the dedicated upstream connection, then run the session
    /// loop until either side closes or a fatal error occurs. Errors here
    /// never propagate to any other connection.
    pub async fn handle_client(&self, client: UnixStream) -> Result<()> {
        let client_id = format!(
            "{}-{}",
            self.socket_name,
            self.connection_counter.fetch_add(1, Ordering::Relaxed)
        );

        self.log(LogEvent::client_connect(&self.socket_name, &client_id));

        let peer = match peer::resolve(&client) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "peer credential resolution failed, closing session");
                self.log(LogEvent::error(format!("peer resolution failed: {e}")));
                return Err(e);
            }
        };
        debug!(client_id = %client_id, user = %peer.user, groups = ?peer.groups, "resolved peer identity");
        self.log(
            LogEvent::new(LogEventKind::PeerResolved)
                .with_socket(&self.socket_name)
                .with_client_id(&client_id)
                .with_user(&peer.user),
        );

        let upstream_conn = match self.upstream.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "upstream connect failed, closing client");
                self.log(LogEvent::error(format!("upstream connect failed: {e}")));
                return Err(e);
            }
        };

        let result = Session {
            client,
            upstream: upstream_conn,
            peer,
            policy: &self.policy,
            client_id: &client_id,
            logger: self.logger.as_deref(),
            socket_name: &self.socket_name,
        }
        .run()
        .await;

        self.log(LogEvent::client_disconnect(&self.socket_name, &client_id));
        result
    }
}

struct Session<'a> {
    client: UnixStream,
    upstream: UnixStream,
    peer: PeerIdentity,
    policy: &'a Policy,
    client_id: &'a str,
    logger: Option<&'a JsonlWriter>,
    socket_name: &'a str,
}

impl Session<'_> {
    fn log(&self, event: LogEvent) {
        if let Some(logger) = self.logger {
            let _ = logger.write(&event);
        }
    }

    /// Wait for readability on either socket, read exactly one frame from
    /// whichever is ready, and act on it. Termination rules are enumerated
    /// per-branch below. Each side's reader keeps its partial-frame state
    /// across loop iterations, so losing the select race never drops bytes
    /// mid-frame.
    async fn run(mut self) -> Result<()> {
        let (client_r, mut client_w) = self.client.split();
        let (upstream_r, mut upstream_w) = self.upstream.split();
        let mut client_reader = FrameReader::new(client_r);
        let mut upstream_reader = FrameReader::new(upstream_r);

        loop {
            tokio::select! {
                client_msg = client_reader.read_message() => {
                    match client_msg {
                        Ok(Some(msg)) => {
                            self.handle_client_message(msg, &mut upstream_w, &mut client_w).await?;
                        }
                        Ok(None) => {
                            debug!(client_id = %self.client_id, "client closed connection");
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(client_id = %self.client_id, error = %e, "framing error on client, closing session");
                            self.log(LogEvent::error(format!("client framing error: {e}")));
                            return Ok(());
                        }
                    }
                }
                upstream_msg = upstream_reader.read_message() => {
                    match upstream_msg {
                        Ok(Some(msg)) => {
                            write_message(&mut client_w, &msg).await?;
                        }
                        Ok(None) => {
                            debug!(client_id = %self.client_id, "upstream closed connection");
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(client_id = %self.client_id, error = %e, "framing error on upstream, closing session");
                            self.log(LogEvent::error(format!("upstream framing error: {e}")));
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Apply the filter to one client-originated message: forward-decisions
    /// write the original frame to the agent, reject-decisions write a
    /// failure frame to the client. The session continues either way.
    async fn handle_client_message<W1, W2>(
        &self,
        msg: AgentMessage,
        upstream_w: &mut W1,
        client_w: &mut W2,
    ) -> Result<()>
    where
        W1: tokio::io::AsyncWrite + Unpin,
        W2: tokio::io::AsyncWrite + Unpin,
    {
        let decision = filter::decide(&msg, &self.peer.groups, self.policy);

        if msg.msg_type().is_list_identities() {
            if let Decision::Forward = decision {
                self.log(
                    LogEvent::new(LogEventKind::IdentitiesRequest)
                        .with_socket(self.socket_name)
                        .with_client_id(self.client_id)
                        .with_user(&self.peer.user),
                );
            }
        }

        match decision {
            Decision::Forward => {
                if msg.msg_type() == MessageType::SignRequest {
                    self.log_sign_decision(&msg, crate::logging::Decision::Allowed, None);
                }
                write_message(upstream_w, &msg).await?;
            }
            Decision::Reject { reason } => {
                debug!(client_id = %self.client_id, reason, "rejecting client message");
                if msg.msg_type() == MessageType::SignRequest {
                    self.log_sign_decision(&msg, crate::logging::Decision::Denied, Some(reason));
                } else {
                    self.log(
                        LogEvent::error(format!("rejected client message: {reason}"))
                            .with_socket(self.socket_name)
                            .with_client_id(self.client_id),
                    );
                }
                write_message(client_w, &AgentMessage::failure()).await?;
            }
        }
        Ok(())
    }

    fn log_sign_decision(
        &self,
        msg: &AgentMessage,
        decision: crate::logging::Decision,
        reason: Option<&'static str>,
    ) {
        let fingerprint = crate::protocol::SignRequest::decode(&msg.body)
            .ok()
            .map(|req| crate::policy::fingerprint::sha256_fingerprint(&req.key_blob));

        let mut event = LogEvent::new(LogEventKind::SignRequest)
            .with_socket(self.socket_name)
            .with_client_id(self.client_id)
            .with_user(&self.peer.user)
            .with_decision(decision);
        if let Some(fp) = fingerprint {
            event = event.with_fingerprint(fp);
        }
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        self.log(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fingerprint::both_fingerprints;
    use bytes::{BufMut, BytesMut};
    use std::collections::{HashMap, HashSet};
    use tokio::io::AsyncReadExt;

    fn groups(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sign_body(key_blob: &[u8]) -> bytes::Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(key_blob.len() as u32);
        buf.put_slice(key_blob);
        buf.put_u32(4);
        buf.put_slice(b"data");
        buf.put_u32(0);
        buf.freeze()
    }

    #[tokio::test]
    async fn rejected_sign_request_writes_failure_frame_to_client() {
        let (mut client_side, proxy_client_end) = UnixStream::pair().unwrap();
        let (mut agent_side, proxy_upstream_end) = UnixStream::pair().unwrap();

        let session = Session {
            client: proxy_client_end,
            upstream: proxy_upstream_end,
            peer: PeerIdentity {
                user: "alice".to_string(),
                groups: groups(&["users"]),
            },
            policy: &HashMap::new(),
            client_id: "test-0",
            logger: None,
            socket_name: "test",
        };

        let handle = tokio::spawn(session.run());

        let msg = AgentMessage::new(13, sign_body(b"unauthorized-key"));
        write_message(&mut client_side, &msg).await.unwrap();
        drop(client_side);

        let _ = handle.await.unwrap();

        let mut response = Vec::new();
        agent_side.read_to_end(&mut response).await.unwrap();
        // No bytes should ever reach the agent for a rejected request.
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn authorized_sign_request_forwards_to_upstream() {
        let (mut client_side, proxy_client_end) = UnixStream::pair().unwrap();
        let (mut agent_side, proxy_upstream_end) = UnixStream::pair().unwrap();

        let key_blob = b"authorized-key";
        let (md5, sha256) = both_fingerprints(key_blob);
        let mut policy: Policy = HashMap::new();
        policy.insert(md5, groups(&["admins"]));
        policy.insert(sha256, groups(&["admins"]));

        let session = Session {
            client: proxy_client_end,
            upstream: proxy_upstream_end,
            peer: PeerIdentity {
                user: "alice".to_string(),
                groups: groups(&["admins"]),
            },
            policy: &policy,
            client_id: "test-0",
            logger: None,
            socket_name: "test",
        };

        let handle = tokio::spawn(session.run());

        let msg = AgentMessage::new(13, sign_body(key_blob));
        write_message(&mut client_side, &msg).await.unwrap();

        let forwarded = read_message(&mut agent_side).await.unwrap().unwrap();
        assert_eq!(forwarded.code, 13);

        drop(client_side);
        let _ = handle.await.unwrap();
    }
}
