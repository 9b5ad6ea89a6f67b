//! SSH Agent Protocol message types
//!
//! https://datatracker.ietf.org/doc/html/draft-miller-ssh-agent

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};

/// SSH agent message codes this proxy recognizes.
///
/// Every other on-wire code decodes to `Unknown` and is rejected by the
/// filter. The proxy never needs to understand any other message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    RequestRsaIdentities = 1,
    RequestIdentities = 11,
    SignRequest = 13,
    Failure = 5,
    Success = 6,
    IdentitiesAnswer = 12,
    SignResponse = 14,
    Unknown = 0,
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::RequestRsaIdentities,
            11 => MessageType::RequestIdentities,
            13 => MessageType::SignRequest,
            5 => MessageType::Failure,
            6 => MessageType::Success,
            12 => MessageType::IdentitiesAnswer,
            14 => MessageType::SignResponse,
            _ => MessageType::Unknown,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

impl MessageType {
    pub fn is_list_identities(self) -> bool {
        matches!(
            self,
            MessageType::RequestRsaIdentities | MessageType::RequestIdentities
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::RequestRsaIdentities => "SSH_AGENTC_REQUEST_RSA_IDENTITIES",
            MessageType::RequestIdentities => "SSH2_AGENTC_REQUEST_IDENTITIES",
            MessageType::SignRequest => "SSH2_AGENTC_SIGN_REQUEST",
            MessageType::Failure => "SSH_AGENT_FAILURE",
            MessageType::Success => "SSH_AGENT_SUCCESS",
            MessageType::IdentitiesAnswer => "SSH_AGENT_IDENTITIES_ANSWER",
            MessageType::SignResponse => "SSH_AGENT_SIGN_RESPONSE",
            MessageType::Unknown => "UNKNOWN",
        }
    }
}

/// A framed agent protocol message: a one-byte code plus an opaque body.
///
/// The proxy never inspects `body` except when `code` is a sign request;
/// list-identities traffic and agent responses are relayed verbatim.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub code: u8,
    pub body: Bytes,
}

impl AgentMessage {
    pub fn new(code: u8, body: Bytes) -> Self {
        Self { code, body }
    }

    pub fn msg_type(&self) -> MessageType {
        MessageType::from(self.code)
    }

    /// The proxy's synthesized rejection reply: `length=1, code=5`, no body.
    pub fn failure() -> Self {
        Self {
            code: MessageType::Failure.into(),
            body: Bytes::new(),
        }
    }

    /// Encode to the full wire frame, including the 4-byte length prefix.
    pub fn encode(&self) -> Bytes {
        let total_len = 1 + self.body.len();
        let mut buf = BytesMut::with_capacity(4 + total_len);
        buf.extend_from_slice(&(total_len as u32).to_be_bytes());
        buf.extend_from_slice(&[self.code]);
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }

    /// Decode a message from the bytes following the length prefix.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Framing("zero-length frame".to_string()));
        }
        Ok(Self {
            code: data[0],
            body: Bytes::copy_from_slice(&data[1..]),
        })
    }
}
