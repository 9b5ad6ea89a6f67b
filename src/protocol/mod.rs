//! SSH Agent Protocol: framing, message codes, sign-request decoding.
//!
//! https://datatracker.ietf.org/doc/html/draft-miller-ssh-agent

pub mod codec;
pub mod message;
pub mod sign;

pub use codec::{read_message, write_message, FrameReader};
pub use message::{AgentMessage, MessageType};
pub use sign::SignRequest;
