//! Sign-request body decoding.

use crate::error::{Error, Result};
use bytes::Bytes;

/// Flags values the filter accepts. Any other value is rejected as
/// "bad-flags" even if the body otherwise parses cleanly.
pub const SSH_AGENT_OLD_SIGNATURE: u32 = 1;
pub const SSH_AGENT_RSA_SHA2_256: u32 = 2;
pub const SSH_AGENT_RSA_SHA2_512: u32 = 4;

fn is_valid_flags(flags: u32) -> bool {
    matches!(
        flags,
        0 | SSH_AGENT_OLD_SIGNATURE | SSH_AGENT_RSA_SHA2_256 | SSH_AGENT_RSA_SHA2_512
    )
}

/// Decoded sign-request body: `(key_blob, data, flags)`.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub key_blob: Bytes,
    pub data: Bytes,
    pub flags: u32,
}

fn read_length_prefixed(body: &[u8], offset: usize) -> Result<(Bytes, usize)> {
    if body.len() < offset + 4 {
        return Err(Error::Framing("sign request: truncated length".to_string()));
    }
    let len = u32::from_be_bytes(body[offset..offset + 4].try_into().unwrap()) as usize;
    let start = offset + 4;
    let end = start
        .checked_add(len)
        .ok_or_else(|| Error::Framing("sign request: length overflow".to_string()))?;
    if end > body.len() {
        return Err(Error::Framing(
            "sign request: length exceeds remaining body".to_string(),
        ));
    }
    Ok((Bytes::copy_from_slice(&body[start..end]), end))
}

impl SignRequest {
    /// Parse `key_blob`, `data`, and `flags` from a sign-request body.
    ///
    /// Fails with a framing error if any field's length exceeds the
    /// remaining body or if bytes remain after the flags word, and with a
    /// framing error for any flags value outside `{0, 1, 2, 4}`. On the
    /// wire both failure modes produce the same rejected frame, so they
    /// are not distinguished by variant.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let (key_blob, offset) = read_length_prefixed(body, 0)?;
        let (data, offset) = read_length_prefixed(body, offset)?;

        if body.len() < offset + 4 {
            return Err(Error::Framing("sign request: missing flags".to_string()));
        }
        let flags = u32::from_be_bytes(body[offset..offset + 4].try_into().unwrap());
        if body.len() != offset + 4 {
            return Err(Error::Framing(
                "sign request: trailing bytes after flags".to_string(),
            ));
        }
        if !is_valid_flags(flags) {
            return Err(Error::Framing(format!("sign request: bad flags {flags}")));
        }

        Ok(Self {
            key_blob,
            data,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn encode_sign_body(key_blob: &[u8], data: &[u8], flags: u32) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(key_blob.len() as u32);
        buf.put_slice(key_blob);
        buf.put_u32(data.len() as u32);
        buf.put_slice(data);
        buf.put_u32(flags);
        buf.freeze()
    }

    #[test]
    fn decodes_well_formed_body() {
        let body = encode_sign_body(b"keyblob", b"to-sign", 0);
        let req = SignRequest::decode(&body).unwrap();
        assert_eq!(&req.key_blob[..], b"keyblob");
        assert_eq!(&req.data[..], b"to-sign");
        assert_eq!(req.flags, 0);
    }

    #[test]
    fn rejects_bad_flags_value_eight() {
        let body = encode_sign_body(b"k", b"d", 8);
        assert!(SignRequest::decode(&body).is_err());
    }

    #[test]
    fn accepts_each_valid_flags_value() {
        for flags in [0, SSH_AGENT_OLD_SIGNATURE, SSH_AGENT_RSA_SHA2_256, SSH_AGENT_RSA_SHA2_512] {
            let body = encode_sign_body(b"k", b"d", flags);
            assert!(SignRequest::decode(&body).is_ok());
        }
    }

    #[test]
    fn rejects_trailing_byte_after_flags() {
        let mut body = encode_sign_body(b"k", b"d", 0).to_vec();
        body.push(0xFF);
        assert!(SignRequest::decode(&body).is_err());
    }

    #[test]
    fn rejects_length_exceeding_remaining_body() {
        let mut buf = BytesMut::new();
        buf.put_u32(100); // claims 100 bytes but body ends here
        assert!(SignRequest::decode(&buf).is_err());
    }

    #[test]
    fn exact_consumption_is_accepted_for_authorization() {
        let body = encode_sign_body(b"exact", b"payload", SSH_AGENT_RSA_SHA2_256);
        assert!(SignRequest::decode(&body).is_ok());
    }
}
