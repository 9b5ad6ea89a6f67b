//! Fingerprint computation over raw SSH public-key blobs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;

/// A canonical fingerprint string, either MD5 or SHA-256 form.
pub type Fingerprint = String;

/// 32 lowercase hex characters, colonless, over the raw key blob.
pub fn md5_fingerprint(blob: &[u8]) -> Fingerprint {
    format!("{:x}", md5::compute(blob))
}

/// Literal prefix `SHA256` followed by the unpadded base64 encoding of the
/// SHA-256 digest of the raw key blob.
pub fn sha256_fingerprint(blob: &[u8]) -> Fingerprint {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(blob);
    format!("SHA256{}", STANDARD_NO_PAD.encode(digest))
}

/// Both canonical forms for a blob, in MD5-then-SHA-256 order.
pub fn both_fingerprints(blob: &[u8]) -> (Fingerprint, Fingerprint) {
    (md5_fingerprint(blob), sha256_fingerprint(blob))
}
