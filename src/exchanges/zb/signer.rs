use crate::core::kernel::signer::{canonical_query, CanonicalParams, SignatureResult, Signer};
use md5::{Digest, Md5};
use sha1::Sha1;
use std::collections::HashMap;

const BLOCK_SIZE: usize = 64;
const INNER_PAD: u8 = 0x36;
const OUTER_PAD: u8 = 0x5c;

/// ZB request signer.
///
/// The key is the SHA-1 hex digest of the secret. The digest is an HMAC-shaped
/// two-pass MD5 over that key, which is NOT textbook HMAC-MD5: the key is the
/// 40 ASCII hex characters, not the raw SHA-1 bytes.
#[derive(Clone)]
pub struct ZbSigner {
    access_key: String,
    key_digest: String,
}

impl ZbSigner {
    pub fn new(access_key: String, secret_key: &str) -> Self {
        Self {
            access_key,
            key_digest: sha1_hex(secret_key),
        }
    }
}

impl std::fmt::Debug for ZbSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZbSigner")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

fn sha1_hex(value: &str) -> String {
    hex::encode(Sha1::digest(value.as_bytes()))
}

fn padded_key(key: &[u8], pad: u8) -> Vec<u8> {
    let mut block: Vec<u8> = key.iter().map(|b| b ^ pad).collect();
    if block.len() < BLOCK_SIZE {
        block.resize(BLOCK_SIZE, pad);
    }
    block
}

fn md5_two_pass(key: &[u8], message: &[u8]) -> String {
    let mut inner = Md5::new();
    inner.update(padded_key(key, INNER_PAD));
    inner.update(message);
    let inner_digest = inner.finalize();

    let mut outer = Md5::new();
    outer.update(padded_key(key, OUTER_PAD));
    outer.update(&inner_digest[..16]);
    hex::encode(outer.finalize())
}

impl Signer for ZbSigner {
    fn access_key(&self) -> &str {
        &self.access_key
    }

    fn sign(&self, payload: &str) -> String {
        md5_two_pass(self.key_digest.as_bytes(), payload.as_bytes())
    }

    /// `accesskey` joins the business params, the sorted query is signed, and
    /// `sign` then `reqTime` trail the query.
    fn sign_request(
        &self,
        _method: &str,
        _endpoint: &str,
        params: &[(String, String)],
        timestamp: u64,
    ) -> SignatureResult {
        let mut canonical: CanonicalParams = params.iter().cloned().collect();
        canonical.insert("accesskey".to_string(), self.access_key.clone());

        let signature = self.sign(&canonical_query(&canonical));

        let mut signed_params: Vec<(String, String)> = canonical.into_iter().collect();
        signed_params.push(("sign".to_string(), signature));
        signed_params.push(("reqTime".to_string(), timestamp.to_string()));

        Ok((HashMap::new(), signed_params))
    }
}
