use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};

/// Result type for signing operations: (headers, `query_params`)
///
/// Query params come back in the exact order they must appear on the wire.
pub type SignatureResult = Result<(HashMap<String, String>, Vec<(String, String)>), ExchangeError>;

/// Sorted parameter set that signatures are computed over.
pub type CanonicalParams = BTreeMap<String, String>;

/// `k1=v1&k2=v2` over keys in lexicographic order.
pub fn canonical_query(params: &CanonicalParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// `{"k1":"v1","k2":"v2"}` over keys in lexicographic order.
///
/// Values are written verbatim, without JSON escaping, matching what the
/// exchange recomputes on its side.
pub fn canonical_message(params: &CanonicalParams) -> String {
    let body = params
        .iter()
        .map(|(k, v)| format!("\"{}\":\"{}\"", k, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

/// Signer trait for request authentication
///
/// A signer owns the credentials of one account and knows one signing scheme.
/// The scheme is selected per exchange; transport code only sees this trait.
pub trait Signer: Send + Sync {
    /// Public key sent alongside signed payloads.
    fn access_key(&self) -> &str;

    /// Digest of an already canonicalized payload.
    ///
    /// Pure and deterministic: the same payload always yields the same digest.
    fn sign(&self, payload: &str) -> String;

    /// Sign a REST request
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `endpoint` - API endpoint path
    /// * `params` - Business parameters, unordered
    /// * `timestamp` - Request timestamp in milliseconds
    ///
    /// # Returns
    /// Tuple of (headers, signed_query_params) to include in the request
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        params: &[(String, String)],
        timestamp: u64,
    ) -> SignatureResult;
}

/// Hex HMAC-SHA256 over the sorted query, with the key in a header.
pub struct HmacSha256Signer {
    api_key: String,
    secret_key: String,
    key_header: String,
}

impl HmacSha256Signer {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key,
            key_header: "X-API-KEY".to_string(),
        }
    }

    #[must_use]
    pub fn with_key_header(mut self, header: impl Into<String>) -> Self {
        self.key_header = header.into();
        self
    }
}

impl Signer for HmacSha256Signer {
    fn access_key(&self) -> &str {
        &self.api_key
    }

    fn sign(&self, payload: &str) -> String {
        // HMAC accepts keys of any length, so construction cannot fail
        let mut mac = match Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn sign_request(
        &self,
        _method: &str,
        _endpoint: &str,
        params: &[(String, String)],
        timestamp: u64,
    ) -> SignatureResult {
        let mut canonical: CanonicalParams = params.iter().cloned().collect();
        canonical.insert("timestamp".to_string(), timestamp.to_string());

        let signature = self.sign(&canonical_query(&canonical));

        let mut headers = HashMap::new();
        headers.insert(self.key_header.clone(), self.api_key.clone());

        let mut signed_params: Vec<(String, String)> = canonical.into_iter().collect();
        signed_params.push(("signature".to_string(), signature));

        Ok((headers, signed_params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> CanonicalParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_query_sorts_keys() {
        let p = params(&[("method", "order"), ("amount", "1.5"), ("currency", "eos_qc")]);
        assert_eq!(canonical_query(&p), "amount=1.5&currency=eos_qc&method=order");
    }

    #[test]
    fn test_canonical_message_literal() {
        let p = params(&[("isZip", "false"), ("binary", "false")]);
        assert_eq!(canonical_message(&p), r#"{"binary":"false","isZip":"false"}"#);
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let signer = HmacSha256Signer::new("ak".to_string(), "Jefe".to_string());
        assert_eq!(
            signer.sign("what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha256_request_appends_timestamp_and_signature() {
        let signer = HmacSha256Signer::new("ak".to_string(), "sk".to_string());
        let (headers, signed) = signer
            .sign_request(
                "GET",
                "/api/v1/order",
                &[("symbol".to_string(), "EOSQC".to_string())],
                42,
            )
            .unwrap();

        assert_eq!(headers.get("X-API-KEY").map(String::as_str), Some("ak"));
        assert_eq!(signed[0], ("symbol".to_string(), "EOSQC".to_string()));
        assert_eq!(signed[1], ("timestamp".to_string(), "42".to_string()));
        assert_eq!(signed[2].0, "signature");
        assert_eq!(signed[2].1, signer.sign("symbol=EOSQC&timestamp=42"));
    }
}
