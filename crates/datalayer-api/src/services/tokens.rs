//! Bridge authorization tokens.
//!
//! A token is `base64url(claims).hex(hmac_sha256(secret, base64url(claims)))`.
//! Claims carry the storefront session id and, for logged-in shoppers, the
//! actor. Tokens carry no expiry: rotating the secret revokes all of them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use datalayer_core::{Actor, Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Claims embedded in a bridge token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Storefront session the token was issued for.
    pub sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
}

/// Issues and verifies bridge tokens with a server-held secret.
#[derive(Clone)]
pub struct BridgeTokens {
    secret: Vec<u8>,
}

impl std::fmt::Debug for BridgeTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeTokens").finish_non_exhaustive()
    }
}

impl BridgeTokens {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.len() < 16 {
            return Err(Error::Config(
                "BRIDGE_TOKEN_SECRET must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Issue a token for the given claims.
    pub fn issue(&self, claims: &TokenClaims) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify a token and return its claims.
    ///
    /// Every failure is reported as `Unauthorized` with no detail about which
    /// part was wrong.
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let invalid = || Error::Unauthorized("invalid token".to_string());

        let (payload, signature) = token.trim().split_once('.').ok_or_else(invalid)?;
        let signature = hex::decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        serde_json::from_slice(&raw).map_err(|_| invalid())
    }
}

/// Random session id for shoppers without a storefront session.
pub fn generate_session_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-0123456789";

    fn claims() -> TokenClaims {
        TokenClaims {
            sid: "sess-1".into(),
            actor: Some(Actor::new(4, vec!["customer".into()])),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = BridgeTokens::new(SECRET).unwrap();
        let token = tokens.issue(&claims()).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), claims());
    }

    #[test]
    fn test_anonymous_claims() {
        let tokens = BridgeTokens::new(SECRET).unwrap();
        let anon = TokenClaims { sid: "s".into(), actor: None };
        let token = tokens.issue(&anon).unwrap();
        assert_eq!(tokens.verify(&token).unwrap().actor, None);
    }

    #[test]
    fn test_rotated_secret_rejects_old_tokens() {
        let old = BridgeTokens::new(SECRET).unwrap();
        let new = BridgeTokens::new("another-secret-9876543210").unwrap();
        let token = old.issue(&claims()).unwrap();
        assert!(matches!(new.verify(&token), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let tokens = BridgeTokens::new(SECRET).unwrap();
        let token = tokens.issue(&claims()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = TokenClaims {
            sid: "sess-1".into(),
            actor: Some(Actor::new(1, vec!["administrator".into()])),
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_payload, signature);
        assert!(tokens.verify(&forged).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let tokens = BridgeTokens::new(SECRET).unwrap();
        for token in ["", "nodot", "abc.zz", ".", "abc.00"] {
            assert!(matches!(tokens.verify(token), Err(Error::Unauthorized(_))), "{}", token);
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(BridgeTokens::new("short"), Err(Error::Config(_))));
    }

    #[test]
    fn test_session_ids_are_random() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
