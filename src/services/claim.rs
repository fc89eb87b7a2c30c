use crate::models::ClaimOutcome;
use crate::protocol::JoinResponse;
use crate::store::DeviceStore;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct ClaimTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    exp: i64,
}

impl ClaimTokenClaims {
    fn into_user_id(self) -> Option<String> {
        self.sub
            .filter(|it| !it.is_empty())
            .or(self.user_id.filter(|it| !it.is_empty()))
    }
}

/// Checks claim tokens presented by devices.
pub struct ClaimVerifier {
    decoding: Option<DecodingKey>,
}

impl ClaimVerifier {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            decoding: secret
                .filter(|it| !it.is_empty())
                .map(|it| DecodingKey::from_secret(it.as_bytes())),
        }
    }

    /// Returns the user id carried by a valid token.
    pub fn verify(&self, token: &[u8]) -> Option<String> {
        let Some(decoding) = &self.decoding else {
            tracing::warn!("claim secret is not configured, rejecting claim token");
            return None;
        };
        let token = std::str::from_utf8(token).ok()?.trim();
        if token.is_empty() {
            return None;
        }
        let validation = Validation::new(Algorithm::HS256);
        match decode::<ClaimTokenClaims>(token, decoding, &validation) {
            Ok(data) => data.claims.into_user_id(),
            Err(err) => {
                tracing::debug!("claim token rejected: {}", err);
                None
            }
        }
    }
}

/// Binds the device to the user named by `token`.
///
/// Always answers with a join response; `success` is false when the token is
/// invalid or the ownership change could not be stored.
pub async fn claim_device(
    store: &dyn DeviceStore,
    verifier: &ClaimVerifier,
    device_id: &str,
    token: &[u8],
) -> JoinResponse {
    let Some(user_id) = verifier.verify(token) else {
        tracing::warn!(device_id, "claim rejected: invalid token");
        return JoinResponse::new(false, false);
    };
    match store.claim_owner(device_id, &user_id).await {
        Ok(ClaimOutcome::AlreadyOwned) => {
            tracing::info!(device_id, user_id = %user_id, "device already owned by claimant");
            JoinResponse::new(true, true)
        }
        Ok(ClaimOutcome::Transferred) => {
            tracing::info!(device_id, user_id = %user_id, "device claimed");
            JoinResponse::new(true, true)
        }
        Err(err) => {
            tracing::error!(device_id, user_id = %user_id, "failed to store claim: {}", err);
            JoinResponse::new(false, false)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ClaimType, DeviceFamily};
    use crate::store::SqliteDeviceStore;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "claim-secret";
    const DEVICE: &str = "MATRX-B43A45B0C418";
    const CLAIM_TOKEN_TTL_SECS: i64 = 600;

    /// Mints tokens the way the account service hands them to users.
    pub(crate) struct ClaimTokenIssuer {
        encoding: EncodingKey,
    }

    impl ClaimTokenIssuer {
        pub(crate) fn new(secret: &str) -> Self {
            Self {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
            }
        }

        pub(crate) fn issue(&self, user_id: &str) -> anyhow::Result<String> {
            let now = chrono::Utc::now().timestamp();
            let claims = ClaimTokenClaims {
                sub: Some(user_id.to_string()),
                user_id: None,
                iat: Some(now),
                exp: now + CLAIM_TOKEN_TTL_SECS,
            };
            Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
        }
    }

    #[test]
    fn token_without_issued_at_is_accepted() {
        let exp = chrono::Utc::now().timestamp() + CLAIM_TOKEN_TTL_SECS;
        let token = token_with(serde_json::json!({ "sub": "user-3", "exp": exp }), SECRET);
        let verifier = ClaimVerifier::new(Some(SECRET));
        assert_eq!(verifier.verify(token.as_bytes()), Some("user-3".into()));
    }

    fn token_with(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_round_trips() {
        let token = ClaimTokenIssuer::new(SECRET).issue("user-1").unwrap();
        let verifier = ClaimVerifier::new(Some(SECRET));
        assert_eq!(verifier.verify(token.as_bytes()), Some("user-1".into()));
        let padded = format!("  {token}\n");
        assert_eq!(verifier.verify(padded.as_bytes()), Some("user-1".into()));
    }

    #[test]
    fn user_id_claim_is_accepted_as_fallback() {
        let exp = chrono::Utc::now().timestamp() + 60;
        let token = token_with(serde_json::json!({ "user_id": "user-2", "exp": exp }), SECRET);
        let verifier = ClaimVerifier::new(Some(SECRET));
        assert_eq!(verifier.verify(token.as_bytes()), Some("user-2".into()));
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        let verifier = ClaimVerifier::new(Some(SECRET));
        assert_eq!(verifier.verify(b""), None);
        assert_eq!(verifier.verify(b"   "), None);
        assert_eq!(verifier.verify(&[0xff, 0xfe]), None);
        assert_eq!(verifier.verify(b"not.a.jwt"), None);

        let foreign = ClaimTokenIssuer::new("other-secret").issue("user-1").unwrap();
        assert_eq!(verifier.verify(foreign.as_bytes()), None);

        let expired = token_with(
            serde_json::json!({ "sub": "user-1", "exp": chrono::Utc::now().timestamp() - 3600 }),
            SECRET,
        );
        assert_eq!(verifier.verify(expired.as_bytes()), None);

        let token = ClaimTokenIssuer::new(SECRET).issue("user-1").unwrap();
        assert_eq!(ClaimVerifier::new(None).verify(token.as_bytes()), None);
    }

    #[tokio::test]
    async fn claim_is_idempotent_for_current_owner() {
        let store = SqliteDeviceStore::connect_in_memory().await;
        store.upsert_device(DEVICE, DeviceFamily::Matrx).await.unwrap();
        let verifier = ClaimVerifier::new(Some(SECRET));
        let token = ClaimTokenIssuer::new(SECRET).issue("alice").unwrap();

        let first = claim_device(&store, &verifier, DEVICE, token.as_bytes()).await;
        store.insert_installation(DEVICE, "clock", 0).await;
        let second = claim_device(&store, &verifier, DEVICE, token.as_bytes()).await;

        assert_eq!(first, JoinResponse::new(true, true));
        assert_eq!(second, JoinResponse::new(true, true));
        assert_eq!(store.list_installations(DEVICE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_by_other_user_transfers_ownership() {
        let store = SqliteDeviceStore::connect_in_memory().await;
        store.upsert_device(DEVICE, DeviceFamily::Matrx).await.unwrap();
        let verifier = ClaimVerifier::new(Some(SECRET));
        let issuer = ClaimTokenIssuer::new(SECRET);

        let alice = issuer.issue("alice").unwrap();
        claim_device(&store, &verifier, DEVICE, alice.as_bytes()).await;
        store.insert_installation(DEVICE, "clock", 0).await;

        let bob = issuer.issue("bob").unwrap();
        let reply = claim_device(&store, &verifier, DEVICE, bob.as_bytes()).await;
        assert!(reply.success);

        let claims = store.list_claims(DEVICE).await;
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].user_id, "bob");
        assert_eq!(claims[0].claim_type, ClaimType::Owner);
        assert!(store.list_installations(DEVICE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_token_reports_failure_without_mutation() {
        let store = SqliteDeviceStore::connect_in_memory().await;
        store.upsert_device(DEVICE, DeviceFamily::Matrx).await.unwrap();
        let verifier = ClaimVerifier::new(Some(SECRET));

        let reply = claim_device(&store, &verifier, DEVICE, b"garbage").await;
        assert_eq!(reply, JoinResponse::new(false, false));
        assert!(store.list_claims(DEVICE).await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_reports_failure() {
        let store = SqliteDeviceStore::connect_in_memory().await;
        let verifier = ClaimVerifier::new(Some(SECRET));
        let token = ClaimTokenIssuer::new(SECRET).issue("alice").unwrap();
        // unknown device violates the claim's foreign key
        let reply = claim_device(&store, &verifier, "MATRX-MISSING", token.as_bytes()).await;
        assert!(!reply.success);
        assert!(!reply.is_claimed);
    }
}
