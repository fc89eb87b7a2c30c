use crate::config::SigningConfig;
use crate::protocol::{CertRenewRequired, CertRenewResponse};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Certificates with less validity left than this are asked to renew.
pub const RENEWAL_WINDOW_DAYS: i64 = 3 * 365;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
const CREDENTIAL_TTL_SECS: i64 = 300;
const CREDENTIAL_SUBJECT: &str = "device-api";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid CSR")]
    InvalidCsr,
    #[error("Missing or invalid token")]
    BadCredential,
    #[error("Missing signing role")]
    MissingRole,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Unknown error")]
    Unknown,
    #[error("Signing credential not configured")]
    NotConfigured,
    /// Error text reported by the signing service itself.
    #[error("{0}")]
    Remote(String),
    #[error("{0}")]
    Transport(String),
}

impl SigningError {
    fn from_response(status: StatusCode, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }
        if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
            return SigningError::Remote(error);
        }
        match status {
            StatusCode::BAD_REQUEST => SigningError::InvalidCsr,
            StatusCode::UNAUTHORIZED => SigningError::BadCredential,
            StatusCode::FORBIDDEN => SigningError::MissingRole,
            StatusCode::BAD_GATEWAY => SigningError::SigningFailed,
            _ => SigningError::Unknown,
        }
    }
}

#[async_trait]
pub trait CertificateSigner: Send + Sync {
    /// Exchanges a PEM CSR for a PEM certificate chain.
    async fn sign(&self, csr_pem: &[u8]) -> Result<Vec<u8>, SigningError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SigningClaims {
    sub: String,
    roles: Vec<String>,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Client of the licensing service's `/v1/pki/sign` endpoint.
pub struct HttpCertificateSigner {
    client: reqwest::Client,
    endpoint: String,
    role: String,
    encoding: Option<EncodingKey>,
}

impl HttpCertificateSigner {
    pub fn new(config: &SigningConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build signing service client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/pki/sign", config.base_url.trim_end_matches('/')),
            role: config.role.clone(),
            encoding: config
                .secret
                .as_deref()
                .filter(|it| !it.is_empty())
                .map(|it| EncodingKey::from_secret(it.as_bytes())),
        })
    }

    fn credential(&self) -> Result<String, SigningError> {
        let encoding = self.encoding.as_ref().ok_or(SigningError::NotConfigured)?;
        let now = Utc::now().timestamp();
        let claims = SigningClaims {
            sub: CREDENTIAL_SUBJECT.to_string(),
            roles: vec![self.role.clone()],
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + CREDENTIAL_TTL_SECS,
        };
        encode(&Header::new(Algorithm::HS256), &claims, encoding)
            .map_err(|err| SigningError::Transport(err.to_string()))
    }
}

#[async_trait]
impl CertificateSigner for HttpCertificateSigner {
    async fn sign(&self, csr_pem: &[u8]) -> Result<Vec<u8>, SigningError> {
        let credential = self.credential()?;
        let form = reqwest::multipart::Form::new()
            .text("csr", String::from_utf8_lossy(csr_pem).into_owned());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .multipart(form)
            .send()
            .await
            .map_err(|err| SigningError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SigningError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(SigningError::from_response(status, &body));
        }
        Ok(body.into_bytes())
    }
}

/// Reason to send with `cert_renew_required`, if the certificate is due.
pub fn renewal_notice(pem: &[u8], now: DateTime<Utc>) -> anyhow::Result<Option<String>> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|err| anyhow!("invalid certificate PEM: {err}"))?;
    let certificate = pem
        .parse_x509()
        .map_err(|err| anyhow!("invalid X.509 certificate: {err}"))?;
    let remaining = certificate.validity().not_after.timestamp() - now.timestamp();
    if remaining >= RENEWAL_WINDOW_DAYS * SECONDS_PER_DAY {
        return Ok(None);
    }
    let days = remaining.div_euclid(SECONDS_PER_DAY);
    Ok(Some(format!("Certificate expires in {days} days")))
}

pub fn handle_cert_report(device_id: &str, pem: &[u8]) -> Option<CertRenewRequired> {
    match renewal_notice(pem, Utc::now()) {
        Ok(Some(reason)) => {
            tracing::info!(device_id, reason = %reason, "certificate renewal required");
            Some(CertRenewRequired { reason })
        }
        Ok(None) => {
            tracing::debug!(device_id, "certificate validity is sufficient");
            None
        }
        Err(err) => {
            tracing::error!(device_id, "failed to parse reported certificate: {:?}", err);
            None
        }
    }
}

/// Never fails: the device always gets exactly one response.
pub async fn handle_cert_renew(
    signer: &dyn CertificateSigner,
    device_id: &str,
    csr_pem: &[u8],
) -> CertRenewResponse {
    tracing::info!(device_id, csr_bytes = csr_pem.len(), "certificate renewal requested");
    match signer.sign(csr_pem).await {
        Ok(device_cert) => {
            tracing::info!(device_id, cert_bytes = device_cert.len(), "certificate signed");
            CertRenewResponse {
                success: true,
                device_cert,
                error: String::new(),
            }
        }
        Err(err) => {
            tracing::error!(device_id, "certificate signing failed: {}", err);
            CertRenewResponse {
                success: false,
                device_cert: Vec::new(),
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    pub(crate) struct StubSigner(pub Result<Vec<u8>, SigningError>);

    #[async_trait]
    impl CertificateSigner for StubSigner {
        async fn sign(&self, _csr_pem: &[u8]) -> Result<Vec<u8>, SigningError> {
            self.0.clone()
        }
    }

    pub(crate) fn certificate_expiring_in(valid_for: time::Duration) -> String {
        let mut params = rcgen::CertificateParams::new(vec!["MATRX-B43A45B0C418".into()]).unwrap();
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(1);
        params.not_after = now + valid_for;
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    fn signing_config(secret: Option<&str>) -> SigningConfig {
        SigningConfig {
            base_url: "http://127.0.0.1:1/".into(),
            secret: secret.map(str::to_string),
            role: "koios-factory".into(),
            timeout_secs: 1,
        }
    }

    #[test]
    fn short_lived_certificate_needs_renewal() {
        let pem = certificate_expiring_in(time::Duration::days(10) + time::Duration::hours(1));
        let notice = renewal_notice(pem.as_bytes(), Utc::now()).unwrap();
        assert_eq!(notice.as_deref(), Some("Certificate expires in 10 days"));
    }

    #[test]
    fn long_lived_certificate_is_left_alone() {
        let pem = certificate_expiring_in(time::Duration::days(5 * 365));
        assert_eq!(renewal_notice(pem.as_bytes(), Utc::now()).unwrap(), None);
        assert!(handle_cert_report("MATRX-1", pem.as_bytes()).is_none());
    }

    #[test]
    fn garbage_certificate_gets_no_reply() {
        assert!(renewal_notice(b"not a certificate", Utc::now()).is_err());
        assert!(handle_cert_report("MATRX-1", b"not a certificate").is_none());
    }

    #[test]
    fn status_codes_map_to_fixed_vocabulary() {
        let cases = [
            (StatusCode::BAD_REQUEST, "Invalid CSR"),
            (StatusCode::UNAUTHORIZED, "Missing or invalid token"),
            (StatusCode::FORBIDDEN, "Missing signing role"),
            (StatusCode::BAD_GATEWAY, "Signing failed"),
            (StatusCode::INTERNAL_SERVER_ERROR, "Unknown error"),
        ];
        for (status, expected) in cases {
            assert_eq!(SigningError::from_response(status, "").to_string(), expected);
        }
        assert_eq!(
            SigningError::from_response(StatusCode::BAD_REQUEST, r#"{"error":"CSR key too small"}"#),
            SigningError::Remote("CSR key too small".into())
        );
    }

    #[test]
    fn credential_is_role_scoped_and_short_lived() {
        let signer = HttpCertificateSigner::new(&signing_config(Some("signing-secret"))).unwrap();
        assert_eq!(signer.endpoint, "http://127.0.0.1:1/v1/pki/sign");
        let token = signer.credential().unwrap();
        let claims = decode::<SigningClaims>(
            &token,
            &DecodingKey::from_secret(b"signing-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims.sub, "device-api");
        assert_eq!(claims.roles, vec!["koios-factory".to_string()]);
        assert_eq!(claims.exp - claims.iat, CREDENTIAL_TTL_SECS);
        assert!(!claims.jti.is_empty());
    }

    #[tokio::test]
    async fn missing_secret_still_answers() {
        let signer = HttpCertificateSigner::new(&signing_config(None)).unwrap();
        let response = handle_cert_renew(&signer, "MATRX-1", b"csr").await;
        assert!(!response.success);
        assert_eq!(response.error, "Signing credential not configured");
        assert!(response.device_cert.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_still_answers() {
        let signer = HttpCertificateSigner::new(&signing_config(Some("signing-secret"))).unwrap();
        let response = handle_cert_renew(&signer, "MATRX-1", b"csr").await;
        assert!(!response.success);
        assert!(!response.error.is_empty());
    }

    #[tokio::test]
    async fn signed_chain_is_returned() {
        let signer = StubSigner(Ok(b"-----BEGIN CERTIFICATE-----".to_vec()));
        let response = handle_cert_renew(&signer, "MATRX-1", b"csr").await;
        assert!(response.success);
        assert_eq!(response.device_cert, b"-----BEGIN CERTIFICATE-----");
        assert!(response.error.is_empty());

        let signer = StubSigner(Err(SigningError::MissingRole));
        let response = handle_cert_renew(&signer, "MATRX-1", b"csr").await;
        assert!(!response.success);
        assert_eq!(response.error, "Missing signing role");
    }
}
