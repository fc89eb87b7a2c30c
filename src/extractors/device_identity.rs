use crate::common::GatewayError;
use crate::models::DeviceFamily;
use crate::state::AppState;
use crate::utils::decode_uri;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use regex::Regex;
use std::sync::LazyLock;

pub const COMMON_NAME_HEADER: &str = "x-common-name";
pub const CLIENT_CERT_INFO_HEADER: &str = "x-forwarded-tls-client-cert-info";

static COMMON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CN=([a-zA-Z0-9_-]*)").expect("valid common name pattern"));

/// Device identity asserted by the TLS terminating proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub family: DeviceFamily,
}

impl DeviceIdentity {
    pub fn resolve(
        headers: &HeaderMap,
        debug_identity: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let device_id = match debug_identity {
            Some(identity) => identity.to_string(),
            None => common_name(headers)?.ok_or(GatewayError::IdentityMissing)?,
        };
        let family = DeviceFamily::from_identity(&device_id)?;
        Ok(Self { device_id, family })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<Option<String>, GatewayError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| GatewayError::MalformedIdentity(format!("{name} is not valid text")))?;
    decode_uri(value)
        .map(Some)
        .map_err(|err| GatewayError::MalformedIdentity(format!("{name}: {err}")))
}

fn common_name(headers: &HeaderMap) -> Result<Option<String>, GatewayError> {
    if let Some(name) = header_value(headers, COMMON_NAME_HEADER)? {
        let name = name.trim();
        if !name.is_empty() {
            return Ok(Some(name.to_string()));
        }
    }
    let Some(cert_info) = header_value(headers, CLIENT_CERT_INFO_HEADER)? else {
        return Ok(None);
    };
    Ok(COMMON_NAME
        .captures(&cert_info)
        .and_then(|captures| captures.get(1))
        .map(|it| it.as_str().to_string())
        .filter(|it| !it.is_empty()))
}

impl<S> FromRequestParts<S> for DeviceIdentity
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Self::resolve(&parts.headers, state.config.debug_identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn common_name_header_wins() {
        let identity = DeviceIdentity::resolve(
            &headers(&[
                (COMMON_NAME_HEADER, "MATRX-B43A45B0C418"),
                (CLIENT_CERT_INFO_HEADER, "Subject%3D%22CN%3DLANTERN-1%22"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(identity.device_id, "MATRX-B43A45B0C418");
        assert_eq!(identity.family, DeviceFamily::Matrx);
    }

    #[test]
    fn common_name_is_extracted_from_cert_info() {
        let identity = DeviceIdentity::resolve(
            &headers(&[(
                CLIENT_CERT_INFO_HEADER,
                "Subject%3D%22C%3DUS%2CO%3DKoios%2CCN%3DLANTERN-00AA11BB%22%3BIssuer%3D%22CN%3DKoios%20CA%22",
            )]),
            None,
        )
        .unwrap();
        assert_eq!(identity.device_id, "LANTERN-00AA11BB");
        assert_eq!(identity.family, DeviceFamily::Lantern);
    }

    #[test]
    fn debug_identity_overrides_headers() {
        let identity = DeviceIdentity::resolve(
            &headers(&[(COMMON_NAME_HEADER, "LANTERN-1")]),
            Some("MATRX-B43A45B0C418"),
        )
        .unwrap();
        assert_eq!(identity.device_id, "MATRX-B43A45B0C418");
    }

    #[test]
    fn missing_or_unknown_identity_is_refused() {
        assert!(matches!(
            DeviceIdentity::resolve(&HeaderMap::new(), None),
            Err(GatewayError::IdentityMissing)
        ));
        assert!(matches!(
            DeviceIdentity::resolve(&headers(&[(CLIENT_CERT_INFO_HEADER, "O%3DKoios")]), None),
            Err(GatewayError::IdentityMissing)
        ));
        assert!(matches!(
            DeviceIdentity::resolve(&headers(&[(COMMON_NAME_HEADER, "TOASTER-1")]), None),
            Err(GatewayError::UnknownFamily(_))
        ));
        assert!(matches!(
            DeviceIdentity::resolve(&headers(&[(COMMON_NAME_HEADER, "MATRX%ZZ")]), None),
            Err(GatewayError::MalformedIdentity(_))
        ));
    }
}
