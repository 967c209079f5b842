//! reqwest plumbing shared by the adapters.

use std::time::Duration;

use pruner_torrent_core::{ClientError, ClientResult};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use crate::error::{AdapterError, AdapterResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("pruner/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client for one adapter instance.
pub(crate) fn build_http(client: &str, insecure_tls: bool, cookies: bool) -> AdapterResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .cookie_store(cookies)
        .danger_accept_invalid_certs(insecure_tls)
        .build()
        .map_err(|source| AdapterError::Http {
            client: client.to_string(),
            source,
        })
}

/// Parse `host` as an absolute URL and strip any trailing `/`.
pub(crate) fn normalise_host(client: &str, host: &str) -> AdapterResult<String> {
    let trimmed = host.trim();
    let invalid = |reason: String| AdapterError::InvalidHost {
        client: client.to_string(),
        host: host.to_string(),
        reason,
    };
    if trimmed.is_empty() {
        return Err(invalid("host is required".to_string()));
    }
    let url = Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Decode the untyped `config:` map; a missing map decodes as empty.
pub(crate) fn decode_settings<T: DeserializeOwned>(
    client: &str,
    value: &serde_yaml::Value,
) -> AdapterResult<T> {
    let value = if value.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        value.clone()
    };
    serde_yaml::from_value(value).map_err(|source| AdapterError::InvalidSettings {
        client: client.to_string(),
        source,
    })
}

/// Map a transport failure onto [`ClientError::Request`].
pub(crate) fn transport(operation: &'static str) -> impl FnOnce(reqwest::Error) -> ClientError {
    move |err| ClientError::request(operation, err)
}

/// Pass successful responses through; turn anything else into
/// [`ClientError::Rejected`] carrying the response body.
pub(crate) async fn ensure_success(
    operation: &'static str,
    response: Response,
) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Rejected {
        operation,
        status: status.as_u16(),
        message: if message.trim().is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            message.trim().to_string()
        },
    })
}

/// Decode a JSON body, reporting failures as [`ClientError::InvalidResponse`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> ClientResult<T> {
    let body = response.bytes().await.map_err(transport(operation))?;
    serde_json::from_slice(&body).map_err(|err| ClientError::InvalidResponse {
        operation,
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_are_normalised() {
        assert_eq!(
            normalise_host("qb", "http://127.0.0.1:8080/").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert_eq!(
            normalise_host("qb", " https://seedbox.example/qbt/ ").unwrap(),
            "https://seedbox.example/qbt"
        );
    }

    #[test]
    fn unusable_hosts_are_rejected() {
        for host in ["", "127.0.0.1:8080", "ftp://example.org"] {
            assert!(
                matches!(
                    normalise_host("qb", host),
                    Err(AdapterError::InvalidHost { .. })
                ),
                "{host:?} was accepted"
            );
        }
    }

    #[test]
    fn null_settings_decode_as_empty() {
        #[derive(serde::Deserialize)]
        struct HostOnly {
            #[serde(default)]
            host: String,
        }
        let settings: HostOnly = decode_settings("qb", &serde_yaml::Value::Null).unwrap();
        assert!(settings.host.is_empty());
    }
}
