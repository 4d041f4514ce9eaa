pub(crate) mod auth;
pub(crate) mod authorizer;
pub(crate) mod transfer;

use crate::misc;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::error;
use std::time::Duration;

pub(crate) use authorizer::Authorizer;

#[derive(Clone, Debug, thiserror::Error)]
#[error("[{status:?}] {code}: {message}")]
pub(crate) struct Error {
    pub(crate) status: StatusCode,
    pub(crate) code: String,
    pub(crate) message: String,
}

impl Error {
    // Transfer reports `code`/`message`, Auth reports OAuth style `error`/`error_description`
    fn new(status: StatusCode, body: &Bytes) -> Self {
        #[derive(Deserialize)]
        struct B {
            code: Option<String>,
            message: Option<String>,
            error: Option<String>,
            error_description: Option<String>,
        }

        match serde_json::from_slice::<B>(body) {
            Ok(b) => Self {
                status,
                code: b.code.or(b.error).unwrap_or_else(|| status.to_string()),
                message: b
                    .message
                    .or(b.error_description)
                    .unwrap_or_else(|| format!("{body:?}")),
            },
            Err(_) => Self {
                status,
                code: status.to_string(),
                message: format!("{body:?}"),
            },
        }
    }

    // the request itself was refused, retrying it unchanged will not help
    pub(crate) fn is_unauthorized(&self) -> bool {
        matches!(
            self.status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        )
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("request timed out after {0:?}")]
pub(crate) struct Timeout(pub(crate) Duration);

pub(crate) type Body = UnsyncBoxBody<Bytes, Box<dyn error::Error + Send + Sync>>;

pub(crate) fn empty() -> Body {
    Empty::new().map_err(Box::from).boxed_unsync()
}

pub(crate) fn full<B>(body: B) -> Body
where
    Bytes: From<B>,
{
    Full::new(Bytes::from(body)).map_err(Box::from).boxed_unsync()
}

#[tracing::instrument(
    err,
    skip_all,
    fields(method = %request.method(), uri = %request.uri()),
)]
pub(crate) async fn send<T>(
    client: &misc::Client,
    request: http::Request<Body>,
    timeout: Duration,
) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let (parts, body) = tokio::time::timeout(timeout, async {
        let response = client.request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        anyhow::Ok((parts, body))
    })
    .await
    .map_err(|_| Timeout(timeout))??;
    tracing::debug!(status = ?parts.status, len = body.len());
    if parts.status.is_success() {
        Ok(serde_json::from_slice(&body)?)
    } else {
        Err(Error::new(parts.status, &body).into())
    }
}

pub(crate) fn secret<'de, D>(deserializer: D) -> Result<secrecy::SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(secrecy::SecretString::from)
}

pub(crate) fn secret_opt<'de, D>(deserializer: D) -> Result<Option<secrecy::SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(secrecy::SecretString::from))
}
