// https://docs.globus.org/api/auth/reference/


use crate::misc;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use headers::HeaderMapExt;
use http::{header, Request};
use rand::distributions::{Alphanumeric, DistString};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

pub(crate) const BASE_URL: &str = "https://auth.globus.org/";
pub(crate) const TRANSFER_RESOURCE_SERVER: &str = "transfer.api.globus.org";
pub(crate) const TRANSFER_SCOPE: &str = "urn:globus:auth:scope:transfer.api.globus.org:all";
pub(crate) const SCOPES: &[&str] = &["openid", "email", TRANSFER_SCOPE];
// the page that displays the authorization code for the user to paste back
const REDIRECT_URI: &str = "https://auth.globus.org/v2/web/auth-code";

#[derive(Clone)]
pub(crate) struct Client {
    http: misc::Client,
    base: Url,
    client_id: String,
    timeout: Duration,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("base", &self.base.as_str())
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct NativeAppFlow {
    pub(crate) authorize_url: Url,
    verifier: SecretString,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(flatten)]
    token: Token,
    #[serde(default)]
    other_tokens: Vec<Token>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Token {
    pub(crate) resource_server: String,
    #[serde(deserialize_with = "super::secret")]
    pub(crate) access_token: SecretString,
    #[serde(default, deserialize_with = "super::secret_opt")]
    pub(crate) refresh_token: Option<SecretString>,
    pub(crate) expires_in: i64,
    #[serde(default)]
    pub(crate) scope: String,
}

impl TokenResponse {
    pub(crate) fn by_resource_server(self) -> HashMap<String, Token> {
        std::iter::once(self.token)
            .chain(self.other_tokens)
            .map(|token| (token.resource_server.clone(), token))
            .collect()
    }

    pub(crate) fn transfer(self) -> anyhow::Result<Token> {
        self.by_resource_server()
            .remove(TRANSFER_RESOURCE_SERVER)
            .ok_or_else(|| anyhow::format_err!("missing {TRANSFER_RESOURCE_SERVER} token"))
    }
}

impl Client {
    pub(crate) fn new(
        http: misc::Client,
        base: Url,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base,
            client_id: client_id.into(),
            timeout,
        }
    }

    pub(crate) fn start_flow(&self, scopes: &[&str]) -> anyhow::Result<NativeAppFlow> {
        let verifier =
            SecretString::from(Alphanumeric.sample_string(&mut rand::thread_rng(), 64));
        let challenge = challenge(&verifier);

        let mut authorize_url = self.base.clone();
        misc::path_segments_mut(&mut authorize_url)?
            .push("v2")
            .push("oauth2")
            .push("authorize");
        authorize_url
            .query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", REDIRECT_URI)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", "_default")
            .append_pair("response_type", "code")
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline");

        Ok(NativeAppFlow {
            authorize_url,
            verifier,
        })
    }

    #[tracing::instrument(err, skip(flow, code))]
    pub(crate) async fn exchange_code(
        &self,
        flow: &NativeAppFlow,
        code: &str,
    ) -> anyhow::Result<TokenResponse> {
        self.token(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", REDIRECT_URI),
                ("client_id", &self.client_id),
                ("code_verifier", flow.verifier.expose_secret()),
            ],
            None,
        )
        .await
    }

    #[tracing::instrument(err, skip(refresh_token))]
    pub(crate) async fn refresh(&self, refresh_token: &SecretString) -> anyhow::Result<TokenResponse> {
        self.token(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_id", &self.client_id),
            ],
            None,
        )
        .await
    }

    #[tracing::instrument(err, skip(client_secret))]
    pub(crate) async fn client_credentials(
        &self,
        client_secret: &SecretString,
        scopes: &[&str],
    ) -> anyhow::Result<TokenResponse> {
        self.token(
            &[
                ("grant_type", "client_credentials"),
                ("scope", &scopes.join(" ")),
            ],
            Some(headers::Authorization::basic(
                &self.client_id,
                client_secret.expose_secret(),
            )),
        )
        .await
    }

    async fn token(
        &self,
        form: &[(&str, &str)],
        authorization: Option<headers::Authorization<headers::authorization::Basic>>,
    ) -> anyhow::Result<TokenResponse> {
        let mut url = self.base.clone();
        misc::path_segments_mut(&mut url)?
            .push("v2")
            .push("oauth2")
            .push("token");
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        let mut builder = Request::post(url.as_str())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let (Some(headers), Some(authorization)) = (builder.headers_mut(), authorization) {
            headers.typed_insert(authorization);
        }
        let request = builder.body(super::full(body))?;
        super::send(&self.http, request, self.timeout).await
    }
}

fn challenge(verifier: &SecretString) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.expose_secret().as_bytes()))
}
