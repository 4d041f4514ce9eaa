use super::auth;
use crate::token;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;

// refresh a little ahead of expiry so that a token does not lapse mid-request
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug)]
pub(crate) enum Authorizer {
    AccessToken(SecretString),
    RefreshToken {
        auth: auth::Client,
        refresh_token: SecretString,
        token_file: PathBuf,
        access: Option<Access>,
    },
}

#[derive(Debug)]
pub(crate) struct Access {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl Access {
    pub(crate) fn new(token: &auth::Token) -> anyhow::Result<Self> {
        let expires_at = TimeDelta::try_seconds(token.expires_in)
            .and_then(|expires_in| Utc::now().checked_add_signed(expires_in))
            .ok_or_else(|| anyhow::format_err!("invalid expires_in: {}", token.expires_in))?;
        Ok(Self {
            token: SecretString::from(token.access_token.expose_secret().to_owned()),
            expires_at,
        })
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > TimeDelta::seconds(EXPIRY_MARGIN_SECS)
    }
}

impl Authorizer {
    pub(crate) fn refresh_token(
        auth: auth::Client,
        refresh_token: SecretString,
        token_file: PathBuf,
        access: Option<Access>,
    ) -> Self {
        Self::RefreshToken {
            auth,
            refresh_token,
            token_file,
            access,
        }
    }

    #[tracing::instrument(err, skip(self))]
    pub(crate) async fn ensure_valid(&mut self) -> anyhow::Result<()> {
        match self {
            Self::AccessToken(_) => Ok(()),
            Self::RefreshToken {
                auth,
                refresh_token,
                token_file,
                access,
            } => {
                if access
                    .as_ref()
                    .is_some_and(|access| access.is_fresh(Utc::now()))
                {
                    return Ok(());
                }
                let refreshed = auth.refresh(refresh_token).await?.transfer()?;
                tracing::info!(expires_in = refreshed.expires_in, "refreshed access token");
                *access = Some(Access::new(&refreshed)?);
                if let Some(rotated) = refreshed.refresh_token {
                    if rotated.expose_secret() != refresh_token.expose_secret() {
                        token::store(token_file, &rotated).await?;
                        tracing::info!(path = %token_file.display(), "stored rotated refresh token");
                        *refresh_token = rotated;
                    }
                }
                Ok(())
            }
        }
    }

    pub(crate) async fn authorization(
        &mut self,
    ) -> anyhow::Result<headers::Authorization<headers::authorization::Bearer>> {
        self.ensure_valid().await?;
        let token = match &*self {
            Self::AccessToken(token) => token,
            Self::RefreshToken { access, .. } => {
                &access
                    .as_ref()
                    .ok_or_else(|| anyhow::format_err!("missing access token"))?
                    .token
            }
        };
        Ok(headers::Authorization::bearer(token.expose_secret())?)
    }
}
