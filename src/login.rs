use crate::globus::authorizer::Access;
use crate::globus::{auth, Authorizer};
use crate::token;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const CONSENTS_URL: &str = "https://auth.globus.org/v2/web/consents";

/// Walks the user through the browser login and caches the resulting refresh token.
#[tracing::instrument(err, skip(input, output))]
pub(crate) async fn interactive<R, W>(
    auth: &auth::Client,
    token_file: &Path,
    input: R,
    output: &mut W,
) -> anyhow::Result<Authorizer>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let flow = auth.start_flow(auth::SCOPES)?;
    writeln!(output, "Please go to this URL and login: {}", flow.authorize_url)?;
    write!(output, "Please enter the code you get after login here: ")?;
    output.flush()?;

    let mut line = String::new();
    BufReader::new(input).read_line(&mut line).await?;
    let code = line.trim();
    anyhow::ensure!(!code.is_empty(), "no authorization code entered");

    let token = auth.exchange_code(&flow, code).await?.transfer()?;
    tracing::info!(scope = %token.scope, "logged in");
    let access = Access::new(&token)?;
    let refresh_token = token
        .refresh_token
        .ok_or_else(|| anyhow::format_err!("login did not return a refresh token"))?;

    token::store(token_file, &refresh_token).await?;
    writeln!(
        output,
        "Your refresh token has been written to the file {}",
        token_file.display(),
    )?;
    writeln!(
        output,
        "Note: refresh tokens are lifetime credentials, they should be kept secret. \
         Consents for these credentials are managed at {CONSENTS_URL}",
    )?;

    Ok(Authorizer::refresh_token(
        auth.clone(),
        refresh_token,
        token_file.to_owned(),
        Some(access),
    ))
}
