
use crate::globus::transfer::{self, FileEntry, SyncLevel, Task, TaskStatus, TransferDocument};
use crate::globus::{self, auth, Authorizer};
use crate::request::{self, DataType, SyncRequest};
use crate::{endpoint, login, logs, misc, token};
use anyhow::Context;
use backoff::ExponentialBackoff;
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use secrecy::SecretString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncRead;
use url::Url;

// registered at https://app.globus.org/settings/developers
const CLIENT_ID: &str = "84d0b918-f49a-4136-a115-4206dafeba8a";
const LS_ATTEMPTS: usize = 15;
const ACTIVITY_URL: &str = "https://app.globus.org/activity";

const EXAMPLES: &str = "\
Examples:
  superdarn-sync /home/username/current_month_rawacfs/
  superdarn-sync -y 2016 -m 05 /home/username/201605_rawacfs/
  superdarn-sync -y 2004 -m 02 -t dat /home/username/200402_dat_files/
  superdarn-sync -y 2014 -m 12 -p '20141201*sas' /home/username/20141201_sas_rawacfs/
  superdarn-sync -p rkn /home/username/cur_month_rkn_rawacfs/
  superdarn-sync -y 2004 -m 02 -t dat -p 20040212 /home/username/20040212_dat_files/";

#[derive(Parser)]
#[clap(
    version,
    about = "Sync a year, month and data type of SuperDARN data from the Globus mirror to a directory on your endpoint",
    after_help = EXAMPLES,
)]
pub struct Args {
    /// Year to sync, defaults to the current year
    #[clap(short = 'y', long)]
    sync_year: Option<i32>,
    /// Month to sync, defaults to the current month
    #[clap(short = 'm', long)]
    sync_month: Option<u32>,
    /// File name pattern, e.g. `20180101`, `ade` or `20160503*kod.c`
    #[clap(short = 'p', long, default_value = "*")]
    sync_pattern: String,
    #[clap(short = 't', long, value_enum, default_value_t = DataType::Raw)]
    data_type: DataType,
    /// Path on the destination endpoint to sync data to
    sync_local_dir: String,

    #[clap(long, default_value = CLIENT_ID)]
    client_id: String,
    /// Authenticate as a confidential client instead of logging in
    #[clap(long, env = "GLOBUS_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
    /// Refresh token cache, defaults to ~/.globus_transfer_rt
    #[clap(long)]
    token_file: Option<PathBuf>,
    /// Fail instead of prompting for a login
    #[clap(long)]
    no_login: bool,

    /// Mirror endpoint id, searched for by default
    #[clap(long)]
    source_endpoint: Option<String>,
    /// Destination endpoint id, defaults to the local Globus Connect Personal endpoint
    #[clap(long)]
    destination_endpoint: Option<String>,
    /// Globus Connect Personal client id file, defaults to ~/.globusonline/lta/client-id.txt
    #[clap(long)]
    client_id_file: Option<PathBuf>,
    /// Some mirrors need this to be `~/chroot/sddata`
    #[clap(long, default_value = request::MIRROR_ROOT)]
    mirror_root: String,

    #[clap(long, value_enum, default_value_t = SyncLevel::Checksum)]
    sync_level: SyncLevel,
    #[clap(long)]
    notify_on_succeeded: bool,
    #[clap(long)]
    no_notify_on_failed: bool,

    /// Seconds to wait for the transfer per file. The transfer itself is not affected.
    #[clap(long, default_value_t = 30)]
    per_file_timeout: u64,
    /// Seconds between transfer status checks
    #[clap(long, default_value_t = 30)]
    poll_interval: u64,
    /// Seconds before an API request is abandoned
    #[clap(long, default_value_t = 60)]
    request_timeout: u64,

    #[clap(long, default_value = auth::BASE_URL, hide = true)]
    auth_url: Url,
    #[clap(long, default_value = transfer::BASE_URL, hide = true)]
    transfer_url: Url,

    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug)]
pub(crate) enum Outcome {
    NothingToTransfer,
    Submitted {
        task_id: String,
        task: Option<Task>,
    },
}

pub async fn main(args: Args) -> anyhow::Result<()> {
    logs::init(args.verbose)?;
    let today = chrono::Local::now().date_naive();
    let outcome = run(args, misc::client()?, today, tokio::io::stdin(), &mut io::stdout()).await?;
    if let Outcome::Submitted { task_id, task } = outcome {
        tracing::info!(%task_id, status = ?task.map(|task| task.status), "done");
    }
    Ok(())
}

pub(crate) async fn run<R, W>(
    args: Args,
    http: misc::Client,
    today: NaiveDate,
    input: R,
    output: &mut W,
) -> anyhow::Result<Outcome>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let request = SyncRequest {
        year: args.sync_year.unwrap_or(today.year()),
        month: args.sync_month.unwrap_or(today.month()),
        pattern: args.sync_pattern.clone(),
        data_type: args.data_type,
        local_dir: args.sync_local_dir.clone(),
    };
    request.validate(today)?;

    let timeout = Duration::from_secs(args.request_timeout);
    let auth = auth::Client::new(http.clone(), args.auth_url.clone(), &args.client_id, timeout);
    let token_file = match &args.token_file {
        Some(path) => path.clone(),
        None => token::default_path()?,
    };
    let authorizer = authorizer(&args, &auth, &token_file, input, output).await?;
    let client = transfer::Client::new(http, args.transfer_url.clone(), authorizer, timeout);

    let source = match &args.source_endpoint {
        Some(id) => id.clone(),
        None => endpoint::superdarn_mirror(&client).await?,
    };
    let destination = match &args.destination_endpoint {
        Some(id) => id.clone(),
        None => {
            let path = match &args.client_id_file {
                Some(path) => path.clone(),
                None => endpoint::default_client_id_path()?,
            };
            endpoint::personal(&client, &path).await?
        }
    };

    let path = request.listing_path(&args.mirror_root);
    let filter = request.listing_filter();
    writeln!(
        output,
        "Listing path: {path} on endpoint: {source} with pattern: {filter}"
    )?;
    writeln!(output, "Note: This can take several minutes")?;
    let entries = list(&client, &source, &path, &filter, listing_backoff(), output).await?;
    let files = entries
        .iter()
        .filter(|entry| entry.kind == "file")
        .collect::<Vec<_>>();

    if files.is_empty() {
        writeln!(output, "No files matched, nothing to transfer.")?;
        return Ok(Outcome::NothingToTransfer);
    }

    let size = files.iter().map(|entry| entry.size).sum::<u64>();
    let soft_timeout =
        Duration::from_secs(args.per_file_timeout.saturating_mul(files.len() as u64));
    writeln!(
        output,
        "Transferring {} files ({}) with a soft timeout of {} s.",
        files.len(),
        humansize::format_size(size, humansize::BINARY),
        soft_timeout.as_secs(),
    )?;

    let mut document = TransferDocument::new(
        client.submission_id().await?,
        source,
        destination,
        request.items(&args.mirror_root, files.iter().map(|entry| entry.name.as_str())),
    );
    document.sync_level = args.sync_level;
    document.notify_on_succeeded = args.notify_on_succeeded;
    document.notify_on_failed = !args.no_notify_on_failed;
    let result = client.submit_transfer(&document).await?;
    tracing::info!(code = %result.code, message = %result.message, "submitted");

    let task = client
        .task_wait(
            &result.task_id,
            soft_timeout,
            Duration::from_secs(args.poll_interval),
        )
        .await?;
    match &task {
        Some(task) => {
            writeln!(
                output,
                "Transfer finished: {:?}, {} of {} files transferred, {} skipped ({})",
                task.status,
                task.files_transferred,
                task.files,
                task.files_skipped,
                humansize::format_size(task.bytes_transferred, humansize::BINARY),
            )?;
            anyhow::ensure!(
                task.status != TaskStatus::Failed,
                "transfer task {} failed, see {ACTIVITY_URL}",
                task.task_id,
            );
        }
        None => writeln!(
            output,
            "Transfer didn't complete yet but may still be running. \
             Please check {ACTIVITY_URL} if you want to check status of transfer",
        )?,
    }

    Ok(Outcome::Submitted {
        task_id: result.task_id,
        task,
    })
}

async fn authorizer<R, W>(
    args: &Args,
    auth: &auth::Client,
    token_file: &Path,
    input: R,
    output: &mut W,
) -> anyhow::Result<Authorizer>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    if let Some(refresh_token) = token::load(token_file).await? {
        let mut authorizer = Authorizer::refresh_token(auth.clone(), refresh_token, token_file.to_owned(), None);
        match authorizer.ensure_valid().await {
            Ok(()) => return Ok(authorizer),
            Err(e)
                if e
                    .downcast_ref::<globus::Error>()
                    .is_some_and(globus::Error::is_unauthorized) =>
            {
                tracing::warn!(error = %e, "cached refresh token rejected");
                if args.no_login {
                    return Err(e.context(format!(
                        "the cached refresh token was rejected, delete {} and log in again",
                        token_file.display(),
                    )));
                }
                writeln!(
                    output,
                    "The cached refresh token in {} was rejected, logging in again.",
                    token_file.display(),
                )?;
            }
            Err(e) => return Err(e),
        }
    } else if let Some(client_secret) = &args.client_secret {
        let token = auth
            .client_credentials(
                &SecretString::from(client_secret.clone()),
                &[auth::TRANSFER_SCOPE],
            )
            .await?
            .transfer()?;
        return Ok(Authorizer::AccessToken(token.access_token));
    }

    anyhow::ensure!(
        !args.no_login,
        "no usable refresh token in {}, run once without --no-login to log in",
        token_file.display(),
    );
    login::interactive(auth, token_file, input, output).await
}

fn listing_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

// any answer from the API or a timeout, not local failures such as a bad response body
fn is_retryable(e: &anyhow::Error) -> bool {
    e.is::<globus::Timeout>() || e.is::<globus::Error>()
}

async fn list<W>(
    client: &transfer::Client,
    endpoint: &str,
    path: &str,
    filter: &str,
    backoff: ExponentialBackoff,
    output: &mut W,
) -> anyhow::Result<Vec<FileEntry>>
where
    W: Write,
{
    let mut attempts = 0;
    let entries = backoff::future::retry(backoff, || {
        attempts += 1;
        let attempt = attempts;
        if let Err(e) = write!(output, ".").and_then(|()| output.flush()) {
            tracing::debug!(error = %e, "failed to print progress");
        }
        async move {
            client
                .operation_ls(endpoint, path, filter)
                .await
                .map_err(|e| {
                    if attempt < LS_ATTEMPTS && is_retryable(&e) {
                        tracing::warn!(attempt, error = %e, "listing failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
        }
    })
    .await;
    writeln!(output)?;
    entries.with_context(|| format!("Listing failed after {attempts} attempts"))
}
