use secrecy::{ExposeSecret, SecretString};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub(crate) const FILE_NAME: &str = ".globus_transfer_rt";

pub(crate) fn default_path() -> anyhow::Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::format_err!("missing home directory"))?
        .join(FILE_NAME))
}

/// Reads the cached refresh token, if any. Only the first line counts.
#[tracing::instrument(err)]
pub(crate) async fn load(path: &Path) -> anyhow::Result<Option<SecretString>> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let token = contents.lines().next().unwrap_or_default().trim();
            if token.is_empty() {
                tracing::warn!("ignoring empty refresh token file");
                Ok(None)
            } else {
                Ok(Some(SecretString::from(token.to_owned())))
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replaces the cached refresh token with an owner-only file.
#[tracing::instrument(err, skip(token))]
pub(crate) async fn store(path: &Path, token: &SecretString) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).await?;

    let temp = tempfile::Builder::new()
        .prefix(FILE_NAME)
        .tempfile_in(parent)?;
    let mut file = fs::File::from_std(temp.reopen()?);
    file.write_all(token.expose_secret().as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    let temp_path = temp.into_temp_path();
    fs::rename(&temp_path, path).await?;
    temp_path.keep()?;
    Ok(())
}
