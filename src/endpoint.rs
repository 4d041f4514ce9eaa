use crate::globus::transfer::{self, EndpointSearch};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const MIRROR_SEARCH: &str = "SuperDARN mirror";
const MIRROR_CONTACT: &str = "kevin.krieger@usask.ca";
const GCP_SCOPE: &str = "my-gcp-endpoints";

// written by Globus Connect Personal on Linux, other platforms keep it elsewhere
pub(crate) fn default_client_id_path() -> anyhow::Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::format_err!("missing home directory"))?
        .join(".globusonline")
        .join("lta")
        .join("client-id.txt"))
}

#[tracing::instrument(err, ret, skip(client))]
pub(crate) async fn superdarn_mirror(client: &transfer::Client) -> anyhow::Result<String> {
    client
        .endpoint_search(EndpointSearch::Fulltext(MIRROR_SEARCH))
        .await?
        .into_iter()
        .find(|endpoint| {
            endpoint
                .contact_email
                .as_deref()
                .is_some_and(|email| email.contains(MIRROR_CONTACT))
                && endpoint
                    .description
                    .as_deref()
                    .is_some_and(|description| description.contains("Official"))
        })
        .map(|endpoint| endpoint.id)
        .ok_or_else(|| anyhow::format_err!("No endpoint found for SuperDARN mirror"))
}

/// The Globus Connect Personal endpoint running on this machine, falling back to
/// the first connected one the user owns.
#[tracing::instrument(err, ret, skip(client))]
pub(crate) async fn personal(
    client: &transfer::Client,
    client_id_path: &Path,
) -> anyhow::Result<String> {
    match fs::read_to_string(client_id_path).await {
        Ok(contents) => {
            let id = contents.lines().next().unwrap_or_default().trim();
            if !id.is_empty() {
                return Ok(id.to_owned());
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => (),
        Err(e) => return Err(e.into()),
    }
    tracing::info!(path = %client_id_path.display(), "no local client id, searching endpoints");

    client
        .endpoint_search(EndpointSearch::Scope(GCP_SCOPE))
        .await?
        .into_iter()
        .find(|endpoint| endpoint.activated && endpoint.gcp_connected == Some(true))
        .map(|endpoint| {
            tracing::info!(name = ?endpoint.display_name, "using endpoint");
            endpoint.id
        })
        .ok_or_else(|| {
            anyhow::format_err!("No endpoint found for Globus Connect Personal endpoint")
        })
}

#[cfg(test)]
mod tests {
    use crate::globus::{transfer, Authorizer};
    use crate::misc;
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use tokio::fs;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> anyhow::Result<transfer::Client> {
        Ok(transfer::Client::new(
            misc::plain_client(),
            Url::parse(&server.uri())?,
            Authorizer::AccessToken(SecretString::from("transfer-access".to_owned())),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_superdarn_mirror() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/endpoint_search"))
            .and(query_param("filter_fulltext", "SuperDARN mirror"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "DATA": [
                    {
                        "id": "unofficial",
                        "contact_email": "someone@example.com",
                        "description": "Official SuperDARN mirror",
                    },
                    {
                        "id": "test",
                        "contact_email": "kevin.krieger@usask.ca",
                        "description": "Test copy",
                    },
                    {
                        "id": "official",
                        "contact_email": "kevin.krieger@usask.ca",
                        "description": "Official SuperDARN mirror",
                    },
                ],
            })))
            .mount(&server)
            .await;

        anyhow::ensure!(super::superdarn_mirror(&client(&server)?).await? == "official");
        Ok(())
    }

    #[tokio::test]
    async fn test_superdarn_mirror_missing() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/endpoint_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"DATA": []})))
            .mount(&server)
            .await;

        anyhow::ensure!(super::superdarn_mirror(&client(&server)?).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_personal_from_file() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("client-id.txt");
        fs::write(&path, "4e6d9b3c-local\n").await?;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        anyhow::ensure!(super::personal(&client(&server)?, &path).await? == "4e6d9b3c-local");
        Ok(())
    }

    #[tokio::test]
    async fn test_personal_search() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let temp_dir = tempfile::tempdir()?;

        Mock::given(method("GET"))
            .and(path("/endpoint_search"))
            .and(query_param("filter_scope", "my-gcp-endpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "DATA": [
                    {"id": "laptop", "activated": true, "gcp_connected": false},
                    {"id": "workstation", "activated": true, "gcp_connected": true},
                ],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = super::personal(&client(&server)?, &temp_dir.path().join("client-id.txt")).await?;
        anyhow::ensure!(id == "workstation");
        Ok(())
    }
}
