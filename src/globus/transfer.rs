// https://docs.globus.org/api/transfer/


use super::Authorizer;
use crate::misc;
use headers::HeaderMapExt;
use http::{header, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

pub(crate) const BASE_URL: &str = "https://transfer.api.globus.org/v0.10/";

pub(crate) struct Client {
    http: misc::Client,
    base: Url,
    authorizer: Mutex<Authorizer>,
    timeout: Duration,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("base", &self.base.as_str())
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum EndpointSearch<'a> {
    Fulltext(&'a str),
    Scope(&'a str),
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Endpoint {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    #[serde(default)]
    pub(crate) contact_email: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) activated: bool,
    #[serde(default)]
    pub(crate) gcp_connected: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct FileEntry {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) size: u64,
}

#[derive(Debug, Deserialize)]
struct Data<T> {
    #[serde(rename = "DATA")]
    data: Vec<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum SyncLevel {
    Exists = 0,
    Size = 1,
    Mtime = 2,
    Checksum = 3,
}

impl Serialize for SyncLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TransferDocument {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub(crate) submission_id: String,
    pub(crate) source_endpoint: String,
    pub(crate) destination_endpoint: String,
    pub(crate) label: String,
    pub(crate) sync_level: SyncLevel,
    pub(crate) notify_on_succeeded: bool,
    pub(crate) notify_on_failed: bool,
    #[serde(rename = "DATA")]
    pub(crate) items: Vec<TransferItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct TransferItem {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub(crate) source_path: String,
    pub(crate) destination_path: String,
}

impl TransferDocument {
    pub(crate) fn new(
        submission_id: String,
        source_endpoint: String,
        destination_endpoint: String,
        items: Vec<TransferItem>,
    ) -> Self {
        Self {
            data_type: "transfer",
            submission_id,
            source_endpoint,
            destination_endpoint,
            label: env!("CARGO_PKG_NAME").to_owned(),
            sync_level: SyncLevel::Checksum,
            notify_on_succeeded: false,
            notify_on_failed: true,
            items,
        }
    }
}

impl TransferItem {
    pub(crate) fn new(source_path: String, destination_path: String) -> Self {
        Self {
            data_type: "transfer_item",
            source_path,
            destination_path,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransferResult {
    pub(crate) task_id: String,
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum TaskStatus {
    Active,
    Inactive,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Task {
    pub(crate) task_id: String,
    pub(crate) status: TaskStatus,
    #[serde(default)]
    pub(crate) files: u64,
    #[serde(default)]
    pub(crate) files_transferred: u64,
    #[serde(default)]
    pub(crate) files_skipped: u64,
    #[serde(default)]
    pub(crate) bytes_transferred: u64,
}

impl TaskStatus {
    pub(crate) fn is_done(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl Client {
    pub(crate) fn new(
        http: misc::Client,
        base: Url,
        authorizer: Authorizer,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base,
            authorizer: Mutex::new(authorizer),
            timeout,
        }
    }

    #[tracing::instrument(err)]
    pub(crate) async fn endpoint_search(
        &self,
        search: EndpointSearch<'_>,
    ) -> anyhow::Result<Vec<Endpoint>> {
        let query = match search {
            EndpointSearch::Fulltext(text) => ("filter_fulltext", text),
            EndpointSearch::Scope(scope) => ("filter_scope", scope),
        };
        let Data { data } = self
            .get(&["endpoint_search"], &[query, ("limit", "100")])
            .await?;
        Ok(data)
    }

    #[tracing::instrument(err)]
    pub(crate) async fn operation_ls(
        &self,
        endpoint: &str,
        path: &str,
        filter: &str,
    ) -> anyhow::Result<Vec<FileEntry>> {
        let Data { data } = self
            .get(
                &["operation", "endpoint", endpoint, "ls"],
                &[("path", path), ("filter", filter)],
            )
            .await?;
        Ok(data)
    }

    #[tracing::instrument(err, ret)]
    pub(crate) async fn submission_id(&self) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct B {
            value: String,
        }

        let B { value } = self.get(&["submission_id"], &[]).await?;
        Ok(value)
    }

    #[tracing::instrument(err, ret, skip(document), fields(items = document.items.len()))]
    pub(crate) async fn submit_transfer(
        &self,
        document: &TransferDocument,
    ) -> anyhow::Result<TransferResult> {
        let url = self.url(&["transfer"])?;
        let builder = Request::post(url.as_str())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");
        let request = self
            .authorize(builder)
            .await?
            .body(super::full(serde_json::to_vec(document)?))?;
        super::send(&self.http, request, self.timeout).await
    }

    #[tracing::instrument(err, ret)]
    pub(crate) async fn get_task(&self, task_id: &str) -> anyhow::Result<Task> {
        self.get(&["task", task_id], &[]).await
    }

    /// Polls the task until it has finished, either way.
    ///
    /// Returns `None` once `timeout` has elapsed while the task is still running.
    #[tracing::instrument(err)]
    pub(crate) async fn task_wait(
        &self,
        task_id: &str,
        timeout: Duration,
        polling_interval: Duration,
    ) -> anyhow::Result<Option<Task>> {
        // no deadline if the timeout is too large to represent
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let task = self.get_task(task_id).await?;
            if task.status.is_done() {
                return Ok(Some(task));
            }
            let interval = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    cmp::min(polling_interval, deadline - now)
                }
                None => polling_interval,
            };
            tokio::time::sleep(interval).await;
        }
    }

    async fn get<T>(&self, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
    {
        let mut url = self.url(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let builder = Request::get(url.as_str()).header(header::ACCEPT, "application/json");
        let request = self.authorize(builder).await?.body(super::empty())?;
        super::send(&self.http, request, self.timeout).await
    }

    fn url(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base.clone();
        misc::path_segments_mut(&mut url)?.extend(segments);
        Ok(url)
    }

    async fn authorize(
        &self,
        mut builder: http::request::Builder,
    ) -> anyhow::Result<http::request::Builder> {
        if let Some(headers) = builder.headers_mut() {
            headers.typed_insert(self.authorizer.lock().await.authorization().await?);
        }
        Ok(builder)
    }
}
