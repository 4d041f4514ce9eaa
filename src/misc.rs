use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::error;
use std::io;
use url::{PathSegmentsMut, Url};

pub type Client = hyper_util::client::legacy::Client<
    HttpsConnector<HttpConnector>,
    UnsyncBoxBody<Bytes, Box<dyn error::Error + Send + Sync>>,
>;
pub fn client() -> Result<Client, io::Error> {
    let connector = HttpsConnectorBuilder::new()
        .with_native_roots()?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();
    Ok(hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(connector))
}

// no trust roots, only plain http servers such as a local mock are reachable
#[cfg(test)]
pub fn plain_client() -> Client {
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_http1()
        .build();
    hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(connector)
}

// drops the trailing empty segment so that pushes append to the base path
pub fn path_segments_mut(url: &mut Url) -> anyhow::Result<PathSegmentsMut<'_>> {
    let mut segments = url
        .path_segments_mut()
        .map_err(|_| anyhow::format_err!("cannot-be-a-base"))?;
    segments.pop_if_empty();
    Ok(segments)
}
