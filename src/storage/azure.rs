//! Azure Blob Storage backend over the REST API.
//!
//! Authenticates with a shared access signature taken from the connection
//! string. Containers are created on first upload with public blob access.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use url::Url;

use super::{validate_name, DurableStore, StorageError, StorageResult};

/// REST API version sent with every request.
const API_VERSION: &str = "2021-08-06";

/// Parsed storage connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConnection {
    /// Blob service endpoint, e.g. `https://account.blob.core.windows.net`.
    pub blob_endpoint: Url,
    /// SAS token without the leading `?`.
    pub sas_token: String,
}

impl AzureConnection {
    /// Parse a `Key=Value;...` connection string.
    ///
    /// Requires `SharedAccessSignature` and either `BlobEndpoint` or
    /// `AccountName` (with optional `DefaultEndpointsProtocol` and
    /// `EndpointSuffix`).
    pub fn parse(connection_string: &str) -> StorageResult<Self> {
        let mut fields: HashMap<String, String> = HashMap::new();
        for part in connection_string.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            // Values (SAS tokens) may themselves contain '='
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::Config(format!("malformed connection string segment: {}", part))
            })?;
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let sas_token = fields
            .get("sharedaccesssignature")
            .map(|s| s.trim_start_matches('?').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                if fields.contains_key("accountkey") {
                    StorageError::Config(
                        "shared key connection strings are not supported; use a SAS connection string"
                            .to_string(),
                    )
                } else {
                    StorageError::Config("connection string has no SharedAccessSignature".to_string())
                }
            })?;

        let endpoint = match fields.get("blobendpoint") {
            Some(endpoint) => endpoint.clone(),
            None => {
                let account = fields.get("accountname").ok_or_else(|| {
                    StorageError::Config(
                        "connection string needs BlobEndpoint or AccountName".to_string(),
                    )
                })?;
                let protocol = fields
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = fields
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                format!("{}://{}.blob.{}", protocol, account, suffix)
            }
        };

        let blob_endpoint = Url::parse(&endpoint)
            .map_err(|e| StorageError::Config(format!("invalid blob endpoint {}: {}", endpoint, e)))?;

        Ok(Self {
            blob_endpoint,
            sas_token,
        })
    }

    /// Build a request URL for a container or blob with extra query pairs.
    fn url(
        &self,
        container: &str,
        blob: Option<&str>,
        params: &[(&str, &str)],
    ) -> StorageResult<Url> {
        let mut url = self.blob_endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StorageError::Config(format!("blob endpoint cannot be a base: {}", self.blob_endpoint))
            })?;
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.push(blob);
            }
        }
        url.set_query(Some(&self.sas_token));
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Azure Blob Storage client.
pub struct AzureBlobStore {
    client: Client,
    connection: AzureConnection,
    /// Containers known to exist (created or confirmed) during this process.
    ensured: Mutex<HashSet<String>>,
}

impl AzureBlobStore {
    pub fn new(connection: AzureConnection, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            connection,
            ensured: Mutex::new(HashSet::new()),
        })
    }

    pub fn from_connection_string(connection_string: &str, timeout: Duration) -> StorageResult<Self> {
        Self::new(AzureConnection::parse(connection_string)?, timeout)
    }

    /// Create the container if it does not exist yet.
    async fn ensure_container(&self, container: &str) -> StorageResult<()> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(container) {
            return Ok(());
        }

        let url = self
            .connection
            .url(container, None, &[("restype", "container")])?;
        let response = self
            .client
            .put(url)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-public-access", "blob")
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!("Created container {}", container);
            }
            StatusCode::CONFLICT => {}
            status => {
                return Err(StorageError::Status {
                    operation: "create container",
                    status: status.as_u16(),
                })
            }
        }

        ensured.insert(container.to_string());
        Ok(())
    }
}

/// Extract blob names and the continuation marker from a List Blobs page.
pub(crate) fn parse_list_page(body: &str) -> StorageResult<(Vec<String>, Option<String>)> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut names = Vec::new();
    let mut marker = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(event)) => path.push(event.name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| StorageError::MalformedListing(e.to_string()))?
                    .into_owned();
                match path.as_slice() {
                    [.., parent, tag] if parent.as_slice() == b"Blob" && tag.as_slice() == b"Name" => {
                        names.push(value)
                    }
                    [.., tag] if tag.as_slice() == b"NextMarker" && !value.is_empty() => {
                        marker = Some(value)
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StorageError::MalformedListing(e.to_string())),
            _ => {}
        }
    }

    Ok((names, marker))
}

#[async_trait]
impl DurableStore for AzureBlobStore {
    async fn existing_blobs(
        &self,
        container: &str,
        prefix: &str,
    ) -> StorageResult<HashSet<String>> {
        let mut names = HashSet::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = vec![("restype", "container"), ("comp", "list")];
            if !prefix.is_empty() {
                params.push(("prefix", prefix));
            }
            if let Some(ref m) = marker {
                params.push(("marker", m.as_str()));
            }
            let url = self.connection.url(container, None, &params)?;

            let response = self
                .client
                .get(url)
                .header("x-ms-version", API_VERSION)
                .send()
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                tracing::info!("Container {} does not exist yet", container);
                return Ok(names);
            }
            if !response.status().is_success() {
                return Err(StorageError::Status {
                    operation: "list blobs",
                    status: response.status().as_u16(),
                });
            }

            let body = response.text().await?;
            let (page, next) = parse_list_page(&body)?;
            names.extend(page);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(names)
    }

    async fn exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        validate_name(name)?;
        let url = self.connection.url(container, Some(name), &[])?;
        let response = self
            .client
            .head(url)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StorageError::Status {
                operation: "get blob properties",
                status: status.as_u16(),
            }),
        }
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        validate_name(name)?;
        self.ensure_container(container).await?;

        let url = self.connection.url(container, Some(name), &[])?;
        let response = self
            .client
            .put(url)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-blob-content-type", content_type)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Status {
                operation: "put blob",
                status: response.status().as_u16(),
            });
        }

        tracing::debug!("Uploaded blob {} to container {}", name, container);
        Ok(())
    }

    fn describe(&self) -> String {
        self.connection.blob_endpoint.to_string()
    }
}
