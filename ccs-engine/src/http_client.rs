//! Cluster HTTP Client
//!
//! Talks to the IPFS-Cluster REST API (default port 9094) and to the IPFS
//! gateway (default port 8080) of a cluster node, with optional basic auth.

use crate::cluster::{AddRequest, ClusterApi, ClusterResult, DownloadInfo, PinRequest};
use crate::config::TransportConfig;
use crate::walk::{total_len, UploadFile};
use async_trait::async_trait;
use ccs_core::{AddedEntry, ClusterAuth, ClusterError, PeerInfo, Pin};
use futures::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

/// Response bodies are truncated to this many characters in debug logs
const LOG_BODY_LIMIT: usize = 2000;

/// HTTP implementation of [`ClusterApi`]
pub struct HttpClusterClient {
    client: Client,
    host: String,
    api_url: String,
    gateway_url: String,
    auth: Option<ClusterAuth>,
    config: TransportConfig,
}

impl HttpClusterClient {
    /// Client for a cluster node reachable at `host`
    pub fn new(
        host: &str,
        auth: Option<ClusterAuth>,
        config: TransportConfig,
    ) -> ClusterResult<Self> {
        let api_url = format!("http://{}:{}", host, config.api_port);
        let gateway_url = format!("http://{}:{}", host, config.gateway_port);
        Self::with_urls(host, &api_url, &gateway_url, auth, config)
    }

    /// Client with explicit API and gateway base URLs
    pub fn with_urls(
        host: &str,
        api_url: &str,
        gateway_url: &str,
        auth: Option<ClusterAuth>,
        config: TransportConfig,
    ) -> ClusterResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClusterError::Http(e.to_string()))?;

        Ok(Self {
            client,
            host: host.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            auth,
            config,
        })
    }

    /// Gateway base URL for another node; full URLs are used as given
    fn gateway_for(&self, host: &str) -> String {
        if host == self.host {
            self.gateway_url.clone()
        } else if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", host, self.config.gateway_port)
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.auth {
            Some(auth) => req.basic_auth(&auth.user, Some(&auth.password)),
            None => req,
        }
    }

    fn api(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.request(method, &format!("{}{}", self.api_url, endpoint))
    }

    /// Send a request and map non-success answers to [`ClusterError`]
    async fn send(&self, req: RequestBuilder) -> ClusterResult<Response> {
        let response = req.send().await.map_err(http_error)?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "Cluster response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(body = %preview(&body), "Cluster error body");
        Err(ClusterError::from_status(status.as_u16(), error_message(&body)))
    }

    /// Send a request and return the body text
    async fn send_text(&self, req: RequestBuilder) -> ClusterResult<(StatusCode, String)> {
        let response = self.send(req).await?;
        let status = response.status();
        let body = response.text().await.map_err(http_error)?;
        debug!(body = %preview(&body), "Cluster response body");
        Ok((status, body))
    }
}

#[async_trait]
impl ClusterApi for HttpClusterClient {
    fn host(&self) -> &str {
        &self.host
    }

    #[instrument(skip(self))]
    async fn peers(&self) -> ClusterResult<Vec<PeerInfo>> {
        let (_, body) = self.send_text(self.api(Method::GET, "/peers")).await?;
        parse_json_stream(&body)
    }

    #[instrument(skip(self))]
    async fn pins(&self) -> ClusterResult<Vec<Pin>> {
        let (status, body) = self.send_text(self.api(Method::GET, "/pins")).await?;
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        parse_json_stream(&body)
    }

    #[instrument(skip(self))]
    async fn pin_status(&self, cid: &str) -> ClusterResult<Pin> {
        let (_, body) = self
            .send_text(self.api(Method::GET, &format!("/pins/{}", cid)))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self, request), fields(path = %request.path.display()))]
    async fn add(&self, request: &AddRequest) -> ClusterResult<Vec<AddedEntry>> {
        let total_bytes = total_len(&request.files);
        debug!(files = request.files.len(), total_bytes, "Streaming add");

        let mut form = Form::new();
        for file in &request.files {
            form = form.part("file", file_part(file)?);
        }

        let mut query: Vec<(String, String)> = vec![("name".to_string(), request.name.clone())];
        if !request.allocations.is_empty() {
            query.push(("allocations".to_string(), request.allocations.join(",")));
        }
        if request.local {
            query.push(("local".to_string(), "true".to_string()));
        }
        for (key, value) in &request.metadata {
            query.push((format!("meta-{}", key), value.clone()));
        }

        let req = self
            .api(Method::POST, "/add")
            .query(&query)
            .timeout(self.config.add_timeout(total_bytes))
            .multipart(form);

        let (_, body) = self.send_text(req).await?;
        parse_json_stream(&body)
    }

    #[instrument(skip(self, request), fields(cid = %request.cid))]
    async fn pin(&self, request: &PinRequest) -> ClusterResult<()> {
        let mut query: Vec<(String, String)> = vec![("mode".to_string(), "recursive".to_string())];
        if let Some(name) = &request.name {
            query.push(("name".to_string(), name.clone()));
        }
        if !request.allocations.is_empty() {
            query.push(("allocations".to_string(), request.allocations.join(",")));
        }
        if let Some(min) = request.replication_min {
            query.push(("replication-min".to_string(), min.to_string()));
        }
        if let Some(max) = request.replication_max {
            query.push(("replication-max".to_string(), max.to_string()));
        }
        for (key, value) in &request.metadata {
            query.push((format!("meta-{}", key), value.clone()));
        }

        let req = self
            .api(Method::POST, &format!("/pins/{}", request.cid))
            .query(&query);
        self.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unpin(&self, cid: &str) -> ClusterResult<()> {
        self.send(self.api(Method::DELETE, &format!("/pins/{}", cid)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recover(&self, cid: &str) -> ClusterResult<()> {
        self.send(self.api(Method::POST, &format!("/pins/{}/recover", cid)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn free_space(&self) -> ClusterResult<BTreeMap<String, u64>> {
        let (_, body) = self
            .send_text(self.api(Method::GET, "/monitor/metrics/freespace"))
            .await?;
        let metrics: Vec<Metric> = parse_json_stream(&body)?;
        Ok(metrics
            .into_iter()
            .filter(|m| !m.peer.is_empty())
            .map(|m| (m.peer, m.value.as_u64()))
            .collect())
    }

    #[instrument(skip(self))]
    async fn dag_size(&self, cid: &str) -> ClusterResult<u64> {
        let url = format!("{}/ipfs/{}", self.gateway_url, cid);

        let (_, body) = self
            .send_text(
                self.request(Method::GET, &url)
                    .query(&[("format", "dag-json")]),
            )
            .await?;
        let node: DagNode = serde_json::from_str(&body)?;
        if !node.links.is_empty() {
            return Ok(node.links.iter().map(|l| l.tsize).sum());
        }

        let response = self.send(self.request(Method::HEAD, &url)).await?;
        Ok(content_length(&response).unwrap_or(0))
    }

    #[instrument(skip(self, dest), fields(path = %dest.display()))]
    async fn download(
        &self,
        source_host: &str,
        cid: &str,
        dest: &Path,
    ) -> ClusterResult<DownloadInfo> {
        let url = format!("{}/ipfs/{}", self.gateway_for(source_host), cid);

        let head = self.send(self.request(Method::HEAD, &url)).await?;
        let is_directory = head
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("text/html"));

        let req = if is_directory {
            self.request(Method::GET, &url).query(&[("format", "tar")])
        } else {
            self.request(Method::GET, &url)
        };
        let response = self.send(req).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_error)?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bytes, is_directory, "Download complete");
        Ok(DownloadInfo {
            path: dest.to_path_buf(),
            bytes,
            is_directory,
        })
    }
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

#[derive(Debug, Deserialize)]
struct Metric {
    #[serde(default)]
    peer: String,
    #[serde(default)]
    value: MetricValue,
}

/// Metric values arrive as strings on most cluster versions
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricValue {
    Number(u64),
    Text(String),
}

impl Default for MetricValue {
    fn default() -> Self {
        MetricValue::Number(0)
    }
}

impl MetricValue {
    fn as_u64(&self) -> u64 {
        match self {
            MetricValue::Number(n) => *n,
            MetricValue::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DagNode {
    #[serde(rename = "Links", default)]
    links: Vec<DagLink>,
}

#[derive(Debug, Deserialize)]
struct DagLink {
    #[serde(rename = "Tsize", default)]
    tsize: u64,
}

/// Parse either a JSON array or newline-delimited JSON objects
fn parse_json_stream<T: DeserializeOwned>(body: &str) -> ClusterResult<Vec<T>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ClusterError::from))
        .collect()
}

/// Prefer the JSON `message` field of an error body
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}

fn http_error(err: reqwest::Error) -> ClusterError {
    ClusterError::Http(err.to_string())
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn preview(body: &str) -> &str {
    if body.is_empty() {
        return "(empty)";
    }
    match body.char_indices().nth(LOG_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// =============================================================================
// MULTIPART UPLOAD
// =============================================================================

/// Multipart part whose file is opened only when the body reaches it
fn file_part(file: &UploadFile) -> ClusterResult<Part> {
    let path = file.path.clone();
    let stream = futures::stream::once(async move { tokio::fs::File::open(path).await })
        .map_ok(ReaderStream::new)
        .try_flatten();

    Part::stream_with_length(Body::wrap_stream(stream), file.len)
        .file_name(file.name.clone())
        .mime_str("application/octet-stream")
        .map_err(http_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, auth: Option<ClusterAuth>) -> HttpClusterClient {
        HttpClusterClient::with_urls(
            "nas",
            &server.uri(),
            &server.uri(),
            auth,
            TransportConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pins_ndjson_with_basic_auth() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"cid": "QmA", "allocations": ["p1"], "peer_map": {"p1": {"peername": "nas", "status": "pinned"}}}"#,
            "\n",
            r#"{"cid": "QmB", "metadata": null, "peer_map": {}}"#,
            "\n"
        );

        Mock::given(method("GET"))
            .and(path("/pins"))
            .and(header("Authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let auth = ClusterAuth {
            user: "admin".to_string(),
            password: "secret".to_string(),
        };
        let pins = client_for(&server, Some(auth)).pins().await.unwrap();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins[0].pinned_count(), 1);
        assert_eq!(pins[1].cid, "QmB");
    }

    #[tokio::test]
    async fn test_pins_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pins"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let pins = client_for(&server, None).pins().await.unwrap();
        assert!(pins.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/peers"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).peers().await.unwrap_err();
        assert!(matches!(err, ClusterError::Unauthorized));
    }

    #[tokio::test]
    async fn test_api_error_uses_message_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pins/QmMissing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"code": 404, "message": "pin not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .pin_status("QmMissing")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.to_string(), "pin not found");
    }

    #[tokio::test]
    async fn test_peers_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/peers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"peername": "nas", "id": "12D3KooWNAS", "addresses": []},
                {"peername": "chll", "id": "12D3KooWCHLL", "error": "dial backoff"}
            ])))
            .mount(&server)
            .await;

        let peers = client_for(&server, None).peers().await.unwrap();
        assert_eq!(peers.len(), 2);
        assert!(peers[0].is_online());
        assert!(!peers[1].is_online());
    }

    #[tokio::test]
    async fn test_pin_upsert_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pins/QmA"))
            .and(query_param("allocations", "p1,p2"))
            .and(query_param("replication-min", "2"))
            .and(query_param("replication-max", "4"))
            .and(query_param("name", "dataset one"))
            .and(query_param("meta-org", "hrdag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut metadata = BTreeMap::new();
        metadata.insert("org".to_string(), "hrdag".to_string());
        let request = PinRequest {
            cid: "QmA".to_string(),
            name: Some("dataset one".to_string()),
            allocations: vec!["p1".to_string(), "p2".to_string()],
            replication_min: Some(2),
            replication_max: Some(4),
            metadata,
        };

        client_for(&server, None).pin(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_directory() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"name": "data/a.txt", "cid": "QmA", "size": 5}"#,
            "\n",
            r#"{"name": "data/b.txt", "cid": "QmB", "size": 6}"#,
            "\n",
            r#"{"name": "data", "cid": "QmDIR", "size": 200}"#,
            "\n"
        );
        Mock::given(method("POST"))
            .and(path("/add"))
            .and(query_param("name", "data"))
            .and(query_param("allocations", "12D3KooWNAS,12D3KooWCHLL"))
            .and(query_param("local", "true"))
            .and(query_param("meta-org", "hrdag"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();
        std::fs::write(root.join("b.txt"), "world!").unwrap();

        let mut metadata = BTreeMap::new();
        metadata.insert("org".to_string(), "hrdag".to_string());
        let files = crate::walk::collect_files(&root).await.unwrap();
        let request = AddRequest {
            path: root,
            name: "data".to_string(),
            files,
            allocations: vec!["12D3KooWNAS".to_string(), "12D3KooWCHLL".to_string()],
            local: true,
            metadata,
        };

        let entries = client_for(&server, None).add(&request).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].cid, "QmDIR");
    }

    #[tokio::test]
    async fn test_free_space_string_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/monitor/metrics/freespace"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "freespace", "peer": "12D3KooWNAS", "value": "1390000000000"},
                {"name": "freespace", "peer": "12D3KooWCHLL", "value": 42}
            ])))
            .mount(&server)
            .await;

        let free = client_for(&server, None).free_space().await.unwrap();
        assert_eq!(free["12D3KooWNAS"], 1_390_000_000_000);
        assert_eq!(free["12D3KooWCHLL"], 42);
    }

    #[tokio::test]
    async fn test_dag_size_sums_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipfs/QmDIR"))
            .and(query_param("format", "dag-json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Data": {"/": {"bytes": "CAE"}},
                "Links": [
                    {"Hash": {"/": "QmA"}, "Name": "a.txt", "Tsize": 100},
                    {"Hash": {"/": "QmB"}, "Name": "b.txt", "Tsize": 250}
                ]
            })))
            .mount(&server)
            .await;

        let size = client_for(&server, None).dag_size("QmDIR").await.unwrap();
        assert_eq!(size, 350);
    }

    #[tokio::test]
    async fn test_download_directory_as_tar() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/ipfs/QmDIR"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ipfs/QmDIR"))
            .and(query_param("format", "tar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tarball".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.tar");
        let client = client_for(&server, None);
        let info = client.download(&server.uri(), "QmDIR", &dest).await.unwrap();

        assert!(info.is_directory);
        assert_eq!(info.bytes, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"tarball");
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(5000);
        assert_eq!(preview(&long).len(), LOG_BODY_LIMIT);
        assert_eq!(preview(""), "(empty)");
    }
}
