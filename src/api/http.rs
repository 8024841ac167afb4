//! reqwest implementation of the backend contract
//!
//! Short JSON calls get a per-request timeout. The scan stream never does:
//! scans may run for hours and only the transport decides when they end.

use super::{ApiError, Backend, GuidanceKind, ScanStream, StopReply, TokenName};
use crate::model::{Project, ProjectId, Report, ScanRecord, ScanRequest, ScanType, ScopeKey, Stats};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Generic body shape for `{message}` / `{error}` replies
#[derive(Debug, Default, Deserialize)]
struct MessageBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    response: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: String,
}

/// HTTP client for the scan server
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl HttpBackend {
    /// Build a client for `base_url` (e.g. "http://127.0.0.1:5000")
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn reports_path<'a>(scope: &'a ScopeKey) -> Vec<&'a str> {
        match scope {
            ScopeKey::Global => vec!["api", "reports"],
            ScopeKey::Project(id) => vec!["api", "projects", id.as_str(), "reports"],
        }
    }

    /// Send a short request with the JSON timeout applied
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.timeout(self.request_timeout).send().await?;
        Ok(response)
    }

    /// Decode a 2xx JSON body, or turn the response into an error
    async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Decode a 2xx `{message}` body
    async fn message(&self, response: Response) -> Result<String, ApiError> {
        let body: MessageBody = self.json(response).await?;
        Ok(body.message.unwrap_or_default())
    }
}

/// Build an `ApiError` from a non-success response
async fn error_from(response: Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<MessageBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .filter(|m| !m.trim().is_empty());

    match status {
        StatusCode::CONFLICT => ApiError::Conflict { message },
        StatusCode::NOT_FOUND => ApiError::NotFound { message },
        _ => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanStream, ApiError> {
        let url = self.endpoint(&["fullscan"])?;

        let scan_type = match request.scope {
            ScopeKey::Project(_) => ScanType::Project,
            ScopeKey::Global => request.options.scan_type,
        };
        let mut form: Vec<(&str, &str)> = vec![
            ("target", request.target.as_str()),
            ("scanType", scan_type.as_str()),
        ];
        if request.options.comprehensive {
            form.push(("comprehensive", "true"));
        }
        if let ScopeKey::Project(id) = &request.scope {
            form.push(("project_id", id.as_str()));
        }

        tracing::debug!("POST {} (scope {}, target {})", url, request.scope, request.target);

        // No timeout: the body streams for as long as the scan runs
        let response = self.client.post(url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        Ok(response.bytes_stream().map(|chunk| chunk.map_err(ApiError::from)).boxed())
    }

    async fn stop_scan(&self, scope: &ScopeKey) -> Result<StopReply, ApiError> {
        let url = self.endpoint(&["stopscan"])?;
        let response = self
            .send(self.client.post(url).form(&[("scope", scope.as_param())]))
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: MessageBody = response.json().await.unwrap_or_default();
                Ok(StopReply::Stopped {
                    message: body.message,
                })
            }
            StatusCode::NOT_FOUND => {
                let body: MessageBody = response.json().await.unwrap_or_default();
                Ok(StopReply::NothingRunning {
                    message: body.message,
                })
            }
            _ => Err(error_from(response).await),
        }
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let url = self.endpoint(&["api", "projects"])?;
        let response = self.send(self.client.get(url)).await?;
        self.json(response).await
    }

    async fn create_project(&self, name: &str, target: &str) -> Result<Project, ApiError> {
        let url = self.endpoint(&["api", "projects"])?;
        let response = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "name": name, "target": target })),
            )
            .await?;
        self.json(response).await
    }

    async fn delete_project(&self, id: &ProjectId) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "projects", id.as_str()])?;
        let response = self.send(self.client.delete(url)).await?;
        self.message(response).await.map(|_| ())
    }

    async fn list_reports(&self, scope: &ScopeKey) -> Result<Vec<Report>, ApiError> {
        let url = self.endpoint(&Self::reports_path(scope))?;
        let response = self.send(self.client.get(url)).await?;
        self.json(response).await
    }

    async fn delete_report(&self, scope: &ScopeKey, filename: &str) -> Result<String, ApiError> {
        let mut segments = Self::reports_path(scope);
        segments.push(filename);
        let url = self.endpoint(&segments)?;
        let response = self.send(self.client.delete(url)).await?;
        self.message(response).await
    }

    async fn project_chat(&self, id: &ProjectId, message: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["api", "projects", id.as_str(), "chat"])?;
        let response = self
            .send(self.client.post(url).json(&json!({ "message": message })))
            .await?;
        let body: ChatBody = self.json(response).await?;
        match (body.response, body.error) {
            (Some(reply), _) => Ok(reply),
            (None, Some(error)) => Err(ApiError::Status {
                status: 200,
                message: Some(error),
            }),
            (None, None) => Err(ApiError::Decode("chat reply has no response".into())),
        }
    }

    async fn stats(&self) -> Result<Stats, ApiError> {
        let url = self.endpoint(&["api", "stats"])?;
        let response = self.send(self.client.get(url)).await?;
        self.json(response).await
    }

    async fn recent_scans(&self) -> Result<Vec<ScanRecord>, ApiError> {
        let url = self.endpoint(&["api", "recent-scans"])?;
        let response = self.send(self.client.get(url)).await?;
        self.json(response).await
    }

    async fn get_token(&self, name: TokenName) -> Result<Option<String>, ApiError> {
        let url = self.endpoint(&["api", "settings", &format!("{}-token", name)])?;
        let response = self.send(self.client.get(url)).await?;
        let body: TokenBody = self.json(response).await?;
        Ok(Some(body.token).filter(|t| !t.is_empty()))
    }

    async fn set_token(&self, name: TokenName, token: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["api", "settings", &format!("{}-token", name)])?;
        let response = self
            .send(self.client.post(url).json(&json!({ "token": token })))
            .await?;
        self.message(response).await
    }

    async fn get_proxy_config(&self) -> Result<serde_json::Value, ApiError> {
        let url = self.endpoint(&["api", "settings", "proxy-config"])?;
        let response = self.send(self.client.get(url)).await?;
        self.json(response).await
    }

    async fn set_proxy_config(&self, config: &serde_json::Value) -> Result<String, ApiError> {
        let url = self.endpoint(&["api", "settings", "proxy-config"])?;
        let response = self.send(self.client.post(url).json(config)).await?;
        self.message(response).await
    }

    async fn generate_guidance(
        &self,
        id: &ProjectId,
        kind: GuidanceKind,
    ) -> Result<String, ApiError> {
        let path = format!("next_{}", kind.as_str());
        let url = self.endpoint(&["api", "projects", id.as_str(), &path])?;
        // Generation calls an LLM; allow it far longer than a plain JSON call
        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout * 10)
            .send()
            .await?;
        self.message(response).await
    }

    async fn guidance(
        &self,
        id: &ProjectId,
        kind: GuidanceKind,
    ) -> Result<Option<String>, ApiError> {
        let file = format!("next_{}.md", kind.as_str());
        let url = self.endpoint(&["projects", id.as_str(), &file])?;
        let response = self.send(self.client.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            _ => Err(error_from(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{DemoOptions, DemoServer};
    use crate::framer::frame_stream;
    use crate::model::ScanOptions;

    fn backend(server: &DemoServer) -> HttpBackend {
        HttpBackend::new(
            &server.url(),
            Duration::from_secs(2),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let backend = HttpBackend::new(
            "http://127.0.0.1:5000/base/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let url = backend
            .endpoint(&["api", "reports", "scan report.pdf"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:5000/base/api/reports/scan%20report.pdf"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpBackend::new(
            "mailto:ops@example.com",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_scan_streams_lines_over_http() {
        let server = DemoServer::spawn(DemoOptions::instant()).await.unwrap();
        let backend = backend(&server);

        let request = ScanRequest {
            scope: ScopeKey::Global,
            target: "example.com".into(),
            options: ScanOptions::default(),
        };
        let stream = backend.start_scan(&request).await.unwrap();
        let lines: Vec<String> = frame_stream(stream)
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines.first().map(String::as_str), Some("[*] Starting scan for example.com"));
        assert!(lines.last().unwrap().starts_with("[OK]"));

        let reports = backend.list_reports(&ScopeKey::Global).await.unwrap();
        assert_eq!(reports.len(), 1);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_start_conflicts_while_first_streams() {
        let server = DemoServer::spawn(DemoOptions::held()).await.unwrap();
        let backend = backend(&server);
        let request = ScanRequest {
            scope: ScopeKey::Global,
            target: "example.com".into(),
            options: ScanOptions::default(),
        };

        let _first = backend.start_scan(&request).await.unwrap();
        let second = backend.start_scan(&request).await;
        assert!(matches!(second, Err(ApiError::Conflict { .. })));

        match backend.stop_scan(&ScopeKey::Global).await.unwrap() {
            StopReply::Stopped { message } => assert_eq!(message.as_deref(), Some("Scan aborted.")),
            other => panic!("unexpected reply: {:?}", other),
        }
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_with_nothing_running_is_404_reply() {
        let server = DemoServer::spawn(DemoOptions::instant()).await.unwrap();
        let backend = backend(&server);
        let reply = backend.stop_scan(&ScopeKey::project("nope")).await.unwrap();
        assert_eq!(
            reply,
            StopReply::NothingRunning {
                message: Some("No scan is running.".into())
            }
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_project_crud_and_error_messages() {
        let server = DemoServer::spawn(DemoOptions::instant()).await.unwrap();
        let backend = backend(&server);

        let created = backend
            .create_project("Shop audit", "shop.example.com")
            .await
            .unwrap();
        let projects = backend.list_projects().await.unwrap();
        assert!(projects.contains(&created));

        let err = backend.create_project("", "x").await.unwrap_err();
        assert_eq!(err.user_message("fallback"), "Name and target are required");

        backend.delete_project(&created.id).await.unwrap();
        let err = backend.delete_project(&created.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_tokens_and_guidance() {
        let server = DemoServer::spawn(DemoOptions::instant()).await.unwrap();
        let backend = backend(&server);

        assert_eq!(backend.get_token(TokenName::Intelx).await.unwrap(), None);
        backend.set_token(TokenName::Intelx, "secret").await.unwrap();
        assert_eq!(
            backend.get_token(TokenName::Intelx).await.unwrap().as_deref(),
            Some("secret")
        );

        let project = backend.create_project("Corp", "10.0.0.1").await.unwrap();
        assert_eq!(
            backend
                .guidance(&project.id, GuidanceKind::Offensive)
                .await
                .unwrap(),
            None
        );
        backend
            .generate_guidance(&project.id, GuidanceKind::Offensive)
            .await
            .unwrap();
        let markdown = backend
            .guidance(&project.id, GuidanceKind::Offensive)
            .await
            .unwrap()
            .unwrap();
        assert!(markdown.contains("10.0.0.1"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let backend = HttpBackend::new(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = backend.stats().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
