// Scripted in-memory backend for controller and session tests
//
// Scan output is fed fragment by fragment through an unbounded channel per
// scope, so a test decides exactly where chunk boundaries fall and when the
// stream ends or fails.

use super::{ApiError, Backend, GuidanceKind, ScanStream, StopReply, TokenName};
use crate::model::{Project, ProjectId, Report, ScanRecord, ScanRequest, ScopeKey, Stats};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

type Chunk = Result<Bytes, ApiError>;

#[derive(Default)]
struct Script {
    start_errors: VecDeque<ApiError>,
    senders: HashMap<ScopeKey, mpsc::UnboundedSender<Chunk>>,
    receivers: HashMap<ScopeKey, mpsc::UnboundedReceiver<Chunk>>,
    requests: Vec<ScanRequest>,
    stop_replies: VecDeque<Result<StopReply, ApiError>>,
    projects: Vec<Project>,
    next_project: u64,
    fail_writes: bool,
    reports: HashMap<ScopeKey, Vec<Report>>,
    recent: Vec<ScanRecord>,
    fail_views: bool,
    chat_replies: VecDeque<Result<String, ApiError>>,
    chat_gate: Option<oneshot::Receiver<()>>,
    tokens: HashMap<TokenName, String>,
    proxy: serde_json::Value,
    guidance: HashMap<(ProjectId, GuidanceKind), String>,
    calls: Vec<String>,
}

/// Test double for [`Backend`]
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sender(script: &mut Script, scope: &ScopeKey) -> mpsc::UnboundedSender<Chunk> {
        if let Some(tx) = script.senders.get(scope) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        script.senders.insert(scope.clone(), tx.clone());
        script.receivers.insert(scope.clone(), rx);
        tx
    }

    /// Deliver one fragment of scan output for a scope
    pub fn send(&self, scope: &ScopeKey, fragment: &str) {
        let mut script = self.lock();
        let tx = Self::sender(&mut script, scope);
        let _ = tx.send(Ok(Bytes::copy_from_slice(fragment.as_bytes())));
    }

    /// Make the scope's stream fail with a transport error
    pub fn fail_stream(&self, scope: &ScopeKey, message: &str) {
        let mut script = self.lock();
        let tx = Self::sender(&mut script, scope);
        let _ = tx.send(Err(ApiError::Network(message.to_string())));
        script.senders.remove(scope);
    }

    /// Close the scope's stream normally
    pub fn finish(&self, scope: &ScopeKey) {
        let mut script = self.lock();
        Self::sender(&mut script, scope);
        script.senders.remove(scope);
    }

    pub fn fail_next_start(&self, err: ApiError) {
        self.lock().start_errors.push_back(err);
    }

    pub fn push_stop_reply(&self, reply: Result<StopReply, ApiError>) {
        self.lock().stop_replies.push_back(reply);
    }

    pub fn push_chat_reply(&self, reply: Result<String, ApiError>) {
        self.lock().chat_replies.push_back(reply);
    }

    /// Hold the next chat reply until the returned sender fires
    pub fn hold_chat(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().chat_gate = Some(rx);
        tx
    }

    pub fn add_project(&self, id: &str, name: &str, target: &str) {
        self.lock().projects.push(Project {
            id: ProjectId::new(id),
            name: name.to_string(),
            target: target.to_string(),
            created_at: "2024-01-15".to_string(),
        });
    }

    pub fn set_reports(&self, scope: ScopeKey, names: &[&str]) {
        let reports = names
            .iter()
            .map(|n| Report {
                filename: n.to_string(),
            })
            .collect();
        self.lock().reports.insert(scope, reports);
    }

    pub fn fail_views(&self, fail: bool) {
        self.lock().fail_views = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn requests(&self) -> Vec<ScanRequest> {
        self.lock().requests.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) -> MutexGuard<'_, Script> {
        let mut script = self.lock();
        script.calls.push(call);
        script
    }
}

fn server_error(message: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        message: Some(message.to_string()),
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanStream, ApiError> {
        let mut script = self.record(format!("start {}", request.scope));
        if let Some(err) = script.start_errors.pop_front() {
            return Err(err);
        }
        script.requests.push(request.clone());

        let rx = match script.receivers.remove(&request.scope) {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                script.senders.insert(request.scope.clone(), tx);
                rx
            }
        };
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn stop_scan(&self, scope: &ScopeKey) -> Result<StopReply, ApiError> {
        let mut script = self.record(format!("stop {}", scope));
        script.stop_replies.pop_front().unwrap_or(Ok(StopReply::Stopped {
            message: Some("Scan aborted.".to_string()),
        }))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let script = self.record("list_projects".to_string());
        if script.fail_views {
            return Err(server_error("Failed to load projects"));
        }
        Ok(script.projects.clone())
    }

    async fn create_project(&self, name: &str, target: &str) -> Result<Project, ApiError> {
        let mut script = self.record(format!("create_project {}", name));
        if script.fail_writes {
            return Err(server_error("Failed to create project"));
        }
        script.next_project += 1;
        let project = Project {
            id: ProjectId::new(format!("new-{}", script.next_project)),
            name: name.to_string(),
            target: target.to_string(),
            created_at: "2024-01-15".to_string(),
        };
        script.projects.push(project.clone());
        Ok(project)
    }

    async fn delete_project(&self, id: &ProjectId) -> Result<(), ApiError> {
        let mut script = self.record(format!("delete_project {}", id));
        if script.fail_writes {
            return Err(server_error("Failed to delete project"));
        }
        let before = script.projects.len();
        script.projects.retain(|p| &p.id != id);
        if script.projects.len() == before {
            return Err(ApiError::NotFound {
                message: Some("Project not found".to_string()),
            });
        }
        Ok(())
    }

    async fn list_reports(&self, scope: &ScopeKey) -> Result<Vec<Report>, ApiError> {
        let script = self.record(format!("list_reports {}", scope));
        if script.fail_views {
            return Err(server_error("Failed to load reports"));
        }
        Ok(script.reports.get(scope).cloned().unwrap_or_default())
    }

    async fn delete_report(&self, scope: &ScopeKey, filename: &str) -> Result<String, ApiError> {
        let mut script = self.record(format!("delete_report {} {}", scope, filename));
        let reports = script.reports.entry(scope.clone()).or_default();
        let before = reports.len();
        reports.retain(|r| r.filename != filename);
        if reports.len() == before {
            return Err(ApiError::NotFound {
                message: Some("Report not found".to_string()),
            });
        }
        Ok(format!("Report {} deleted successfully", filename))
    }

    async fn project_chat(&self, id: &ProjectId, message: &str) -> Result<String, ApiError> {
        let (gate, reply) = {
            let mut script = self.record(format!("chat {}", id));
            let reply = script
                .chat_replies
                .pop_front()
                .unwrap_or_else(|| Ok(format!("You asked: {}", message)));
            (script.chat_gate.take(), reply)
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        reply
    }

    async fn stats(&self) -> Result<Stats, ApiError> {
        let script = self.record("stats".to_string());
        if script.fail_views {
            return Err(server_error("Failed to load stats"));
        }
        Ok(Stats {
            reports_count: script.reports.values().map(Vec::len).sum::<usize>() as u64,
            modules_count: 13,
            clients_count: script.projects.len() as u64,
        })
    }

    async fn recent_scans(&self) -> Result<Vec<ScanRecord>, ApiError> {
        let script = self.record("recent_scans".to_string());
        if script.fail_views {
            return Err(server_error("Failed to load recent scans"));
        }
        Ok(script.recent.clone())
    }

    async fn get_token(&self, name: TokenName) -> Result<Option<String>, ApiError> {
        let script = self.record(format!("get_token {}", name));
        Ok(script.tokens.get(&name).cloned())
    }

    async fn set_token(&self, name: TokenName, token: &str) -> Result<String, ApiError> {
        let mut script = self.record(format!("set_token {}", name));
        if script.fail_writes {
            return Err(server_error("Failed to save token"));
        }
        script.tokens.insert(name, token.to_string());
        Ok(format!("{} token saved successfully", name.as_str().to_uppercase()))
    }

    async fn get_proxy_config(&self) -> Result<serde_json::Value, ApiError> {
        let script = self.record("get_proxy_config".to_string());
        Ok(script.proxy.clone())
    }

    async fn set_proxy_config(&self, config: &serde_json::Value) -> Result<String, ApiError> {
        let mut script = self.record("set_proxy_config".to_string());
        script.proxy = config.clone();
        Ok("Proxy configuration saved".to_string())
    }

    async fn generate_guidance(
        &self,
        id: &ProjectId,
        kind: GuidanceKind,
    ) -> Result<String, ApiError> {
        let mut script = self.record(format!("generate_guidance {} {}", id, kind.as_str()));
        script
            .guidance
            .insert((id.clone(), kind), format!("# Next {} steps", kind.as_str()));
        Ok("Guidance generated".to_string())
    }

    async fn guidance(
        &self,
        id: &ProjectId,
        kind: GuidanceKind,
    ) -> Result<Option<String>, ApiError> {
        let script = self.record(format!("guidance {} {}", id, kind.as_str()));
        Ok(script.guidance.get(&(id.clone(), kind)).cloned())
    }
}

/// Yield until `check` holds, failing the test after a bounded number of turns
pub(crate) async fn settle(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
