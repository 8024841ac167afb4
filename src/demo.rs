// Demo mode: an in-process scan server speaking the same HTTP contract as the
// real backend
//
// Scan output is scripted and deliberately delivered in odd-sized chunks that
// ignore line (and UTF-8) boundaries, so the console path is exercised the
// same way a real chunked response would exercise it. Everything else
// (projects, reports, chat, stats, settings) is held in memory.
//
// Run with: CERBERUS_DEMO=1 cargo run --release

use crate::model::{Project, ProjectId, Report, ScanRecord, ScopeKey, Stats};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Number of scan modules the demo claims to have
const MODULES_COUNT: u64 = 13;

/// Chunk sizes cycled through when splitting scan output
const CHUNK_SIZES: [usize; 6] = [5, 17, 3, 41, 11, 26];

/// How the demo server paces its scans
#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    /// Pause before each chunk
    pub step_delay: Duration,
    /// Emit the opening lines, then wait for a stop instead of finishing
    pub hold: bool,
    /// Start with sample projects and reports
    pub seed: bool,
}

impl DemoOptions {
    /// Paced output with sample data, for interactive use
    pub fn interactive() -> Self {
        Self {
            step_delay: Duration::from_millis(120),
            hold: false,
            seed: true,
        }
    }

    /// No pacing, no sample data
    pub fn instant() -> Self {
        Self {
            step_delay: Duration::ZERO,
            hold: false,
            seed: false,
        }
    }

    /// Scans never finish on their own
    pub fn held() -> Self {
        Self {
            hold: true,
            ..Self::instant()
        }
    }
}

#[derive(Default)]
struct DemoData {
    projects: Vec<Project>,
    next_id: u64,
    reports: HashMap<ScopeKey, Vec<Report>>,
    /// Stop signal per running scan
    scans: HashMap<ScopeKey, watch::Sender<bool>>,
    recent: Vec<ScanRecord>,
    tokens: HashMap<String, String>,
    proxy: Value,
    guidance: HashMap<(ProjectId, String), String>,
}

impl DemoData {
    fn seeded() -> Self {
        let mut data = Self {
            proxy: json!({ "enabled": false, "host": "", "port": 8080 }),
            ..Self::default()
        };
        for (name, target) in [("Acme Storefront", "shop.acme.test"), ("Internal Range", "10.0.0.0/24")] {
            data.add_project(name, target);
        }
        data.reports.insert(
            ScopeKey::Global,
            vec![Report {
                filename: "scanme.nmap.org_report.pdf".to_string(),
            }],
        );
        data.recent.push(ScanRecord {
            target: "scanme.nmap.org".to_string(),
            date: Utc::now().format("%Y-%m-%d %H:%M").to_string(),
            status: "Completed".to_string(),
        });
        data
    }

    fn add_project(&mut self, name: &str, target: &str) -> Project {
        self.next_id += 1;
        let project = Project {
            id: ProjectId::new(format!("{}", 1000 + self.next_id)),
            name: name.to_string(),
            target: target.to_string(),
            created_at: Utc::now().format("%Y-%m-%d").to_string(),
        };
        self.projects.push(project.clone());
        project
    }

    fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| &p.id == id)
    }
}

#[derive(Clone)]
struct DemoState {
    data: Arc<Mutex<DemoData>>,
    options: DemoOptions,
}

impl DemoState {
    fn lock(&self) -> MutexGuard<'_, DemoData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

fn error(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "error": text }))).into_response()
}

fn scope_of(param: Option<&str>) -> ScopeKey {
    match param.map(str::trim) {
        None | Some("") | Some("global") => ScopeKey::Global,
        Some(id) => ScopeKey::project(id),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scans
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScanForm {
    #[serde(default)]
    target: String,
    #[serde(default, rename = "scanType")]
    scan_type: Option<String>,
    #[serde(default)]
    comprehensive: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopForm {
    #[serde(default)]
    scope: Option<String>,
}

fn scan_script(target: &str, comprehensive: bool, scan_type: &str) -> Vec<String> {
    let mut lines = vec![
        format!("[*] Starting scan for {}", target),
        format!("[*] Scan type: {}", scan_type),
        "[*] Resolving DNS records".to_string(),
        "[*] Port scan: top 1000 TCP ports".to_string(),
        "[+] 22/tcp open ssh".to_string(),
        "[+] 80/tcp open http".to_string(),
        "[+] 443/tcp open https".to_string(),
        "[*] Checking TLS configuration".to_string(),
        "[WARN] TLS 1.0 still enabled".to_string(),
    ];
    if comprehensive {
        lines.extend([
            "[*] Comprehensive mode: enabling all modules".to_string(),
            "[*] Subdomain enumeration".to_string(),
            "[+] Found 4 subdomains".to_string(),
            "[*] Mail server checks".to_string(),
            "[WARN] SPF record uses ~all".to_string(),
        ]);
    }
    lines.extend([
        "[*] Inspecting HTTP headers".to_string(),
        "[WARN] Missing Content-Security-Policy header".to_string(),
        "[*] Generating report".to_string(),
        format!("[OK] Scan completed for {} ✓", target),
    ]);
    lines
}

/// Split text into chunks that ignore line and character boundaries
fn chunk(text: &str) -> VecDeque<Bytes> {
    let bytes = text.as_bytes();
    let mut chunks = VecDeque::new();
    let mut start = 0;
    let mut sizes = CHUNK_SIZES.iter().cycle();
    while start < bytes.len() {
        let size = sizes.next().copied().unwrap_or(8);
        let end = (start + size).min(bytes.len());
        chunks.push_back(Bytes::copy_from_slice(&bytes[start..end]));
        start = end;
    }
    chunks
}

/// Removes the scope's running entry however the response stream ends
struct ScanGuard {
    state: DemoState,
    scope: ScopeKey,
    target: String,
}

impl ScanGuard {
    fn record(&self, status: &str, report: bool) {
        let mut data = self.state.lock();
        if report {
            let slug: String = self
                .target
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
                .collect();
            data.reports
                .entry(self.scope.clone())
                .or_default()
                .push(Report {
                    filename: format!("{}_report.pdf", slug),
                });
        }
        data.recent.push(ScanRecord {
            target: self.target.clone(),
            date: Utc::now().format("%Y-%m-%d %H:%M").to_string(),
            status: status.to_string(),
        });
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.state.lock().scans.remove(&self.scope);
    }
}

struct ScanFeed {
    chunks: VecDeque<Bytes>,
    stop: watch::Receiver<bool>,
    delay: Duration,
    hold: bool,
    done: bool,
    guard: ScanGuard,
}

async fn next_chunk(mut feed: ScanFeed) -> Option<(Result<Bytes, Infallible>, ScanFeed)> {
    loop {
        if feed.done {
            return None;
        }
        if *feed.stop.borrow() {
            feed.done = true;
            feed.guard.record("Aborted", false);
            return Some((Ok(Bytes::from_static(b"\n[!] Scan interrupted by user\n")), feed));
        }
        if let Some(chunk) = feed.chunks.pop_front() {
            if !feed.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(feed.delay) => {}
                    _ = feed.stop.changed() => continue,
                }
            }
            return Some((Ok(chunk), feed));
        }
        if feed.hold {
            if feed.stop.changed().await.is_err() {
                feed.done = true;
            }
            continue;
        }
        feed.done = true;
        feed.guard.record("Completed", true);
    }
}

async fn start_scan(State(state): State<DemoState>, Form(form): Form<ScanForm>) -> Response {
    let target = form.target.trim().to_string();
    if target.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Target is required");
    }
    let scope = scope_of(form.project_id.as_deref());
    let comprehensive = form.comprehensive.as_deref() == Some("true");
    let scan_type = form.scan_type.unwrap_or_else(|| "full".to_string());

    let stop = {
        let mut data = state.lock();
        if data.scans.contains_key(&scope) {
            return error(StatusCode::CONFLICT, "A scan is already running");
        }
        let (tx, rx) = watch::channel(false);
        data.scans.insert(scope.clone(), tx);
        rx
    };

    tracing::info!("Demo scan started for {} on {}", target, scope);

    let mut lines = scan_script(&target, comprehensive, &scan_type);
    if state.options.hold {
        lines.truncate(3);
    }
    let mut text = lines.join("\n");
    text.push('\n');

    let feed = ScanFeed {
        chunks: chunk(&text),
        stop,
        delay: state.options.step_delay,
        hold: state.options.hold,
        done: false,
        guard: ScanGuard {
            state: state.clone(),
            scope,
            target,
        },
    };
    let body = Body::from_stream(futures::stream::unfold(feed, next_chunk));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; charset=utf-8")
        .body(body)
        .unwrap_or_else(|_| error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response"))
}

async fn stop_scan(State(state): State<DemoState>, Form(form): Form<StopForm>) -> Response {
    let scope = scope_of(form.scope.as_deref());
    let data = state.lock();
    match data.scans.get(&scope) {
        Some(tx) => {
            let _ = tx.send(true);
            tracing::info!("Demo scan on {} asked to stop", scope);
            message(StatusCode::OK, "Scan aborted.")
        }
        None => message(StatusCode::NOT_FOUND, "No scan is running."),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects and Reports
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewProject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    target: String,
}

async fn list_projects(State(state): State<DemoState>) -> Json<Vec<Project>> {
    Json(state.lock().projects.clone())
}

async fn create_project(State(state): State<DemoState>, Json(body): Json<NewProject>) -> Response {
    let (name, target) = (body.name.trim(), body.target.trim());
    if name.is_empty() || target.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Name and target are required");
    }
    let project = state.lock().add_project(name, target);
    (StatusCode::CREATED, Json(project)).into_response()
}

async fn delete_project(State(state): State<DemoState>, Path(id): Path<String>) -> Response {
    let id = ProjectId::new(id);
    let mut data = state.lock();
    let before = data.projects.len();
    data.projects.retain(|p| p.id != id);
    if data.projects.len() == before {
        return error(StatusCode::NOT_FOUND, "Project not found");
    }
    data.reports.remove(&ScopeKey::Project(id));
    message(StatusCode::OK, "Project deleted successfully")
}

fn list_reports_for(state: &DemoState, scope: &ScopeKey) -> Json<Vec<Report>> {
    Json(state.lock().reports.get(scope).cloned().unwrap_or_default())
}

fn delete_report_for(state: &DemoState, scope: &ScopeKey, filename: &str) -> Response {
    let mut data = state.lock();
    let reports = data.reports.entry(scope.clone()).or_default();
    let before = reports.len();
    reports.retain(|r| r.filename != filename);
    if reports.len() == before {
        return error(StatusCode::NOT_FOUND, "Report not found");
    }
    message(
        StatusCode::OK,
        &format!("Report {} deleted successfully", filename),
    )
}

async fn global_reports(State(state): State<DemoState>) -> Json<Vec<Report>> {
    list_reports_for(&state, &ScopeKey::Global)
}

async fn delete_global_report(
    State(state): State<DemoState>,
    Path(filename): Path<String>,
) -> Response {
    delete_report_for(&state, &ScopeKey::Global, &filename)
}

async fn project_reports(
    State(state): State<DemoState>,
    Path(id): Path<String>,
) -> Json<Vec<Report>> {
    list_reports_for(&state, &ScopeKey::project(id))
}

async fn delete_project_report(
    State(state): State<DemoState>,
    Path((id, filename)): Path<(String, String)>,
) -> Response {
    delete_report_for(&state, &ScopeKey::project(id), &filename)
}

async fn stats(State(state): State<DemoState>) -> Json<Stats> {
    let data = state.lock();
    Json(Stats {
        reports_count: data.reports.values().map(Vec::len).sum::<usize>() as u64,
        modules_count: MODULES_COUNT,
        clients_count: data.projects.len() as u64,
    })
}

async fn recent_scans(State(state): State<DemoState>) -> Json<Vec<ScanRecord>> {
    let data = state.lock();
    Json(data.recent.iter().rev().take(3).cloned().collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat and Guidance
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

async fn project_chat(
    State(state): State<DemoState>,
    Path(id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Response {
    if body.message.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "No message provided");
    }
    let data = state.lock();
    let Some(project) = data.project(&ProjectId::new(id)) else {
        return error(StatusCode::NOT_FOUND, "Project not found");
    };
    let reply = format!(
        "For {} ({}), start with the warnings in the latest report: TLS 1.0 and the missing CSP header are the quickest wins.",
        project.name, project.target
    );
    Json(json!({ "response": reply })).into_response()
}

fn generate_for(state: &DemoState, id: String, kind: &str) -> Response {
    let id = ProjectId::new(id);
    let mut data = state.lock();
    let Some(target) = data.project(&id).map(|p| p.target.clone()) else {
        return error(StatusCode::NOT_FOUND, "Project not found");
    };
    let markdown = match kind {
        "offensive" => format!(
            "# Next offensive steps for {}\n\n- Probe TLS 1.0 downgrade paths\n- Enumerate the four discovered subdomains\n",
            target
        ),
        _ => format!(
            "# Next defensive steps for {}\n\n- Disable TLS 1.0\n- Add a Content-Security-Policy header\n",
            target
        ),
    };
    data.guidance.insert((id, kind.to_string()), markdown);
    message(StatusCode::OK, &format!("Next {} steps generated", kind))
}

async fn next_offensive(State(state): State<DemoState>, Path(id): Path<String>) -> Response {
    generate_for(&state, id, "offensive")
}

async fn next_defensive(State(state): State<DemoState>, Path(id): Path<String>) -> Response {
    generate_for(&state, id, "defensive")
}

async fn guidance_file(
    State(state): State<DemoState>,
    Path((id, file)): Path<(String, String)>,
) -> Response {
    let kind = match file.as_str() {
        "next_offensive.md" => "offensive",
        "next_defensive.md" => "defensive",
        _ => return error(StatusCode::NOT_FOUND, "Not found"),
    };
    let data = state.lock();
    match data.guidance.get(&(ProjectId::new(id), kind.to_string())) {
        Some(markdown) => markdown.clone().into_response(),
        None => error(StatusCode::NOT_FOUND, "Not generated yet"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

async fn get_setting(State(state): State<DemoState>, Path(name): Path<String>) -> Response {
    let data = state.lock();
    if name == "proxy-config" {
        return Json(data.proxy.clone()).into_response();
    }
    match name.strip_suffix("-token") {
        Some(key) => {
            let token = data.tokens.get(key).cloned().unwrap_or_default();
            Json(json!({ "token": token })).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Unknown setting"),
    }
}

async fn set_setting(
    State(state): State<DemoState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut data = state.lock();
    if name == "proxy-config" {
        data.proxy = body;
        return message(StatusCode::OK, "Proxy configuration saved");
    }
    let Some(key) = name.strip_suffix("-token") else {
        return error(StatusCode::NOT_FOUND, "Unknown setting");
    };
    match body.get("token").and_then(Value::as_str).map(str::trim) {
        Some(token) if !token.is_empty() => {
            data.tokens.insert(key.to_string(), token.to_string());
            message(
                StatusCode::OK,
                &format!("{} token saved successfully", key.to_uppercase()),
            )
        }
        _ => error(StatusCode::BAD_REQUEST, "Token is required"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

fn router(state: DemoState) -> Router {
    Router::new()
        .route("/fullscan", post(start_scan))
        .route("/stopscan", post(stop_scan))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/:id", delete(delete_project))
        .route("/api/projects/:id/reports", get(project_reports))
        .route(
            "/api/projects/:id/reports/:filename",
            delete(delete_project_report),
        )
        .route("/api/projects/:id/chat", post(project_chat))
        .route("/api/projects/:id/next_offensive", post(next_offensive))
        .route("/api/projects/:id/next_defensive", post(next_defensive))
        .route("/projects/:id/:file", get(guidance_file))
        .route("/api/reports", get(global_reports))
        .route("/api/reports/:filename", delete(delete_global_report))
        .route("/api/stats", get(stats))
        .route("/api/recent-scans", get(recent_scans))
        .route("/api/settings/:name", get(get_setting).post(set_setting))
        .with_state(state)
}

/// A running demo server
pub struct DemoServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl DemoServer {
    /// Bind to an ephemeral localhost port and start serving
    pub async fn spawn(options: DemoOptions) -> Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), options).await
    }

    pub async fn bind(addr: SocketAddr, options: DemoOptions) -> Result<Self> {
        let data = if options.seed {
            DemoData::seeded()
        } else {
            DemoData::default()
        };
        let state = DemoState {
            data: Arc::new(Mutex::new(data)),
            options,
        };

        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind demo server")?;
        let addr = listener
            .local_addr()
            .context("Failed to read demo server address")?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::info!("Demo backend listening on {}", addr);

        let app = router(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                })
                .await
                .context("Demo server error")
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections; open scan streams get two seconds to drain
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(Duration::from_secs(2), &mut self.handle).await {
            Ok(Ok(Ok(()))) => tracing::info!("Demo backend shut down"),
            Ok(Ok(Err(e))) => tracing::warn!("Demo backend stopped with error: {:#}", e),
            Ok(Err(e)) => tracing::warn!("Demo backend task failed: {}", e),
            Err(_) => {
                tracing::warn!("Demo backend did not drain in time; aborting");
                self.handle.abort();
            }
        }
    }
}
