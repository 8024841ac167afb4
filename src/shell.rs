// Shell module - interactive line-oriented front end
//
// Two halves share one Dashboard:
// - a renderer task subscribed to the event bus, printing console lines of
//   the active scope and every toast as they are published
// - a command loop reading stdin, one command per line
//
// The renderer never blocks the core; lagging just skips events.

use crate::api::{GuidanceKind, TokenName};
use crate::dashboard::Dashboard;
use crate::events::DashboardEvent;
use crate::logging::LogBuffer;
use crate::model::{ProjectId, ScanOptions, ScopeKey};
use crate::operation::OperationError;
use crate::session::Tab;
use crate::toast::{ToastId, ToastKind};
use crate::util::{shorten_report_name, truncate_utf8_safe};
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// Longest log message shown by `logs` before truncation
const LOG_MESSAGE_MAX_BYTES: usize = 200;
const DEFAULT_LOG_TAIL: usize = 20;

const HELP: &str = "\
Scanner
  scan <target> [--comprehensive]   start a scan on the active scope
  stop                              request a stop for the active scope
  clear                             clear the active console
  console                           reprint the active console
  status                            active scope and running scans
Projects
  projects                          list projects
  select <id>|global                switch the active scope
  create <name...> <target>         create a project
  delete <id>                       delete a project
  tab scanner|reports|chat          switch tab
Reports
  reports                           list reports for the active scope
  rm-report <file>                  delete a report
  stats | recent                    dashboard counters / last scans
Chat (project selected)
  chat <message>                    ask the assistant
  chat-clear | chat-export          reset / save the transcript
  guidance offensive|defensive      generate next steps
  show-guidance offensive|defensive print generated next steps
Settings
  tokens                            show API token status
  token <name> <value>              save an API token
  proxy [<json>]                    show or replace the proxy config
Misc
  toasts | dismiss <id> | logs [n] | help | quit";

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Scan { target: String, comprehensive: bool },
    Stop,
    Clear,
    Console,
    Status,
    Projects,
    Select(Option<ProjectId>),
    Create { name: String, target: String },
    Delete(ProjectId),
    Tab(Tab),
    Reports,
    DeleteReport(String),
    Stats,
    Recent,
    Chat(String),
    ChatClear,
    ChatExport,
    Guidance(GuidanceKind),
    ShowGuidance(GuidanceKind),
    Tokens,
    SetToken { name: TokenName, value: String },
    Proxy(Option<serde_json::Value>),
    Toasts,
    Dismiss(ToastId),
    Logs(usize),
}

fn parse_guidance(arg: &str) -> Result<GuidanceKind, String> {
    match arg.to_lowercase().as_str() {
        "offensive" => Ok(GuidanceKind::Offensive),
        "defensive" => Ok(GuidanceKind::Defensive),
        _ => Err("expected 'offensive' or 'defensive'".to_string()),
    }
}

/// Parse one input line; blank lines parse to `None`
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word.to_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "scan" => {
            let comprehensive = args.iter().any(|a| *a == "--comprehensive" || *a == "-c");
            let target = args
                .iter()
                .find(|a| !a.starts_with('-'))
                .ok_or("usage: scan <target> [--comprehensive]")?;
            Command::Scan {
                target: target.to_string(),
                comprehensive,
            }
        }
        "stop" => Command::Stop,
        "clear" => Command::Clear,
        "console" => Command::Console,
        "status" => Command::Status,
        "projects" => Command::Projects,
        "select" => match args.as_slice() {
            ["global"] | ["none"] => Command::Select(None),
            [id] => Command::Select(Some(ProjectId::new(*id))),
            _ => return Err("usage: select <id>|global".to_string()),
        },
        "create" => match args.split_last() {
            Some((target, name)) if !name.is_empty() => Command::Create {
                name: name.join(" "),
                target: target.to_string(),
            },
            _ => return Err("usage: create <name...> <target>".to_string()),
        },
        "delete" => match args.as_slice() {
            [id] => Command::Delete(ProjectId::new(*id)),
            _ => return Err("usage: delete <id>".to_string()),
        },
        "tab" => {
            let tab = args
                .first()
                .and_then(|name| Tab::parse(name))
                .ok_or("usage: tab scanner|reports|chat")?;
            Command::Tab(tab)
        }
        "reports" => Command::Reports,
        "rm-report" => match args.as_slice() {
            [file] => Command::DeleteReport(file.to_string()),
            _ => return Err("usage: rm-report <file>".to_string()),
        },
        "stats" => Command::Stats,
        "recent" => Command::Recent,
        "chat" if rest.is_empty() => return Err("usage: chat <message>".to_string()),
        "chat" => Command::Chat(rest.to_string()),
        "chat-clear" => Command::ChatClear,
        "chat-export" => Command::ChatExport,
        "guidance" => Command::Guidance(parse_guidance(rest)?),
        "show-guidance" => Command::ShowGuidance(parse_guidance(rest)?),
        "tokens" => Command::Tokens,
        "token" => match args.as_slice() {
            [name, value] => Command::SetToken {
                name: TokenName::parse(name).ok_or_else(|| format!("unknown token '{}'", name))?,
                value: value.to_string(),
            },
            _ => return Err("usage: token <name> <value>".to_string()),
        },
        "proxy" if rest.is_empty() => Command::Proxy(None),
        "proxy" => {
            let value = serde_json::from_str(rest).map_err(|e| format!("invalid JSON: {}", e))?;
            Command::Proxy(Some(value))
        }
        "toasts" => Command::Toasts,
        "dismiss" => {
            let id = args
                .first()
                .and_then(|id| id.parse::<u64>().ok())
                .ok_or("usage: dismiss <id>")?;
            Command::Dismiss(ToastId(id))
        }
        "logs" => {
            let n = match args.first() {
                Some(n) => n.parse().map_err(|_| "usage: logs [n]")?,
                None => DEFAULT_LOG_TAIL,
            };
            Command::Logs(n)
        }
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn toast_icon(kind: ToastKind) -> &'static str {
    match kind {
        ToastKind::Info => "i",
        ToastKind::Success => "✓",
        ToastKind::Warning => "!",
        ToastKind::Error => "✗",
    }
}

/// Text to print for an event, given the scope on screen
pub fn render_event(event: &DashboardEvent, active: &ScopeKey) -> Option<String> {
    match event {
        DashboardEvent::ConsoleLine { scope, line, .. } if scope == active => Some(line.clone()),
        DashboardEvent::ConsoleCleared { scope, .. } if scope == active => {
            Some("── console cleared ──".to_string())
        }
        DashboardEvent::ToastShown { toast } => Some(format!(
            "  [{}] {}: {}  (#{})",
            toast_icon(toast.kind),
            toast.title,
            toast.message,
            toast.id
        )),
        DashboardEvent::OperationChanged {
            scope, from, to, ..
        } if scope != active => Some(format!("  ({}: {} → {})", scope, from, to)),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command execution
// ─────────────────────────────────────────────────────────────────────────────

/// Text to print when a scanner command is refused or fails
fn operation_failure<T>(result: &Result<T, OperationError>) -> Option<String> {
    result.as_ref().err().map(|e| e.to_string())
}

enum Flow {
    Continue,
    Quit,
}

struct Shell {
    dashboard: Dashboard,
    logs: LogBuffer,
}

impl Shell {
    /// Run one command. Failures are already surfaced as toasts by the
    /// components; refused scanner commands also print their error.
    async fn execute(&self, command: Command) -> Flow {
        let dashboard = &self.dashboard;
        let session = dashboard.session();

        match command {
            Command::Help => println!("{}", HELP),
            Command::Quit => return Flow::Quit,

            Command::Scan {
                target,
                comprehensive,
            } => {
                let options = ScanOptions::default().comprehensive(comprehensive);
                // Runs in the background; lines arrive through the renderer
                let result = dashboard.start_scan(&target, options);
                if let Some(text) = operation_failure(&result) {
                    println!("{}", text);
                }
            }
            Command::Stop => {
                let result = dashboard.stop_scan().await;
                if let Some(text) = operation_failure(&result) {
                    println!("{}", text);
                }
            }
            Command::Clear => {
                dashboard.clear_console();
            }
            Command::Console => {
                for line in session.view().console {
                    println!("{}", line);
                }
            }
            Command::Status => {
                let view = session.view();
                let name = view
                    .project
                    .as_ref()
                    .map(|p| format!("{} ({})", p.name, p.target))
                    .unwrap_or_else(|| "dashboard".to_string());
                println!("Active: {} [{}] tab={}", name, view.scope, view.tab.as_str());
                println!("Operation: {} ({} console lines)", view.operation, view.console.len());
                for scope in dashboard.operations().active_scopes() {
                    if let Some(op) = dashboard.operations().session(&scope) {
                        println!("  running {} → {} since {}", scope, op.target, op.started_at);
                    }
                }
            }

            Command::Projects => {
                if let Ok(projects) = session.reload().await {
                    if projects.is_empty() {
                        println!("No projects yet. Use 'create <name> <target>'.");
                    }
                    let selected = session.selection();
                    for p in projects {
                        let marker = if Some(&p.id) == selected.as_ref() { "*" } else { " " };
                        println!("{} {:<8} {:<24} {} {}", marker, p.id, p.name, p.target, p.created_at);
                    }
                }
            }
            Command::Select(id) => match session.select(id) {
                Ok(scope) => {
                    println!("Now viewing {}", scope);
                    for line in dashboard.consoles().lines(&scope) {
                        println!("{}", line);
                    }
                }
                Err(e) => println!("{}", e),
            },
            Command::Create { name, target } => {
                if let Ok(project) = session.create(&name, &target).await {
                    println!("Created {} ({})", project.name, project.id);
                }
            }
            Command::Delete(id) => {
                let _ = session.delete(&id).await;
            }
            Command::Tab(tab) => {
                if let Err(e) = session.set_tab(tab) {
                    println!("{}", e);
                }
            }

            Command::Reports => {
                dashboard.refresh().await;
                let reports = session.reports();
                if reports.is_empty() {
                    println!("No reports for {}", session.active_scope());
                }
                for report in reports {
                    println!("  {}", shorten_report_name(&report.filename));
                }
            }
            Command::DeleteReport(file) => {
                let _ = session.delete_report(&file).await;
            }
            Command::Stats => match dashboard.refresh().await.stats() {
                Some(stats) => println!(
                    "Reports: {}  Modules: {}  Clients: {}",
                    stats.reports_count, stats.modules_count, stats.clients_count
                ),
                None => println!("No stats loaded"),
            },
            Command::Recent => {
                dashboard.refresh_scope(ScopeKey::Global).await;
                for scan in dashboard.views().recent_scans() {
                    println!("  {:<28} {:<20} {}", scan.target, scan.date, scan.status);
                }
            }

            Command::Chat(message) => match session.send_chat(&message).await {
                Ok(reply) => println!("ASSISTANT: {}", reply),
                Err(e) => println!("{}", e),
            },
            Command::ChatClear => {
                if let Err(e) = session.clear_chat() {
                    println!("{}", e);
                }
            }
            Command::ChatExport => match session.export_chat() {
                Ok((file, text)) => match std::fs::write(&file, text) {
                    Ok(()) => println!("Saved {}", file),
                    Err(e) => println!("Could not write {}: {}", file, e),
                },
                Err(e) => println!("{}", e),
            },
            Command::Guidance(kind) => {
                if let Err(e) = session.generate_guidance(kind).await {
                    println!("{}", e);
                }
            }
            Command::ShowGuidance(kind) => match session.guidance(kind).await {
                Ok(Some(markdown)) => println!("{}", markdown),
                Ok(None) => println!("No {} guidance generated yet", kind.as_str()),
                Err(e) => println!("{}", e),
            },

            Command::Tokens => {
                for status in dashboard.settings().tokens().await.into_iter().flatten() {
                    println!("  {:<12} {}", status.name.as_str(), status.masked());
                }
            }
            Command::SetToken { name, value } => {
                let _ = dashboard.settings().set_token(name, &value).await;
            }
            Command::Proxy(None) => {
                if let Ok(config) = dashboard.settings().proxy_config().await {
                    match serde_json::to_string_pretty(&config) {
                        Ok(pretty) => println!("{}", pretty),
                        Err(_) => println!("{}", config),
                    }
                }
            }
            Command::Proxy(Some(value)) => {
                let _ = dashboard.settings().set_proxy_config(&value).await;
            }

            Command::Toasts => {
                for toast in dashboard.toasts().active() {
                    println!("  #{} [{}] {}: {}", toast.id, toast.kind.as_str(), toast.title, toast.message);
                }
            }
            Command::Dismiss(id) => {
                if !dashboard.toasts().dismiss(id) {
                    println!("No toast #{}", id);
                }
            }
            Command::Logs(n) => {
                for entry in self.logs.tail(n) {
                    println!(
                        "{} {:<5} {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.level.as_str(),
                        truncate_utf8_safe(&entry.message, LOG_MESSAGE_MAX_BYTES)
                    );
                }
            }
        }
        Flow::Continue
    }
}

/// Run the interactive shell until `quit` or end of input
pub async fn run(dashboard: Dashboard, logs: LogBuffer) -> Result<()> {
    let mut events = dashboard.bus().subscribe();
    let renderer_dashboard = dashboard.clone();
    let renderer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let active = renderer_dashboard.session().active_scope();
                    if let Some(text) = render_event(&event, &active) {
                        println!("{}", text);
                    }
                }
                Err(RecvError::Lagged(n)) => println!("  (skipped {} events)", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Populate the project cache and the dashboard counters
    let _ = dashboard.session().list().await;
    let _ = dashboard.session().select(None);

    let shell = Shell { dashboard, logs };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                tracing::debug!("Shell command: {:?}", command);
                if let Flow::Quit = shell.execute(command).await {
                    break;
                }
            }
            Err(usage) => println!("{}", usage),
        }
    }

    // Stop whatever is still running so the backend isn't left scanning
    for scope in shell.dashboard.operations().active_scopes() {
        let _ = shell.dashboard.operations().stop(&scope).await;
    }
    renderer.abort();
    Ok(())
}
