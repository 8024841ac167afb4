// Cerberus Console - operation streaming and session coordination
//
// Client core for the Cerberus security-scanning dashboard:
// - Operations: start/stop long-running scans, framing streamed output into
//   per-scope console buffers (global scanner vs. each project)
// - Sessions: project selection, reports, per-project chat and guidance
// - Notifications: independently timed toasts
// - Event bus: every observable change is published as a DashboardEvent,
//   consumed by the interactive shell and the optional JSONL journal

pub mod api;
pub mod chat;
pub mod cli;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod demo;
pub mod events;
pub mod framer;
pub mod logging;
pub mod model;
pub mod operation;
pub mod refresh;
pub mod session;
pub mod settings;
pub mod shell;
pub mod startup;
pub mod storage;
pub mod toast;
pub mod util;

pub use dashboard::{Dashboard, DashboardOptions};
