// Startup module - displays banner and module status
//
// Printed once before the interactive shell takes over the terminal, and
// mirrored into the log so the `logs` command shows how the session began.

use crate::config::{Config, Features, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Module status for display
pub struct ModuleStatus {
    pub name: &'static str,
    pub enabled: bool,
    pub description: &'static str,
}

/// Print the startup banner and module status
pub fn print_startup(config: &Config, api_url: &str) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}Cerberus Console{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Scan operations and project sessions{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    for module in &module_status(config) {
        print_module_status(module);
    }
    println!();

    println!("  {MAGENTA}▸{RESET} Scan server {BOLD}{}{RESET}", api_url);
    if config.demo_mode {
        println!("  {YELLOW}▸{RESET} {YELLOW}Demo mode active{RESET} {DIM}(in-process backend){RESET}");
    }
    println!("  {DIM}Type 'help' for commands.{RESET}");
    println!();
}

fn module_status(config: &Config) -> Vec<ModuleStatus> {
    let Features {
        journal,
        refresh_on_complete,
    } = &config.features;

    vec![
        ModuleStatus {
            name: "operations",
            enabled: true,
            description: "Scan streaming",
        },
        ModuleStatus {
            name: "sessions",
            enabled: true,
            description: "Projects, reports, chat",
        },
        ModuleStatus {
            name: "refresh",
            enabled: *refresh_on_complete,
            description: "Stats after each scan",
        },
        ModuleStatus {
            name: "journal",
            enabled: *journal,
            description: "JSONL event log",
        },
        ModuleStatus {
            name: "file-log",
            enabled: config.logging.file_enabled,
            description: "Trace files",
        },
    ]
}

fn print_module_status(module: &ModuleStatus) {
    use colors::*;

    let (icon, style) = if module.enabled {
        (format!("{GREEN}✓{RESET}"), "")
    } else {
        (format!("{DIM}○{RESET}"), DIM)
    };

    println!(
        "    {icon} {style}{:<12}{RESET} {DIM}{}{RESET}",
        module.name, module.description
    );
}

/// Mirror the startup status into the log buffer
pub fn log_startup(config: &Config, api_url: &str) {
    tracing::info!("Cerberus Console v{}", VERSION);
    for module in &module_status(config) {
        let icon = if module.enabled { "✓" } else { "○" };
        tracing::info!("  {} {} - {}", icon, module.name, module.description);
    }
    tracing::info!("Scan server: {}", api_url);
    if config.demo_mode {
        tracing::info!("Demo mode active");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_status_follows_features() {
        let mut config = Config::default();
        config.features.journal = false;

        let modules = module_status(&config);
        let journal = modules.iter().find(|m| m.name == "journal").unwrap();
        assert!(!journal.enabled);
        let refresh = modules.iter().find(|m| m.name == "refresh").unwrap();
        assert!(refresh.enabled);
    }
}
