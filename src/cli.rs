// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - (none): interactive shell
// - scan <target>: one-shot scan streamed to stdout
// - config --show: Display effective configuration
// - config --reset: Regenerate config file with defaults
// - config --path: Show config file path

use crate::config::{Config, VERSION};
use clap::{Parser, Subcommand};
use std::io::Write;

/// Cerberus console - scan operations and project sessions from the terminal
#[derive(Debug, Parser)]
#[command(name = "cerberus-console")]
#[command(version = VERSION)]
#[command(about = "Terminal client for the Cerberus scan server", long_about = None)]
pub struct Cli {
    /// Run against the built-in demo backend (same as CERBERUS_DEMO=1)
    #[arg(long, global = true)]
    pub demo: bool,

    /// Scan server base URL (overrides CERBERUS_API_URL and the config file)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one scan and stream its output; Ctrl+C requests a stop
    Scan {
        /// Target host, domain or URL
        target: String,

        /// Run the comprehensive module set
        #[arg(long)]
        comprehensive: bool,

        /// Scope the scan to a project id
        #[arg(long, value_name = "ID")]
        project: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle `config` flags. Returns the process exit code.
pub fn handle_config(config: &Config, show: bool, reset: bool, path: bool) -> i32 {
    if path {
        handle_config_path()
    } else if show {
        handle_config_show(config)
    } else if reset {
        handle_config_reset()
    } else {
        // No flag provided, show help
        println!("Usage: cerberus-console config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        0
    }
}

fn handle_config_path() -> i32 {
    match Config::config_path() {
        Some(path) => {
            println!("{}", path.display());
            0
        }
        None => {
            eprintln!("Error: Could not determine config path");
            1
        }
    }
}

fn handle_config_show(config: &Config) -> i32 {
    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    if config.demo_mode {
        println!();
        println!("# demo mode active (CERBERUS_DEMO)");
    }

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    0
}

fn handle_config_reset() -> i32 {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        return 1;
    };

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err()
            || !input.trim().eq_ignore_ascii_case("y")
        {
            println!("Aborted.");
            return 0;
        }
    }

    // Write the default config (using Config's single source of truth)
    match Config::default().save() {
        Ok(()) => {
            println!("Config reset to defaults: {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error writing config: {}", e);
            1
        }
    }
}
