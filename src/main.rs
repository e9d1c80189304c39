// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Capture Relay CLI
//!
//! Inspect capture rules and exercise the authenticated backend paths.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use capture_relay::{
    FileStore, MemoryStore, ProxyOptions, RelayConfig, RelayContext, Result, StateStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "capture_relay=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    match args[1].as_str() {
        "rules" => {
            if args.len() < 3 {
                eprintln!("Usage: capture-relay rules <host>");
                return ExitCode::from(1);
            }
            list_rules(&args[2]).await
        }
        "match" => {
            if args.len() < 4 {
                eprintln!("Usage: capture-relay match <host> <url>");
                return ExitCode::from(1);
            }
            match_url(&args[2], &args[3]).await
        }
        "forward" => {
            if args.len() < 4 {
                eprintln!("Usage: capture-relay forward <host> <path> [method]");
                return ExitCode::from(1);
            }
            let method = args.get(4).map(String::as_str).unwrap_or("GET");
            forward(&args[2], &args[3], method).await
        }
        "refresh" => {
            if args.len() < 3 {
                eprintln!("Usage: capture-relay refresh <host>");
                return ExitCode::from(1);
            }
            refresh(&args[2]).await
        }
        "--help" | "-h" | "help" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "--version" | "-v" | "version" => {
            println!("capture-relay {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"Capture Relay - Authenticated Network Mediation

USAGE:
    capture-relay <COMMAND> [OPTIONS]

COMMANDS:
    rules <host>                      Fetch and list the capture rules
    match <host> <url>                Show which capture rule matches a URL
    forward <host> <path> [method]    Send an authenticated request to the backend
    refresh <host>                    Run one token refresh
    help                              Show this help message
    version                           Show version information

ENVIRONMENT:
    RELAY_ACCESS_TOKEN     Access token for forward/refresh
    RELAY_REFRESH_TOKEN    Refresh token for forward/refresh
    RELAY_CONFIG           JSON config file
    RELAY_STATE_DIR        Directory for persisted state (in-memory if unset)
    RELAY_TIMEOUT_SECS     Request and refresh timeout override

EXAMPLES:
    capture-relay rules https://backend.example
    capture-relay match https://backend.example https://shop.example/api/cart
    capture-relay forward https://backend.example /api/v1/user/me
"#
    );
}

async fn build_context(host: &str) -> Result<RelayContext> {
    let config = match env::var("RELAY_CONFIG") {
        Ok(path) => RelayConfig::from_file(path)?,
        Err(_) => RelayConfig::new(),
    }
    .with_env_overrides()?
    .host(host);

    let store: Arc<dyn StateStore> = match env::var("RELAY_STATE_DIR") {
        Ok(dir) => Arc::new(FileStore::open(dir).await?),
        Err(_) => Arc::new(MemoryStore::new()),
    };

    RelayContext::new(config, store).await
}

async fn login_from_env(ctx: &RelayContext, host: &str) -> Result<()> {
    let access = env::var("RELAY_ACCESS_TOKEN").unwrap_or_default();
    let refresh = env::var("RELAY_REFRESH_TOKEN").unwrap_or_default();
    if access.is_empty() && refresh.is_empty() && ctx.credentials().is_logged_in() {
        return Ok(());
    }
    ctx.login(Some(host), &access, &refresh).await
}

async fn list_rules(host: &str) -> ExitCode {
    let ctx = match build_context(host).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to start relay: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = ctx.rules().refresh().await {
        eprintln!("Failed to fetch capture rules: {}", e);
        return ExitCode::from(1);
    }

    let rules = ctx.rules().rules();
    println!("=== Capture Rules ({}) ===", rules.len());
    for rule in rules.iter() {
        println!(
            "  [{:>4}] {:<24} {:<40} {}{}",
            rule.priority,
            rule.name,
            rule.pattern,
            rule.data_type,
            if rule.enabled { "" } else { " (disabled)" }
        );
    }
    ExitCode::SUCCESS
}

async fn match_url(host: &str, url: &str) -> ExitCode {
    let ctx = match build_context(host).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to start relay: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = ctx.rules().refresh().await {
        eprintln!("Failed to fetch capture rules: {}", e);
        return ExitCode::from(1);
    }

    match ctx.rules().match_url(url) {
        Some(rule) => {
            println!("Matched: {} (priority {}, pattern {:?})", rule.name, rule.priority, rule.pattern);
            if !rule.data_type.is_empty() {
                println!("Data type: {}", rule.data_type);
            }
            ExitCode::SUCCESS
        }
        None => {
            println!("No capture rule matches {}", url);
            ExitCode::from(2)
        }
    }
}

async fn forward(host: &str, path: &str, method: &str) -> ExitCode {
    let ctx = match build_context(host).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to start relay: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = login_from_env(&ctx, host).await {
        eprintln!("Login failed: {}", e);
        return ExitCode::from(1);
    }

    let response = match ctx
        .gateway()
        .forward("cli-1", path, ProxyOptions::new().method(method))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Forward failed: {}", e);
            return ExitCode::from(1);
        }
    };

    match serde_json::to_string_pretty(&response) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode response: {}", e),
    }

    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn refresh(host: &str) -> ExitCode {
    let ctx = match build_context(host).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to start relay: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = login_from_env(&ctx, host).await {
        eprintln!("Login failed: {}", e);
        return ExitCode::from(1);
    }

    match ctx.coordinator().ensure_fresh_token().await {
        Some(token) => {
            let shown: String = token.chars().take(8).collect();
            println!("Refreshed access token: {}...", shown);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Refresh failed; credentials cleared");
            ExitCode::from(1)
        }
    }
}
