//! helpdesk-cli - client for the Helpdesk session API
//!
//! Opens a support session over HTTP and keeps it alive with a once-per-second
//! ping, the way a chat widget would.
//!
//! # Subcommands
//! - `create`                  - request a session and print its id
//! - `ping <session-id>`       - prolong a session once
//! - `connect [--interval ms]` - create, then ping until the server drops it
//! - `status`                  - show pool capacity and per-agent load

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";
const DEFAULT_INTERVAL_MS: u64 = 1000;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "helpdesk-cli", version, about = "Helpdesk support session client")]
struct Cli {
    /// Helpdesk HTTP server URL (overrides HELPDESK_HTTP_URL env var)
    #[arg(long, env = "HELPDESK_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Request a new support session
    Create,

    /// Prolong an existing session once
    Ping {
        /// Session id returned by `create`
        session_id: Uuid,
    },

    /// Create a session and keep it alive until it is dropped or Ctrl-C
    Connect {
        /// Keep-alive period in milliseconds
        #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
        interval: u64,
    },

    /// Show pool status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateCode {
    Created,
    TooBusy,
    Failed,
}

/// Response from POST /api/session/create
#[derive(Debug, Deserialize)]
pub struct CreateResponse {
    pub code: CreateCode,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingCode {
    Success,
    Failed,
}

/// Response from PUT /api/session/ping
#[derive(Debug, Deserialize)]
pub struct PingResponse {
    pub code: PingCode,
}

#[derive(Debug, Serialize)]
struct PingRequest {
    session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AgentStatus {
    pub id: u32,
    pub kind: String,
    pub level: String,
    pub working_hours: String,
    pub available: bool,
    pub queue_size: usize,
    pub max_slots: usize,
}

/// Response from GET /api/pool/status
#[derive(Debug, Deserialize)]
pub struct PoolStatus {
    pub capacity: usize,
    pub maximum_queue_size: usize,
    pub queue_size: usize,
    pub active_sessions: usize,
    pub agents: Vec<AgentStatus>,
}

/// One line per agent, e.g. `  10 regular    Junior    07:00-15:00  2/4`.
pub fn format_agent_line(agent: &AgentStatus) -> String {
    let marker = if agent.available { "" } else { "  (closed)" };
    format!(
        "  {:>4} {:<10} {:<9} {}  {}/{}{}",
        agent.id,
        agent.kind,
        agent.level,
        agent.working_hours,
        agent.queue_size,
        agent.max_slots,
        marker
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?)
}

fn create_session(client: &reqwest::blocking::Client, server: &str) -> anyhow::Result<CreateResponse> {
    let url = format!("{}/api/session/create", server);
    let resp = client.post(&url).send()?;
    if !resp.status().is_success() {
        anyhow::bail!("server returned {} for {}", resp.status(), url);
    }
    Ok(resp.json()?)
}

fn ping_session(
    client: &reqwest::blocking::Client,
    server: &str,
    session_id: Uuid,
) -> anyhow::Result<PingResponse> {
    let url = format!("{}/api/session/ping", server);
    let resp = client.put(&url).json(&PingRequest { session_id }).send()?;
    if !resp.status().is_success() {
        anyhow::bail!("server returned {} for {}", resp.status(), url);
    }
    Ok(resp.json()?)
}

fn do_create(server: &str) -> anyhow::Result<()> {
    let response = create_session(&client()?, server)?;
    match (response.code, response.session_id) {
        (CreateCode::Created, Some(id)) => println!("Session created: {}", id),
        (CreateCode::TooBusy, _) => {
            eprintln!("There are too many connections at the time. Please try again later");
            std::process::exit(2);
        }
        _ => anyhow::bail!("server failed to create a session"),
    }
    Ok(())
}

fn do_ping(server: &str, session_id: Uuid) -> anyhow::Result<()> {
    match ping_session(&client()?, server, session_id)?.code {
        PingCode::Success => println!("Session {} prolongated", session_id),
        PingCode::Failed => {
            eprintln!("Session {} is unknown or expired", session_id);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn do_connect(server: &str, interval: Duration) -> anyhow::Result<()> {
    let client = client()?;
    let response = create_session(&client, server)?;

    let session_id = match (response.code, response.session_id) {
        (CreateCode::Created, Some(id)) => id,
        (CreateCode::TooBusy, _) => {
            eprintln!("There are too many connections at the time. Please try again later");
            std::process::exit(2);
        }
        _ => anyhow::bail!("server failed to create a session"),
    };
    println!("Session created: {}", session_id);

    loop {
        std::thread::sleep(interval);
        if ping_session(&client, server, session_id)?.code == PingCode::Failed {
            anyhow::bail!("session {} was dropped by the server", session_id);
        }
    }
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/pool/status", server);
    let resp = match client()?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("helpdesk-cli: cannot reach {} - {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        eprintln!("helpdesk-cli: server returned HTTP {}", resp.status());
        std::process::exit(1);
    }

    let status: PoolStatus = resp.json()?;
    println!("Capacity:        {}", status.capacity);
    println!("Max backlog:     {}", status.maximum_queue_size);
    println!("Backlog:         {}", status.queue_size);
    println!("Active sessions: {}", status.active_sessions);
    println!("Agents:");
    for agent in &status.agents {
        println!("{}", format_agent_line(agent));
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Create => do_create(&server),
        Commands::Ping { session_id } => do_ping(&server, session_id),
        Commands::Connect { interval } => do_connect(&server, Duration::from_millis(interval)),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("helpdesk-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
