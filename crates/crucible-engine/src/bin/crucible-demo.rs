//! Crucible demo runner
//!
//! Seeds one deliberation session from the command line and prints its
//! events until the claim graduates, dies, or hits the cycle cap. Uses
//! the real HTTP transport when `CRUCIBLE_API_KEY` is set and falls back
//! to the scripted offline transport otherwise; embeddings always use the
//! local hash embedder.

use std::io;
use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crucible_core::{SessionConfig, Storage};
use crucible_engine::{
    ChatTransport, EventBus, HashEmbedder, HttpChatTransport, ScriptedTransport, SessionEvent,
    SessionStatus, SessionSupervisor, GLOBAL_TOPIC,
};

/// Parse command-line arguments and return the seed claim.
/// Exits the process if `--help` or `--version` is requested.
fn parse_args() -> String {
    let args: Vec<String> = std::env::args().collect();
    let mut claim_parts: Vec<String> = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Crucible demo v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Runs one claim deliberation session and prints its events.");
                println!();
                println!("USAGE:");
                println!("    crucible-demo <SEED CLAIM>");
                println!();
                println!("ENVIRONMENT:");
                println!("    CRUCIBLE_API_KEY         Provider key; offline transport when unset");
                println!("    CRUCIBLE_API_BASE        OpenAI-compatible endpoint override");
                println!("    CRUCIBLE_MODEL_POOL      Comma-separated model identifiers");
                println!("    CRUCIBLE_MAX_CYCLES      Cycle cap (default 50)");
                println!("    CRUCIBLE_COST_LIMIT_USD  Hard budget");
                println!("    RUST_LOG                 Log level filter");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("crucible-demo {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            arg => claim_parts.push(arg.to_string()),
        }
        i += 1;
    }

    if claim_parts.is_empty() {
        eprintln!("error: a seed claim is required");
        eprintln!("Usage: crucible-demo <SEED CLAIM>");
        std::process::exit(1);
    }
    claim_parts.join(" ")
}

/// Offline transport: agents refine the claim a little, sponsor ideas,
/// and the session walks to a natural end without any network.
fn offline_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .stub(
            "explorer",
            r#"{"valid": true, "new_claim": "A precisely scoped restatement of the seed claim", "summary": "tightened scope", "frontier_ideas": ["treat the claim as a falsifiable bet"]}"#,
        )
        .stub(
            "critic",
            r#"{"valid": true, "target_premise": "the mechanism generalizes to every domain", "objection": "generalization is asserted, not shown", "summary": "scoping objection"}"#,
        )
        .stub(
            "connector",
            r#"{"valid": true, "analogy": "like error-correcting codes", "mapping": "redundant premises detect single-premise failures", "summary": "coding analogy", "frontier_ideas": ["treat the claim as a falsifiable bet"]}"#,
        )
        .stub("Classify", "refinement")
        .stub(
            "added and removed",
            r#"{"additions": ["precise scoping"], "removals": ["universal quantifier"]}"#,
        )
}

#[tokio::main]
async fn main() {
    let seed_claim = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    info!("Crucible demo v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = SessionConfig::from_env();
    let storage = match Storage::new(None) {
        Ok(storage) => Arc::new(storage),
        Err(error) => {
            eprintln!("error: failed to initialize storage: {}", error);
            std::process::exit(1);
        }
    };

    let chat: Arc<dyn ChatTransport> =
        match HttpChatTransport::from_env(config.model_pool.clone()) {
            Ok(transport) => {
                info!("using HTTP chat transport");
                Arc::new(transport)
            }
            Err(error) => {
                warn!(%error, "falling back to offline scripted transport");
                Arc::new(offline_transport())
            }
        };

    let events = Arc::new(EventBus::new());
    let mut feed = events.subscribe(GLOBAL_TOPIC);
    let supervisor = SessionSupervisor::new(storage, chat, Arc::new(HashEmbedder), events);

    let session_id = match supervisor.start_session(&seed_claim, config) {
        Ok(id) => id,
        Err(error) => {
            eprintln!("error: failed to start session: {}", error);
            std::process::exit(1);
        }
    };
    info!(%session_id, claim = %seed_claim, "session running");

    // print the event stream until the session leaves the running state
    loop {
        match feed.recv().await {
            Ok(event) => {
                println!("{}", event.to_json());
                if matches!(
                    event,
                    SessionEvent::SessionCompleted { .. } | SessionEvent::SessionStopped { .. }
                ) {
                    break;
                }
            }
            Err(error) => {
                warn!(%error, "event feed interrupted");
                break;
            }
        }
    }

    let info = supervisor.info(&session_id).ok();
    if let Some(info) = info {
        info!(
            status = ?info.status,
            cycles = info.cycle_count,
            support = info.support_strength,
            "session finished"
        );
        if info.status == SessionStatus::Stopped {
            if let Some(last_error) = info.last_error {
                warn!(%last_error, "session stopped with error");
            }
        }
    }
}
