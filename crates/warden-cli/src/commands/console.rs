use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use warden_config::WardenConfig;
use warden_core::{SessionId, WardenError};
use warden_runtime::{CommandOutput, OperatorCommand, WardenRuntime};

use super::render;

pub(super) async fn cmd_run(config: WardenConfig) -> warden_core::Result<()> {
    let runtime = WardenRuntime::open(config)?;
    let governor = runtime.governor();

    println!("🛡️  Warden v{}", env!("CARGO_PKG_VERSION"));
    println!("   Store: {}", runtime.config().store.db_path.display());
    println!(
        "   Tier: {}, balance {:.2} (floor {:.2})",
        governor.hierarchy().current_tier(),
        governor.ledger().balance(),
        governor.ledger().floor()
    );
    println!(
        "   {} rules, {} backends, {} tasks",
        governor.gate().rule_names().len(),
        runtime.registry().profiles().len(),
        runtime.scheduler().statuses().len()
    );
    println!("   Type 'help' for commands, 'exit' or Ctrl+C to quit");
    println!();

    let cancel = CancellationToken::new();
    let scheduler = runtime.spawn_scheduler(cancel.child_token());
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut active: Option<SessionId> = None;

    loop {
        let prompt = match active {
            Some(_) => console::style("warden(dialogue)>").yellow(),
            None => console::style("warden>").cyan(),
        };
        eprint!("{prompt} ");
        std::io::stderr().flush().ok();

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF
                Err(e) => {
                    error!(error = %e, "failed to read operator input");
                    break;
                }
            },
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed {
            "exit" | "/exit" | "/quit" => break,
            "help" | "?" => {
                render::help();
                continue;
            }
            _ => {}
        }

        let command = match OperatorCommand::parse(trimmed) {
            Ok(command) => command,
            Err(e) => {
                println!("{} {e}", console::style("?").yellow());
                continue;
            }
        };
        let responding = matches!(command, OperatorCommand::Respond { .. });

        match runtime.execute(command, active).await {
            Ok(output) => {
                if let CommandOutput::Submission(s) = &output {
                    active = match s.session_id() {
                        Some(id) => Some(id),
                        None if responding => None,
                        None => active,
                    };
                }
                render::output(&output);
            }
            Err(e) => {
                if matches!(
                    e,
                    WardenError::SessionAborted { .. } | WardenError::SessionNotFound(_)
                ) {
                    active = None;
                }
                render::error(&e);
            }
        }
        println!();
    }

    cancel.cancel();
    if let Some(session_id) = active {
        info!(session_id = %session_id, "leaving with a dialogue open; its request stays unresolved");
    }
    if let Err(e) = scheduler.await {
        error!(error = %e, "scheduler task failed");
    }
    println!("👋 Goodbye!");
    Ok(())
}
