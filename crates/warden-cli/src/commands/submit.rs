use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use warden_config::WardenConfig;
use warden_core::{ActionRequest, WardenError};
use warden_policy::OperatorInput;
use warden_runtime::WardenRuntime;

use super::render;

/// Submit one request. If the gate opens a dialogue, it is carried on here:
/// each stdin line is parsed as dialogue input, Ctrl+C or EOF abandons the
/// session and leaves the request unresolved.
pub(super) async fn cmd_submit(config: WardenConfig, description: String, urgent: bool) -> warden_core::Result<()> {
    let runtime = WardenRuntime::open(config)?;
    let governor = runtime.governor();

    let mut request = ActionRequest::operator(description);
    if urgent {
        request = request.urgent();
    }
    let mut submission = governor.submit(request).await?;
    render::submission(&submission);

    let Some(_) = submission.session_id() else {
        return Ok(());
    };

    let (tx, mut rx) = mpsc::channel::<OperatorInput>(1);
    let cancel = CancellationToken::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(session_id) = submission.session_id() {
        // Feed exactly one parsed input (or the cancellation) to the wait below.
        loop {
            eprint!("{} ", console::style("warden(dialogue)>").yellow());
            std::io::stderr().flush().ok();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match OperatorInput::parse(&line) {
                        Some(input) => {
                            if tx.send(input).await.is_err() {
                                cancel.cancel();
                            }
                            break;
                        }
                        None if line.trim().is_empty() => {}
                        None => println!("   expected: ack | correct <text> | accept | override | cancel"),
                    },
                    Ok(None) => {
                        cancel.cancel();
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read operator input");
                        cancel.cancel();
                        break;
                    }
                },
            }
        }

        submission = match governor.await_input(session_id, &mut rx, &cancel).await {
            Ok(next) => next,
            Err(e @ WardenError::InvalidTransition { .. }) => {
                render::error(&e);
                continue;
            }
            Err(e) => {
                if let Some(request) = governor.unresolved().first() {
                    println!("   request {} left unresolved", request.request.id());
                }
                return Err(e);
            }
        };
        render::submission(&submission);
    }
    Ok(())
}
