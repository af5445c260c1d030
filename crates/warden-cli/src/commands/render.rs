//! Terminal rendering for command output.

use chrono::{DateTime, Utc};
use console::style;

use warden_core::{ActionRecord, ErrorKind, Outcome, TaskOutcome, Transaction, WardenError};
use warden_runtime::{
    BackendReport, BalanceStatus, CommandOutput, EconomicsReport, HierarchyReport, PendingReason,
    PendingRequest, StatusReport, Submission, TasksReport,
};

pub(super) fn output(output: &CommandOutput) {
    match output {
        CommandOutput::Status(r) => status(r),
        CommandOutput::Log(r) => actions(r),
        CommandOutput::Economics(r) => economics(r),
        CommandOutput::Hierarchy(r) => hierarchy(r),
        CommandOutput::Tasks(r) => tasks(r),
        CommandOutput::Unresolved(r) => unresolved(r),
        CommandOutput::Submission(s) => submission(s),
        CommandOutput::Transaction(t) => transaction(t),
        CommandOutput::Dismissed(p) => dismissed(p),
        CommandOutput::Backends(r) => backends(r),
    }
}

pub(super) fn status(r: &StatusReport) {
    println!("{}", style("Warden Status").bold());
    println!("   Tier:       {}", style(r.tier).cyan());
    println!(
        "   Balance:    {} (floor {:.2}, {})",
        money(r.balance),
        r.floor,
        balance_status(r.balance_status)
    );
    match &r.last_sample {
        Some(s) => println!(
            "   Resources:  health {:.2} (memory {:.1}%, disk {:.1}%, sampled {})",
            r.resource_health,
            s.memory_pct,
            s.disk_pct,
            ago(s.sampled_at)
        ),
        None => println!("   Resources:  health {:.2} (not sampled yet)", r.resource_health),
    }
    println!("   Error rate: {:.0}%", r.error_rate * 100.0);
    println!(
        "   Backlog:    {} unresolved, {} open dialogue sessions",
        r.unresolved, r.open_sessions
    );
    println!("   Tasks:      {} running", r.tasks_running);
    match r.audit_chain_intact {
        Some(true) => println!("   Audit log:  {}", style("hash chain intact").green()),
        Some(false) => println!("   Audit log:  {}", style("HASH CHAIN BROKEN").red().bold()),
        None => {}
    }
}

pub(super) fn actions(records: &[ActionRecord]) {
    if records.is_empty() {
        println!("No policy verdicts recorded.");
        return;
    }
    println!("{} ({} entries)", style("Policy Log").bold(), records.len());
    println!("{}", "-".repeat(80));
    for a in records {
        let urgent = if a.urgent { " [urgent]" } else { "" };
        println!(
            "{}  {}  {}{}",
            style(a.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            outcome(a.outcome),
            a.description,
            style(urgent).yellow()
        );
        if !a.rationale.is_empty() {
            println!("   {}", style(truncate(&a.rationale, 120)).dim());
        }
    }
}

pub(super) fn economics(r: &EconomicsReport) {
    println!("{}", style("Economics").bold());
    println!(
        "   Balance: {} (floor {:.2}, {})",
        money(r.balance),
        r.floor,
        balance_status(r.balance_status)
    );
    println!("   Trend:   {}", signed(r.trend));
    if r.transactions.is_empty() {
        return;
    }
    println!();
    for t in &r.transactions {
        println!(
            "   {}  {:>10}  {:>10.2}  {}",
            style(t.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            signed(t.amount),
            t.balance_after,
            t.memo
        );
    }
}

pub(super) fn hierarchy(r: &HierarchyReport) {
    println!("{} {}", style("Needs tier:").bold(), style(r.current).cyan());
    println!("   {}", style(r.current.description()).dim());
    if r.history.is_empty() {
        return;
    }
    println!();
    for t in &r.history {
        let exited = match t.exited_at {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "current".into(),
        };
        println!(
            "   {:<26} {} → {}",
            t.tier.to_string(),
            style(t.entered_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            exited
        );
    }
}

pub(super) fn tasks(r: &TasksReport) {
    if r.tasks.is_empty() {
        println!("No tasks scheduled.");
    }
    for t in &r.tasks {
        let state = if t.running {
            style("running").yellow()
        } else if t.permitted {
            style("idle").green()
        } else {
            style("held").dim()
        };
        let next = match t.next_due_at {
            Some(at) if at > Utc::now() => format!("next in {}", until(at)),
            _ => "due".into(),
        };
        println!(
            "   {:<22} {:<8} every {:>6}  needs {:<26} {}",
            t.name,
            state,
            duration(t.interval_secs),
            t.required_tier.to_string(),
            style(next).dim()
        );
    }
    if r.recent_runs.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Recent runs").bold());
    for run in &r.recent_runs {
        let marker = match &run.outcome {
            TaskOutcome::Succeeded { .. } => style("✓").green(),
            TaskOutcome::Failed { .. } => style("✗").red(),
            TaskOutcome::TimedOut => style("⏱").red(),
        };
        println!(
            "   {} {}  {:<22} {}",
            marker,
            style(run.ended_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            run.task_name,
            truncate(&run.outcome.to_string(), 80)
        );
    }
}

pub(super) fn unresolved(pending: &[PendingRequest]) {
    if pending.is_empty() {
        println!("No unresolved requests.");
        return;
    }
    for p in pending {
        let reason = match p.reason {
            PendingReason::Lockout => style(p.reason.to_string()).red().bold(),
            PendingReason::InDialogue => style(p.reason.to_string()).yellow(),
            PendingReason::Aborted => style(p.reason.to_string()).dim(),
        };
        println!("   {}  {:<12} {}", p.request.id(), reason, p.request.description());
        println!("      {}", style(truncate(&p.rationale, 110)).dim());
    }
}

pub(super) fn submission(s: &Submission) {
    match s {
        Submission::Completed(exec) => {
            let via = match &exec.dispatch.failed_over_from {
                Some(from) => format!("{} (after {} faulted)", exec.dispatch.decision.backend_id, from),
                None => exec.dispatch.decision.backend_id.clone(),
            };
            println!(
                "{} {} via {}: {} units, cost {:.4}",
                style("✅").green(),
                outcome(exec.outcome),
                style(via).cyan(),
                exec.dispatch.units,
                exec.dispatch.actual_cost
            );
            if !exec.dispatch.output.is_empty() {
                println!("{}", exec.dispatch.output);
            }
        }
        Submission::Dialogue { stage, text, .. } => {
            println!("{} {}", style("⚠️  Dialogue").yellow().bold(), style(format!("[{stage}]")).dim());
            for line in text.lines() {
                println!("   {line}");
            }
            println!(
                "   {}",
                style("reply: ack | correct <text> | accept | override | cancel").dim()
            );
        }
        Submission::Blocked {
            request_id,
            kind,
            rationale,
            rules,
        } => {
            if *kind == ErrorKind::SafetyLockout {
                println!("{} request {}", style("⛔ SAFETY LOCK-OUT").red().bold(), request_id);
                println!("   Rules: {}", rules.join(", "));
                println!("   {rationale}");
                println!(
                    "   {}",
                    style(format!("clear with: acknowledge-risk {request_id}")).dim()
                );
            } else {
                println!("{} request {}", style("❌ Blocked").red().bold(), request_id);
                println!("   {rationale}");
            }
        }
    }
}

pub(super) fn dismissed(p: &PendingRequest) {
    println!(
        "{} request {} ({}): {}",
        style("🗑️  Dismissed").yellow().bold(),
        p.request.id(),
        p.reason,
        p.request.description()
    );
}

pub(super) fn transaction(t: &Transaction) {
    println!(
        "{} {} → balance {}  {}",
        style("✅").green(),
        signed(t.amount),
        money(t.balance_after),
        style(&t.memo).dim()
    );
}

pub(super) fn backends(reports: &[BackendReport]) {
    for r in reports {
        let p = &r.profile;
        let state = if p.available {
            style("up").green()
        } else {
            style("down").red()
        };
        let kind = if p.local { "local" } else { "remote" };
        println!(
            "   {:<24} {:<4} tier {}  {:<6} {:.6}/unit  {} ok, {} faults",
            p.id, state, p.tier, kind, p.cost_per_unit, r.stats.successes, r.stats.faults
        );
    }
}

pub(super) fn error(e: &WardenError) {
    let label = match e.kind() {
        ErrorKind::PolicyViolation => "policy violation",
        ErrorKind::BudgetExceeded => "budget exceeded",
        ErrorKind::BackendFault => "backend fault",
        ErrorKind::SessionAborted => "session aborted",
        ErrorKind::SafetyLockout => "safety lock-out",
        ErrorKind::Internal => "error",
    };
    println!("{} {}", style(format!("❌ {label}:")).red().bold(), e);
}

pub(super) fn help() {
    println!("{}", style("Commands").bold());
    for (cmd, what) in [
        ("submit [--urgent] <text>", "submit an action request"),
        ("ack | accept | override | cancel", "answer the open dialogue"),
        ("correct <text>", "replace the request under discussion"),
        ("respond <session> <input>", "answer a specific dialogue session"),
        ("acknowledge-risk <request>", "clear a safety lock-out"),
        ("dismiss <request>", "withdraw an aborted or locked-out request"),
        ("status | log [n] | economics [n]", "inspect the runtime"),
        ("hierarchy [n] | tasks | unresolved", "inspect the runtime"),
        ("credit <amount> [memo]", "record a deposit"),
        ("backend [<id> up|down]", "list backends or change availability"),
        ("exit", "leave the console"),
    ] {
        println!("   {:<36} {}", cmd, style(what).dim());
    }
}

fn outcome(o: Outcome) -> console::StyledObject<&'static str> {
    match o {
        Outcome::Allow => style("allow").green(),
        Outcome::Flag => style("flag").yellow(),
        Outcome::Block => style("block").red(),
    }
}

fn balance_status(s: BalanceStatus) -> console::StyledObject<&'static str> {
    match s {
        BalanceStatus::Healthy => style(s.as_str()).green(),
        BalanceStatus::Warning => style(s.as_str()).yellow(),
        BalanceStatus::Critical => style(s.as_str()).red().bold(),
    }
}

fn money(v: f64) -> console::StyledObject<String> {
    style(format!("{v:.2}")).bold()
}

fn signed(v: f64) -> console::StyledObject<String> {
    let s = style(format!("{v:+.2}"));
    if v < 0.0 { s.red() } else { s.green() }
}

fn duration(secs: u64) -> String {
    match secs {
        s if s % 3600 == 0 && s >= 3600 => format!("{}h", s / 3600),
        s if s % 60 == 0 && s >= 60 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

fn ago(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0) as u64;
    format!("{} ago", duration(secs))
}

fn until(at: DateTime<Utc>) -> String {
    let mins = (at - Utc::now()).num_minutes().max(0) as u64;
    if mins >= 60 {
        format!("{}h{:02}m", mins / 60, mins % 60)
    } else {
        format!("{mins}m")
    }
}

/// Truncate to `max` characters on a char boundary, flattening newlines.
pub(super) fn truncate(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    match flat.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &flat[..i]),
        None => flat,
    }
}
