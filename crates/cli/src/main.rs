//! Stockroom CLI: the `stockroom` command.
//!
//! This is the calling layer of the ledger: it resolves the acting role,
//! checks the operation's permission and only then invokes the ledger.
//! Results are printed to stdout as JSON; logs go to stderr.

mod cli;
mod commands;

use clap::Parser;
use serde_json::json;

use stockroom_auth::AuthzError;
use stockroom_core::LedgerError;

#[tokio::main]
async fn main() {
    stockroom_observability::init();

    let cli = cli::Cli::parse();

    if let Err(err) = commands::run(cli).await {
        let (report, exit) = report(&err);
        eprintln!("{report}");
        std::process::exit(exit);
    }
}

/// Structured error report for stderr, plus the process exit status.
fn report(err: &anyhow::Error) -> (serde_json::Value, i32) {
    let (code, retryable, exit) = classify(err);
    let report = json!({
        "error": code,
        "message": format!("{err:#}"),
        "retryable": retryable,
    });
    (report, exit)
}

/// Error code, retry hint and process exit status.
fn classify(err: &anyhow::Error) -> (&'static str, bool, i32) {
    if let Some(ledger) = err.downcast_ref::<LedgerError>() {
        let exit = if ledger.is_retryable() { 75 } else { 1 };
        return (ledger.code(), ledger.is_retryable(), exit);
    }
    if err.downcast_ref::<AuthzError>().is_some() {
        return ("forbidden", false, 77);
    }
    ("error", false, 1)
}
