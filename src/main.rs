use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use mail_cleaner::config::{self, MailboxConfig};
use mail_cleaner::mailbox::ImapMailbox;
use mail_cleaner::pipeline::{CleanReport, Cleaner};
use mail_cleaner::rules::RuleRegistry;

#[derive(Parser)]
#[command(name = "mail-cleaner")]
#[command(about = "Delete mailbox messages matching a rule set", long_about = None)]
struct Cli {
    /// Service prefix of the mailbox settings, e.g. `gmail` reads GMAIL_IMAP_SERVER
    service_name: String,

    /// JSON file with the rule records
    rule_set_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(report) => {
            println!(
                "Scanned {} messages, deleted {}",
                report.scanned, report.deleted
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<CleanReport> {
    let mailbox_config = MailboxConfig::from_env(&cli.service_name)
        .with_context(|| format!("loading settings for service '{}'", cli.service_name))?;
    info!(mailbox = %mailbox_config, "Mailbox configured");

    let registry = RuleRegistry::with_builtin_rules(config::audit_log_path());
    let rules = registry
        .build_from_file(&cli.rule_set_file)
        .context("loading rule set")?;
    for description in rules.describe() {
        info!(rule = %description, "Active rule");
    }

    let mut mailbox = ImapMailbox::new(mailbox_config);
    let report = Cleaner::new(rules).run(&mut mailbox).await?;
    Ok(report)
}
