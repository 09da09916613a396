use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repo_audit::config::{AuditArgs, OutputFormat};
use repo_audit::github::OctocrabClient;
use repo_audit::policy::{self, AuditContext, EXIT_CONFIG, EXIT_PASS};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr so a JSON report on stdout stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = AuditArgs::parse();
    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Audit could not run");
            eprintln!("error: {:#}", err);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run(args: AuditArgs) -> anyhow::Result<u8> {
    let policy = args.load_policy().context("loading policy")?;
    let checks = policy::select(policy::plan(&policy), &args.only)?;

    if args.list_checks {
        for check in &checks {
            println!("{}", check.name());
        }
        return Ok(EXIT_PASS);
    }

    let client = OctocrabClient::with_timeout(&args.repo_uri, &args.token, args.timeout());
    tracing::info!(
        client = ?client,
        checks = checks.len(),
        "Starting repository audit"
    );

    let context = AuditContext {
        secrets_token: args.secrets_token.clone(),
    };
    let report = policy::run_audit(&client, &policy, &checks, &context).await?;

    match args.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!(
            "{}",
            report.render_json().context("serializing report")?
        ),
    }

    let summary = report.summary();
    tracing::info!(
        passed = summary.passed,
        failed = summary.failed,
        errored = summary.errored,
        "Audit finished"
    );

    Ok(report.exit_code())
}
