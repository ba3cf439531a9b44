mod bootstrap;

use anyhow::Result;
use billing_core::settings::{BillingConfig, Command, Settings};
use billing_runtime::pipeline::{Pipeline, PipelineEvent};
use billing_runtime::report_access::{stream_report, Pacing, ReportKind, ReportRequest};
use clap::Parser;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level())?;

    let config = settings.resolve_config()?;
    tracing::info!("CDR billing v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "effective configuration");

    match settings.command {
        Command::Process { json } => {
            let pipeline = Pipeline::new(config);
            let (tx, rx) = mpsc::channel(8);

            // Dropping the receiver on Ctrl+C is what tells the pipeline to
            // cancel both passes.
            let printer = tokio::spawn(print_events(rx));
            let result = pipeline.run(tx).await;
            printer.await?;

            let summary = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }

        Command::Customers { msisdn } => {
            let request =
                msisdn.map_or(ReportRequest::Full(ReportKind::Customer), ReportRequest::Subscriber);
            print_report(&config, request).await;
        }

        Command::Operators { operator } => {
            let request = operator.map_or(
                ReportRequest::Full(ReportKind::Interoperator),
                ReportRequest::Operator,
            );
            print_report(&config, request).await;
        }
    }

    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<PipelineEvent>) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => println!("{}", event.message()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; cancelling processing");
                break;
            }
        }
    }
}

async fn print_report(config: &BillingConfig, request: ReportRequest) {
    let path = request.kind().path(config);
    let mut lines = stream_report(path, request, Pacing::from(config));
    while let Some(line) = lines.recv().await {
        println!("{line}");
    }
}
