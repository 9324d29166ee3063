mod bridge;
mod cli;
mod renderer;

use aidflow_core::bulk::BulkOperation;
use aidflow_core::workflows::{builtin_templates, WorkflowLoader};
use aidflow_core::{AidFlow, Config, Event};
use anyhow::{anyhow, Context};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::bridge::{dry_run_handlers, DryRunExecutor};
use crate::cli::{BulkRequestArgs, Command, WorkflowCommand};
use crate::renderer::Renderer;

fn main() {
    if let Err(error) = run() {
        eprintln!("aidflow failed: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse_args();
    let config = aidflow_core::config::load(args.config.as_deref())?;
    aidflow_core::logging::init_tracing(&config.logging.level);
    let renderer = Renderer::new(args.output);

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    match args.command {
        Command::Validate { request } => {
            let app = build_app(config, Vec::new(), 0)?;
            let payload = parse_payload(request.payload.as_deref())?;
            let report = app.runtime().validator.validate(
                &request.entity_type,
                &request.action,
                &request.ids,
                payload.as_ref(),
            );
            renderer.render_report(&report);
            if !report.valid {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Bulk {
            request,
            fail_ids,
            delay_ms,
            export_dir,
        } => {
            let app = build_app(config, fail_ids, delay_ms)?;
            let operation = runtime.block_on(run_bulk(&app, &renderer, request))?;
            renderer.render_operation(&operation);
            if let Some(export) = &operation.result {
                match export_dir {
                    Some(dir) => {
                        let path = dir.join(&export.filename);
                        std::fs::write(&path, &export.content).with_context(|| {
                            format!("failed to write export '{}'", path.display())
                        })?;
                        eprintln!("export written to {}", path.display());
                    }
                    None => print!("{}", export.content),
                }
            }
            Ok(())
        }
        Command::Workflow { command } => match command {
            WorkflowCommand::Templates => {
                renderer.render_templates(&builtin_templates());
                Ok(())
            }
            WorkflowCommand::Run {
                file,
                template,
                input,
            } => {
                let app = build_app(config, Vec::new(), 0)?;
                let input: Value =
                    serde_json::from_str(&input).context("--input must be valid JSON")?;
                runtime.block_on(run_workflow(
                    &app,
                    &renderer,
                    file.as_deref(),
                    template.as_deref(),
                    input,
                ))
            }
        },
    }
}

fn build_app(config: Config, fail_ids: Vec<String>, delay_ms: u64) -> anyhow::Result<AidFlow> {
    let executor = Arc::new(DryRunExecutor::new(fail_ids, delay_ms));
    Ok(AidFlow::new(config, executor, dry_run_handlers())?)
}

fn parse_payload(raw: Option<&str>) -> anyhow::Result<Option<Value>> {
    raw.map(|text| serde_json::from_str(text).context("--payload must be valid JSON"))
        .transpose()
}

async fn run_bulk(
    app: &AidFlow,
    renderer: &Renderer,
    request: BulkRequestArgs,
) -> anyhow::Result<BulkOperation> {
    let payload = parse_payload(request.payload.as_deref())?;
    let mut events = app.events().subscribe();
    let operation = app
        .submit_bulk(&request.entity_type, &request.action, request.ids, payload)
        .await?;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let Event::OperationUpdated(update) = &event else {
                        continue;
                    };
                    if update.id != operation.id {
                        continue;
                    }
                    renderer.render_event(&event);
                    if update.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress renderer lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                eprintln!("cancelling operation {}", operation.id);
                app.bulk().cancel_operation(&operation.id).await?;
            }
        }
    }

    Ok(app.bulk().get_operation(&operation.id).await?)
}

async fn run_workflow(
    app: &AidFlow,
    renderer: &Renderer,
    file: Option<&Path>,
    template: Option<&str>,
    input: Value,
) -> anyhow::Result<()> {
    let workflow = match (file, template) {
        (Some(path), _) => WorkflowLoader::load_file(path)?,
        (None, Some(id)) => builtin_templates()
            .into_iter()
            .find(|candidate| candidate.id.as_deref() == Some(id))
            .ok_or_else(|| anyhow!("unknown template '{id}'"))?,
        (None, None) => return Err(anyhow!("either --file or --template is required")),
    };

    let definition = app.runtime().workflow_store.create(workflow, "cli").await?;
    let mut events = app.events().subscribe();
    let execution = app.workflows().execute(&definition.id, input).await?;

    while let Ok(event) = events.try_recv() {
        renderer.render_event(&event);
    }
    renderer.render_execution(&execution);
    Ok(())
}
