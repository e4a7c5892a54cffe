use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use log::info;
use taskwatch_config::{ConfigLoader, SyncConfig, validate};
use taskwatch_core::model::{EntityId, TaskId, TaskStatus, TaskType};
use taskwatch_core::{Submission, SubscriptionHandle, TaskSyncSession};

use crate::cli::{Cli, Command, WatchArgs};
use crate::render::{self, Output};

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.server.as_deref())?;
    let session = TaskSyncSession::new(&config)
        .with_context(|| format!("cannot reach {}", config.server_url))?;
    let output = Output { json: cli.json };

    let result = match cli.command {
        Command::Show { task_id } => {
            show(&session, output, TaskId::from(task_id)).await
        }
        Command::Watch(WatchArgs {
            task: Some(task_id),
            ..
        }) => {
            session.open();
            let handle = session.subscribe_task(task_id);
            follow_task(&session, output, handle).await
        }
        Command::Watch(WatchArgs {
            task_type: Some(task_type),
            ..
        }) => {
            session.open();
            watch_type(&session, output, TaskType::from(task_type)).await
        }
        Command::Watch(_) => bail!("watch needs --task or --type"),
        Command::Busy { task_type } => {
            session.open();
            watch_busy(&session, output, TaskType::from(task_type)).await
        }
        Command::Sync { recent } => {
            session.open();
            let submission = if recent {
                session.start_recent_updates_sync().await
            } else {
                session.start_sync().await
            }
            .context("failed to start sync")?;
            finish(&session, output, submission).await
        }
        Command::Download { entity_ids } => {
            download(&session, output, entity_ids).await
        }
    };

    session.shutdown();
    result
}

fn load_config(server: Option<&str>) -> Result<SyncConfig> {
    let load = ConfigLoader::new().load()?;
    info!("[Config] Using {}", load.source);

    let mut config = load.config;
    if let Some(server) = server {
        config.server_url = server.to_string();
        validate(&config)?;
    }
    Ok(config)
}

async fn show(
    session: &TaskSyncSession,
    output: Output,
    task_id: TaskId,
) -> Result<ExitCode> {
    match session.refresh(&task_id).await? {
        Some(record) => {
            output.record(&record)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("task {} not found", task_id);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn download(
    session: &TaskSyncSession,
    output: Output,
    entity_ids: Vec<String>,
) -> Result<ExitCode> {
    let entity_ids: Vec<EntityId> =
        entity_ids.into_iter().map(EntityId::from).collect();

    if let [entity_id] = entity_ids.as_slice() {
        session.open();
        let submission = session
            .download(entity_id)
            .await
            .with_context(|| format!("failed to start download {entity_id}"))?;
        return finish(session, output, submission).await;
    }

    let summary = session
        .download_batch(&entity_ids)
        .await
        .context("batch download failed")?;
    output.summary(&summary)?;
    Ok(if summary.failed_count == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn finish(
    session: &TaskSyncSession,
    output: Output,
    submission: Submission,
) -> Result<ExitCode> {
    match submission {
        Submission::Tracking(handle) => {
            info!("Following {}", handle.target());
            follow_task(session, output, handle).await
        }
        Submission::Completed { message } => {
            println!("{}", message.as_deref().unwrap_or("done"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print every accepted change until the task turns terminal.
async fn follow_task(
    session: &TaskSyncSession,
    output: Output,
    mut handle: SubscriptionHandle,
) -> Result<ExitCode> {
    let mut health = session.watch_health();
    let mut shown = None;

    loop {
        if let Some(record) = handle.record()
            && shown.as_ref() != Some(&record)
        {
            output.record(&record)?;
            if record.is_terminal() {
                let error = record.error_message.as_deref();
                return Ok(exit_code(record.status, error));
            }
            shown = Some(record);
        }

        tokio::select! {
            alive = handle.changed() => {
                if !alive {
                    bail!("task registry closed");
                }
            }
            Ok(()) = health.changed() => {
                render::health(*health.borrow_and_update());
            }
        }
    }
}

async fn watch_type(
    session: &TaskSyncSession,
    output: Output,
    task_type: TaskType,
) -> Result<ExitCode> {
    let mut handle = session.subscribe_type(task_type);
    let mut health = session.watch_health();

    loop {
        tokio::select! {
            alive = handle.changed() => {
                if !alive {
                    bail!("task registry closed");
                }
                output.tasks(&handle.tasks())?;
            }
            Ok(()) = health.changed() => {
                render::health(*health.borrow_and_update());
            }
        }
    }
}

async fn watch_busy(
    session: &TaskSyncSession,
    output: Output,
    task_type: TaskType,
) -> Result<ExitCode> {
    let mut busy = session.busy(task_type);
    let mut health = session.watch_health();
    output.busy(&busy.current())?;

    loop {
        tokio::select! {
            alive = busy.changed() => {
                if !alive {
                    bail!("busy index closed");
                }
                output.busy(&busy.current())?;
            }
            Ok(()) = health.changed() => {
                render::health(*health.borrow_and_update());
            }
        }
    }
}

fn exit_code(status: TaskStatus, error_message: Option<&str>) -> ExitCode {
    match status {
        TaskStatus::Failed => {
            eprintln!("{}", error_message.unwrap_or("task failed"));
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}
