//! Subcommand implementations.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use nexstage_client::{NexusClient, StagingService, create_client};
use nexstage_deploy::{
    Chatter, UploadOrchestrator, UploadRequestParameters, create_upload_request,
    wait_for_transition,
};
use nexstage_protocol::StagingRepository;
use nexstage_transfer::ProgressEvent;
use tracing::info;

use crate::args::Command;
use crate::config::Settings;

/// Runs one subcommand against the configured server.
pub async fn run(command: Command, settings: &Settings) -> anyhow::Result<ExitCode> {
    let client = create_client(settings.client.clone())?;
    let _chatter = Chatter::start(settings.chatter_period);
    let mut out = std::io::stdout();

    match command {
        Command::Create {
            description,
            output_file,
        } => create(&client, &description, output_file.as_deref(), &mut out).await?,
        Command::List { json } => list(&client, json, &mut out).await?,
        Command::Show { repository, json } => {
            if !show(&client, &repository, json, &mut out).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Close { repository } => close(&client, &repository, settings).await?,
        Command::Drop { repository } => {
            client.drop_repositories(&[repository.clone()]).await?;
            info!(repository = %repository, "repository dropped");
        }
        Command::Release { repository } => {
            client.release(&[repository.clone()]).await?;
            info!(repository = %repository, "repository released");
        }
        Command::Upload {
            repository,
            directory,
        } => upload(&client, repository, &directory, settings).await?,
        Command::Version => print_version(&mut out)?,
    }
    Ok(ExitCode::SUCCESS)
}

pub fn print_version(out: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(out, "nexstage {}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

async fn create(
    service: &dyn StagingService,
    description: &str,
    output_file: Option<&Path>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let id = service.create(description).await?;
    match output_file {
        Some(path) => {
            std::fs::write(path, format!("{id}\n"))
                .with_context(|| format!("writing repository id to {}", path.display()))?;
            info!(repository = %id, file = %path.display(), "repository id written");
        }
        None => writeln!(out, "{id}")?,
    }
    Ok(())
}

async fn list(service: &dyn StagingService, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let repositories = service.repositories().await?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&repositories)?)?;
    } else {
        for r in &repositories {
            writeln!(out, "{} {} {}", r.repository_id, r.repository_type, r.description)?;
        }
    }
    Ok(())
}

/// Prints a repository. Returns false if the server does not know it.
async fn show(
    service: &dyn StagingService,
    id: &str,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<bool> {
    let Some(repository) = service.repository(id).await? else {
        eprintln!("repository {id} does not exist");
        return Ok(false);
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&repository)?)?;
    } else {
        for (label, value) in describe(&repository) {
            writeln!(out, "{label:<24}{value}")?;
        }
    }
    Ok(true)
}

/// Labelled fields of a repository, in display order.
fn describe(r: &StagingRepository) -> Vec<(&'static str, String)> {
    vec![
        ("Repository ID", r.repository_id.clone()),
        ("Type", r.repository_type.clone()),
        ("Transitioning", r.transitioning.to_string()),
        ("Description", r.description.clone()),
        ("Profile ID", r.profile_id.clone()),
        ("Profile Name", r.profile_name.clone()),
        ("Profile Type", r.profile_type.clone()),
        ("Policy", r.policy.clone()),
        ("Provider", r.provider.clone()),
        ("Repository URI", r.repository_uri.clone()),
        ("Created", r.created.to_rfc3339()),
        ("Updated", r.updated.to_rfc3339()),
        ("User ID", r.user_id.clone()),
        ("User Agent", r.user_agent.clone()),
        ("IP Address", r.ip_address.clone()),
        ("Release Repository ID", r.release_repository_id.clone()),
        ("Release Repository", r.release_repository_name.clone()),
        ("Notifications", r.notifications.clone()),
    ]
}

async fn close(client: &NexusClient, id: &str, settings: &Settings) -> anyhow::Result<()> {
    client.close(&[id.to_string()]).await?;
    info!(repository = %id, "close requested");
    wait_for_transition(client, id, "closed", settings.poll_interval).await?;
    info!(repository = %id, "repository closed");
    Ok(())
}

async fn upload(
    client: &NexusClient,
    repository_id: String,
    directory: &Path,
    settings: &Settings,
) -> anyhow::Result<()> {
    let request = create_upload_request(UploadRequestParameters {
        repository_id,
        base_directory: directory.to_path_buf(),
        retry_delay: settings.retry_delay,
        retry_count: settings.retry_count,
    })?;

    UploadOrchestrator::new(client, Box::new(log_progress))
        .upload(&request)
        .await?;
    Ok(())
}

fn log_progress(event: ProgressEvent) {
    match event {
        ProgressEvent::FileStarted {
            name,
            file_index_current,
            file_index_max,
            attempt_current,
            attempt_max,
        } => info!(
            file = %name,
            "[{file_index_current}/{file_index_max}] attempt {attempt_current}/{attempt_max}"
        ),
        ProgressEvent::Update {
            name,
            bytes_sent,
            bytes_max,
            progress,
            bytes_per_second,
            time_remaining,
            ..
        } => info!(
            file = %name,
            "{:.1}% {bytes_sent}/{bytes_max} bytes, {bytes_per_second} B/s, {}s remaining",
            progress * 100.0,
            time_remaining.as_secs()
        ),
    }
}
