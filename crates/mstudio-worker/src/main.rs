//! Command-line runner: executes a single job in-process and prints the record.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use mstudio_media::StyleRegistry;
use mstudio_models::{CaptionMode, CaptionRequest, GenerateRequest, JobId, DEFAULT_CAPTION_STYLE};
use mstudio_storage::S3Client;
use mstudio_worker::clients::S3Provisioner;
use mstudio_worker::remote::ResourceProvisioner;
use mstudio_worker::{
    init_tracing, job_system, open_job_store, Collaborators, JobOrchestrator, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "mstudio-worker", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a scene from a prompt and render it.
    Render {
        #[arg(long)]
        prompt: String,
    },
    /// Caption a hosted video.
    Captions {
        #[arg(long)]
        video_url: String,

        #[arg(long, default_value = DEFAULT_CAPTION_STYLE)]
        style: String,

        #[arg(long, value_enum, default_value_t = ModeArg::Remote)]
        mode: ModeArg,
    },
    /// Find or create the render bucket.
    Provision,
    /// List caption style ids.
    Styles,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Remote,
    Burn,
}

impl From<ModeArg> for CaptionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Remote => CaptionMode::Remote,
            ModeArg::Burn => CaptionMode::Burn,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();
    config.validate()?;

    match cli.cmd {
        Command::Styles => {
            for id in StyleRegistry::with_builtin_styles().ids() {
                println!("{}", id);
            }
            Ok(())
        }
        Command::Provision => {
            let s3 = S3Client::from_env().await?;
            let provision = S3Provisioner::new(s3, config.bucket_prefix.clone())
                .ensure_bucket()
                .await?;
            println!("{}", serde_json::to_string_pretty(&provision)?);
            Ok(())
        }
        Command::Render { prompt } => {
            run_single(config, |orchestrator| async move {
                Ok(orchestrator
                    .submit_prompt(&GenerateRequest { prompt })
                    .await?)
            })
            .await
        }
        Command::Captions {
            video_url,
            style,
            mode,
        } => {
            let request = CaptionRequest {
                video_url,
                style,
                mode: mode.into(),
                emoji_cues: Vec::new(),
            };
            run_single(config, |orchestrator| async move {
                Ok(orchestrator.submit_captions(request).await?)
            })
            .await
        }
    }
}

/// Start an executor, submit one job, wait for it to finish and print it.
async fn run_single<F, Fut>(config: WorkerConfig, submit: F) -> anyhow::Result<()>
where
    F: FnOnce(JobOrchestrator) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<JobId>>,
{
    let store = open_job_store(&config).await?;
    let collaborators = Collaborators::from_env(&config)
        .await
        .context("failed to configure service clients")?;
    let (orchestrator, executor) = job_system(
        config,
        store,
        Arc::new(StyleRegistry::with_builtin_styles()),
        collaborators,
    );

    let shutdown = executor.shutdown_handle();
    let worker = tokio::spawn(executor.run());

    let job_id = submit(orchestrator.clone()).await?;
    info!(job_id = %job_id, "Submitted job");

    let job = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                shutdown.shutdown();
                worker.await.ok();
                anyhow::bail!("interrupted before job {} finished", job_id);
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        let job = orchestrator.status(&job_id).await?;
        if job.is_terminal() {
            break job;
        }
    };

    shutdown.shutdown();
    worker.await.context("executor task failed")?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    match job.error {
        Some(error) => anyhow::bail!("job {} failed: {}", job_id, error),
        None => Ok(()),
    }
}
