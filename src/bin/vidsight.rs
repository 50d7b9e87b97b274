//! Command line for registering uploads, submitting jobs and querying status.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vidsight::adapters::local::RedisPool;
use vidsight::application::dispatcher::JobDispatcher;
use vidsight::config::{init_logging, WorkerConfig};
use vidsight::domain::jobs::VideoId;
use vidsight::ports::repository::StatusTracker;
use vidsight::ports::BoxError;

#[derive(Parser)]
#[command(name = "vidsight", about = "Video analysis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register an uploaded video and schedule its analysis
    Register {
        /// Video file, relative paths are resolved against MEDIA_ROOT
        file: PathBuf,
    },
    /// Schedule another analysis run for a registered video
    Submit { video_id: VideoId },
    /// Print the job status as JSON
    Status { video_id: VideoId },
}

async fn run(cli: Cli, config: WorkerConfig) -> Result<(), BoxError> {
    let redis = RedisPool::new(&config.redis_url, &config.consumer_name)?;
    let dispatcher = JobDispatcher::new(redis.clone(), redis.clone());

    match cli.command {
        Command::Register { file } => {
            let path = config.resolve_media(&file);
            if !path.is_file() {
                return Err(format!("{} is not a file", path.display()).into());
            }
            let video_id = dispatcher.register(&path).await?;
            println!("{}", video_id);
        }
        Command::Submit { video_id } => {
            if redis.get_job(video_id).await?.is_none() {
                return Err(format!("unknown video {}", video_id).into());
            }
            dispatcher.submit(video_id).await?;
        }
        Command::Status { video_id } => match redis.get_status(video_id).await? {
            Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
            None => return Err(format!("unknown video {}", video_id).into()),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging("warn");
    let config = WorkerConfig::from_env();

    if let Err(e) = run(cli, config).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
