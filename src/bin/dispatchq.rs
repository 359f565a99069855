//! dispatchq CLI — demo driver for the dispatch engine.
//!
//! The sleep-per-item worker lives here, not in the library: the core
//! coordinates work, it does not care what the work is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

use dispatchq::config::Config;
use dispatchq::engine::{DispatchConfig, Dispatcher, SubmitOutcome, Worker};
use dispatchq::kv::{KvStore, MemoryKv, RedisKv};
use dispatchq::model::Submission;
use dispatchq::relay::StatusRelay;
use dispatchq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "dispatchq", about = "Idempotent dispatch and single-flight execution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a payload and stream its status until terminal
    Process {
        /// User the submission belongs to
        #[arg(long, default_value_t = 1)]
        user: i64,
        /// Items to process
        #[arg(required = true)]
        items: Vec<i64>,
        /// Simulated per-item work duration in milliseconds
        #[arg(long, default_value_t = 500)]
        step_ms: u64,
        /// Use the in-memory store instead of Redis
        #[arg(long)]
        memory: bool,
    },
    /// Print the idempotency fingerprint and resource key for a payload
    Fingerprint {
        #[arg(long, default_value_t = 1)]
        user: i64,
        #[arg(required = true)]
        items: Vec<i64>,
    },
}

/// Demo worker: sleeps per item in place of real work.
struct SleepWorker {
    step: Duration,
}

#[async_trait]
impl Worker for SleepWorker {
    async fn process_item(&self, _user_id: i64, _item: i64) -> anyhow::Result<()> {
        tokio::time::sleep(self.step).await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            user,
            items,
            step_ms,
            memory,
        } => cmd_process(user, items, step_ms, memory).await,
        Command::Fingerprint { user, items } => {
            let submission = Submission::new(user, items);
            println!("fingerprint:  {}", submission.fingerprint());
            println!("resource key: {}", submission.resource_key());
            Ok(())
        }
    }
}

async fn cmd_process(user: i64, items: Vec<i64>, step_ms: u64, memory: bool) -> anyhow::Result<()> {
    let (kv, dispatch_config, _guard): (Arc<dyn KvStore>, DispatchConfig, _) = if memory {
        let guard = init_telemetry(TelemetryConfig { endpoint: None })?;
        (Arc::new(MemoryKv::new()), DispatchConfig::default(), guard)
    } else {
        let config = Config::from_env()?;
        let guard = init_telemetry(TelemetryConfig {
            endpoint: config.otel_endpoint.clone(),
        })?;
        let kv = RedisKv::connect(config.redis_url.expose_secret()).await?;
        (Arc::new(kv), config.dispatch_config(), guard)
    };

    let worker = Arc::new(SleepWorker {
        step: Duration::from_millis(step_ms),
    });
    let dispatcher = Dispatcher::new(kv, worker, dispatch_config);

    let submission = Submission::new(user, items);
    let resource_key = submission.resource_key();

    let job_id = match dispatcher.submit(submission).await? {
        SubmitOutcome::Accepted { job_id } => {
            println!("accepted: {job_id}");
            job_id
        }
        SubmitOutcome::Duplicate => {
            println!("already processed");
            return Ok(());
        }
        SubmitOutcome::InProgress => {
            println!("already in progress");
            return Ok(());
        }
    };

    let relay = StatusRelay::new(dispatcher).with_poll_interval(Duration::from_millis(100));
    let mut rx = relay.subscribe(job_id, Some(resource_key)).await?;

    loop {
        let payload = rx.borrow_and_update().clone();
        println!("{}", serde_json::to_string(&payload)?);
        if payload.is_terminal() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }

    Ok(())
}
