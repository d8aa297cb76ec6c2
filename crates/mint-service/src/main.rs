//! Main entry point for the mint pipeline service.
//!
//! Loads configuration, builds the pipeline, resumes any webhook jobs left
//! over from a previous run and then keeps sweeping for due jobs and expired
//! storage entries until interrupted. Optionally serves the HTTP API.

use clap::Parser;
use mint_config::Config;
use mint_core::{MintPipeline, PipelineBuilder};
use mint_types::{DispatchEvent, PipelineEvent, TransactionEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

mod apis;
mod server;

/// Command-line arguments for the mint pipeline service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started mint pipeline");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.pipeline.id);

	let pipeline = Arc::new(build_pipeline(config.clone())?);
	tokio::spawn(log_events(Arc::clone(&pipeline)));

	match pipeline.resume_pending().await {
		Ok(report) if report.resumed > 0 => {
			tracing::info!(resumed = report.resumed, "Resumed webhook jobs from previous run");
		},
		Ok(_) => {},
		Err(e) => tracing::warn!(error = %e, "Startup recovery failed"),
	}

	let maintenance = run_maintenance(
		Arc::clone(&pipeline),
		Duration::from_secs(config.webhook.resume_interval_seconds),
		Duration::from_secs(config.storage.cleanup_interval_seconds),
	);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let api_task = server::start_server(api_config, Arc::clone(&pipeline));
			tokio::select! {
				_ = maintenance => {},
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
				}
			}
		},
		None => {
			tokio::select! {
				_ = maintenance => {},
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
				}
			}
		},
	}

	tracing::info!("Stopped mint pipeline");
	Ok(())
}

fn build_pipeline(config: Config) -> Result<MintPipeline, Box<dyn std::error::Error>> {
	let storage_factories = mint_storage::get_all_implementations()
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect();

	Ok(PipelineBuilder::new(config).build::<mint_storage::StorageFactory>(storage_factories)?)
}

/// Periodically resumes due webhook jobs and purges expired storage entries.
async fn run_maintenance(pipeline: Arc<MintPipeline>, resume_every: Duration, cleanup_every: Duration) {
	let mut resume = tokio::time::interval(resume_every);
	let mut cleanup = tokio::time::interval(cleanup_every);
	resume.set_missed_tick_behavior(MissedTickBehavior::Delay);
	cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// Both fire immediately; startup recovery already ran.
	resume.tick().await;
	cleanup.tick().await;

	loop {
		tokio::select! {
			_ = resume.tick() => {
				if let Err(e) = pipeline.resume_pending().await {
					tracing::warn!(error = %e, "Webhook job sweep failed");
				}
			}
			_ = cleanup.tick() => {
				match pipeline.storage().cleanup_expired().await {
					Ok(0) => {},
					Ok(removed) => tracing::debug!(removed, "Removed expired storage entries"),
					Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
				}
			}
		}
	}
}

async fn log_events(pipeline: Arc<MintPipeline>) {
	let mut events = pipeline.event_bus().subscribe();
	loop {
		match events.recv().await {
			Ok(PipelineEvent::Transaction(TransactionEvent::Submitted { process_id, tx_hash })) => {
				tracing::debug!(%process_id, %tx_hash, "Transaction submitted");
			},
			Ok(PipelineEvent::Transaction(TransactionEvent::Resolved {
				process_id,
				status,
				..
			})) => {
				tracing::debug!(%process_id, status = ?status, "Transaction resolved");
			},
			Ok(PipelineEvent::Dispatch(DispatchEvent::RetryScheduled {
				process_id,
				attempt,
				error,
				..
			})) => {
				tracing::debug!(%process_id, attempt, %error, "Webhook retry scheduled");
			},
			Ok(PipelineEvent::Dispatch(DispatchEvent::Delivered { process_id, .. })) => {
				tracing::debug!(%process_id, "Webhook delivered");
			},
			Ok(PipelineEvent::Dispatch(DispatchEvent::Exhausted { process_id, attempts })) => {
				tracing::debug!(%process_id, attempts, "Webhook exhausted");
			},
			Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "Event log fell behind");
			},
			Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
		}
	}
}
