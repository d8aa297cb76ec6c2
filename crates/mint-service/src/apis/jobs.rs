use super::ApiError;
use mint_core::MintPipeline;
use mint_dispatch::JobView;

pub async fn get_job(pipeline: &MintPipeline, process_id: &str) -> Result<JobView, ApiError> {
	Ok(pipeline.dispatcher().lookup(process_id).await?)
}
