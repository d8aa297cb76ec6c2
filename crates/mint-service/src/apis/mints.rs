use super::ApiError;
use mint_core::{MintOutcome, MintPipeline};
use mint_types::{MintContext, SignerDescriptor, TransactionHash, TransactionRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
	pub transaction: TransactionRequest,
	pub signer: SignerDescriptor,
	pub mint: MintContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
	pub tx_hash: TransactionHash,
	pub mint: MintContext,
}

fn check_mint(mint: &MintContext) -> Result<(), ApiError> {
	if mint.process_id.trim().is_empty() {
		return Err(ApiError::bad_request("processId cannot be empty"));
	}
	Ok(())
}

pub async fn run_mint(
	pipeline: &MintPipeline,
	request: MintRequest,
) -> Result<MintOutcome, ApiError> {
	check_mint(&request.mint)?;
	Ok(pipeline
		.run(&request.transaction, &request.signer, &request.mint)
		.await?)
}

pub async fn finalize_mint(
	pipeline: &MintPipeline,
	request: FinalizeRequest,
) -> Result<MintOutcome, ApiError> {
	check_mint(&request.mint)?;
	if request.tx_hash.0.len() != 32 {
		return Err(ApiError::bad_request("txHash must be 32 bytes"));
	}
	Ok(pipeline.finalize(&request.tx_hash, &request.mint).await?)
}
