use crate::metrics;
pub use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Hard upper bound on calls per aggregate request
pub const MAX_BATCH_SIZE: usize = 500;

/// A single read-only contract call to be batched in a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

/// Chain-facing seam used by the subscription rounds.
///
/// Takes an ordered list of calls and returns the raw return data in the same
/// order, or a single batch-level error. Implementations must not return a
/// partial result.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, calls: Vec<Call>) -> Result<Vec<Bytes>>;
}

/// Multicall3 batch executor.
///
/// Batches contract calls into `aggregate3` requests so that one subscription
/// round costs a single `eth_call`. Calls are submitted with
/// `allowFailure = false`, so any reverting call fails the whole batch.
///
/// When the call list exceeds `batch_size` it is split into chunks, and all
/// chunks are pinned to the same block so the results stay consistent.
///
/// ## Example
///
/// ```rust,no_run
/// # use launchpool_sync::multicall::{Call, Multicall};
/// # async fn run(provider: std::sync::Arc<ethers::providers::Provider<ethers::providers::Http>>,
/// #              multicall_address: ethers::types::Address, calls: Vec<Call>) -> anyhow::Result<()> {
/// let multicall = Multicall::new(provider, multicall_address, 200);
/// let results = multicall.run(calls, None).await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    pub provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
    timeout_seconds: u64,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        let validated_batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);

        if batch_size > MAX_BATCH_SIZE {
            warn!(
                "Batch size {} exceeds maximum ({}), capping",
                batch_size, MAX_BATCH_SIZE
            );
        }

        Self {
            provider,
            multicall_address,
            batch_size: validated_batch_size,
            timeout_seconds: 10,
        }
    }

    /// Set custom timeout for each aggregate request
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs a batch of calls, optionally at a specific block.
    pub async fn run(&self, calls: Vec<Call>, block: Option<BlockId>) -> Result<Vec<Bytes>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls to reduce load
        let mut unique_calls = indexmap::IndexSet::new();
        let mut original_indices = Vec::with_capacity(calls.len());
        for call in &calls {
            let (index, _) = unique_calls.insert_full(call.clone());
            original_indices.push(index);
        }
        let unique_call_vec: Vec<Call> = unique_calls.into_iter().collect();
        debug!(
            "Multicall coalesced {} calls into {}",
            calls.len(),
            unique_call_vec.len()
        );

        // More than one chunk: pin everything to one block
        let block = match block {
            Some(block) => Some(block),
            None if unique_call_vec.len() > self.batch_size => {
                let number = self.provider.get_block_number().await?;
                Some(BlockId::Number(BlockNumber::Number(number)))
            }
            None => None,
        };

        let mut all_results_unique: Vec<Bytes> = Vec::with_capacity(unique_call_vec.len());
        for call_chunk in unique_call_vec.chunks(self.batch_size) {
            metrics::record_multicall_batch_size(call_chunk.len() as f64);
            let return_data = self.execute_multicall3(call_chunk, block).await?;
            if return_data.len() != call_chunk.len() {
                anyhow::bail!(
                    "Multicall returned {} results for {} calls",
                    return_data.len(),
                    call_chunk.len()
                );
            }
            all_results_unique.extend(return_data);
        }

        // Reconstruct the full result set in the original order
        let final_results = original_indices
            .into_iter()
            .map(|index| all_results_unique[index].clone())
            .collect();

        Ok(final_results)
    }

    async fn execute_multicall3(
        &self,
        calls: &[Call],
        block: Option<BlockId>,
    ) -> Result<Vec<Bytes>> {
        // function aggregate3(Call3[] calldata calls) public payable returns (Result[] memory returnData)
        // Call3 struct: { target, allowFailure, callData }
        // Result struct: { success, returnData }
        let call_tokens: Vec<Token> = calls
            .iter()
            .map(|call| {
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(false),
                    Token::Bytes(call.call_data.to_vec()),
                ])
            })
            .collect();

        let calldata = aggregate3_function().encode_input(&[Token::Array(call_tokens)])?;

        let tx_request = TransactionRequest::new()
            .to(self.multicall_address)
            .data(calldata);
        let typed_tx: ethers::types::transaction::eip2718::TypedTransaction = tx_request.into();

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            self.provider.call(&typed_tx, block),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Multicall timed out after {}s", self.timeout_seconds))??;

        decode_aggregate3_response(&response)
    }
}

#[async_trait]
impl<M: Middleware + 'static> BatchExecutor for Multicall<M> {
    async fn execute(&self, calls: Vec<Call>) -> Result<Vec<Bytes>> {
        self.run(calls, None).await
    }
}

#[allow(deprecated)]
fn aggregate3_function() -> Function {
    Function {
        name: "aggregate3".to_string(),
        inputs: vec![Param {
            name: "calls".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        outputs: vec![Param {
            name: "returnData".to_string(),
            kind: aggregate3_result_type(),
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::Payable,
    }
}

fn aggregate3_result_type() -> ParamType {
    ParamType::Array(Box::new(ParamType::Tuple(vec![
        ParamType::Bool,
        ParamType::Bytes,
    ])))
}

/// Decodes `Result[]` from an `aggregate3` response, failing on any
/// unsuccessful entry.
fn decode_aggregate3_response(response: &[u8]) -> Result<Vec<Bytes>> {
    let decoded = ethers::abi::decode(&[aggregate3_result_type()], response)?;

    let results_array = decoded
        .into_iter()
        .next()
        .and_then(|t| t.into_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid multicall response format"))?;

    let mut return_data = Vec::with_capacity(results_array.len());
    for (index, result_token) in results_array.into_iter().enumerate() {
        let mut tuple = result_token
            .into_tuple()
            .ok_or_else(|| anyhow::anyhow!("Multicall result {} is not a tuple", index))?;
        if tuple.len() != 2 {
            anyhow::bail!("Multicall result {} has {} fields", index, tuple.len());
        }
        let data = tuple.pop().and_then(|t| t.into_bytes());
        let success = tuple.pop().and_then(|t| t.into_bool());
        match (success, data) {
            (Some(true), Some(data)) => return_data.push(Bytes::from(data)),
            (Some(false), _) => anyhow::bail!("Multicall call {} failed", index),
            _ => anyhow::bail!("Multicall result {} is malformed", index),
        }
    }

    Ok(return_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_results(results: Vec<(bool, Vec<u8>)>) -> Vec<u8> {
        let tokens = results
            .into_iter()
            .map(|(success, data)| Token::Tuple(vec![Token::Bool(success), Token::Bytes(data)]))
            .collect();
        ethers::abi::encode(&[Token::Array(tokens)])
    }

    #[test]
    fn test_decode_aggregate3_response() {
        let raw = encode_results(vec![(true, vec![1, 2]), (true, vec![3])]);
        let decoded = decode_aggregate3_response(&raw).unwrap();
        assert_eq!(decoded, vec![Bytes::from(vec![1, 2]), Bytes::from(vec![3])]);
    }

    #[test]
    fn test_decode_aggregate3_response_rejects_failed_call() {
        let raw = encode_results(vec![(true, vec![1]), (false, vec![])]);
        assert!(decode_aggregate3_response(&raw).is_err());
    }

    #[test]
    fn test_aggregate3_selector() {
        let selector = aggregate3_function().short_signature();
        assert_eq!(selector, [0x82, 0xad, 0x56, 0xcb]);
    }
}
