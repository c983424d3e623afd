//! Contract call executor: binds a catalog call to a pool contract.

use super::catalog::{CallKind, ContractGroup};
use super::SubscriptionError;
use crate::contracts::AbiRegistry;
use crate::multicall::Call;
use crate::pools::PoolDescriptor;
use ethers::abi::{Function, Token};
use ethers::contract::BaseContract;
use ethers::prelude::{Address, Bytes, U256};

/// One unexecuted read call, bound to a pool contract and (if needed) the
/// user's address.
#[derive(Debug, Clone)]
pub struct BoundCall {
    pub pool_id: String,
    pub kind: CallKind,
    pub call: Call,
    function: Function,
}

impl BoundCall {
    /// Decodes the `uint256` returned by the call.
    pub fn decode(&self, data: &Bytes) -> Result<U256, SubscriptionError> {
        let decode_error = |reason: String| SubscriptionError::Decode {
            pool_id: self.pool_id.clone(),
            call: self.kind,
            reason,
        };

        let tokens = self
            .function
            .decode_output(data)
            .map_err(|e| decode_error(e.to_string()))?;
        tokens
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or_else(|| decode_error("expected a single uint256".to_string()))
    }
}

/// Contract instance for one (group, pool) pair.
pub struct ContractBinding<'a> {
    pub address: Address,
    pub contract: &'a BaseContract,
}

/// Token group: the pool's token address with the fixed token ABI.
/// Reward group: the pool's earn contract with that pool's own ABI.
pub fn bind_contract<'a>(
    abis: &'a AbiRegistry,
    group: ContractGroup,
    pool: &PoolDescriptor,
) -> Result<ContractBinding<'a>, SubscriptionError> {
    match group {
        ContractGroup::Token => Ok(ContractBinding {
            address: pool.token_address,
            contract: abis.token(),
        }),
        ContractGroup::Reward => {
            let contract = abis.reward(&pool.earn_contract_abi).ok_or_else(|| {
                SubscriptionError::UnknownAbi {
                    pool_id: pool.id.clone(),
                    abi: pool.earn_contract_abi.clone(),
                }
            })?;
            Ok(ContractBinding {
                address: pool.earn_contract_address,
                contract,
            })
        }
    }
}

impl ContractBinding<'_> {
    /// Builds the call descriptor for `kind` against this contract.
    pub fn bind(
        &self,
        pool: &PoolDescriptor,
        kind: CallKind,
        user: Option<Address>,
    ) -> Result<BoundCall, SubscriptionError> {
        let function = self
            .contract
            .abi()
            .function(kind.method())
            .map_err(|e| SubscriptionError::Abi {
                pool_id: pool.id.clone(),
                call: kind,
                reason: e.to_string(),
            })?
            .clone();

        let args = call_arguments(pool, kind, user)?;
        let call_data = function
            .encode_input(&args)
            .map_err(|e| SubscriptionError::Abi {
                pool_id: pool.id.clone(),
                call: kind,
                reason: e.to_string(),
            })?;

        Ok(BoundCall {
            pool_id: pool.id.clone(),
            kind,
            call: Call {
                target: self.address,
                call_data: call_data.into(),
            },
            function,
        })
    }
}

/// Convenience for a single call; rounds bind once per (group, pool).
pub fn build_call(
    abis: &AbiRegistry,
    pool: &PoolDescriptor,
    kind: CallKind,
    user: Option<Address>,
) -> Result<BoundCall, SubscriptionError> {
    bind_contract(abis, kind.group(), pool)?.bind(pool, kind, user)
}

fn call_arguments(
    pool: &PoolDescriptor,
    kind: CallKind,
    user: Option<Address>,
) -> Result<Vec<Token>, SubscriptionError> {
    if !kind.needs_address() {
        return Ok(Vec::new());
    }

    let user = user.ok_or_else(|| SubscriptionError::MissingAddress {
        pool_id: pool.id.clone(),
        call: kind,
    })?;

    Ok(match kind {
        CallKind::UserApproval => vec![
            Token::Address(user),
            Token::Address(pool.earn_contract_address),
        ],
        _ => vec![Token::Address(user)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::test_support::pool;
    use crate::pools::PoolStatus;
    use ethers::utils::id;
    use std::str::FromStr;

    fn user() -> Address {
        Address::from_str("0x3333333333333333333333333333333333333333").unwrap()
    }

    #[test]
    fn test_pool_call_targets_reward_contract_without_arguments() {
        let abis = AbiRegistry::with_standard().unwrap();
        let pool = pool("pool-a", PoolStatus::Active);

        let bound = build_call(&abis, &pool, CallKind::PoolFinish, None).unwrap();
        assert_eq!(bound.call.target, pool.earn_contract_address);
        assert_eq!(bound.call.call_data.to_vec(), id("periodFinish()").to_vec());
    }

    #[test]
    fn test_approval_encodes_owner_and_spender() {
        let abis = AbiRegistry::with_standard().unwrap();
        let pool = pool("pool-a", PoolStatus::Active);

        let bound = build_call(&abis, &pool, CallKind::UserApproval, Some(user())).unwrap();
        assert_eq!(bound.call.target, pool.token_address);

        let data = bound.call.call_data.to_vec();
        assert_eq!(&data[..4], &id("allowance(address,address)")[..]);
        let args = ethers::abi::decode(
            &[ethers::abi::ParamType::Address, ethers::abi::ParamType::Address],
            &data[4..],
        )
        .unwrap();
        assert_eq!(args[0], Token::Address(user()));
        assert_eq!(args[1], Token::Address(pool.earn_contract_address));
    }

    #[test]
    fn test_user_call_without_address_is_rejected() {
        let abis = AbiRegistry::with_standard().unwrap();
        let pool = pool("pool-a", PoolStatus::Active);
        let result = build_call(&abis, &pool, CallKind::UserStaked, None);
        assert!(matches!(result, Err(SubscriptionError::MissingAddress { .. })));
    }

    #[test]
    fn test_unknown_reward_abi_is_rejected() {
        let abis = AbiRegistry::with_standard().unwrap();
        let mut pool = pool("pool-a", PoolStatus::Active);
        pool.earn_contract_abi = "missing".to_string();
        let result = build_call(&abis, &pool, CallKind::PoolStaked, None);
        assert!(matches!(result, Err(SubscriptionError::UnknownAbi { .. })));
    }

    #[test]
    fn test_decode_uint_result() {
        let abis = AbiRegistry::with_standard().unwrap();
        let pool = pool("pool-a", PoolStatus::Active);
        let bound = build_call(&abis, &pool, CallKind::PoolStaked, None).unwrap();

        let raw = Bytes::from(ethers::abi::encode(&[Token::Uint(U256::from(42u64))]));
        assert_eq!(bound.decode(&raw).unwrap(), U256::from(42u64));
        assert!(bound.decode(&Bytes::from(vec![1u8, 2])).is_err());
    }
}
