//! Call catalog: which contract reads each subscribable metric needs.
//!
//! Metrics, calls and contract groups are closed enums, so the mapping between
//! them is a set of exhaustive `match`es rather than string-keyed tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user- or pool-level value that UI components can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    UserApproval,
    UserBalance,
    UserStaked,
    UserRewardsAvailable,
    PoolApy,
    PoolStaked,
    PoolTvl,
    PoolFinish,
}

/// One low-level view call on a pool contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallKind {
    UserApproval,
    UserBalance,
    UserStaked,
    UserRewardsAvailable,
    PoolRewardRate,
    PoolStaked,
    PoolFinish,
    TokenPricePerShare,
}

/// Which of the pool's two contracts a call is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractGroup {
    /// The staked token (`PoolDescriptor::token_address`, standard token ABI)
    Token,
    /// The reward contract (`PoolDescriptor::earn_contract_address`, per-pool ABI)
    Reward,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::UserApproval,
        Metric::UserBalance,
        Metric::UserStaked,
        Metric::UserRewardsAvailable,
        Metric::PoolApy,
        Metric::PoolStaked,
        Metric::PoolTvl,
        Metric::PoolFinish,
    ];

    pub fn calls(self) -> &'static [CallKind] {
        match self {
            Metric::UserApproval => &[CallKind::UserApproval],
            Metric::UserBalance => &[CallKind::UserBalance],
            Metric::UserStaked => &[CallKind::UserStaked],
            Metric::UserRewardsAvailable => &[CallKind::UserRewardsAvailable],
            Metric::PoolApy => &[
                CallKind::PoolRewardRate,
                CallKind::PoolStaked,
                CallKind::TokenPricePerShare,
            ],
            Metric::PoolStaked => &[CallKind::PoolStaked],
            Metric::PoolTvl => &[CallKind::PoolStaked],
            Metric::PoolFinish => &[CallKind::PoolFinish],
        }
    }

    /// True iff any underlying call needs the user's address.
    pub fn needs_address(self) -> bool {
        self.calls().iter().any(|call| call.needs_address())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::UserApproval => "userApproval",
            Metric::UserBalance => "userBalance",
            Metric::UserStaked => "userStaked",
            Metric::UserRewardsAvailable => "userRewardsAvailable",
            Metric::PoolApy => "poolApy",
            Metric::PoolStaked => "poolStaked",
            Metric::PoolTvl => "poolTvl",
            Metric::PoolFinish => "poolFinish",
        }
    }
}

impl CallKind {
    pub fn group(self) -> ContractGroup {
        match self {
            CallKind::UserApproval | CallKind::UserBalance | CallKind::TokenPricePerShare => {
                ContractGroup::Token
            }
            CallKind::UserStaked
            | CallKind::UserRewardsAvailable
            | CallKind::PoolRewardRate
            | CallKind::PoolStaked
            | CallKind::PoolFinish => ContractGroup::Reward,
        }
    }

    pub fn needs_address(self) -> bool {
        match self {
            CallKind::UserApproval
            | CallKind::UserBalance
            | CallKind::UserStaked
            | CallKind::UserRewardsAvailable => true,
            CallKind::PoolRewardRate
            | CallKind::PoolStaked
            | CallKind::PoolFinish
            | CallKind::TokenPricePerShare => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::UserApproval => "userApproval",
            CallKind::UserBalance => "userBalance",
            CallKind::UserStaked => "userStaked",
            CallKind::UserRewardsAvailable => "userRewardsAvailable",
            CallKind::PoolRewardRate => "poolRewardRate",
            CallKind::PoolStaked => "poolStaked",
            CallKind::PoolFinish => "poolFinish",
            CallKind::TokenPricePerShare => "tokenPricePerShare",
        }
    }

    /// Contract method invoked for this call
    pub fn method(self) -> &'static str {
        match self {
            CallKind::UserApproval => "allowance",
            CallKind::UserBalance | CallKind::UserStaked => "balanceOf",
            CallKind::UserRewardsAvailable => "earned",
            CallKind::PoolRewardRate => "rewardRate",
            CallKind::PoolStaked => "totalSupply",
            CallKind::PoolFinish => "periodFinish",
            CallKind::TokenPricePerShare => "getPricePerFullShare",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_independent_metrics() {
        let independent: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|m| !m.needs_address())
            .collect();
        assert_eq!(
            independent,
            vec![
                Metric::PoolApy,
                Metric::PoolStaked,
                Metric::PoolTvl,
                Metric::PoolFinish
            ]
        );
    }

    #[test]
    fn test_call_groups() {
        assert_eq!(CallKind::UserApproval.group(), ContractGroup::Token);
        assert_eq!(CallKind::TokenPricePerShare.group(), ContractGroup::Token);
        assert_eq!(CallKind::UserStaked.group(), ContractGroup::Reward);
        assert_eq!(CallKind::PoolFinish.group(), ContractGroup::Reward);
    }

    #[test]
    fn test_pool_apy_spans_both_groups() {
        let groups: Vec<ContractGroup> = Metric::PoolApy
            .calls()
            .iter()
            .map(|c| c.group())
            .collect();
        assert!(groups.contains(&ContractGroup::Token));
        assert!(groups.contains(&ContractGroup::Reward));
    }

    #[test]
    fn test_metric_names_round_trip_through_from_str() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
        assert_eq!(
            "poolVolume".parse::<Metric>(),
            Err(UnknownMetric("poolVolume".to_string()))
        );
    }

    #[test]
    fn test_call_kinds_display_wire_names() {
        assert_eq!(CallKind::PoolFinish.to_string(), "poolFinish");
        assert_eq!(CallKind::TokenPricePerShare.to_string(), "tokenPricePerShare");
        let err = crate::subscription::SubscriptionError::MissingResult {
            pool_id: "pool-a".to_string(),
            call: CallKind::PoolRewardRate,
        };
        assert_eq!(err.to_string(), "No poolRewardRate result for pool pool-a");
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&Metric::UserRewardsAvailable).unwrap();
        assert_eq!(json, "\"userRewardsAvailable\"");
    }
}
