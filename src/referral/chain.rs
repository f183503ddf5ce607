//! Referral Chain Resolver
//!
//! A member's hierarchy is stored as a dot-delimited ancestry path, root first,
//! ending with the member itself (e.g. `"1.4.9.23"` for member 23). The chain
//! that earns commission on 23's purchases is `[9, 4, 1]`: everything before
//! the member, reversed, capped at the configured depth.

use serde::{Deserialize, Serialize};

use super::bonus::bonus_percentage;
use crate::error::{LedgerError, LedgerResult};

/// One upline member eligible for commission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferralLevel {
    pub member_id: i64,
    /// 1 = direct upline
    pub level: usize,
    pub percentage: f64,
}

impl ReferralLevel {
    pub fn commission_type(&self) -> CommissionType {
        if self.level == 1 {
            CommissionType::Direct
        } else {
            CommissionType::Indirect
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommissionType {
    Direct,
    Indirect,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::Direct => "DIRECT",
            CommissionType::Indirect => "INDIRECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECT" => Some(CommissionType::Direct),
            "INDIRECT" => Some(CommissionType::Indirect),
            _ => None,
        }
    }
}

/// Split a stored hierarchy into member ids, root first.
pub fn parse_hierarchy(hierarchy: &str) -> LedgerResult<Vec<i64>> {
    hierarchy
        .split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .parse::<i64>()
                .map_err(|_| LedgerError::MalformedHierarchy(hierarchy.to_string()))
        })
        .collect()
}

/// Resolve the commission chain for `member_id`, nearest ancestor first.
///
/// A missing path means a root member and yields an empty chain. A path that
/// does not contain the member, or contains it more than once, is corrupted
/// referral data and fails as a data-integrity error.
pub fn resolve_chain(
    hierarchy: Option<&str>,
    member_id: i64,
    max_depth: usize,
) -> LedgerResult<Vec<ReferralLevel>> {
    let Some(path) = hierarchy else {
        return Ok(Vec::new());
    };

    let ids = parse_hierarchy(path)?;
    let mut occurrences = ids.iter().enumerate().filter(|(_, id)| **id == member_id);

    let Some((position, _)) = occurrences.next() else {
        return Err(LedgerError::MemberNotInHierarchy {
            member_id,
            hierarchy: path.to_string(),
        });
    };
    if occurrences.next().is_some() {
        return Err(LedgerError::CyclicHierarchy {
            member_id,
            hierarchy: path.to_string(),
        });
    }

    Ok(ids[..position]
        .iter()
        .rev()
        .take(max_depth)
        .enumerate()
        .map(|(idx, &ancestor)| {
            let level = idx + 1;
            ReferralLevel {
                member_id: ancestor,
                level,
                percentage: bonus_percentage(level),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_direct_and_second_level() {
        let chain = resolve_chain(Some("1.4.9.23"), 23, 10).unwrap();
        let ids: Vec<i64> = chain.iter().map(|l| l.member_id).collect();
        assert_eq!(ids, vec![9, 4, 1]);
        assert_eq!(chain[0].level, 1);
        assert_eq!(chain[0].percentage, 10.0);
        assert_eq!(chain[0].commission_type(), CommissionType::Direct);
        assert_eq!(chain[1].percentage, 1.5);
        assert_eq!(chain[2].commission_type(), CommissionType::Indirect);
    }

    #[test]
    fn test_chain_is_capped_at_ten() {
        // 15 ancestors (1..=15) above member 16
        let path = (1..=16).map(|i| i.to_string()).collect::<Vec<_>>().join(".");
        let chain = resolve_chain(Some(&path), 16, 10).unwrap();

        assert_eq!(chain.len(), 10);
        let ids: Vec<i64> = chain.iter().map(|l| l.member_id).collect();
        assert_eq!(ids, vec![15, 14, 13, 12, 11, 10, 9, 8, 7, 6]);
        let levels: Vec<usize> = chain.iter().map(|l| l.level).collect();
        assert_eq!(levels, (1..=10).collect::<Vec<_>>());
        let pcts: Vec<f64> = chain.iter().map(|l| l.percentage).collect();
        assert_eq!(pcts, vec![10.0, 1.5, 1.5, 1.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_reporting_depth_beyond_bonus_table() {
        let path = (1..=16).map(|i| i.to_string()).collect::<Vec<_>>().join(".");
        let chain = resolve_chain(Some(&path), 16, 12).unwrap();
        assert_eq!(chain.len(), 12);
        assert_eq!(chain[10].percentage, 0.0);
        assert_eq!(chain[11].percentage, 0.0);
    }

    #[test]
    fn test_root_member_has_no_chain() {
        assert!(resolve_chain(None, 1, 10).unwrap().is_empty());
        assert!(resolve_chain(Some("1"), 1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_member_missing_from_own_path() {
        let err = resolve_chain(Some("1.4.9"), 23, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        assert!(matches!(err, LedgerError::MemberNotInHierarchy { member_id: 23, .. }));
    }

    #[test]
    fn test_member_in_own_ancestry_is_rejected() {
        let err = resolve_chain(Some("1.23.9.23"), 23, 10).unwrap_err();
        assert!(matches!(err, LedgerError::CyclicHierarchy { .. }));
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_malformed_path() {
        let err = resolve_chain(Some("1.x.23"), 23, 10).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedHierarchy(_)));
    }
}
