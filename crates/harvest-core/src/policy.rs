//! Replacement Policy
//!
//! Static lookup structure mapping each symbol to its substantially-identical
//! cluster and to a ranked list of safe alternatives. Pure queries only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ranked replacement list for one symbol. Declaration order matters for the
/// cluster-fallback scan in [`ReplacementPolicy::safe_alternatives`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativesEntry {
    pub symbol: String,
    pub alternatives: Vec<String>,
}

/// Substitution rules: disjoint clusters of mutually identical symbols plus
/// a ranked alternatives table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementPolicy {
    pub prohibited_equivalents: Vec<Vec<String>>,
    pub recommended_alternatives: Vec<AlternativesEntry>,
    pub version: String,
}

impl ReplacementPolicy {
    pub fn new(
        prohibited_equivalents: Vec<Vec<String>>,
        recommended_alternatives: Vec<(String, Vec<String>)>,
        version: String,
    ) -> Self {
        Self {
            prohibited_equivalents,
            recommended_alternatives: recommended_alternatives
                .into_iter()
                .map(|(symbol, alternatives)| AlternativesEntry {
                    symbol,
                    alternatives,
                })
                .collect(),
            version,
        }
    }

    /// Cluster containing `symbol`, or a `{symbol}` singleton when it belongs
    /// to no declared cluster. If a symbol were declared in two clusters the
    /// first declared one wins.
    pub fn cluster_for(&self, symbol: &str) -> HashSet<String> {
        for cluster in &self.prohibited_equivalents {
            if cluster.iter().any(|s| s == symbol) {
                return cluster.iter().cloned().collect();
            }
        }
        HashSet::from([symbol.to_string()])
    }

    /// Ranked safe alternatives for `symbol`.
    ///
    /// Looks up the symbol directly; when no direct entry exists, falls back
    /// to the first entry (declaration order) whose key shares the symbol's
    /// cluster. Alternatives inside the symbol's own cluster are filtered out
    /// as a defense against a misconfigured policy. An empty result means
    /// "no safe replacement known" and is not an error.
    pub fn safe_alternatives(&self, symbol: &str) -> Vec<String> {
        let cluster = self.cluster_for(symbol);

        let mut alts: Vec<String> = self
            .recommended_alternatives
            .iter()
            .find(|e| e.symbol == symbol)
            .map(|e| e.alternatives.clone())
            .unwrap_or_default();

        if alts.is_empty() {
            for entry in &self.recommended_alternatives {
                if self.cluster_for(&entry.symbol).contains(symbol) {
                    alts = entry.alternatives.clone();
                    break;
                }
            }
        }

        alts.retain(|a| !cluster.contains(a));
        alts
    }
}

/// Demo policy covering the seeded index-fund clusters and single names.
pub fn demo_policy() -> ReplacementPolicy {
    let clusters = vec![
        vec!["SPY".to_string(), "IVV".to_string(), "VOO".to_string()],
        vec!["QQQ".to_string(), "QQQM".to_string()],
        vec!["VTI".to_string(), "ITOT".to_string(), "SCHB".to_string()],
    ];

    let alternatives = vec![
        ("SPY", vec!["VTI", "SCHX", "ITOT"]),
        ("IVV", vec!["VTI", "SCHX", "ITOT"]),
        ("VOO", vec!["VTI", "SCHX", "ITOT"]),
        ("QQQ", vec!["SCHG", "XLK", "IYW"]),
        ("QQQM", vec!["SCHG", "XLK", "IYW"]),
        ("VTI", vec!["SCHX", "VTV", "SCHF"]),
        ("ITOT", vec!["SCHX", "VTV", "SCHF"]),
        ("SCHB", vec!["SCHX", "VTV", "SCHF"]),
        ("AAPL", vec!["XLK", "VGT"]),
        ("TSLA", vec!["XLY", "CARZ", "DRIV"]),
        ("NVDA", vec!["SOXX", "SMH"]),
    ]
    .into_iter()
    .map(|(s, alts)| {
        (
            s.to_string(),
            alts.into_iter().map(str::to_string).collect(),
        )
    })
    .collect();

    ReplacementPolicy::new(clusters, alternatives, "demo-1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_for_declared_symbol() {
        let policy = demo_policy();
        let cluster = policy.cluster_for("SPY");
        assert_eq!(cluster.len(), 3);
        assert!(cluster.contains("SPY"));
        assert!(cluster.contains("IVV"));
        assert!(cluster.contains("VOO"));
    }

    #[test]
    fn test_cluster_for_unknown_symbol_is_singleton() {
        let policy = demo_policy();
        let cluster = policy.cluster_for("AAPL");
        assert_eq!(cluster, HashSet::from(["AAPL".to_string()]));
    }

    #[test]
    fn test_duplicate_membership_first_cluster_wins() {
        let policy = ReplacementPolicy::new(
            vec![
                vec!["SPY".to_string(), "IVV".to_string()],
                vec!["SPY".to_string(), "VOO".to_string()],
            ],
            vec![],
            "test".to_string(),
        );
        let cluster = policy.cluster_for("SPY");
        assert!(cluster.contains("IVV"));
        assert!(!cluster.contains("VOO"));
    }

    #[test]
    fn test_safe_alternatives_direct_lookup() {
        let policy = demo_policy();
        assert_eq!(policy.safe_alternatives("AAPL"), vec!["XLK", "VGT"]);
    }

    #[test]
    fn test_safe_alternatives_filters_own_cluster() {
        // Misconfigured policy lists a cluster sibling as an alternative.
        let policy = ReplacementPolicy::new(
            vec![vec![
                "SPY".to_string(),
                "IVV".to_string(),
                "VOO".to_string(),
            ]],
            vec![(
                "SPY".to_string(),
                vec!["IVV".to_string(), "VTI".to_string()],
            )],
            "test".to_string(),
        );
        assert_eq!(policy.safe_alternatives("SPY"), vec!["VTI"]);
    }

    #[test]
    fn test_safe_alternatives_cluster_fallback() {
        // VOO has no direct entry; it borrows SPY's list via the cluster.
        let policy = ReplacementPolicy::new(
            vec![vec![
                "SPY".to_string(),
                "IVV".to_string(),
                "VOO".to_string(),
            ]],
            vec![(
                "SPY".to_string(),
                vec!["VTI".to_string(), "IVV".to_string()],
            )],
            "test".to_string(),
        );
        assert_eq!(policy.safe_alternatives("VOO"), vec!["VTI"]);
    }

    #[test]
    fn test_safe_alternatives_none_known() {
        let policy = demo_policy();
        assert!(policy.safe_alternatives("GME").is_empty());
    }
}
