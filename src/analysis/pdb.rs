use serde::Serialize;

use crate::types::{BudgetValue, PdbInfo};

/// A disruption budget that would block an eviction-based drain.
#[derive(Debug, Clone, Serialize)]
pub struct PdbBlocker {
    pub name: String,
    pub namespace: String,
    pub block_reason: String,
    /// Nodes hosting pods covered by this budget; filled in live mode only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_nodes: Vec<String>,
}

/// Determine which budgets would block drain.
///
/// `maxUnavailable=0` is an explicit, unconditional author declaration and
/// is checked first; otherwise a budget with no disruption headroom blocks.
/// Exactly one reason is reported per blocking PDB; non-blocking budgets are
/// excluded entirely.
pub fn evaluate_blockers(pdbs: &[PdbInfo]) -> Vec<PdbBlocker> {
    let mut blockers = Vec::new();

    for pdb in pdbs {
        let reason = if pdb.max_unavailable == Some(BudgetValue::Count(0)) {
            Some("maxUnavailable=0".to_string())
        } else if pdb.disruptions_allowed == 0 {
            Some(match &pdb.min_available {
                Some(min) => format!(
                    "minAvailable={} equals current healthy count ({})",
                    min, pdb.current_healthy
                ),
                None => format!(
                    "no disruptions currently allowed ({} healthy)",
                    pdb.current_healthy
                ),
            })
        } else {
            None
        };

        if let Some(block_reason) = reason {
            blockers.push(PdbBlocker {
                name: pdb.name.clone(),
                namespace: pdb.namespace.clone(),
                block_reason,
                affected_nodes: Vec::new(),
            });
        }
    }

    blockers
}
