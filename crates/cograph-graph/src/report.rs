//! Diagnostic counters returned by a repair pass.
//!
//! Observational only: nothing in the repair algorithms reads these back.

use std::time::Duration;

use serde::Serialize;

use crate::edge::EdgeKey;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    /// Elementary cycles enumerated (acyclic variant).
    pub cycles_found: usize,
    /// Edge removals performed to break cycles (acyclic variant).
    pub resolution_steps: usize,
    /// Edges deleted by the pass, in deletion order.
    pub removed_edges: Vec<EdgeKey>,
    /// Connected components before repair (fixed-root variants).
    pub components_found: usize,
    /// Dangling adjacency entries found after the merge.
    pub dangling_found: usize,
    /// Tombstones consumed to restore nodes or edges.
    pub restored_elements: usize,
    /// Adjacency entries written to bring mirrors back in agreement.
    pub mirrors_repaired: usize,
    /// Duplicate or stale log entries dropped.
    pub duplicates_pruned: usize,
    #[serde(serialize_with = "serialize_micros")]
    pub elapsed: Duration,
}

impl RepairReport {
    /// Returns `true` if the pass wrote anything.
    pub fn changed(&self) -> bool {
        !self.removed_edges.is_empty()
            || self.restored_elements > 0
            || self.mirrors_repaired > 0
            || self.duplicates_pruned > 0
    }
}

fn serialize_micros<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(elapsed.as_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_is_unchanged() {
        assert!(!RepairReport::default().changed());
    }

    #[test]
    fn elapsed_serializes_as_micros() {
        let report = RepairReport {
            elapsed: Duration::from_millis(3),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 3000);
    }

    #[test]
    fn report_json_shape() {
        let report = RepairReport {
            cycles_found: 2,
            resolution_steps: 1,
            removed_edges: vec![EdgeKey::new("a", "b")],
            ..Default::default()
        };
        insta::assert_json_snapshot!(report, @r###"
        {
          "cycles_found": 2,
          "resolution_steps": 1,
          "removed_edges": [
            {
              "source": "a",
              "target": "b"
            }
          ],
          "components_found": 0,
          "dangling_found": 0,
          "restored_elements": 0,
          "mirrors_repaired": 0,
          "duplicates_pruned": 0,
          "elapsed": 0
        }
        "###);
    }
}
