//! Investment thesis: weighted pillars that drive both collection priority
//! and report synthesis.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pillar {
    pub id: Uuid,
    pub name: String,
    pub weight: f64,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thesis {
    pub id: Uuid,
    pub statement: String,
    pub pillars: Vec<Pillar>,
    pub success_criteria: Vec<String>,
    pub target_market_hints: Vec<String>,
}

impl Thesis {
    /// Spec invariant: `sum(pillar.weight) = 1` within any Thesis.
    pub fn weights_are_normalized(&self) -> bool {
        let sum: f64 = self.pillars.iter().map(|p| p.weight).sum();
        (sum - 1.0).abs() <= 1e-6
    }

    /// Renormalizes pillar weights in place so they sum to exactly 1.0.
    ///
    /// A no-op on an empty pillar set or when weights already sum to ~0
    /// (nothing sensible to scale).
    pub fn renormalize(&mut self) {
        let sum: f64 = self.pillars.iter().map(|p| p.weight).sum();
        if sum <= f64::EPSILON {
            return;
        }
        for pillar in &mut self.pillars {
            pillar.weight /= sum;
        }
    }

    pub fn pillar(&self, id: Uuid) -> Option<&Pillar> {
        self.pillars.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pillar(name: &str, weight: f64) -> Pillar {
        Pillar {
            id: Uuid::new_v4(),
            name: name.into(),
            weight,
            questions: vec![],
        }
    }

    #[test]
    fn weights_summing_to_one_pass() {
        let thesis = Thesis {
            id: Uuid::new_v4(),
            statement: "x".into(),
            pillars: vec![pillar("tech", 0.6), pillar("market", 0.4)],
            success_criteria: vec![],
            target_market_hints: vec![],
        };
        assert!(thesis.weights_are_normalized());
    }

    #[test]
    fn renormalize_fixes_unnormalized_weights() {
        let mut thesis = Thesis {
            id: Uuid::new_v4(),
            statement: "x".into(),
            pillars: vec![pillar("tech", 3.0), pillar("market", 1.0)],
            success_criteria: vec![],
            target_market_hints: vec![],
        };
        assert!(!thesis.weights_are_normalized());
        thesis.renormalize();
        assert!(thesis.weights_are_normalized());
        assert!((thesis.pillars[0].weight - 0.75).abs() < 1e-9);
    }
}
