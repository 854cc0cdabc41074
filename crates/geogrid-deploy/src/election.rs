//! Leader election scoring.
//!
//! Each candidate is scored as a weighted combination of normalized
//! health, free capacity, and a small seeded jitter that keeps
//! near-tied candidates from thrashing deterministically to the same
//! loser. Re-running with the same candidates and seed yields the same
//! leader; ties break to the lowest region id.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use geogrid_state::{Region, RegionId};

/// Weights for the election score components.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ElectionWeights {
    pub health: f64,
    pub capacity: f64,
    pub jitter: f64,
}

impl Default for ElectionWeights {
    fn default() -> Self {
        Self {
            health: 0.6,
            capacity: 0.3,
            jitter: 0.1,
        }
    }
}

/// Individual score components, each in [0, 1], for explainability.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ElectionBreakdown {
    pub health: f64,
    pub capacity: f64,
    pub jitter: f64,
}

/// Scored election result for a single candidate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CandidateScore {
    pub region_id: RegionId,
    pub score: f64,
    pub breakdown: ElectionBreakdown,
}

/// Score all candidates and return them ranked best-first.
///
/// Jitter is drawn per candidate in region-id order from an RNG seeded
/// with `seed`, so the whole ranking is a pure function of
/// `(candidates, weights, seed)` regardless of input order.
pub fn score_candidates(
    candidates: &[Region],
    weights: &ElectionWeights,
    seed: u64,
) -> Vec<CandidateScore> {
    let mut ordered: Vec<&Region> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut rng = StdRng::seed_from_u64(seed);
    let mut scores: Vec<CandidateScore> = ordered
        .into_iter()
        .map(|region| {
            let breakdown = ElectionBreakdown {
                health: region.health_score / 100.0,
                capacity: 1.0 - region.utilization(),
                jitter: rng.r#gen::<f64>(),
            };
            let score = weights.health * breakdown.health
                + weights.capacity * breakdown.capacity
                + weights.jitter * breakdown.jitter;
            CandidateScore {
                region_id: region.id.clone(),
                score,
                breakdown,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.region_id.cmp(&b.region_id))
    });
    scores
}

/// Elect a leader from the candidate set. `None` when it is empty.
pub fn elect(
    candidates: &[Region],
    weights: &ElectionWeights,
    seed: u64,
) -> Option<CandidateScore> {
    score_candidates(candidates, weights, seed).into_iter().next()
}
