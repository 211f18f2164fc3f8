//! Relevance scoring for geocoding candidates.
//!
//! Score components, summed:
//!
//! | Component                          | Points                         |
//! |------------------------------------|--------------------------------|
//! | each address keyword in the name   | +15                            |
//! | keyword hit ratio                  | + matches / total × 30         |
//! | place kind                         | amenity 30, building 25, road 20, residential 15, suburb 8, city −40, state −60 |
//! | provider importance                | + importance × 15              |
//! | far from region center (> 0.15°)   | − distance × 100               |
//! | query priority                     | + priority                     |
//! | name mentions the region           | +30                            |
//! | "no number" and amenity/building   | +50                            |

use super::address::{comparable, extract_keywords};
use super::region::Region;
use crate::geo::degree_distance;
use crate::provider::{GeocodeCandidate, PlaceKind};

const KEYWORD_HIT_POINTS: f64 = 15.0;
const KEYWORD_RATIO_POINTS: f64 = 30.0;
const IMPORTANCE_WEIGHT: f64 = 15.0;
const DISTANCE_PENALTY_WEIGHT: f64 = 100.0;
const REGION_NAME_BONUS: f64 = 30.0;
const NO_NUMBER_FACILITY_BONUS: f64 = 50.0;

/// Inputs shared by every candidate of one resolution.
#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    keywords: Vec<String>,
    region: &'a Region,
    region_name: String,
    no_number: bool,
}

impl<'a> ScoringContext<'a> {
    /// Builds the context from the operator's original text.
    pub fn new(original_text: &str, region: &'a Region, no_number: bool) -> Self {
        Self {
            keywords: extract_keywords(original_text),
            region,
            region_name: comparable(&region.name),
            no_number,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Total score for `candidate` found by a query with `priority`.
    pub fn score(&self, candidate: &GeocodeCandidate, priority: f64) -> f64 {
        let name = comparable(&candidate.display_name);

        let mut score = self.keyword_score(&name);
        score += kind_score(&candidate.kind);
        score += candidate.importance * IMPORTANCE_WEIGHT;

        let distance = degree_distance(candidate.coordinate, self.region.center);
        if distance > self.region.far_threshold_deg {
            score -= distance * DISTANCE_PENALTY_WEIGHT;
        }

        score += priority;
        if name.contains(&self.region_name) {
            score += REGION_NAME_BONUS;
        }
        if self.no_number && candidate.kind.is_facility() {
            score += NO_NUMBER_FACILITY_BONUS;
        }
        score
    }

    fn keyword_score(&self, name: &str) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        let matches = self
            .keywords
            .iter()
            .filter(|keyword| name.contains(keyword.as_str()))
            .count() as f64;
        matches * KEYWORD_HIT_POINTS + matches / self.keywords.len() as f64 * KEYWORD_RATIO_POINTS
    }
}

/// Points for a place kind.
pub fn kind_score(kind: &PlaceKind) -> f64 {
    match kind {
        PlaceKind::Amenity => 30.0,
        PlaceKind::Building => 25.0,
        PlaceKind::Road => 20.0,
        PlaceKind::Residential => 15.0,
        PlaceKind::Suburb => 8.0,
        PlaceKind::City => -40.0,
        PlaceKind::State => -60.0,
        PlaceKind::Other(_) => 0.0,
    }
}
