//! Reverse geocoding into short operator-facing labels.
//!
//! A label is built from the best place a provider returns: a point of
//! interest when one is near, otherwise the first hit. Parts are joined with
//! `", "` in the order name, street, locality, city, state, without
//! repeats. When nothing usable comes back the label is the coordinate
//! itself, `"-22.0086, -47.8908"`.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::address::comparable;
use crate::geo::Coordinate;
use crate::http::RequestSlots;
use crate::provider::{
    ChainOutcome, GeocodeProvider, ProviderChain, ProviderFuture, ProviderOutcome,
    ReversePlace,
};

/// Name fragments that mark a place as a point of interest.
const POI_KEYWORDS: &[&str] = &[
    "hospital",
    "unimed",
    "escola",
    "posto",
    "clinica",
    "santa casa",
    "pronto",
    "upa",
    "centro",
    "instituto",
    "faculdade",
    "universidade",
    "igreja",
    "shopping",
    "mercado",
    "farmacia",
];

/// Macro-region names some providers put in the state field.
const MACRO_REGIONS: &[&str] = &[
    "southeast",
    "south",
    "northeast",
    "north",
    "central-west",
    "sudeste",
    "sul",
    "nordeste",
    "norte",
    "centro-oeste",
];

/// Places inspected when looking for a point of interest.
const POI_SEARCH_DEPTH: usize = 5;

/// Coordinate label used when no place is known.
pub fn fallback_label(coordinate: Coordinate) -> String {
    format!("{:.4}, {:.4}", coordinate.latitude(), coordinate.longitude())
}

/// Builds a label from provider places, keeping at most `max_parts` parts.
///
/// Returns `None` when no place yields any part.
pub fn build_label(places: &[ReversePlace], max_parts: usize) -> Option<String> {
    let place = pick_place(places)?;

    let street = place.street.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let name = place
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .filter(|n| street.map_or(true, |s| !s.eq_ignore_ascii_case(n)));
    let state = place
        .state
        .as_deref()
        .map(str::trim)
        .filter(|s| !is_macro_region(s));

    let candidates = [
        name,
        street,
        place.locality.as_deref().map(str::trim),
        place.city.as_deref().map(str::trim),
        state,
    ];

    let mut seen = HashSet::new();
    let parts: Vec<&str> = candidates
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .filter(|part| seen.insert(part.to_lowercase()))
        .take(max_parts)
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn pick_place(places: &[ReversePlace]) -> Option<&ReversePlace> {
    places
        .iter()
        .take(POI_SEARCH_DEPTH)
        .find(|place| is_point_of_interest(place))
        .or_else(|| places.first())
}

fn is_point_of_interest(place: &ReversePlace) -> bool {
    let Some(name) = place.name.as_deref().filter(|n| !n.trim().is_empty()) else {
        return false;
    };
    if place
        .street
        .as_deref()
        .is_some_and(|street| street.eq_ignore_ascii_case(name))
    {
        return false;
    }
    let folded = comparable(name);
    place.is_amenity || POI_KEYWORDS.iter().any(|keyword| folded.contains(keyword))
}

fn is_macro_region(state: &str) -> bool {
    let folded = state.to_lowercase();
    MACRO_REGIONS.contains(&folded.as_str())
}

/// Reverse lookup reporting an empty answer as [`ProviderOutcome::Empty`],
/// so the chain moves on to the next provider.
fn reverse_places<'a>(
    provider: &'a dyn GeocodeProvider,
    coordinate: Coordinate,
    token: &'a CancellationToken,
) -> ProviderFuture<'a, Vec<ReversePlace>> {
    Box::pin(async move {
        match provider.reverse(coordinate, token).await {
            ProviderOutcome::Found(places) if places.is_empty() => ProviderOutcome::Empty,
            other => other,
        }
    })
}

/// Reverse geocoder over a provider chain.
#[derive(Debug)]
pub struct ReverseGeocoder {
    chain: Arc<ProviderChain>,
    slots: RequestSlots,
    shutdown: CancellationToken,
}

impl ReverseGeocoder {
    /// Creates a geocoder with its own shutdown token.
    pub fn new(chain: Arc<ProviderChain>) -> Self {
        Self::with_shutdown(chain, CancellationToken::new())
    }

    /// Creates a geocoder whose lookups end when `shutdown` fires.
    pub fn with_shutdown(chain: Arc<ProviderChain>, shutdown: CancellationToken) -> Self {
        Self {
            chain,
            slots: RequestSlots::new(shutdown.clone()),
            shutdown,
        }
    }

    /// Label for `coordinate`, falling back to the coordinate text.
    pub async fn label(&self, coordinate: Coordinate) -> String {
        let token = self.shutdown.child_token();
        self.label_with(coordinate, &token)
            .await
            .unwrap_or_else(|| fallback_label(coordinate))
    }

    /// Label for `coordinate` in a named slot.
    ///
    /// Returns `None` when a newer request for the same slot superseded this one.
    pub async fn label_for(&self, slot: &str, coordinate: Coordinate) -> Option<String> {
        let ticket = self.slots.begin(slot);
        let label = self.label_with(coordinate, ticket.token()).await;
        self.slots.finish(&ticket);
        label
    }

    async fn label_with(&self, coordinate: Coordinate, token: &CancellationToken) -> Option<String> {
        let outcome = self
            .chain
            .run(|provider| reverse_places(provider, coordinate, token))
            .await;

        let label = match outcome {
            ChainOutcome::Found { value, served_by } => {
                let max_parts = self
                    .chain
                    .provider(served_by)
                    .map_or(POI_SEARCH_DEPTH, |p| p.max_label_parts());
                build_label(&value, max_parts)
            }
            ChainOutcome::Unavailable | ChainOutcome::Empty => None,
            ChainOutcome::Cancelled => return None,
        };

        let label = label.unwrap_or_else(|| fallback_label(coordinate));
        tracing::debug!(coordinate = %coordinate, label = %label, "Reverse geocoded");
        Some(label)
    }
}
