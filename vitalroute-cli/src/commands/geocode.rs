//! Address lookup commands: `resolve`, `suggest` and `reverse`.

use std::sync::Arc;

use vitalroute::geo::Coordinate;
use vitalroute::Engine;

use super::format_point;
use crate::error::CliError;

/// Resolve a free-text address to a coordinate.
pub async fn run_resolve(engine: Arc<Engine>, address: String) -> Result<(), CliError> {
    let coordinate = engine.resolver().resolve(&address).await;
    println!("{}", format_point(coordinate));
    Ok(())
}

/// Print suggestions for a partial address.
pub async fn run_suggest(engine: Arc<Engine>, text: String) -> Result<(), CliError> {
    let Some(suggestions) = engine.suggester().suggest("cli", &text).await else {
        return Err(CliError::Interrupted);
    };

    if suggestions.is_empty() {
        let min_chars = engine.config().suggester.min_chars;
        if text.trim().chars().count() < min_chars {
            println!("(type at least {} characters)", min_chars);
        } else {
            println!("No suggestions");
        }
        return Ok(());
    }

    for (index, suggestion) in suggestions.iter().enumerate() {
        println!(
            "{:>2}. {}  [{}]",
            index + 1,
            suggestion.label,
            format_point(suggestion.coordinate)
        );
    }
    Ok(())
}

/// Print a readable label for a coordinate.
pub async fn run_reverse(engine: Arc<Engine>, lat: f64, lon: f64) -> Result<(), CliError> {
    let coordinate = Coordinate::new(lat, lon).map_err(|e| CliError::InvalidPoint {
        input: format!("{},{}", lat, lon),
        reason: e.to_string(),
    })?;
    println!("{}", engine.reverse_geocoder().label(coordinate).await);
    Ok(())
}
