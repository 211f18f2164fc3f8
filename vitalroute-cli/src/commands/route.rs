//! `route`: driving route between two points or addresses.

use std::sync::Arc;

use vitalroute::routing::{RouteEstimate, RouteOutcome};
use vitalroute::Engine;

use super::{format_point, locate};
use crate::error::CliError;

pub async fn run(
    engine: Arc<Engine>,
    from: String,
    to: String,
    show_geometry: bool,
) -> Result<(), CliError> {
    let origin = locate(&engine, &from).await?;
    let destination = locate(&engine, &to).await?;

    println!("From: {}", format_point(origin));
    println!("To:   {}", format_point(destination));

    match engine
        .route_calculator()
        .compute_route(origin, destination)
        .await
    {
        RouteOutcome::Succeeded(route) => {
            println!("Distance: {} km", route.distance_label());
            println!("Duration: {} min", route.duration_min);
            println!("Points:   {}", route.polyline.len());
            if show_geometry {
                for point in &route.polyline {
                    println!("  {}", format_point(*point));
                }
            }
            Ok(())
        }
        RouteOutcome::Failed(error) => {
            let estimate = RouteEstimate::straight_line(origin, destination);
            println!(
                "Straight-line estimate: {} km, {} min",
                estimate.distance_label(),
                estimate.duration_min
            );
            Err(error.into())
        }
        RouteOutcome::Cancelled => Err(CliError::Interrupted),
    }
}
