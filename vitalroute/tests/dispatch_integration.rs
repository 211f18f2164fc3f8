//! End-to-end dispatch flows through a fully wired [`Engine`].
//!
//! These tests cover:
//! - Address resolution through the provider chain and its cache
//! - Route computation with debounce and retry
//! - Live tracking into the headless map surface
//!
//! Run with: `cargo test --test dispatch_integration`

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use vitalroute::bridge::{
    BridgeConfig, MapSyncBridge, RenderSurface, DESTINATION_LAYER, ORIGIN_LAYER, ROUTE_LAYER,
    VEHICLE_LAYER,
};
use vitalroute::routing::{RetryPolicy, RouteCalculatorConfig, RouteOutcome, RouteResult};
use vitalroute::tracking::{PositionSample, SessionEvent};

use common::*;

// ============================================================================
// Address resolution
// ============================================================================

#[tokio::test]
async fn test_hospital_resolves_through_primary_only() {
    let http = ScriptedHttp::new().on(
        "geoapify.test/v1/geocode/search",
        vec![Reply::Json(
            200,
            json!({"features": [geoapify_feature(
                "Hospital Municipal, São Carlos", "amenity", -22.0153, -47.8911
            )]}),
        )],
    );
    let (engine, _clock) = engine_with(test_config(), http.clone()).await;

    let hospital = engine
        .resolver()
        .resolve("Hospital Municipal, São Carlos")
        .await;

    assert_eq!(hospital.lat_lon(), (-22.0153, -47.8911));
    assert_eq!(http.count("geoapify.test"), 1);
    assert_eq!(http.count("nominatim.test"), 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_resolve_twice_hits_network_once() {
    let http = ScriptedHttp::new().on(
        "geoapify.test/v1/geocode/search",
        vec![Reply::Json(
            200,
            json!({"features": [geoapify_feature(
                "Rua Episcopal, 1200, São Carlos", "building", -22.017, -47.891
            )]}),
        )],
    );
    let (engine, clock) = engine_with(test_config(), http.clone()).await;

    let first = engine.resolver().resolve("Rua Episcopal, 1200").await;
    clock.advance(chrono::Duration::days(2));
    let second = engine.resolver().resolve("Rua Episcopal, 1200").await;

    assert_eq!(first, second);
    assert_eq!(http.count("geoapify.test"), 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_outage_falls_back_to_region_center() {
    let http = ScriptedHttp::new()
        .on("geoapify.test", vec![Reply::Fail])
        .on("nominatim.test", vec![Reply::Status(503)]);
    let (engine, _clock) = engine_with(test_config(), http.clone()).await;

    let resolved = engine.resolver().resolve("Rua Sem Nome, 10").await;

    assert_eq!(resolved, engine.config().resolver.region.center);
    assert!(engine
        .advisories()
        .was_raised(vitalroute::advisory::Advisory::GeocodingUnavailable));
    engine.shutdown().await;
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_osrm_route_scenario() {
    let http = ScriptedHttp::new().on("osrm.test", vec![Reply::Json(200, osrm_route_body())]);
    let (engine, _clock) = engine_with(test_config(), http).await;

    let outcome = engine
        .route_calculator()
        .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
        .await;

    let RouteOutcome::Succeeded(route) = outcome else {
        panic!("expected a route, got {:?}", outcome);
    };
    assert_eq!(route.distance_label(), "15.0");
    assert_eq!(route.duration_min, 20);
    assert_eq!(
        route.polyline,
        vec![coord(-22.0, -47.9), coord(-22.05, -47.95)]
    );
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rapid_changes_request_final_pair_once() {
    let http = ScriptedHttp::new().on("osrm.test", vec![Reply::Json(200, osrm_route_body())]);
    let (engine, _clock) = engine_with(test_config(), http.clone()).await;
    let destination = coord(-22.05, -47.95);

    let mut handles = Vec::new();
    let origin_at = |i: i32| coord(-22.0 + i as f64 * 0.001, -47.9);
    for i in 0..5 {
        let calculator = engine.route_calculator().clone();
        let origin = origin_at(i);
        handles.push(tokio::spawn(async move {
            calculator.compute_route(origin, destination).await
        }));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert!(outcomes[..4].iter().all(RouteOutcome::is_cancelled));
    assert!(matches!(outcomes[4], RouteOutcome::Succeeded(_)));
    let requests = http.requests("osrm.test");
    assert_eq!(requests.len(), 1);
    let last = origin_at(4);
    let expected = format!("{},{};", last.longitude(), last.latitude());
    assert!(requests[0].url.contains(&expected), "{}", requests[0].url);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fail_fail_succeed_backs_off_twice() {
    let http = ScriptedHttp::new().on(
        "osrm.test",
        vec![
            Reply::Status(502),
            Reply::Fail,
            Reply::Json(200, osrm_route_body()),
        ],
    );
    let config = test_config().with_calculator(
        RouteCalculatorConfig::default().with_retry(RetryPolicy::exponential(3)),
    );
    let (engine, _clock) = engine_with(config, http.clone()).await;

    let start = Instant::now();
    let outcome = engine
        .route_calculator()
        .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(outcome, RouteOutcome::Succeeded(_)));
    assert_eq!(http.count("osrm.test"), 3);
    // 500 ms debounce, then 1 s and 2 s of backoff.
    assert!(elapsed >= Duration::from_millis(3500), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3600), "{:?}", elapsed);
    engine.shutdown().await;
}

// ============================================================================
// Map surface
// ============================================================================

fn replay(outbound: &mut mpsc::Receiver<String>, surface: &mut RenderSurface) -> usize {
    let mut applied = 0;
    while let Ok(text) = outbound.try_recv() {
        surface.apply(&text);
        applied += 1;
    }
    applied
}

#[test]
fn test_empty_route_update_clears_layers() {
    let (bridge, mut outbound) = MapSyncBridge::new(BridgeConfig::default());
    let mut surface = RenderSurface::new();
    bridge.handle_inbound(&RenderSurface::ready_message());

    let route = RouteResult::from_raw(
        vec![coord(-22.0, -47.9), coord(-22.05, -47.95)],
        15_000.0,
        1_200.0,
    );
    bridge.push_route(&route, coord(-22.0, -47.9), coord(-22.05, -47.95));
    replay(&mut outbound, &mut surface);
    assert!(surface.layer(ROUTE_LAYER).is_some());
    assert!(surface.layer(ORIGIN_LAYER).is_some());
    assert!(surface.layer(DESTINATION_LAYER).is_some());

    bridge.clear_route();
    replay(&mut outbound, &mut surface);
    assert!(!surface.has_route_layers());
}

#[tokio::test(start_paused = true)]
async fn test_tracking_buffers_until_surface_ready() {
    let http = ScriptedHttp::new().on("osrm.test", vec![Reply::Json(200, osrm_route_body())]);
    let (engine, _clock) = engine_with(test_config(), http).await;

    let link = engine.tracking_session(coord(-22.05, -47.95));
    let mut outbound = link.outbound;
    let mut session = link.session;
    let mut events = session.events();

    let (positions_tx, positions_rx) = mpsc::channel(16);
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let handle = tokio::spawn(session.run(positions_rx, inbound_rx));

    for i in 0..3 {
        positions_tx
            .send(PositionSample::new(coord(-22.0, -47.9 + i as f64 * 0.0002), i * 1_000).with_heading(90.0))
            .await
            .unwrap();
    }

    // The route lands while the surface is still loading.
    let Some(SessionEvent::RouteUpdated(_)) = events.recv().await else {
        panic!("expected a route");
    };
    assert_eq!(outbound.try_recv().ok(), None);

    let mut surface = RenderSurface::new();
    inbound_tx.send(RenderSurface::ready_message()).await.unwrap();
    settle().await;

    // One snapshot plus one fit.
    assert_eq!(replay(&mut outbound, &mut surface), 2);
    assert!(surface.layer(ROUTE_LAYER).is_some());
    assert!(surface.layer(VEHICLE_LAYER).is_some());
    assert!(surface.camera_commands().len() >= 2);

    drop(positions_tx);
    let summary = handle.await.unwrap();
    assert_eq!(summary.positions, 3);
    assert_eq!(summary.routes_succeeded, 1);
    engine.shutdown().await;
}
