// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Driver Integration Tests
//!
//! End-to-end cycles of a [`CyclicDriver`] against the simulated endpoint.
//!
//! ## Test Categories
//!
//! - `test_cycle_*`: input and output handling within TRANSCEIVING
//! - `test_reconnect_*`: recoverable failures and reconnection
//! - `test_availability_*`: unavailable points and the configured policy
//! - `test_lifecycle_*`: shutdown, fatal errors and panics

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rpio_core::{
    CyclicDriver, DriverError, DriverState, SessionFactory, Signal, StatusCode, Value,
};
use rpio_sim::SimEndpoint;

use rpio_tests::common::init_test_logging;
use rpio_tests::prelude::*;

fn pid(identifier: &str) -> rpio_core::PointId {
    PlantFixtures::point(identifier)
}

// =============================================================================
// Cycle Tests
// =============================================================================

#[test]
fn test_cycle_three_inputs_one_output_with_unavailable_input() {
    init_test_logging();
    let endpoint = SimEndpoint::new("sim://scenario")
        .with_point(pid("A"), 0i32)
        .with_point(pid("B"), 0i32)
        .with_point(pid("Out"), false);
    let points = [
        TestPoint::input("a", "A"),
        TestPoint::input("b", "B"),
        TestPoint::input("c", "C"),
        TestPoint::output("out", "Out"),
    ];
    let mut harness = DriverHarness::new(endpoint.clone(), &points);
    assert!(harness.run_until_transceiving());

    harness.signal("out").set_write_status(StatusCode::BAD_TIMEOUT);

    // Cycle 1: notifications for A and B arrive, the output is written.
    endpoint.set_value(&pid("A"), 1i32);
    endpoint.set_value(&pid("B"), 2i32);
    harness.signal("out").set(true);
    harness.cycle();
    assert_eq!(harness.state(), DriverState::Transceiving);

    // Cycle 2
    harness.cycle();
    assert_eq!(harness.signal("a").valid_value(), Some(Value::Int32(1)));
    assert_eq!(harness.signal("b").valid_value(), Some(Value::Int32(2)));
    assert!(!harness.signal("c").is_valid());
    assert_eq!(harness.signal("out").write_status(), StatusCode::GOOD);
    assert_eq!(harness.state(), DriverState::Transceiving);

    let history = endpoint.write_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].point_id, pid("Out"));
    assert_eq!(history[0].value, Value::Bool(true));
    assert!(!endpoint.monitored_points().contains(&pid("C")));

    assert!(harness.stop_and_drain());
}

#[test]
fn test_cycle_no_update_means_no_change() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();

    let level = Arc::clone(harness.signal("level"));
    let before = level.value();
    let check_ins = level.check_in_count();
    assert_eq!(before, Some(Value::Float64(0.0)));

    harness.cycles(20);
    assert_eq!(level.value(), before);
    assert!(level.is_valid());
    assert_eq!(level.check_in_count(), check_ins);

    harness.endpoint.set_value(&pid("Tank.Level"), 4.5f64);
    harness.cycle();
    assert_eq!(level.valid_value(), Some(Value::Float64(4.5)));
    assert_eq!(level.check_in_count(), check_ins + 1);
}

#[test]
fn test_cycle_keeps_only_latest_notification() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();

    let level = Arc::clone(harness.signal("level"));
    let check_ins = level.check_in_count();
    for value in [1.0f64, 2.0, 3.0] {
        harness.endpoint.set_value(&pid("Tank.Level"), value);
    }
    harness.cycle();

    assert_eq!(level.valid_value(), Some(Value::Float64(3.0)));
    assert_eq!(level.check_in_count(), check_ins + 1);
}

#[test]
fn test_cycle_bad_notification_invalidates_signal() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();
    assert!(harness.signal("temperature").is_valid());

    harness
        .endpoint
        .set_status(&pid("Tank.Temperature"), StatusCode::BAD_COMMUNICATION_ERROR);
    harness.cycle();
    assert!(!harness.signal("temperature").is_valid());
    assert_eq!(harness.state(), DriverState::Transceiving);

    // A persistent fault stays invalid without new notifications.
    harness.cycles(5);
    assert!(!harness.signal("temperature").is_valid());

    harness.endpoint.set_value(&pid("Tank.Temperature"), 21.5f64);
    harness.cycle();
    assert_eq!(
        harness.signal("temperature").valid_value(),
        Some(Value::Float64(21.5))
    );
}

#[test]
fn test_cycle_round_trip_through_bidirectional_point() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();
    assert_eq!(
        harness.signal("setpoint").valid_value(),
        Some(Value::Float64(50.0))
    );

    let setpoint = Arc::clone(harness.signal("setpoint"));
    let check_ins = setpoint.check_in_count();
    setpoint.set(75.0f64);
    harness.cycle();

    assert_eq!(setpoint.write_status(), StatusCode::GOOD);
    assert_eq!(
        harness.endpoint.value(&pid("Tank.Setpoint")).and_then(|v| v.value),
        Some(Value::Float64(75.0))
    );

    harness.cycle();
    assert_eq!(setpoint.check_in_count(), check_ins + 1);
    assert_eq!(setpoint.valid_value(), Some(Value::Float64(75.0)));
}

#[test]
fn test_cycle_batches_all_pending_outputs() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());

    harness.signal("valve").set(true);
    harness.signal("pump").set(true);
    harness.signal("heater").set(Value::Int32(3));
    harness.cycle();

    assert_eq!(harness.endpoint.write_batches(), 1);
    assert_eq!(harness.endpoint.write_history().len(), 3);
    let snapshot = harness.driver.metrics().snapshot();
    assert_eq!(snapshot.write_batches, 1);
    assert_eq!(snapshot.write_items, 3);

    // Nothing pending: no batch at all.
    harness.cycles(3);
    assert_eq!(harness.endpoint.write_batches(), 1);
}

// =============================================================================
// Reconnect Tests
// =============================================================================

#[test]
fn test_reconnect_bad_probe_invalidates_inputs_and_restarts_once() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();
    assert!(harness.signal("level").is_valid());
    assert_eq!(harness.driver.metrics().establishments_started(), 1);

    harness.endpoint.set_probe_status(StatusCode::BAD);
    harness.cycle();
    assert_eq!(harness.state(), DriverState::Idle);
    for name in ["level", "temperature", "pressure", "setpoint"] {
        assert!(!harness.signal(name).is_valid(), "{} still valid", name);
    }

    harness.cycle();
    assert_eq!(harness.state(), DriverState::Connecting);
    assert_eq!(harness.driver.metrics().establishments_started(), 2);

    // The endpoint keeps reporting BAD: the attempt stays in flight.
    harness.cycle_until(Duration::from_millis(100), |_| false);
    assert_eq!(harness.state(), DriverState::Connecting);
    assert_eq!(harness.driver.metrics().establishments_started(), 2);

    harness.endpoint.set_probe_status(StatusCode::GOOD);
    assert!(harness.run_until_transceiving());
    assert_eq!(harness.driver.metrics().establishments_started(), 2);
    assert_eq!(harness.driver.metrics().snapshot().reconnects, 1);

    harness.cycle();
    assert!(harness.signal("level").is_valid());
}

#[test]
fn test_reconnect_write_batch_with_one_bad_status() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness
        .endpoint
        .set_write_status(&pid("Tank.Pump"), Some(StatusCode::BAD_NOT_WRITABLE));

    harness.signal("valve").set(true);
    harness.signal("pump").set(true);
    harness.signal("heater").set(Value::Int32(7));
    harness.cycle();

    assert_eq!(harness.signal("pump").write_status(), StatusCode::BAD_NOT_WRITABLE);
    assert_eq!(harness.signal("valve").write_status(), StatusCode::GOOD);
    assert_eq!(harness.signal("heater").write_status(), StatusCode::GOOD);
    assert_eq!(harness.state(), DriverState::Idle);
    assert!(!harness.signal("level").is_valid());

    let snapshot = harness.driver.metrics().snapshot();
    assert_eq!(snapshot.write_rejections, 1);
    assert_eq!(snapshot.reconnects, 1);

    harness.cycle();
    assert_eq!(harness.state(), DriverState::Connecting);
}

#[test]
fn test_reconnect_after_endpoint_goes_offline() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();

    harness.endpoint.set_online(false);
    harness.cycle();
    assert_eq!(harness.state(), DriverState::Idle);
    assert!(!harness.signal("pressure").is_valid());

    harness.cycle_until(Duration::from_millis(100), |_| false);
    assert_eq!(harness.state(), DriverState::Connecting);

    harness.endpoint.set_online(true);
    assert!(harness.run_until_transceiving());
    harness.cycle();
    assert!(harness.signal("pressure").is_valid());
    assert_eq!(harness.endpoint.subscription_count(), 1);
}

#[test]
fn test_reconnect_single_establisher_in_flight() {
    let endpoint = PlantFixtures::tank_endpoint();
    endpoint.set_online(false);
    let tracking = TrackingFactory::new(Arc::new(endpoint.factory()));
    let factory: Arc<dyn SessionFactory> = tracking.clone();
    let mut harness = DriverHarness::with_factory(
        endpoint.clone(),
        factory,
        &PlantFixtures::tank_points(),
        SettingsFixtures::fast(),
    );

    harness.cycle_until(Duration::from_millis(300), |_| false);
    assert_eq!(harness.state(), DriverState::Connecting);
    assert!(harness.driver.is_connecting());
    assert_eq!(harness.driver.metrics().establishments_started(), 1);
    assert!(harness.driver.metrics().connect_attempts() > 1);
    assert!(tracking.max_live() <= 1);

    endpoint.set_online(true);
    assert!(harness.run_until_transceiving());
    assert_eq!(harness.driver.metrics().establishments_started(), 1);
    assert_eq!(tracking.live(), 1);
}

#[test]
fn test_reconnect_stalled_endpoint_costs_one_request_timeout() {
    let settings = SettingsFixtures::default_retry();
    assert_eq!(settings.request.retry.max_attempts, 2);
    let mut harness = DriverHarness::with_settings(
        PlantFixtures::tank_endpoint(),
        &PlantFixtures::tank_points(),
        settings,
    );
    assert!(harness.run_until_transceiving());
    harness.cycle();

    // Every request now hangs far beyond the 200 ms request timeout.
    harness.endpoint.set_latency(Duration::from_secs(2));
    let started = Instant::now();
    harness.cycle();
    let elapsed = started.elapsed();

    assert_eq!(harness.state(), DriverState::Idle);
    assert!(!harness.signal("level").is_valid());
    // A retried liveness check would take 200 + 100 + 200 ms.
    assert!(elapsed >= Duration::from_millis(200), "cycle took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(450), "cycle took {:?}", elapsed);
}

// =============================================================================
// Availability Tests
// =============================================================================

#[test]
fn test_availability_unavailable_output_excluded_until_reconnect() {
    let endpoint = PlantFixtures::tank_endpoint();
    let mut points = PlantFixtures::tank_points();
    points.push(TestPoint::output("drain", "Tank.Drain"));
    let mut harness = DriverHarness::new(endpoint.clone(), &points);
    assert!(harness.run_until_transceiving());

    harness.signal("drain").set(true);
    harness.cycle();
    assert_eq!(endpoint.write_batches(), 0);
    assert_eq!(harness.state(), DriverState::Transceiving);

    // Appearing mid-connection does not make it available.
    endpoint.add_point(pid("Tank.Drain"), false);
    harness.cycles(3);
    assert_eq!(endpoint.write_batches(), 0);

    endpoint.set_probe_status(StatusCode::BAD);
    harness.cycle();
    endpoint.set_probe_status(StatusCode::GOOD);
    assert!(harness.run_until_transceiving());
    harness.cycle();

    assert_eq!(
        endpoint.value(&pid("Tank.Drain")).and_then(|v| v.value),
        Some(Value::Bool(true))
    );
    assert_eq!(harness.signal("drain").write_status(), StatusCode::GOOD);
}

#[test]
fn test_availability_invalidate_policy() {
    let endpoint = PlantFixtures::tank_endpoint();
    let mut points = PlantFixtures::tank_points();
    points.push(TestPoint::input("flow", "Tank.Flow"));
    let mut harness = DriverHarness::new(endpoint, &points);

    harness.signal("flow").check_in(Value::Float64(9.0), true);
    assert!(harness.run_until_transceiving());

    assert!(!harness.signal("flow").is_valid());
    assert_eq!(harness.signal("flow").value(), Some(Value::Float64(9.0)));
}

#[test]
fn test_availability_keep_last_policy() {
    let endpoint = PlantFixtures::tank_endpoint();
    let mut points = PlantFixtures::tank_points();
    points.push(TestPoint::input("flow", "Tank.Flow"));
    let mut harness = DriverHarness::with_settings(endpoint, &points, SettingsFixtures::keep_last());

    harness.signal("flow").check_in(Value::Float64(9.0), true);
    assert!(harness.run_until_transceiving());
    harness.cycles(3);

    assert_eq!(harness.signal("flow").valid_value(), Some(Value::Float64(9.0)));
    assert!(harness.signal("level").is_valid());
}

#[test]
fn test_availability_bad_point_not_subscribed() {
    let endpoint = PlantFixtures::tank_endpoint();
    endpoint.set_status(&pid("Tank.Pressure"), StatusCode::BAD);
    let mut harness = DriverHarness::new(endpoint.clone(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());

    let monitored = endpoint.monitored_points();
    assert!(monitored.contains(&pid("Tank.Level")));
    assert!(!monitored.contains(&pid("Tank.Pressure")));

    // Pushes for an excluded point never reach its signal.
    endpoint.set_value(&pid("Tank.Pressure"), 2.0f64);
    harness.cycle();
    assert!(!harness.signal("pressure").is_valid());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_lifecycle_stop_while_transceiving() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    assert!(harness.run_until_transceiving());
    harness.cycle();
    assert_eq!(harness.endpoint.subscription_count(), 1);

    assert!(harness.stop_and_drain());
    assert_eq!(harness.state(), DriverState::Stopped);
    assert!(!harness.signal("level").is_valid());
    assert_eq!(harness.endpoint.subscription_count(), 0);
    assert!(harness.endpoint.unsubscribes() >= 1);

    // Terminal: further cycles do nothing.
    let cycles = harness.driver.metrics().snapshot().cycles;
    harness.cycles(3);
    assert_eq!(harness.driver.metrics().snapshot().cycles, cycles);
}

#[test]
fn test_lifecycle_stop_while_connecting_from_another_thread() {
    let endpoint = PlantFixtures::tank_endpoint();
    endpoint.set_online(false);
    let mut harness = DriverHarness::new(endpoint.clone(), &PlantFixtures::tank_points());
    harness.cycles(3);
    assert_eq!(harness.state(), DriverState::Connecting);

    let stop = harness.driver.stop_handle();
    thread::spawn(move || stop.stop()).join().unwrap();
    assert!(harness.driver.stop_handle().is_requested());

    harness.cycle();
    assert_eq!(harness.state(), DriverState::Stopped);
    assert!(harness.driver.is_finished());

    thread::sleep(Duration::from_millis(50));
    let opens = endpoint.opens();
    thread::sleep(Duration::from_millis(150));
    assert!(endpoint.opens() <= opens + 1);
}

#[test]
fn test_lifecycle_stop_before_connected_outcome_is_polled() {
    let mut harness = DriverHarness::new(PlantFixtures::tank_endpoint(), &PlantFixtures::tank_points());
    harness.cycle();
    assert_eq!(harness.state(), DriverState::Connecting);

    // The establisher subscribes and hands over its connection, but the
    // driver does not cycle again before the stop request.
    assert!(harness.wait_until(DEFAULT_WAIT, |h| h.endpoint.subscription_count() == 1));
    thread::sleep(Duration::from_millis(20));

    harness.driver.stop();
    harness.cycle();
    assert_eq!(harness.state(), DriverState::Stopped);
    assert_eq!(harness.endpoint.unsubscribes(), 1);
    assert_eq!(harness.endpoint.closes(), 1);
    assert_eq!(harness.endpoint.subscription_count(), 0);
}

#[test]
fn test_lifecycle_dropped_driver_releases_delivered_connection() {
    let runtime = test_runtime();
    let endpoint = PlantFixtures::tank_endpoint();
    let points = PlantFixtures::tank_points();
    let factory: Arc<dyn SessionFactory> = Arc::new(endpoint.factory());

    let mut driver = CyclicDriver::new("dropped", factory, SettingsFixtures::fast(), runtime.handle().clone());
    let signals: Vec<(Arc<dyn Signal>, String)> = points
        .iter()
        .map(|p| {
            let signal: Arc<dyn Signal> = Arc::new(rpio_core::SignalCell::new(p.signal.clone()));
            (signal, p.signal.clone())
        })
        .collect();
    driver.prepare(signals, &resolver_for(&points)).unwrap();

    driver.run();
    assert_eq!(driver.state(), DriverState::Connecting);
    for _ in 0..2500 {
        if endpoint.subscription_count() == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(20));
    drop(driver);

    for _ in 0..2500 {
        if endpoint.closes() == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(endpoint.closes(), 1);
    assert_eq!(endpoint.subscription_count(), 0);
}

#[test]
fn test_lifecycle_fatal_factory_error_stops_driver() {
    let endpoint = PlantFixtures::tank_endpoint();
    endpoint.fail_sessions_with(Some(DriverError::configuration("licence missing")));
    let mut harness = DriverHarness::new(endpoint, &PlantFixtures::tank_points());

    assert!(harness.cycle_until(DEFAULT_WAIT, |h| h.driver.is_finished()));
    assert_eq!(harness.state(), DriverState::Stopped);

    let snapshot = harness.driver.metrics().snapshot();
    assert_eq!(snapshot.fatal_stops, 1);
    assert_eq!(snapshot.establishments_started, 1);
    assert!(snapshot.last_error.unwrap_or_default().contains("licence missing"));
}

#[test]
fn test_lifecycle_panicking_signal_stops_driver() {
    let runtime = test_runtime();
    let endpoint = PlantFixtures::tank_endpoint();
    let panicking = PanickingSignal::new("level");
    let points = [TestPoint::input("level", "Tank.Level")];

    let mut driver = CyclicDriver::new(
        "panicking",
        Arc::new(endpoint.factory()),
        SettingsFixtures::fast(),
        runtime.handle().clone(),
    );
    let signal: Arc<dyn Signal> = panicking.clone();
    driver
        .prepare(vec![(signal, "level".to_string())], &resolver_for(&points))
        .unwrap();

    for _ in 0..2500 {
        driver.run();
        if driver.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }

    assert!(driver.is_finished());
    assert_eq!(driver.metrics().snapshot().fatal_stops, 1);
    assert!(panicking.invalidations() >= 1);
    drop(driver);
}

#[test]
fn test_lifecycle_invalid_output_sample_not_written() {
    let runtime = test_runtime();
    let endpoint = PlantFixtures::tank_endpoint();
    let valve = RecordingSignal::new("valve");
    let points = [TestPoint::output("valve", "Tank.Valve")];

    let mut driver = CyclicDriver::new(
        "recording",
        Arc::new(endpoint.factory()),
        SettingsFixtures::fast(),
        runtime.handle().clone(),
    );
    let signal: Arc<dyn Signal> = valve.clone();
    driver
        .prepare(vec![(signal, "valve".to_string())], &resolver_for(&points))
        .unwrap();

    for _ in 0..2500 {
        driver.run();
        if driver.state() == DriverState::Transceiving {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(driver.state(), DriverState::Transceiving);

    valve.set_output(true, false);
    driver.run();
    assert_eq!(endpoint.write_batches(), 0);
    assert_eq!(valve.last_write_status(), None);

    valve.set_output(true, true);
    driver.run();
    assert_eq!(endpoint.write_batches(), 1);
    assert_eq!(valve.last_write_status(), Some(StatusCode::GOOD));
    drop(driver);
}
