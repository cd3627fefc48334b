//! Behavioural tests for client sessions over loopback TCP.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use scanlink_sensor::DeviceHealth;
use scanlink_sensor::simulated::SimulatedConnector;
use scanlink_sensor::testing::{DriverCall, SensorScript};

use super::support::{HealthEvent, TestClient, TestDaemon, launch};
use crate::transport::{MAX_LINE_BYTES, wait_for};

#[fixture]
fn daemon() -> TestDaemon {
    TestDaemon::start(SensorScript::new())
}

#[rstest]
fn greeting_is_the_first_line(daemon: TestDaemon) {
    let mut client = TestClient::connect(daemon.addr());

    assert_eq!(
        client.read_envelope(),
        json!({
            "command": "CONNECT",
            "response": {"status": "OK", "message": "LIDAR connection established"}
        })
    );
}

#[rstest]
#[case::faulted(Some(DeviceHealth::error(0x8001)))]
#[case::silent(None)]
fn unhealthy_sensor_is_refused(#[case] health: Option<DeviceHealth>) {
    let script = SensorScript::new();
    script.set_health(health);
    let daemon = TestDaemon::start(script);
    let mut client = TestClient::connect(daemon.addr());

    assert_eq!(
        client.read_envelope(),
        json!({
            "command": "CONNECT",
            "response": {"status": "LIDAR_ERROR", "message": "LIDAR is unavailable or unhealthy"}
        })
    );
    assert!(client.is_closed());
}

#[test]
fn absent_sensor_is_refused() {
    let script = SensorScript::new();
    script.refuse_connect(true);
    let daemon = TestDaemon::start(script);
    let mut client = TestClient::connect(daemon.addr());

    let greeting = client.read_envelope();

    assert_eq!(greeting["response"]["status"], "LIDAR_ERROR");
    assert!(client.is_closed());
    assert!(wait_for(|| {
        daemon
            .reporter
            .events()
            .contains(&HealthEvent::ClientConnected { sensor_ready: false })
    }));
}

#[rstest]
fn scan_session_round_trip(daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());

    let started = client.command("START_SCAN");
    assert_eq!(started["response"]["status"], "OK");

    let sample = client.command("GET_SAMPLE");
    assert_eq!(sample["command"], "GET_SAMPLE");
    assert_eq!(sample["response"]["status"], "OK");
    let angles: Vec<f64> = sample["response"]["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|point| point["angle"].as_f64().expect("angle"))
        .collect();
    assert_eq!(angles, vec![0.0, 90.0, 180.0, 270.0]);

    let stopped = client.command("STOP");
    assert_eq!(stopped["response"]["status"], "OK");
    assert!(!daemon.script.is_scanning());
}

#[rstest]
fn wrap_at_batch_boundary_yields_one_sweep(daemon: TestDaemon) {
    daemon.script.push_batches([
        SensorScript::rotation_of(&[0.0, 90.0]),
        SensorScript::rotation_of(&[180.0, 270.0]),
        SensorScript::rotation_of(&[5.0, 95.0]),
    ]);
    let mut client = TestClient::connect_ready(daemon.addr());
    client.command("START_SCAN");

    let sample = client.command("GET_SAMPLE");

    let angles: Vec<f64> = sample["response"]["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|point| point["angle"].as_f64().expect("angle"))
        .collect();
    assert_eq!(angles, vec![0.0, 90.0, 180.0, 270.0]);
}

#[rstest]
fn info_and_health_are_reported(daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());

    assert_eq!(
        client.command("GET_INFO")["response"],
        json!({"model": 24, "firmware_version": {"major": 1, "minor": 29}, "hardware_version": 7})
    );
    assert_eq!(
        client.command("GET_HEALTH")["response"],
        json!({"status": "HEALTH_OK", "error_code": 0})
    );
}

#[rstest]
fn unknown_commands_are_echoed(daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());

    assert_eq!(
        client.command("start_scan"),
        json!({"command": "start_scan", "response": {"status": "UNKNOWN_COMMAND"}})
    );
    let starts = daemon.script.count(DriverCall::StartScan {
        force: false,
        use_typical_scan: true,
    });
    assert_eq!(starts, 0);
}

#[rstest]
fn pipelined_commands_are_answered_in_order(daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());

    client.send_raw(b"GET_HEALTH\r\nBOGUS\nSTOP\n");

    let names: Vec<Value> = (0..3)
        .map(|_| client.read_envelope()["command"].clone())
        .collect();
    assert_eq!(names, vec![json!("GET_HEALTH"), json!("BOGUS"), json!("STOP")]);
}

#[rstest]
fn released_sensor_fails_sample_requests(daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());
    daemon
        .runtime()
        .driver()
        .with_handle(scanlink_sensor::DriverHandle::shutdown);

    assert_eq!(
        client.command("GET_SAMPLE"),
        json!({
            "command": "GET_SAMPLE",
            "response": {
                "status": "FAILED",
                "reason": "DRIVER_UNAVAILABLE",
                "message": "LiDAR driver unavailable"
            }
        })
    );
    assert_eq!(client.command("STOP")["response"]["status"], "FAILED");
    assert_eq!(
        client.command("GET_HEALTH")["response"],
        json!({"status": "HEALTH_FAILED"})
    );
}

#[rstest]
fn overlong_line_closes_the_connection(daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());

    client.send_raw(&vec![b'A'; MAX_LINE_BYTES + 1]);

    assert!(client.is_closed());
}

#[rstest]
fn concurrent_clients_receive_well_formed_envelopes(daemon: TestDaemon) {
    let addr = daemon.addr();
    let mut setup = TestClient::connect_ready(addr);
    setup.command("START_SCAN");

    let workers: Vec<_> = ["STOP", "GET_SAMPLE"]
        .into_iter()
        .map(|keyword| {
            thread::spawn(move || {
                let mut client = TestClient::connect_ready(addr);
                (0..20)
                    .map(|_| client.command(keyword))
                    .collect::<Vec<Value>>()
            })
        })
        .collect();

    for (keyword, worker) in ["STOP", "GET_SAMPLE"].into_iter().zip(workers) {
        let replies = worker.join().expect("client thread");
        assert_eq!(replies.len(), 20);
        for reply in replies {
            assert_eq!(reply["command"], keyword);
            let status = reply["response"]["status"].as_str().expect("status");
            assert!(matches!(status, "OK" | "FAILED"), "unexpected status {status}");
        }
    }
}

#[rstest]
fn session_events_are_reported(daemon: TestDaemon) {
    {
        let mut client = TestClient::connect_ready(daemon.addr());
        client.command("GET_HEALTH");
        client.command("GET_INFO");
    }

    assert!(wait_for(|| {
        daemon
            .reporter
            .events()
            .contains(&HealthEvent::ClientDisconnected { commands: 2 })
    }));
    let events = daemon.reporter.events();
    assert!(events.contains(&HealthEvent::DaemonReady));
    assert!(events.contains(&HealthEvent::SensorConnected("/dev/ttyUSB0".to_owned())));
    assert!(events.contains(&HealthEvent::ClientConnected { sensor_ready: true }));
}

#[rstest]
fn shutdown_closes_idle_sessions(mut daemon: TestDaemon) {
    let mut client = TestClient::connect_ready(daemon.addr());
    client.command("START_SCAN");

    let started = Instant::now();
    daemon.stop();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(client.is_closed());
    assert!(!daemon.script.is_scanning());
    assert_eq!(daemon.script.calls().last(), Some(&DriverCall::SetMotorSpeed(0)));
}

#[test]
fn simulated_sensor_serves_full_sweeps() {
    let (runtime, _reporter) = launch(Arc::new(SimulatedConnector::new()));
    let addr = runtime.local_addr().expect("runtime address");
    let mut client = TestClient::connect_ready(addr);
    client.command("START_SCAN");

    for _ in 0..3 {
        let sample = client.command("GET_SAMPLE");

        let data = sample["response"]["data"].as_array().expect("data array");
        assert_eq!(data.len(), 720);
        let angles: Vec<f64> = data
            .iter()
            .map(|point| point["angle"].as_f64().expect("angle"))
            .collect();
        assert_eq!(angles.first(), Some(&0.0));
        assert!(angles.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(angles.iter().all(|angle| (0.0..360.0).contains(angle)));
    }
    drop(client);
    runtime.stop().expect("stop runtime");
}

#[rstest]
fn silent_sensor_does_not_starve_other_clients(daemon: TestDaemon) {
    daemon.script.allow_idle_grab();
    daemon.script.set_rotation(Vec::new());
    let addr = daemon.addr();
    let mut sampler = TestClient::connect_ready(addr);
    sampler.command("START_SCAN");
    let mut stopper = TestClient::connect_ready(addr);

    let started = Instant::now();
    let sampling = thread::spawn(move || sampler.command("GET_SAMPLE"));
    thread::sleep(Duration::from_millis(50));
    let stopped = stopper.command("STOP");
    let sample = sampling.join().expect("sampling client");

    assert_eq!(stopped["response"]["status"], "OK");
    assert_eq!(sample["response"]["status"], "FAILED");
    assert_eq!(sample["response"]["reason"], "CAPTURE_TIMEOUT");
    assert!(started.elapsed() < Duration::from_secs(3));
}
