//! HTTP solver client against a one-shot local stub server.

mod fixtures;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rail_duty_planner::solver::{Ruleset, SolveOptions, SolverClient, SolverRequest};
use rail_duty_planner::traits::SolverBackend;
use rail_duty_planner::{PlannerError, SolverConfig};

use fixtures::*;

// ============================================================================
// Stub server
// ============================================================================

/// Reads one HTTP request (headers plus `Content-Length` body).
fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).unwrap_or(0);
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}

/// Serves a single request, then reports what it received.
fn serve_once(status_line: &'static str, body: &'static str, delay: Duration) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let request = read_request(&mut stream);
        let _ = tx.send(request);
        thread::sleep(delay);
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
    });

    (base_url, rx)
}

fn request() -> SolverRequest {
    let snapshot = snapshot(vec![ride("r1", "crew-17", at(8, 0), at(9, 0), &HAUPTBAHNHOF, &FRIEDRICHSTRASSE)]);
    SolverRequest::new(
        &Ruleset::new("s-bahn-default", "4"),
        &snapshot,
        Vec::new(),
        Vec::new(),
        &SolveOptions::default(),
    )
}

fn client(base_url: &str, timeout_secs: u64) -> SolverClient {
    SolverClient::new(SolverConfig {
        timeout_secs,
        ..SolverConfig::with_base_url(format!("{}/", base_url))
    })
    .expect("build solver client")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_posts_request_and_decodes_duty_groups() {
    let (base_url, received) = serve_once(
        "200 OK",
        r#"{"summary":"1 duty","dutyGroups":[{"groupId":"group:crew-17:2025-03-14","duties":[["r1"]]}],"status":"OPTIMAL","stats":{"totalCandidates":0,"selectedCandidates":0,"groupCount":1}}"#,
        Duration::ZERO,
    );

    let response = client(&base_url, 5).solve(&request()).unwrap();
    assert_eq!(response.duty_groups().len(), 1);
    assert_eq!(response.status.as_deref(), Some("OPTIMAL"));

    let raw = received.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(raw.starts_with("POST /solve "), "got {}", raw.lines().next().unwrap_or(""));
    assert!(raw.contains(r#""rulesetId":"s-bahn-default""#));
    assert!(raw.contains(r#""max_per_service_type":1"#));
    assert!(!raw.contains(r#""problem""#));
}

#[test]
fn test_non_success_status_surfaces_body() {
    let (base_url, _received) = serve_once(
        "422 Unprocessable Entity",
        r#"{"detail":"rulesetVersion missing"}"#,
        Duration::ZERO,
    );

    match client(&base_url, 5).solve(&request()) {
        Err(PlannerError::SolverStatus { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, r#"{"detail":"rulesetVersion missing"}"#);
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[test]
fn test_slow_solver_times_out() {
    let (base_url, _received) = serve_once("200 OK", "{}", Duration::from_secs(4));

    match client(&base_url, 1).solve(&request()) {
        Err(PlannerError::SolverTimeout { timeout_secs }) => assert_eq!(timeout_secs, 1),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_garbage_body_is_a_response_error() {
    let (base_url, _received) = serve_once("200 OK", "not json", Duration::ZERO);

    let err = client(&base_url, 5).solve(&request()).unwrap_err();
    assert!(matches!(err, PlannerError::SolverResponse(_)), "got {:?}", err);
}

#[test]
fn test_refused_connection_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = client(&format!("http://127.0.0.1:{}", port), 2)
        .solve(&request())
        .unwrap_err();
    assert!(matches!(err, PlannerError::SolverTransport(_)), "got {:?}", err);
}

#[test]
fn test_health_probe() {
    let (base_url, received) = serve_once("200 OK", r#"{"status":"ok"}"#, Duration::ZERO);

    assert!(client(&base_url, 5).health().unwrap());
    let raw = received.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(raw.starts_with("GET /health "));
}
