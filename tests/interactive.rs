//! The interactive front end driven by a scripted input against a loopback
//! coordinator and worker.

use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::watch;

use distort_dispatch::category::Category;
use distort_dispatch::client::ClientSession;
use distort_dispatch::command::run_interactive;
use distort_dispatch::config::{ClientConfig, CoordinatorOptions, WorkerConfig};
use distort_dispatch::coordinator::Coordinator;
use distort_dispatch::worker::WorkerSession;

const STEP: Duration = Duration::from_secs(5);

fn position(output: &str, line: &str) -> usize {
    output
        .lines()
        .position(|l| l == line)
        .unwrap_or_else(|| panic!("missing line {line:?} in:\n{output}"))
}

/// Status lines come out in order, and a worker outcome pending at end of
/// input is still reported before the final logout.
#[tokio::test]
async fn scripted_session_reports_every_outcome() {
    let coordinator = Coordinator::bind(&["127.0.0.1:0"], CoordinatorOptions::default())
        .await
        .unwrap();
    let addr = coordinator.local_addrs()[0];
    let registry = coordinator.registry();
    let (stop, rx) = watch::channel(false);
    let server = tokio::spawn(coordinator.run(rx));

    let worker_config = WorkerConfig {
        coordinator_ip: addr.ip().to_string(),
        coordinator_port: addr.port(),
        ip: "127.0.0.1".into(),
        port: 0,
        folder: std::env::temp_dir(),
        category: Category::Text,
    };
    let worker = WorkerSession::start(&worker_config, Some(STEP)).await.unwrap();
    let (worker_stop, worker_rx) = watch::channel(false);
    let worker_task = tokio::spawn(worker.run(worker_rx));

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join("song.mp3"), b"ID3").unwrap();
    let session = ClientSession::new(ClientConfig {
        username: "alice".into(),
        folder: dir.path().to_path_buf(),
        coordinator_ip: addr.ip().to_string(),
        coordinator_port: addr.port(),
    })
    .with_timeout(Some(STEP));

    let script = "fly away\n\
                  DISTORT notes.txt 2\n\
                  \n\
                  connect\n\
                  LIST text\n\
                  DISTORT song.mp3 1\n\
                  DISTORT notes.txt 2\n";
    let mut output = Vec::new();
    tokio::time::timeout(
        STEP,
        run_interactive(session, BufReader::new(script.as_bytes()), &mut output),
    )
    .await
    .expect("session timed out")
    .unwrap();
    let output = String::from_utf8(output).unwrap();

    let unknown = position(&output, "Unknown command.");
    let refused = position(
        &output,
        "Distort failed: not connected to the coordinator",
    );
    let connected = position(&output, "Connected as alice.");
    let listed = position(&output, "notes.txt");
    let no_worker = position(&output, "Distort failed: no Media worker available");
    let accepted = position(&output, "Worker accepted notes.txt.");
    let logged_out = position(&output, "Logged out.");

    assert!(unknown < refused && refused < connected);
    assert!(connected < listed && listed < no_worker && no_worker < accepted);
    assert!(accepted < logged_out);
    assert_eq!(output.lines().last(), Some("Logged out."));
    assert!(registry.lookup(Category::Text).is_some());

    worker_stop.send(true).unwrap();
    worker_task.await.unwrap().unwrap();
    stop.send(true).unwrap();
    server.await.unwrap().unwrap();
}

/// `EXIT` stops reading; later lines are never executed.
#[tokio::test]
async fn exit_stops_before_remaining_input() {
    let dir = tempfile::tempdir().unwrap();
    let session = ClientSession::new(ClientConfig {
        username: "bob".into(),
        folder: dir.path().to_path_buf(),
        coordinator_ip: "127.0.0.1".into(),
        coordinator_port: 1,
    });

    let mut output = Vec::new();
    tokio::time::timeout(
        STEP,
        run_interactive(session, BufReader::new(&b"HELP\nexit\nCONNECT\n"[..]), &mut output),
    )
    .await
    .expect("session timed out")
    .unwrap();
    let output = String::from_utf8(output).unwrap();

    assert!(!output.contains("Connect"));
    assert!(!output.contains("Logged out."));
}
