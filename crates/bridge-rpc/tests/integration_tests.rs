//! Integration tests for the bridge-rpc binary.
//!
//! Each test launches `bridge-rpc serve` as a child process, waits for the
//! launch markers on stdout and then talks to it as a satellite would.

use bridge_core::{BridgeError, LaunchConfig, Satellite};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

fn binary_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_bridge-rpc") {
        return Ok(PathBuf::from(path));
    }
    let current_exe = std::env::current_exe()
        .map_err(|e| format!("failed to resolve current_exe for fallback: {e}"))?;
    let target_debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .ok_or_else(|| "failed to resolve target/debug directory for fallback".to_string())?;

    let mut fallback = target_debug_dir.join("bridge-rpc");
    if cfg!(target_os = "windows") {
        fallback.set_extension("exe");
    }
    if !fallback.exists() {
        return Err(format!(
            "CARGO_BIN_EXE_bridge-rpc not set and fallback binary not found at {}",
            fallback.display()
        ));
    }
    Ok(fallback)
}

struct HostProcess {
    child: tokio::process::Child,
    addr: SocketAddr,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl HostProcess {
    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start `bridge-rpc serve` and wait for the port and ready lines.
async fn start_host() -> Result<HostProcess, String> {
    let mut child = tokio::process::Command::new(binary_path()?)
        .arg("serve")
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("failed to spawn bridge-rpc: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut port: Option<u16> = None;
    let mut ready = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline && !ready {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix(LaunchConfig::PORT_PREFIX) {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid port value '{value}': {e}"))?;
                    port = Some(parsed);
                } else if line.trim() == LaunchConfig::READY_LINE {
                    ready = true;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read bridge-rpc stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port = port.ok_or_else(|| "port line not emitted by bridge-rpc".to_string())?;
    if !ready {
        return Err("ready line not emitted by bridge-rpc".to_string());
    }

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(HostProcess {
        child,
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        stdout_drain: Some(stdout_drain),
    })
}

/// Run `bridge-rpc call` against the host and parse its JSON output.
async fn run_call(addr: SocketAddr, extra: &[&str]) -> Result<Value, String> {
    let output = tokio::process::Command::new(binary_path()?)
        .arg("call")
        .arg("--addr")
        .arg(addr.to_string())
        .args(extra)
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to run bridge-rpc call: {e}"))?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).map_err(|e| format!("invalid call output '{stdout}': {e}"))
}

async fn connect(host: &HostProcess) -> Satellite {
    Satellite::connect(
        host.addr,
        bridge_services::registry().unwrap(),
        bridge_services::default_allow_list(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_satellite_replicates_host_mutations() {
    let host = start_host().await.unwrap();
    let satellite = connect(&host).await;

    let scenes = satellite.service("ScenesService").await.unwrap();
    let scene = scenes
        .call_mutator("createScene", vec![json!("Intro")])
        .await
        .unwrap();
    scene
        .call("rename", vec![json!("Opening")])
        .await
        .unwrap();

    let history = satellite.history().unwrap();
    let types: Vec<_> = history.iter().map(|m| m.mutation_type.as_str()).collect();
    assert_eq!(types, vec!["ADD_SCENE", "RENAME_SCENE"]);

    let listed = scenes.call_data("getScenes", vec![]).await.unwrap();
    assert_eq!(listed, satellite.state("ScenesService").unwrap().unwrap()["scenes"]);
    assert_eq!(listed[0]["name"], "Opening");

    host.stop().await;
}

#[tokio::test]
async fn test_two_satellites_share_canonical_state() {
    let host = start_host().await.unwrap();
    let first = connect(&host).await;
    let second = connect(&host).await;

    let audio = first.service("AudioService").await.unwrap();
    audio
        .call("registerSource", vec![json!("mic-1"), json!("Mic")])
        .await
        .unwrap();

    // The second window sees the host's state, not the first window's replica
    let from_second = second.service("AudioService").await.unwrap();
    let source = from_second
        .call_mutator("getSource", vec![json!("mic-1")])
        .await
        .unwrap();
    source.call("setVolume", vec![json!(0.25)]).await.unwrap();

    let volume = audio
        .call_mutator("getSource", vec![json!("mic-1")])
        .await
        .unwrap()
        .call_data("getVolume", vec![])
        .await
        .unwrap();
    assert_eq!(volume, json!(0.25));
    assert_eq!(
        second.state("AudioService").unwrap().unwrap()["sources"]["mic-1"]["volume"],
        json!(0.25)
    );

    host.stop().await;
}

#[tokio::test]
async fn test_host_exit_surfaces_host_lost() {
    let host = start_host().await.unwrap();
    let satellite = connect(&host).await;
    let scenes = satellite.service("ScenesService").await.unwrap();

    host.stop().await;

    let err = scenes.call("getScenes", vec![]).await.unwrap_err();
    assert!(matches!(err, BridgeError::HostLost { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_call_command_prints_result_and_mutations() {
    let host = start_host().await.unwrap();

    let created = run_call(
        host.addr,
        &["ScenesService", "createScene", "--args", r#"["Intro"]"#],
    )
    .await
    .unwrap();
    assert_eq!(created["remote"], true);
    assert_eq!(created["result"]["isMutator"], true);
    assert_eq!(created["result"]["mutatorName"], "Scene");
    let mutations = created["mutations"].as_array().unwrap();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0]["type"], "ADD_SCENE");
    assert_eq!(mutations[0]["payload"]["name"], "Intro");

    // A fresh satellite: reads carry no mutations
    let listed = run_call(host.addr, &["ScenesService", "getScenes"])
        .await
        .unwrap();
    assert_eq!(listed["result"][0]["name"], "Intro");
    assert_eq!(listed["mutations"], json!([]));

    host.stop().await;
}

#[tokio::test]
async fn test_call_command_with_constructor_args() {
    let host = start_host().await.unwrap();

    run_call(
        host.addr,
        &["AudioService", "registerSource", "--args", r#"["mic-1", "Mic"]"#],
    )
    .await
    .unwrap();
    let output = run_call(
        host.addr,
        &[
            "AudioSource",
            "setVolume",
            "--constructor-args",
            r#"["mic-1"]"#,
            "--args",
            "[0.5]",
        ],
    )
    .await
    .unwrap();

    assert_eq!(output["result"], Value::Null);
    assert_eq!(
        output["mutations"],
        json!([{"type": "SET_VOLUME", "payload": {"sourceId": "mic-1", "volume": 0.5}}])
    );

    host.stop().await;
}

#[tokio::test]
async fn test_call_command_fails_for_local_only_service() {
    let host = start_host().await.unwrap();

    let err = run_call(host.addr, &["LayoutService", "getCurrentTab"])
        .await
        .unwrap_err();
    assert!(err.contains("LayoutService"), "stderr was: {err}");

    host.stop().await;
}
