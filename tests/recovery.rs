//! Configured recovery policy driving a live client.
mod common;

use common::{wait_for, wait_until, within, MockConnection, MockTransport};
use extlink::types::INITIALIZE;
use extlink::{client_from_config, load_config, ClientState};
use tempfile::TempDir;

#[tokio::test]
async fn restart_limit_from_config_caps_reconnects() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[client]\nname = \"previewer\"\n\n[recovery]\nmax_restarts = 1\nrestart_window_secs = 600\n",
    )
    .unwrap();
    let config = load_config(&config_dir, None).unwrap();

    let first = MockConnection::new();
    let second = MockConnection::new();
    let third = MockConnection::new();
    let transport = MockTransport::new(vec![first.clone(), second.clone(), third.clone()]);
    let client = client_from_config("c1", &config, transport.clone()).unwrap();

    assert_eq!(within(client.activate_and_wait()).await, ClientState::Active);
    let params = first.request_params(INITIALIZE).unwrap();
    assert_eq!(params["clientInfo"]["name"], "previewer");

    first.fire_close();
    wait_until(|| second.requests().contains(&INITIALIZE.to_string())).await;
    wait_for(&client, ClientState::Active).await;

    second.fire_close();
    wait_for(&client, ClientState::Stopped).await;
    assert_eq!(transport.connects(), 2);
    assert!(second.is_disposed());
    assert!(third.requests().is_empty());
}

#[tokio::test]
async fn error_limit_from_config_shuts_down() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("project");
    std::fs::create_dir_all(project.join(".extlink")).unwrap();
    std::fs::write(
        project.join(".extlink").join("config.toml"),
        "[recovery]\nmax_errors = 3\n",
    )
    .unwrap();
    let config = load_config(&config_dir, Some(&project)).unwrap();
    assert_eq!(config.recovery.max_errors, 3);

    let conn = MockConnection::new();
    let client = client_from_config("c1", &config, MockTransport::new(vec![conn.clone()])).unwrap();
    within(client.activate_and_wait()).await;

    conn.fire_error(extlink::ConnectionError::Transport("bad frame".into()), 2);
    conn.fire_error(extlink::ConnectionError::Transport("bad frame".into()), 3);
    wait_for(&client, ClientState::Stopped).await;
    assert!(conn.is_disposed());
}
