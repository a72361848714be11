//! # testdock Container Integration Tests
//!
//! File: testdock/tests/container.rs
//!
//! Runs real containers. All tests are `#[ignore]`d and need a Docker daemon
//! (and registry access for `nginx`); run with
//! `cargo test --test container -- --ignored`.
//!

mod common;
use common::*;
use std::time::Duration;
use testdock::common::docker::Engine;
use testdock::container::{ContainerHandle, ContainerRequest, ContainerState, SESSION_LABEL};
use testdock::image::{DockerImage, RemoveOptions};
use testdock::modules::nginx::{NginxContainer, NginxOptions};

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Docker
async fn test_docker_run_nginx() {
    let nginx = NginxContainer::start(docker_engine(), NginxOptions::new("nginx:1.27-alpine"))
        .await
        .unwrap();
    assert!(nginx.container().exposed_port(80).unwrap() > 0);

    let response = reqwest::get(format!("{}/", nginx.url().unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await.unwrap().contains("Welcome to nginx!"));
    nginx.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Docker
async fn test_docker_run_nginx_with_dockerfile() {
    let options = NginxOptions::new("testdock/local-nginx")
        .with_dockerfile(asset_dir("nginx"))
        .with_port(8080);
    let nginx = NginxContainer::start(docker_engine(), options).await.unwrap();

    let body = reqwest::get(format!("{}/", nginx.url().unwrap()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Custom Title"));
    nginx.stop().await.unwrap();

    let mut image = DockerImage::new(docker_engine());
    image.from_local("testdock/local-nginx").await.unwrap();
    image
        .remove(RemoveOptions::default().force(true))
        .await
        .unwrap();
    assert!(!image.exists("testdock/local-nginx").await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Docker
async fn test_container_is_removed_after_panic() {
    let engine = docker_engine();
    DockerImage::new(engine.clone())
        .from_image("alpine", None)
        .await
        .unwrap();

    let (id_tx, id_rx) = tokio::sync::oneshot::channel();
    let task_engine = engine.clone();
    let task = tokio::spawn(async move {
        let container = ContainerHandle::start(
            task_engine,
            ContainerRequest::new("alpine:latest")
                .with_cmd(["sleep", "300"])
                .with_stop_timeout(1),
        )
        .await
        .unwrap();
        assert_eq!(container.state(), ContainerState::Running);
        id_tx.send(container.id().to_string()).unwrap();
        panic!("test body failed");
    });
    assert!(task.await.unwrap_err().is_panic());

    let id = id_rx.await.unwrap();
    let inspect = engine.inspect_container(&id).await;
    assert!(inspect.is_err(), "container {} should be gone", id);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Docker
async fn test_logs_exec_and_labels() {
    let engine = docker_engine();
    DockerImage::new(engine.clone())
        .from_image("alpine", None)
        .await
        .unwrap();

    let container = ContainerHandle::start(
        engine.clone(),
        ContainerRequest::new("alpine:latest")
            .with_cmd(["sh", "-c", "echo ready; sleep 300"])
            .with_stop_timeout(1),
    )
    .await
    .unwrap();
    container
        .wait_for_logs("ready", Duration::from_secs(10))
        .await
        .unwrap();

    let output = container.exec(["echo", "hi"]).await.unwrap();
    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout.trim(), "hi");

    let inspect = engine.inspect_container(container.id()).await.unwrap();
    let labels = inspect.config.and_then(|c| c.labels).unwrap_or_default();
    assert_eq!(
        labels.get(SESSION_LABEL).map(String::as_str),
        Some(testdock::container::session_id())
    );
    container.stop().await.unwrap();
}
