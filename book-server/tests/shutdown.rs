//! Graceful shutdown: stop serving, stop the monitor, drain generation

mod common;

use book_server::Server;
use common::{GATED, place_order, test_app_with};
use shared::models::GenerationStatus;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_shutdown_drains_in_flight_generation() {
    let app = test_app_with(|config| config.auto_start_monitor = true);
    let order = place_order(&app.state, &[Some(GATED)]);
    let entry = app
        .state
        .queue
        .entry_for_item(&order.items[0].id)
        .unwrap()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let server = Server::with_state(app.state.config.clone(), app.state.clone());
    let serving = tokio::spawn(async move {
        server
            .run_until(listener, async move {
                let _ = rx.await;
            })
            .await
    });

    // The monitor starts with the server and picks the entry up
    tokio::time::timeout(Duration::from_secs(5), app.provider.started.notified())
        .await
        .expect("generation started");
    assert!(app.state.monitor.is_running());

    tx.send(()).unwrap();
    // Release the provider once shutdown is underway
    tokio::time::sleep(Duration::from_millis(100)).await;
    app.provider.release.notify_one();

    tokio::time::timeout(Duration::from_secs(10), serving)
        .await
        .expect("server exited")
        .unwrap()
        .unwrap();

    assert!(!app.state.monitor.is_running());
    assert_eq!(app.state.worker.in_flight_count(), 0);
    let entry = app.state.queue.get(&entry.id).unwrap();
    assert_eq!(entry.status, GenerationStatus::Completed);
}

#[tokio::test]
async fn test_shutdown_with_idle_monitor() {
    let app = test_app_with(|_| {});
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::with_state(app.state.config.clone(), app.state.clone());

    tokio::time::timeout(
        Duration::from_secs(5),
        server.run_until(listener, async {}),
    )
    .await
    .expect("server exited")
    .unwrap();

    assert!(!app.state.monitor.is_running());
}
