use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;

use church_permissions::app::shutdown_on;

#[tokio::test]
async fn listener_stops_when_the_signal_fires() -> Result<()> {
    let handle = axum_server::Handle::new();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let drain = shutdown_on(
        handle.clone(),
        async move {
            let _ = rx.await;
        },
        Duration::from_secs(1),
    );

    let app = Router::new().route("/", get(|| async { "ok" }));
    let server = tokio::spawn(
        axum_server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .handle(handle.clone())
            .serve(app.into_make_service()),
    );

    let addr = handle.listening().await.context("server never started listening")?;
    assert_ne!(addr.port(), 0);
    assert!(!server.is_finished());

    tx.send(()).ok();
    drain.await?;

    let served = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .context("server kept running after shutdown")??;
    served?;
    Ok(())
}
