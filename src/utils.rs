/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resolves on Ctrl-C. Never resolves if the handler can't be installed.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "Failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
