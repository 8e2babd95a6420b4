use baselog_http::{BaselogClient, LogLevel, LogModel, Logger};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = BaselogClient::from_env()?;

    if !client.health_check().await {
        println!("backend is not reachable, records will be retried");
    }

    let log = LogModel::new(LogLevel::Error, "payment declined")?
        .with_category("billing")
        .with_tags(["checkout", "card"]);
    let response = client.send_log(&log).await.into_result()?;
    println!("accepted after {} attempt(s): {}", response.attempts, response.body);

    let logger = Logger::with_client(client.clone());
    logger.info("checkout service started").await;

    client.close().await;
    Ok(())
}
