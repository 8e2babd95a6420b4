use baselog_http::{blocking::BaselogClient, LogLevel, LogModel, Outcome};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = BaselogClient::from_env()?;

    let log = LogModel::new(LogLevel::Warning, "disk almost full")?.with_tags(["storage"]);
    match client.send_log(&log) {
        Outcome::Success(response) => println!("accepted: {}", response.body),
        Outcome::Failure(failure) => println!("not delivered: {failure}"),
        Outcome::NotSupported { operation } => println!("{operation} is not supported"),
    }

    client.close();
    Ok(())
}
