use anyhow::Result;
use quill::cli;

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // The telemetry handle flushes spans when it goes out of scope.
    let (action, _telemetry) = cli::start()?;

    action.execute().await?;

    Ok(())
}
