use crate::api::{self, handlers::auth::HasherConfig, ServerConfig};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub db_schema: String,
    pub db_max_connections: u32,
    pub hasher: HasherConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the schema snapshot fails,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    api::new(ServerConfig {
        port: args.port,
        dsn: args.dsn,
        db_schema: args.db_schema,
        db_max_connections: args.db_max_connections,
        hasher: args.hasher,
    })
    .await
}
