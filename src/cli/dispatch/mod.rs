//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, database};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let db = database::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: db.dsn,
        db_schema: db.schema,
        db_max_connections: db.max_connections,
        hasher: auth::hasher_config(matches),
    }))
}
