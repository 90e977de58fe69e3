use clap::{Arg, ArgMatches, Command};

use crate::api::handlers::auth::HasherConfig;

pub const ARG_HASH_TIME_COST: &str = "hash-time-cost";
pub const ARG_HASH_MEMORY_KIB: &str = "hash-memory-kib";
pub const ARG_HASH_LANES: &str = "hash-lanes";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_TIME_COST)
                .long("hash-time-cost")
                .help("Argon2id iterations per password hash")
                .env("QUILL_HASH_TIME_COST")
                .default_value("1")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long("hash-memory-kib")
                .help("Argon2id memory cost in KiB")
                .env("QUILL_HASH_MEMORY_KIB")
                .default_value("65536")
                .value_parser(clap::value_parser!(u32).range(8..)),
        )
        .arg(
            Arg::new(ARG_HASH_LANES)
                .long("hash-lanes")
                .help("Argon2id parallelism")
                .env("QUILL_HASH_LANES")
                .default_value("4")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}

/// Hashing costs from the parsed arguments, falling back to the defaults.
#[must_use]
pub fn hasher_config(matches: &ArgMatches) -> HasherConfig {
    let defaults = HasherConfig::default();
    HasherConfig::new()
        .with_time_cost(
            matches
                .get_one::<u32>(ARG_HASH_TIME_COST)
                .copied()
                .unwrap_or(defaults.time_cost()),
        )
        .with_memory_kib(
            matches
                .get_one::<u32>(ARG_HASH_MEMORY_KIB)
                .copied()
                .unwrap_or(defaults.memory_kib()),
        )
        .with_lanes(
            matches
                .get_one::<u32>(ARG_HASH_LANES)
                .copied()
                .unwrap_or(defaults.lanes()),
        )
}
