//! CLI command implementations.

pub mod choose;
pub mod docker;
pub mod fan_out;
pub mod run;

use jumpgate_host::HostOverride;

/// Parses a `--host` value; blank means no override.
fn parse_override(host: Option<&str>) -> Option<HostOverride> {
    host.and_then(HostOverride::parse)
}

/// Joins command-line words into one shell command.
fn shell_command(words: &[String]) -> String {
    words.join(" ")
}
