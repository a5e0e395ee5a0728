use std::path::PathBuf;

use clap::Parser;

/// The confsmith backend daemon.
#[derive(Debug, Parser)]
#[command(
    name = "confsmith",
    version,
    about = "YANG-driven transactional configuration engine"
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'f', long, env = "CONFSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log destination: "stderr" or a file path.
    #[arg(short = 'l', long, default_value = "stderr")]
    pub log: String,

    /// Directory scanned (alphabetically) for *.yl schema modules.
    #[arg(short = 'y', long)]
    pub schema_dir: Option<PathBuf>,

    /// Directory holding the configuration databases.
    #[arg(short = 'd', long)]
    pub db_dir: Option<PathBuf>,

    /// RPC transport: unix, ipv4 or ipv6.
    #[arg(short = 'F', long)]
    pub socket_family: Option<String>,

    /// Socket path (unix) or address:port (ipv4/ipv6).
    #[arg(short = 'a', long)]
    pub socket_path: Option<String>,

    /// Boot pipeline: none, init, startup or running.
    #[arg(short = 's', long)]
    pub startup_mode: Option<String>,

    /// Extra XML file merged into running after startup.
    #[arg(short = 'c', long)]
    pub extra_config: Option<PathBuf>,

    /// key=value overrides of configuration options.
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Pretty-print protocol replies.
    #[arg(long)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["confsmith"]);
        assert_eq!(cli.log, "stderr");
        assert!(cli.config.is_none());
        assert!(cli.overrides.is_empty());
        assert!(!cli.pretty);
    }

    #[test]
    fn short_flags() {
        let cli = Cli::parse_from([
            "confsmith",
            "-f",
            "conf.toml",
            "-y",
            "schemas",
            "-s",
            "running",
            "-o",
            "pretty=true",
            "-o",
            "modstate_enabled=false",
        ]);
        assert_eq!(cli.config.unwrap().to_str(), Some("conf.toml"));
        assert_eq!(cli.schema_dir.unwrap().to_str(), Some("schemas"));
        assert_eq!(cli.startup_mode.as_deref(), Some("running"));
        assert_eq!(cli.overrides.len(), 2);
    }

    #[test]
    fn verify_cli_contract() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
