//! CLI argument definitions for kubewarn-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use kubewarn_core::config::KubewarnConfig;

/// kubewarn Warning event daemon.
///
/// Watches the cluster's Warning events, records each one exactly once,
/// streams new ones to live viewers, and serves the recorded history.
#[derive(Parser, Debug)]
#[command(name = "kubewarn-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to kubewarn.toml configuration file.
    #[arg(short, long, default_value = "/etc/kubewarn/kubewarn.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut KubewarnConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = DaemonCli::parse_from(["kubewarn-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/kubewarn/kubewarn.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = DaemonCli::parse_from([
            "kubewarn-daemon",
            "--config",
            "/tmp/kw.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--pid-file",
            "/run/kubewarn.pid",
        ]);
        let mut config = KubewarnConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.general.pid_file, "/run/kubewarn.pid");
    }

    #[test]
    fn missing_overrides_keep_config_values() {
        let cli = DaemonCli::parse_from(["kubewarn-daemon", "--validate"]);
        let mut config = KubewarnConfig::default();
        config.general.log_level = "warn".to_owned();
        cli.apply_overrides(&mut config);

        assert!(cli.validate);
        assert_eq!(config.general.log_level, "warn");
    }
}
