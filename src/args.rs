use std::{fs::File, io, net::SocketAddr, sync::Mutex, time::Duration};

use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::{
    agent::AgentConfig,
    bridge::{BridgeConfig, ConfigError},
    presence::PresenceStyle,
};

/// Environment variable read when neither `--client-id` nor `CLIENT_ID` is set
const LEGACY_CLIENT_ID_VAR: &str = "DISCORD_CLIENT_ID";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File to write the log to. If not specified, logs will be written to stderr.
    #[clap(long, short, global = true)]
    log_file: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive playback snapshots over WebSocket and show them on Discord
    Bridge(BridgeArgs),
    /// Read the player page from stdin (one JSON object per line) and push changes to the bridge
    Agent(AgentArgs),
}

#[derive(clap::Args, Debug)]
pub struct BridgeArgs {
    /// Discord application id.
    /// Create one at `<https://discord.com/developers/applications>`.
    #[clap(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,
    /// Address the WebSocket server listens on
    #[clap(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
    /// Prefix the song title with a play/pause glyph
    #[clap(long)]
    pub status_glyph: bool,
}

impl BridgeArgs {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingClientId`] if no application id is configured.
    pub fn into_config(self) -> Result<BridgeConfig, ConfigError> {
        self.into_config_with(|key| std::env::var(key).ok())
    }

    fn into_config_with(
        self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<BridgeConfig, ConfigError> {
        let non_blank = |id: String| {
            let id = id.trim();
            (!id.is_empty()).then(|| id.to_owned())
        };
        let client_id = self
            .client_id
            .and_then(non_blank)
            .or_else(|| var(LEGACY_CLIENT_ID_VAR).and_then(non_blank))
            .ok_or(ConfigError::MissingClientId)?;
        Ok(BridgeConfig {
            client_id,
            listen: self.listen,
            style: PresenceStyle {
                status_glyph: self.status_glyph,
            },
        })
    }
}

#[derive(clap::Args, Debug)]
pub struct AgentArgs {
    /// WebSocket URL of the bridge
    #[clap(long, default_value = "ws://localhost:8080")]
    pub endpoint: String,
    /// Poll the page every X milliseconds
    #[clap(long, default_value_t = 2000)]
    pub poll_interval: u64,
}

impl AgentArgs {
    pub fn into_config(self) -> AgentConfig {
        AgentConfig {
            poll_interval: Duration::from_millis(self.poll_interval),
            ..AgentConfig::new(self.endpoint)
        }
    }
}

impl Args {
    /// Build the tracing subscriber using parameters from the command line arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be created.
    pub fn init_tracing_subscriber(&self) -> io::Result<()> {
        let builder = tracing_subscriber::fmt().pretty().with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );

        match self.log_file.as_ref() {
            None => builder.with_writer(io::stderr).init(),
            Some(f) => builder.with_writer(Mutex::new(File::create(f)?)).init(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_args(client_id: Option<&str>) -> BridgeArgs {
        BridgeArgs {
            client_id: client_id.map(ToOwned::to_owned),
            listen: "127.0.0.1:8080".parse().unwrap(),
            status_glyph: false,
        }
    }

    #[test]
    fn bridge_defaults() {
        let args = Args::try_parse_from(["ytm-presence", "bridge", "--client-id", "42"]).unwrap();
        let Command::Bridge(bridge) = args.command else {
            panic!("expected bridge subcommand");
        };
        assert_eq!(bridge.client_id.as_deref(), Some("42"));
        assert_eq!(bridge.listen, "127.0.0.1:8080".parse().unwrap());
        assert!(!bridge.status_glyph);
        assert_eq!(args.log_file, None);
    }

    #[test]
    fn log_file_after_subcommand() {
        let args = Args::try_parse_from([
            "ytm-presence",
            "agent",
            "--log-file",
            "agent.log",
            "--endpoint",
            "ws://127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(args.log_file.as_deref(), Some("agent.log"));
        let Command::Agent(agent) = args.command else {
            panic!("expected agent subcommand");
        };
        let config = agent.into_config();
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000");
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.navigation_delay, Duration::from_millis(1000));
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(Args::try_parse_from([
            "ytm-presence",
            "bridge",
            "--client-id",
            "42",
            "--listen",
            "localhost"
        ])
        .is_err());
    }

    #[test]
    fn missing_client_id_is_fatal() {
        let e = bridge_args(None).into_config_with(|_| None).unwrap_err();
        assert_eq!(e, ConfigError::MissingClientId);
        let e = bridge_args(Some("  ")).into_config_with(|_| None).unwrap_err();
        assert_eq!(e, ConfigError::MissingClientId);
    }

    #[test]
    fn client_id_fallback() {
        let config = bridge_args(None)
            .into_config_with(|key| (key == "DISCORD_CLIENT_ID").then(|| "7".to_owned()))
            .unwrap();
        assert_eq!(config.client_id, "7");

        let config = bridge_args(Some("1"))
            .into_config_with(|_| Some("7".to_owned()))
            .unwrap();
        assert_eq!(config.client_id, "1");
        assert!(!config.style.status_glyph);
    }
}
