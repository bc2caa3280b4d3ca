use clap::{Parser, Subcommand};
use std::path::PathBuf;

use duet_call::config;

#[derive(Parser, Debug)]
#[command(name = "duet-call")]
#[command(author = "duet-call developers")]
#[command(version = "0.1.0")]
#[command(about = "Two-party video calls with turn-based counseling questions", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "duet-call.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the call page and the signaling relay
    Serve {
        /// HTTP bind address
        #[arg(long)]
        host: Option<String>,

        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding index.html
        #[arg(long)]
        web_root: Option<PathBuf>,
    },

    /// Start a new meeting and wait for the other participant
    Create {
        /// Relay base URL
        #[arg(long)]
        signaling_url: Option<String>,
    },

    /// Join a meeting from its link or `/meeting/<id>` path
    Join {
        link: String,

        /// Relay base URL; defaults to the link's origin when it is a full URL
        #[arg(long)]
        signaling_url: Option<String>,
    },
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_with_link() {
        let args = Args::parse_from(["duet-call", "join", "http://127.0.0.1:8000/meeting/abc-xyz"]);
        match args.command {
            Command::Join { link, signaling_url } => {
                assert_eq!(link, "http://127.0.0.1:8000/meeting/abc-xyz");
                assert!(signaling_url.is_none());
            }
            other => panic!("Expected join, got {:?}", other),
        }
    }

    #[test]
    fn parses_serve_overrides() {
        let args = Args::parse_from(["duet-call", "-v", "serve", "--port", "9000"]);
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Serve { port: Some(9000), .. }));
    }
}
