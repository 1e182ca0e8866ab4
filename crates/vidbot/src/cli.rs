use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vidbot")]
#[command(author, version, about = "Telegram bot that downloads media and delivers files of any size", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (the default when no command is given)
    Run {
        /// Receive updates through a webhook instead of long polling
        #[arg(long)]
        webhook: bool,
    },

    /// Create the database tables and exit
    Migrate,

    /// Print what yt-dlp knows about a URL without downloading it
    Probe {
        url: String,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["vidbot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_webhook_flag() {
        let cli = Cli::try_parse_from(["vidbot", "run", "--webhook"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run { webhook: true })));
    }

    #[test]
    fn test_probe_args() {
        let cli = Cli::try_parse_from(["vidbot", "probe", "https://vimeo.com/1", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Probe { url, json }) => {
                assert_eq!(url, "https://vimeo.com/1");
                assert!(json);
            }
            _ => panic!("expected probe"),
        }
    }
}
