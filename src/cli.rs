use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dogeads")]
#[command(author, version, about = "Telegram bot paying DOGE for ad views, with hot-wallet withdrawals", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot together with the HTTP API
    Run {
        /// Use webhook mode instead of long polling
        #[arg(long)]
        webhook: bool,
    },

    /// Run only the HTTP API (withdraw, health, metrics)
    Serve {
        /// Port to listen on; defaults to PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Withdraw DOGE for a user from the command line
    Withdraw {
        /// Telegram ID of the ledger user
        #[arg(short, long)]
        user: i64,

        /// Destination DOGE address
        #[arg(short, long)]
        address: String,

        /// Amount in DOGE, e.g. 12.5
        #[arg(long)]
        amount: String,

        /// Idempotency key; reuse it to safely retry the same withdrawal
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Credit a ledger account (use the house ID to fund the hot wallet mirror)
    Credit {
        #[arg(short, long)]
        user: i64,

        #[arg(long)]
        amount: String,
    },

    /// List withdrawals waiting for an operator
    Pending,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
