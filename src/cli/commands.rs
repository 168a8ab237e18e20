use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// A note object given on the command line as `TITLE` or `TITLE:BODY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteArg {
    pub title: String,
    pub body: Option<String>,
}

impl FromStr for NoteArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (title, body) = match s.split_once(':') {
            Some((title, body)) => (title.trim(), Some(body.trim().to_string())),
            None => (s.trim(), None),
        };
        if title.is_empty() {
            return Err(format!(
                "Invalid note: {s}. Use 'TITLE' or 'TITLE:BODY'"
            ));
        }
        Ok(NoteArg {
            title: title.to_string(),
            body,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "architect-ledger", about = "A pluggable proof-of-work ledger node")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "init", about = "Create the ledger and its genesis block")]
    Init,
    #[command(name = "mine", about = "Mine a block on top of the local head")]
    Mine {
        #[arg(long = "note", help = "Note object to include, as TITLE or TITLE:BODY")]
        notes: Vec<NoteArg>,
        #[arg(long = "reward-to", help = "Wallet address receiving a reward transaction")]
        reward_to: Option<String>,
        #[arg(long = "amount", default_value_t = 50, help = "Reward amount")]
        amount: u64,
    },
    #[command(name = "print-chain", about = "Print all blocks in the ledger")]
    PrintChain,
    #[command(name = "verify-chain", about = "Re-validate every block in the ledger")]
    VerifyChain,
    #[command(name = "start-node", about = "Start a ledger node")]
    StartNode,
    #[command(name = "push-latest", about = "Announce the local head to peers")]
    PushLatest {
        #[arg(help = "Peer address; every configured peer when omitted")]
        peer: Option<String>,
    },
    #[command(name = "create-wallet", about = "Create a new wallet")]
    CreateWallet {
        #[arg(help = "Wallet name")]
        name: String,
        #[arg(long = "random-salt", help = "Use a fresh random salt instead of the fixed one")]
        random_salt: bool,
    },
    #[command(name = "new-address", about = "Derive the next address of a wallet")]
    NewAddress {
        #[arg(help = "Wallet name")]
        name: String,
    },
    #[command(name = "list-addresses", about = "Print wallet addresses")]
    ListAddresses {
        #[arg(help = "Wallet name; every wallet when omitted")]
        name: Option<String>,
    },
}

impl Command {
    /// Whether the command operates on the local ledger
    pub fn needs_chain(&self) -> bool {
        !matches!(
            self,
            Command::CreateWallet { .. }
                | Command::NewAddress { .. }
                | Command::ListAddresses { .. }
        )
    }
}
