use architect_ledger::cli::{Command, NoteArg, Opt};
use architect_ledger::config::{Config, StoreKind};
use architect_ledger::core::{
    Block, BlockObject, Blockchain, Note, Payload, ProofOfWork, Transaction,
};
use architect_ledger::error::Result as LedgerResult;
use architect_ledger::network::{Nodes, PeerClient, Server};
use architect_ledger::storage::{BlockStore, MemoryStore, SledStore};
use architect_ledger::utils::{current_timestamp, from_hex, to_hex};
use architect_ledger::wallet::{WalletFactory, Wallets};
use clap::Parser;
use log::{error, warn, LevelFilter};
use std::env;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;
use zeroize::Zeroizing;

const PASSPHRASE_KEY: &str = "LEDGER_PASSPHRASE";
const OBJECT_VERSION: u32 = 1;

type LedgerChain<S> = Blockchain<S, Box<dyn ProofOfWork>>;

fn main() {
    let opt = Opt::parse();

    // RUST_LOG wins over the configured level
    let config = Config::load(opt.config.as_deref());
    let level = config
        .as_ref()
        .ok()
        .and_then(|c| c.log_level_filter().ok())
        .unwrap_or(LevelFilter::Info);
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = run(config, opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run(config: LedgerResult<Config>, command: Command) -> Result<(), Box<dyn Error>> {
    let config = config?.install()?;
    if command.needs_chain() {
        with_chain(config, command)
    } else {
        run_wallet_command(config, command)
    }
}

fn run_wallet_command(config: &Config, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::CreateWallet { name, random_salt } => {
            let mut wallets = Wallets::load(&config.wallet.file)?;
            let passphrase = read_passphrase()?;
            let factory = if random_salt {
                WalletFactory::random_salt(config.kdf_params())
            } else {
                WalletFactory::fixed_salt(config.kdf_params())
            };
            let mut wallet = factory.create(&passphrase);
            let address = wallet.generate_address()?;
            wallets.add_wallet(&name, &mut wallet)?;
            println!("Created wallet {name}");
            println!("Salt: {}", to_hex(wallet.get_salt()));
            println!("Your new address: {address}");
        }
        Command::NewAddress { name } => {
            let mut wallets = Wallets::load(&config.wallet.file)?;
            let passphrase = read_passphrase()?;
            let mut wallet = wallets.open_wallet(&name, &passphrase)?;
            let address = wallet.generate_address()?;
            wallets.update_wallet(&name, &mut wallet)?;
            println!("Your new address: {address}");
        }
        Command::ListAddresses { name } => {
            let wallets = Wallets::load(&config.wallet.file)?;
            let names = match name {
                Some(name) => vec![name],
                None => wallets.get_names(),
            };
            for name in names {
                let record = wallets.get_record(&name)?;
                println!("{name}:");
                for address in &record.addresses {
                    println!("  {address}");
                }
            }
        }
        other => return Err(format!("{other:?} needs the ledger").into()),
    }
    Ok(())
}

/// Opens the configured store and runs `command` against it
fn with_chain(config: &Config, command: Command) -> Result<(), Box<dyn Error>> {
    let pow = config.proof_of_work()?;
    let genesis = config.genesis_block();
    match config.storage.kind {
        StoreKind::Memory => {
            warn!("Using memory storage; blocks are lost when the process exits");
            run_chain_command(config, Blockchain::new(MemoryStore::new(genesis), pow), command)
        }
        StoreKind::Sled => {
            let store = SledStore::open(config.node_data_dir(), genesis)?;
            run_chain_command(config, Blockchain::new(store, pow), command)
        }
    }
}

fn run_chain_command<S: BlockStore + 'static>(
    config: &Config,
    chain: LedgerChain<S>,
    command: Command,
) -> Result<(), Box<dyn Error>> {
    chain.init()?;
    match command {
        Command::Init => {
            let head = chain.last_block()?;
            println!(
                "Ledger ready with {} blocks, head {}",
                chain.len()?,
                head.get_hash_hex()
            );
        }
        Command::Mine {
            notes,
            reward_to,
            amount,
        } => {
            let objects = block_objects(&config.node_id(), notes, reward_to, amount)?;
            let block = chain.mine_block(objects)?;
            println!(
                "Mined block {} with hash {}",
                block.get_index(),
                block.get_hash_hex()
            );
        }
        Command::PrintChain => {
            for block in chain.blocks()? {
                print_block(&block?);
            }
        }
        Command::VerifyChain => {
            let blocks = chain.blocks()?.collect::<LedgerResult<Vec<Block>>>()?;
            chain.check_chain(&blocks)?;
            println!("Chain is valid ({} blocks)", blocks.len());
        }
        Command::StartNode => {
            let nodes = Arc::new(Nodes::from_addrs(config.peers.clone()));
            let server = Server::new(Arc::new(chain), nodes, &config.node.address);
            server.run()?;
        }
        Command::PushLatest { peer } => {
            let head = chain.last_block()?;
            let peers = match peer {
                Some(peer) => vec![peer],
                None => config.peers.clone(),
            };
            if peers.is_empty() {
                return Err("No peers to announce to".into());
            }
            for peer in peers {
                let report = PeerClient::new(&peer)?.put_latest_block(&config.node.address, &head)?;
                println!("{peer}: {report:?}");
            }
        }
        other => return Err(format!("{other:?} does not use the ledger").into()),
    }
    Ok(())
}

fn block_objects(
    source_id: &str,
    notes: Vec<NoteArg>,
    reward_to: Option<String>,
    amount: u64,
) -> LedgerResult<Vec<BlockObject>> {
    let timestamp = current_timestamp()?;
    let mut objects = Vec::with_capacity(notes.len() + 1);
    if let Some(address) = reward_to {
        let reward = Transaction::new_reward(&from_hex(&address)?, amount);
        objects.push(BlockObject::new(
            source_id,
            OBJECT_VERSION,
            timestamp,
            Payload::from(reward),
        ));
    }
    for note in notes {
        let mut payload = Note::new(&note.title);
        if let Some(body) = &note.body {
            payload = payload.with_body(body);
        }
        objects.push(BlockObject::new(
            source_id,
            OBJECT_VERSION,
            timestamp,
            Payload::from(payload),
        ));
    }
    Ok(objects)
}

fn print_block(block: &Block) {
    println!("Block #{}", block.get_index());
    println!("  Hash: {}", block.get_hash_hex());
    println!("  Previous hash: {}", to_hex(block.get_previous_hash()));
    println!("  Timestamp: {}", block.get_timestamp());
    println!("  Nonce: {}", block.get_nonce());
    for object in block.get_objects() {
        println!(
            "  - {} from {} v{} ({})",
            object.get_data().kind_name(),
            object.get_source_id(),
            object.get_version(),
            to_hex(object.get_hash())
        );
        if let Some(tx) = object.get_data().as_transaction() {
            for output in tx.get_outputs() {
                println!(
                    "      {} -> {}",
                    output.get_amount(),
                    to_hex(output.get_address())
                );
            }
        }
    }
    println!();
}

/// Reads the passphrase from `LEDGER_PASSPHRASE` or the first line of stdin
fn read_passphrase() -> LedgerResult<Zeroizing<String>> {
    if let Ok(passphrase) = env::var(PASSPHRASE_KEY) {
        return Ok(Zeroizing::new(passphrase));
    }
    eprint!("Passphrase: ");
    io::stderr().flush()?;
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    Ok(Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string()))
}
