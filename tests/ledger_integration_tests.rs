//! Ledger integration tests
//!
//! Exercises the chain across stores, peers and wallets the way a running
//! node uses them.

use architect_ledger::core::{
    Block, BlockCodec, BlockObject, Blockchain, DifficultySchedule, Note, NullProofOfWork,
    Payload, ProofOfWork, ScheduledProofOfWork, Transaction, TransactionType,
};
use architect_ledger::error::{BlockValidationError, BlockchainError, ChainValidationError, Result};
use architect_ledger::network::{BlockSource, Nodes, PeerClient, PeerSync, Server, SyncOutcome};
use architect_ledger::storage::{BlockStore, MemoryStore, SledStore};
use architect_ledger::wallet::{KdfParams, WalletFactory, Wallets};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

const GENESIS_TS: i64 = 1_704_067_200_000;

fn memory_chain() -> Blockchain<MemoryStore, NullProofOfWork> {
    let chain = Blockchain::new(MemoryStore::new(Block::genesis(GENESIS_TS)), NullProofOfWork);
    chain.init().unwrap();
    chain
}

fn note(title: &str) -> BlockObject {
    BlockObject::new("node-a", 1, 10, Payload::from(Note::new(title)))
}

struct FixedSource(Vec<Block>);

impl BlockSource for FixedSource {
    fn fetch_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "fixed".to_string()
    }
}

#[test]
fn test_genesis_is_identical_across_nodes() {
    let dir = tempdir().unwrap();
    let a = memory_chain();
    let b = Blockchain::new(
        SledStore::open(dir.path().join("b"), Block::genesis(GENESIS_TS)).unwrap(),
        NullProofOfWork,
    );
    b.init().unwrap();

    assert_eq!(a.last_block().unwrap().get_hash(), b.last_block().unwrap().get_hash());
    assert_ne!(
        Block::genesis(GENESIS_TS).get_hash(),
        Block::genesis(GENESIS_TS + 1).get_hash()
    );
}

#[test]
fn test_check_chain_reports_the_failing_pair() {
    let chain = memory_chain();
    let genesis = chain.last_block().unwrap();
    let second = Block::new(2, genesis.get_hash().to_vec(), 20, vec![note("a")]);
    let third = Block::new(3, vec![7; 32], 30, vec![note("b")]);

    let err = chain
        .check_chain(&[genesis.clone(), second.clone(), third])
        .unwrap_err();
    match err {
        BlockchainError::ChainValidation(ChainValidationError::InvalidPair { index, .. }) => {
            assert_eq!(index, 2)
        }
        other => panic!("unexpected error {other:?}"),
    }

    let third = Block::new(3, second.get_hash().to_vec(), 30, vec![note("b")]);
    assert!(chain.check_chain(&[genesis, second, third]).is_ok());
}

#[test]
fn test_replace_chain_takes_only_longer_chains() {
    let local = memory_chain();
    let remote = memory_chain();
    local.mine_block(vec![note("local")]).unwrap();

    let remote_blocks = |chain: &Blockchain<MemoryStore, NullProofOfWork>| {
        chain
            .blocks()
            .unwrap()
            .collect::<Result<Vec<Block>>>()
            .unwrap()
    };

    // Same length: rejected
    remote.mine_block(vec![]).unwrap();
    let err = local.replace_chain(&remote_blocks(&remote)).unwrap_err();
    assert!(matches!(
        err,
        BlockchainError::ChainValidation(ChainValidationError::ChainNotLonger { .. })
    ));

    // Longer and extending our head: taken
    let follower = memory_chain();
    let appended = follower.replace_chain(&remote_blocks(&remote)).unwrap();
    assert_eq!(appended, 1);
    assert_eq!(follower.last_block().unwrap(), remote.last_block().unwrap());
}

#[test]
fn test_peer_sync_outcomes() {
    let leader = memory_chain();
    let follower = memory_chain();
    let sync = PeerSync::new(&follower);

    let second = leader.mine_block(vec![note("one")]).unwrap();
    assert_eq!(
        sync.reconcile(second.clone()).unwrap(),
        SyncOutcome::Accepted(second.clone())
    );
    assert_eq!(sync.reconcile(second).unwrap(), SyncOutcome::Rejected);

    leader.mine_block(vec![note("two")]).unwrap();
    let fourth = leader.mine_block(vec![note("three")]).unwrap();
    assert_eq!(sync.reconcile(fourth.clone()).unwrap(), SyncOutcome::Ambiguous);

    let blocks = leader.blocks().unwrap().collect::<Result<Vec<Block>>>().unwrap();
    assert_eq!(sync.resolve_ambiguous(&FixedSource(blocks)).unwrap(), 2);
    assert_eq!(follower.last_block().unwrap(), fourth);
}

#[test]
fn test_follower_catches_up_over_tcp() {
    let leader = Arc::new(memory_chain());
    for title in ["a", "b", "c"] {
        leader.mine_block(vec![note(title)]).unwrap();
    }
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = Server::new(Arc::clone(&leader), Arc::new(Nodes::new()), &addr);
    thread::spawn(move || server.serve(listener));

    let follower = memory_chain();
    let client = PeerClient::new(&addr).unwrap();
    let sync = PeerSync::new(&follower);
    assert_eq!(
        sync.reconcile(client.get_latest_block().unwrap()).unwrap(),
        SyncOutcome::Ambiguous
    );
    assert_eq!(sync.resolve_ambiguous(&client).unwrap(), 3);
    assert_eq!(follower.len().unwrap(), 4);
    assert_eq!(follower.last_block().unwrap(), leader.last_block().unwrap());
}

#[test]
fn test_sled_chain_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    let pow = ScheduledProofOfWork::new(DifficultySchedule::constant(4).unwrap());

    let head = {
        let chain = Blockchain::new(
            SledStore::open(&path, Block::genesis(GENESIS_TS)).unwrap(),
            pow.clone(),
        );
        chain.init().unwrap();
        chain.mine_block(vec![note("first")]).unwrap();
        let head = chain.mine_block(vec![note("second")]).unwrap();
        assert!(chain.get_proof_of_work().is_satisfied(&head));
        head
    };

    let store = SledStore::open(&path, Block::genesis(GENESIS_TS)).unwrap();
    assert_eq!(store.len().unwrap(), 3);
    assert_eq!(store.get_by_hash(head.get_hash()).unwrap(), Some(head.clone()));

    let chain = Blockchain::new(store, pow);
    chain.init().unwrap();
    let blocks = chain.blocks().unwrap().collect::<Result<Vec<Block>>>().unwrap();
    assert!(chain.check_chain(&blocks).is_ok());
    assert_eq!(chain.last_block().unwrap(), head);
}

#[test]
fn test_codec_keeps_block_hash() {
    let mut tx = Transaction::new_reward(&[1, 2, 3], 50);
    tx.add_output(5, &[4, 5, 6]);
    let objects = vec![
        BlockObject::new("node-a", 1, 10, Payload::from(tx)),
        BlockObject::new(
            "node-a",
            2,
            11,
            Payload::from(Note::new("memo").with_body("text").with_weight(0.5)),
        ),
    ];
    let block = Block::new(2, Block::genesis(GENESIS_TS).get_hash().to_vec(), 12, objects);

    let codec = BlockCodec::default();
    let decoded = codec
        .deserialize_block(&codec.serialize_block(&block).unwrap())
        .unwrap();
    assert_eq!(decoded, block);
    assert_eq!(decoded.compute_hash().to_vec(), block.get_hash().to_vec());
}

#[test]
fn test_fixed_salt_wallets_are_reproducible() {
    let fixed = WalletFactory::fixed_salt(KdfParams::light());
    let mut first = fixed.create("correct horse");
    let mut second = fixed.create("correct horse");
    assert_eq!(
        first.generate_address().unwrap(),
        second.generate_address().unwrap()
    );

    let random = WalletFactory::random_salt(KdfParams::light());
    let mut third = random.create("correct horse");
    assert_ne!(
        first.get_addresses()[0],
        third.generate_address().unwrap()
    );
}

#[test]
fn test_wallet_file_restores_addresses() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.dat");
    let factory = WalletFactory::fixed_salt(KdfParams::light());

    let mut wallet = factory.create("pass");
    wallet.generate_address().unwrap();
    wallet.generate_address().unwrap();
    let mut wallets = Wallets::load(&path).unwrap();
    wallets.add_wallet("main", &mut wallet).unwrap();

    let reloaded = Wallets::load(&path).unwrap();
    let restored = reloaded.open_wallet("main", "pass").unwrap();
    assert_eq!(restored.get_addresses(), wallet.get_addresses());
    assert!(reloaded.open_wallet("main", "wrong").is_err());
}

#[test]
fn test_transfer_signed_by_wallet_key_verifies() {
    let mut wallet = WalletFactory::fixed_salt(KdfParams::light()).create("pass");
    wallet.generate_address().unwrap();
    let key = wallet.get_key_chain().last().unwrap();

    let mut tx = Transaction::new(TransactionType::Regular);
    tx.add_input("prev", 0, 50, key.get_public_key())
        .add_output(50, &[9; 32]);
    assert_eq!(tx.sign_inputs(key).unwrap(), 1);
    assert!(tx.verify_signatures());
}

#[test]
fn test_decoded_block_with_tampered_object_hash_is_refused() {
    let chain = memory_chain();
    let genesis = chain.last_block().unwrap();
    let object = note("wire");
    let block = Block::new(2, genesis.get_hash().to_vec(), 20, vec![object.clone()]);

    let codec = BlockCodec::default();
    let mut bytes = codec.serialize_block(&block).unwrap();
    let at = bytes
        .windows(object.get_hash().len())
        .position(|w| w == object.get_hash())
        .unwrap();
    for byte in &mut bytes[at..at + object.get_hash().len()] {
        *byte ^= 0xff;
    }
    let tampered = codec.deserialize_block(&bytes).unwrap();
    assert_eq!(tampered.get_hash(), block.get_hash());

    assert!(matches!(
        chain.add_block(tampered),
        Err(BlockchainError::BlockValidation(
            BlockValidationError::ObjectHashMismatch { position: 0, .. }
        ))
    ));
    assert_eq!(chain.len().unwrap(), 1);
}
