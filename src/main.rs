use dotenvy::dotenv;
use log::{error, info};
use std::error::Error;

use pow_ledger::config::keypair_from_env;
use pow_ledger::{GenesisConfig, KeyPair, Ledger, LedgerConfig, Transaction};

fn main() {
    let _ = dotenv();
    env_logger::init();

    if let Err(e) = run() {
        error!("demo failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = LedgerConfig::from_env()?;
    let mint = keypair_from_env("MINT_SECRET_KEY")?;
    let holder = keypair_from_env("HOLDER_SECRET_KEY")?;
    let recipient = KeyPair::generate();
    let miner = KeyPair::generate();

    println!(
        "⛓️ Starting ledger (difficulty={}, reward={}, block_time={}ms)",
        config.difficulty, config.reward, config.block_time_ms
    );

    let genesis = GenesisConfig::new(mint.address(), holder.address());
    let mut ledger = Ledger::new(config, genesis)?.with_mint_key(mint)?;

    let mut tx = Transaction::new(holder.address(), recipient.address(), 50, 1);
    tx.sign(&holder)?;
    ledger.add_transaction(tx)?;

    if let Some(block) = ledger.mine_transactions(&miner.address())? {
        info!("mined {} with nonce {}", block.hash, block.nonce);
    }

    let chain = serde_json::to_string_pretty(ledger.chain())?;
    println!("{chain}");
    println!("valid: {}", ledger.is_valid());
    println!("holder balance: {}", ledger.balance(&holder.address()));
    println!("miner balance: {}", ledger.balance(&miner.address()));
    println!("next difficulty: {}", ledger.difficulty());
    Ok(())
}
