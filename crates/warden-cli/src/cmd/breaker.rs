use clap::Subcommand;
use std::path::Path;
use warden_core::config::Config;
use warden_core::state::Section;
use warden_core::store::StateStore;

#[derive(Subcommand)]
pub enum BreakerSubcommand {
    /// Clear the tripped breaker and its failure counters
    Reset {
        /// Also clear the enforcement log and halt latch
        #[arg(long)]
        all: bool,
    },
}

pub fn run(root: &Path, subcommand: BreakerSubcommand) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    let store = StateStore::open(root, &config)?;

    match subcommand {
        BreakerSubcommand::Reset { all } => {
            store.reset(Section::Breaker)?;
            if all {
                store.reset(Section::Enforcement)?;
                println!("Circuit breaker and enforcement log reset.");
            } else {
                println!("Circuit breaker reset.");
            }
        }
    }
    Ok(())
}
