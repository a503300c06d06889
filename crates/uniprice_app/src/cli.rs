use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use uniprice_core::config::DEFAULT_NETWORK;

pub const FETCHER_CONTRACT: &str = "FetchPriceUniswapV2";
pub const TOKEN_CONTRACT: &str = "Token20";

#[derive(Parser, Debug)]
#[command(
    name = "uniprice",
    version,
    about = "Deploy and verify the Uniswap V2 price fetcher contracts"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Project config file [default: ./uniprice.toml]")]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "UNIPRICE_NETWORK",
        default_value = DEFAULT_NETWORK,
        help = "Network to run against"
    )]
    pub network: String,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "More log output (-v, -vv)")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the FetchPriceUniswapV2 contract.
    DeployFetcher,
    /// Deploy the Token20 mock ERC-20.
    DeployToken {
        #[arg(long, default_value_t = 18)]
        decimals: u8,
        #[arg(long, default_value = "DAI")]
        name: String,
        #[arg(long, default_value = "DAI")]
        symbol: String,
    },
    /// Submit a deployed contract's source to the block explorer.
    Verify {
        /// Contract name, or `path/File.sol:Name` [default: the configured target].
        contract: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Constructor arguments, in ABI order.
        #[arg(long = "arg", value_name = "VALUE")]
        args: Vec<String>,
    },
    /// List the network's signers and their balances.
    Accounts,
    /// List deployments recorded for the network.
    Deployments,
    /// Write the default config file.
    Init,
    /// Development node helpers.
    Dev {
        #[command(subcommand)]
        command: DevCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum DevCommands {
    /// Advance the node clock and mine a block.
    IncreaseTime { seconds: u64 },
    /// Mine empty blocks.
    Mine {
        #[arg(default_value_t = 1)]
        blocks: u64,
    },
}
