use anyhow::Result;
use clap::Parser as _;

use args::{Args, Command};
use page::FeedSource;

mod agent;
mod args;
mod backoff;
mod bridge;
mod ipc;
mod page;
mod presence;
mod rpc;
mod snapshot;
mod utils;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.init_tracing_subscriber()?;

    match args.command {
        Command::Bridge(bridge) => bridge::run_bridge(bridge.into_config()?).await,
        Command::Agent(agent) => {
            let page = FeedSource::spawn(tokio::io::stdin());
            agent::run_agent(page, agent.into_config(), utils::interrupted()).await
        }
    }
}
