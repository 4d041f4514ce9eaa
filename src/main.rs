mod endpoint;
mod globus;
mod login;
mod logs;
mod misc;
mod request;
mod sync;
mod token;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sync::main(sync::Args::parse()).await
}
