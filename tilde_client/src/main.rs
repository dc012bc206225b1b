use clap::Parser;
use tilde_client::{app, cli::Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    app::init_tracing();
    app::run(args).await
}
