use clap::Parser;
use tilde_client::{app, Fixture, MockServer};

#[derive(Parser, Debug)]
#[command(name = "mock_server", about = "Canned Tilde program core for local testing")]
struct Args {
    #[arg(long, env = "TILDE_MOCK_ADDR", default_value = "127.0.0.1:8070")]
    addr: String,

    /// Databases announced on login, the first one active.
    #[arg(long = "db", value_name = "NAME")]
    dbs: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    app::init_tracing();

    let mut fixture = Fixture::default();
    if !args.dbs.is_empty() {
        fixture.dbs = args.dbs;
    }
    let server = MockServer::spawn_with_addr(&args.addr, fixture)
        .map_err(|e| anyhow::anyhow!("mock server bind failed on {}: {e}", args.addr))?;
    println!("mock server on ws://{}", server.listen_addr());

    loop {
        std::thread::park();
    }
}
