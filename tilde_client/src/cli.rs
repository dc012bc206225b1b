use clap::Parser;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "tilde", about = "Terminal client for a Tilde materials repository")]
pub struct Args {
    /// WebSocket endpoint of the program core.
    #[arg(long, env = "TILDE_URL", default_value = "ws://127.0.0.1:8070/duplex")]
    pub url: String,

    /// Key-value file holding the persisted client settings.
    #[arg(long, env = "TILDE_SETTINGS", value_name = "PATH", default_value = "tilde_client.json")]
    pub settings: PathBuf,

    /// Location fragment to open first (e.g. `mydb/browse`).
    #[arg(long)]
    pub fragment: Option<String>,

    /// Terminal width in pixels, used to cap table columns.
    #[arg(long)]
    pub width: Option<u32>,

    /// Mirror protocol traffic on the console.
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl Args {
    pub fn endpoint(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| anyhow::anyhow!("invalid --url {}: {e}", self.url))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(anyhow::anyhow!("--url must use ws:// or wss://, got {other}://")),
        }
    }
}
