use crate::cli::Args;
use crate::commands::{Command, Flow, HELP};
use crate::console::ConsoleRenderer;
use crate::ws_actor::{self, ActorTransport, LinkCommand, COMMAND_CAP};
use crossbeam_channel::unbounded;
use std::io::Stdout;
use std::time::{Duration, Instant};
use tilde_session::{FileSettingsStore, SessionConfig, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const TICK: Duration = Duration::from_millis(33);

type Controller = SessionController<ActorTransport, ConsoleRenderer<Stdout>, FileSettingsStore>;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let url = args.endpoint()?;
    let (cmd_tx, cmd_rx) = mpsc::channel::<LinkCommand>(COMMAND_CAP);
    let (event_tx, event_rx) = unbounded();
    let socket_task = tokio::spawn(ws_actor::run(url.clone(), cmd_rx, event_tx));

    let transport = ActorTransport::new(cmd_tx);
    let renderer = ConsoleRenderer::new(std::io::stdout(), args.debug);
    let store = FileSettingsStore::new(&args.settings);
    let mut ctl: Controller = SessionController::new(
        SessionConfig::default(),
        transport.clone(),
        renderer,
        store,
        event_rx,
    )?;
    info!(%url, settings = %args.settings.display(), "starting session");

    if let Some(fragment) = args.fragment.as_deref() {
        ctl.navigate(fragment);
    }
    if let Some(width) = args.width {
        ctl.apply_viewport_width(width);
    }
    ctl.start();

    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(TICK);
    let mut reload_at: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                ctl.tick(now);
                if let Some(after) = ctl.renderer_mut().take_reload() {
                    reload_at = Some(now + after);
                }
                if reload_at.is_some_and(|at| now >= at) {
                    reload_at = None;
                    debug!("reloading after core restart");
                    ctl.reconnect();
                }
            }
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(cmd) => match cmd.apply(&mut ctl) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Help) => println!("{HELP}"),
                        Ok(Flow::Quit) => break,
                        Err(e) => debug!(error = %e, "command failed"),
                    },
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    transport.shutdown();
    if let Err(e) = socket_task.await {
        warn!(error = %e, "socket task ended abnormally");
    }
    Ok(())
}
