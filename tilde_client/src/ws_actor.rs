use crossbeam_channel::Sender;
use futures_util::{SinkExt, StreamExt};
use tilde_session::{Transport, TransportError, TransportEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

pub const COMMAND_CAP: usize = 256;

#[derive(Debug)]
pub enum LinkCommand {
    Connect,
    Send(String),
    Shutdown,
}

/// [`Transport`] handle onto the socket task. Never blocks the session core.
#[derive(Clone)]
pub struct ActorTransport {
    tx: mpsc::Sender<LinkCommand>,
}

impl ActorTransport {
    pub fn new(tx: mpsc::Sender<LinkCommand>) -> Self {
        Self { tx }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.try_send(LinkCommand::Shutdown);
    }
}

impl Transport for ActorTransport {
    fn connect(&mut self) {
        if let Err(e) = self.tx.try_send(LinkCommand::Connect) {
            warn!(error = %e, "connect request not delivered to socket task");
        }
    }

    fn send(&mut self, wire: String) -> Result<(), TransportError> {
        self.tx.try_send(LinkCommand::Send(wire)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }
}

/// Socket task: one connection attempt per `Connect`, outcome reported as
/// events. Retrying is up to the session core.
pub async fn run(url: Url, mut rx: mpsc::Receiver<LinkCommand>, events: Sender<TransportEvent>) {
    loop {
        match rx.recv().await {
            Some(LinkCommand::Connect) => {}
            Some(LinkCommand::Send(_)) => {
                warn!("dropping frame, not connected");
                continue;
            }
            Some(LinkCommand::Shutdown) | None => return,
        }

        debug!(%url, "connecting");
        let mut socket = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                warn!(error = %e, "connect failed");
                let _ = events.send(TransportEvent::Closed);
                continue;
            }
        };
        info!(%url, "socket open");
        let _ = events.send(TransportEvent::Opened);

        let mut shutdown = false;
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(LinkCommand::Send(wire)) => {
                            if let Err(e) = socket.send(Message::Text(wire.into())).await {
                                warn!(error = %e, "send failed");
                                break;
                            }
                        }
                        Some(LinkCommand::Connect) => {}
                        Some(LinkCommand::Shutdown) | None => {
                            let _ = socket.close(None).await;
                            shutdown = true;
                            break;
                        }
                    }
                }
                incoming = socket.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let _ = events.send(TransportEvent::Message(text.as_str().to_string()));
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "read failed");
                            break;
                        }
                    }
                }
            }
        }

        info!("socket closed");
        let _ = events.send(TransportEvent::Closed);
        if shutdown {
            return;
        }
    }
}
