//! WebSocket listener.
//!
//! Every accepted connection is attached to the relay under a fresh
//! [`ClientId`]. Outbound frames come from the relay's per-client queue;
//! inbound text frames are parsed as [`WsBrowserRequest`]s. A connection
//! that drops is detached and the listener keeps accepting until the
//! session's shutdown token fires.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::relay::{ClientId, Outbound, RelayHandle};
use crate::state::WsBrowserRequest;

/// How long connections get to flush their close frames on shutdown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind the listener. Port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is unavailable.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        match TcpListener::bind(&addr).await {
            Ok(listener) => Ok(Self { listener }),
            Err(source) => Err(Error::Bind { addr, source }),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires, then give open
    /// connections a moment to deliver their final frames.
    ///
    /// # Errors
    ///
    /// Accept failures are logged, not returned; this only fails if the
    /// listener itself is unusable.
    pub async fn run(self, relay: RelayHandle, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "listening");

        let mut connections = JoinSet::new();
        let mut next_id: ClientId = 0;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let id = next_id;
                        tracing::debug!(client = id, %peer, "connection accepted");
                        connections.spawn(serve(stream, id, relay.clone()));
                    }
                    Err(err) => tracing::warn!(%err, "accept failed"),
                },
            }
        }

        drop(self.listener);
        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!(open = connections.len(), "aborting slow connections");
            connections.abort_all();
        }
        Ok(())
    }
}

async fn serve(stream: TcpStream, id: ClientId, relay: RelayHandle) {
    if let Err(err) = connection(stream, id, &relay).await {
        tracing::debug!(client = id, %err, "connection ended with error");
    }
    relay.detach(id);
}

async fn connection(stream: TcpStream, id: ClientId, relay: &RelayHandle) -> Result<()> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let Some(mut outbox) = relay.attach(id) else {
        tracing::debug!(client = id, "session already over");
        return Ok(());
    };
    let (mut sink, mut incoming) = socket.split();

    let writer = async {
        while let Some(frame) = outbox.recv().await {
            match frame {
                Outbound::Text(text) => sink.send(Message::text(text.to_string())).await?,
                Outbound::Close => {
                    sink.send(Message::Close(None)).await?;
                    break;
                }
            }
        }
        Ok::<_, Error>(())
    };

    let reader = async {
        while let Some(message) = incoming.next().await {
            match message? {
                Message::Text(text) => {
                    match serde_json::from_str::<WsBrowserRequest>(text.as_str()) {
                        Ok(request) => {
                            relay.request(id, request);
                        }
                        Err(err) => tracing::warn!(client = id, %err, "ignoring malformed request"),
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok::<_, Error>(())
    };

    tokio::select! {
        result = writer => result,
        result = reader => result,
    }
}
