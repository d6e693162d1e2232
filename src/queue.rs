//! Authenticated shared-queue server and client.
//!
//! The server exposes named FIFO queues over TCP with line-delimited JSON
//! frames. Every connection must present the shared secret in a `hello`
//! frame before any queue operation; `put` never blocks, `get` parks the
//! connection's handler task until a message is available. Queues are
//! created on first touch and vanish with the server; there is no
//! persistence.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{Request, Response};
use crate::Error;

fn transport_err(e: LinesCodecError) -> Error {
    match e {
        LinesCodecError::Io(io) => Error::Io(io),
        LinesCodecError::MaxLineLengthExceeded => {
            Error::Protocol("frame exceeds maximum line length".to_string())
        }
    }
}

/// One named FIFO. The semaphore carries exactly one permit per queued
/// item, so a parked `pop` wakes without lost-notification races.
struct Fifo {
    items: Mutex<VecDeque<Value>>,
    ready: Semaphore,
}

impl Fifo {
    fn new() -> Fifo {
        Fifo {
            items: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
        }
    }

    async fn push(&self, value: Value) {
        self.items.lock().await.push_back(value);
        self.ready.add_permits(1);
    }

    async fn pop(&self) -> Option<Value> {
        let permit = self.ready.acquire().await.ok()?;
        permit.forget();
        self.items.lock().await.pop_front()
    }
}

type Registry = Mutex<HashMap<String, Arc<Fifo>>>;

async fn fifo(queues: &Registry, name: &str) -> Arc<Fifo> {
    queues
        .lock()
        .await
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Fifo::new()))
        .clone()
}

/// The coordinator-side queue server.
///
/// Binding starts the accept loop immediately; dropping the server (or
/// calling [`QueueServer::shutdown`]) cancels it along with every client
/// handler.
pub struct QueueServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl QueueServer {
    /// Bind the listener and start serving authenticated clients.
    pub async fn bind<A: ToSocketAddrs>(addr: A, authkey: &str) -> Result<QueueServer, Error> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(Mutex::new(HashMap::new())),
            authkey.to_string(),
            shutdown.clone(),
        ));
        debug!(%local_addr, "queue server listening");
        Ok(QueueServer {
            local_addr,
            shutdown,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and tear down client handlers. Queued messages are
    /// discarded.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for QueueServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    queues: Arc<Registry>,
    authkey: String,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    tokio::spawn(serve_client(
                        stream,
                        queues.clone(),
                        authkey.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    queues: Arc<Registry>,
    authkey: String,
    shutdown: CancellationToken,
) {
    if let Err(e) = client_session(stream, queues, authkey, shutdown).await {
        debug!(error = %e, "client session ended");
    }
}

async fn client_session(
    stream: TcpStream,
    queues: Arc<Registry>,
    authkey: String,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let mut framed = Framed::new(stream, LinesCodec::new());

    // Authentication: the first frame must present the shared secret.
    let Some(frame) = next_frame(&mut framed, &shutdown).await? else {
        return Ok(());
    };
    match serde_json::from_str(&frame)? {
        Request::Hello { key } if key == authkey => {
            send_response(&mut framed, &Response::Ok).await?;
        }
        Request::Hello { .. } => {
            warn!("client presented a mismatched secret");
            send_response(
                &mut framed,
                &Response::Refused {
                    reason: "authentication failed".to_string(),
                },
            )
            .await?;
            return Ok(());
        }
        _ => {
            send_response(
                &mut framed,
                &Response::Refused {
                    reason: "hello required before queue operations".to_string(),
                },
            )
            .await?;
            return Ok(());
        }
    }

    loop {
        let Some(frame) = next_frame(&mut framed, &shutdown).await? else {
            return Ok(());
        };
        let request: Request = match serde_json::from_str(&frame) {
            Ok(request) => request,
            Err(e) => {
                send_response(
                    &mut framed,
                    &Response::Refused {
                        reason: format!("malformed request: {e}"),
                    },
                )
                .await?;
                continue;
            }
        };
        match request {
            Request::Put { queue, message } => {
                fifo(&queues, &queue).await.push(message).await;
                send_response(&mut framed, &Response::Ok).await?;
            }
            Request::Get { queue } => {
                let fifo = fifo(&queues, &queue).await;
                let message = tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    message = fifo.pop() => message,
                };
                let Some(message) = message else {
                    return Ok(());
                };
                send_response(&mut framed, &Response::Message { message }).await?;
            }
            Request::Hello { .. } => {
                send_response(
                    &mut framed,
                    &Response::Refused {
                        reason: "already authenticated".to_string(),
                    },
                )
                .await?;
            }
        }
    }
}

async fn next_frame(
    framed: &mut Framed<TcpStream, LinesCodec>,
    shutdown: &CancellationToken,
) -> Result<Option<String>, Error> {
    let frame = tokio::select! {
        _ = shutdown.cancelled() => return Ok(None),
        frame = framed.next() => frame,
    };
    match frame {
        Some(frame) => Ok(Some(frame.map_err(transport_err)?)),
        None => Ok(None),
    }
}

async fn send_response(
    framed: &mut Framed<TcpStream, LinesCodec>,
    response: &Response,
) -> Result<(), Error> {
    framed
        .send(serde_json::to_string(response)?)
        .await
        .map_err(transport_err)
}

/// A client connection to the queue server, authenticated at construction.
///
/// Requests on one client are strictly sequential; a parked `get` must be
/// answered (or the connection dropped) before the next request.
pub struct QueueClient {
    framed: Framed<TcpStream, LinesCodec>,
}

impl QueueClient {
    /// Connect and authenticate with the shared secret.
    pub async fn connect<A: ToSocketAddrs>(addr: A, authkey: &str) -> Result<QueueClient, Error> {
        let stream = TcpStream::connect(addr).await?;
        let mut framed = Framed::new(stream, LinesCodec::new());
        framed
            .send(serde_json::to_string(&Request::Hello {
                key: authkey.to_string(),
            })?)
            .await
            .map_err(transport_err)?;
        match read_response(&mut framed).await? {
            Response::Ok => Ok(QueueClient { framed }),
            Response::Refused { reason } => Err(Error::Auth(reason)),
            Response::Message { .. } => Err(Error::Protocol(
                "unexpected message before authentication".to_string(),
            )),
        }
    }

    /// Append a message to a named queue. Never blocks on queue capacity.
    pub async fn put<T: Serialize>(&mut self, queue: &str, message: &T) -> Result<(), Error> {
        let request = Request::Put {
            queue: queue.to_string(),
            message: serde_json::to_value(message)?,
        };
        self.send(&request).await?;
        match read_response(&mut self.framed).await? {
            Response::Ok => Ok(()),
            Response::Refused { reason } => Err(Error::Protocol(reason)),
            Response::Message { .. } => {
                Err(Error::Protocol("unexpected message in reply to put".to_string()))
            }
        }
    }

    /// Pop the next message from a named queue, waiting for one to arrive.
    pub async fn get<T: DeserializeOwned>(&mut self, queue: &str) -> Result<T, Error> {
        self.send(&Request::Get {
            queue: queue.to_string(),
        })
        .await?;
        match read_response(&mut self.framed).await? {
            Response::Message { message } => Ok(serde_json::from_value(message)?),
            Response::Refused { reason } => Err(Error::Protocol(reason)),
            Response::Ok => Err(Error::Protocol("empty reply to get".to_string())),
        }
    }

    async fn send(&mut self, request: &Request) -> Result<(), Error> {
        self.framed
            .send(serde_json::to_string(request)?)
            .await
            .map_err(transport_err)
    }
}

async fn read_response(
    framed: &mut Framed<TcpStream, LinesCodec>,
) -> Result<Response, Error> {
    let frame = framed
        .next()
        .await
        .ok_or_else(|| Error::Protocol("connection closed by server".to_string()))?
        .map_err(transport_err)?;
    Ok(serde_json::from_str(&frame)?)
}
