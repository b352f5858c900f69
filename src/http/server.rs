//! Connection-per-task HTTP/1.1 server.
//!
//! # Responsibilities
//! - Bind the listener and run the accept loop
//! - Spawn one task per connection
//! - Read one request, run the handler, write one response, close
//! - Emit the access line and request metrics for every connection
//!
//! # Design Decisions
//! - Exactly one request per connection; every response says
//!   `Connection: close`
//! - Parse failures get the literal 400 response and never reach the
//!   handler
//! - Handlers are synchronous; they fill in a `ResponseWriter` and the
//!   connection task serializes it afterwards
//! - `close()` only stops the accept loop; connections already accepted
//!   run to completion

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{validate_config, ServerConfig};
use crate::http::error::{RequestError, ServerError, WriteError};
use crate::http::request::{read_request, Request};
use crate::http::response::{ResponseWriter, BAD_REQUEST_RESPONSE};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::{metrics, AccessRecord};
use crate::security::limits::Limits;

/// Produces the response for one parsed request.
///
/// The writer arrives preloaded with status 200, no extra headers and an
/// empty body.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: &Request, writer: &mut ResponseWriter<'_>);
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut ResponseWriter<'_>) + Send + Sync + 'static,
{
    fn handle(&self, request: &Request, writer: &mut ResponseWriter<'_>) {
        self(request, writer)
    }
}

/// Per-connection settings, copied into every connection task.
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    limits: Limits,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

/// A bound server that has not started accepting yet.
pub struct Server<H> {
    listener: Listener,
    handler: Arc<H>,
    settings: ConnectionSettings,
}

impl<H: Handler> Server<H> {
    /// Validate `config` and bind its listener.
    pub async fn bind(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        validate_config(&config).map_err(|errors| {
            ServerError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })?;

        let listener = Listener::bind(&config.listener).await?;

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            settings: ConnectionSettings {
                limits: config.limits,
                read_timeout: config.timeouts.read(),
                write_timeout: config.timeouts.write(),
            },
        })
    }

    /// Bind and start accepting in the background.
    pub async fn serve(config: ServerConfig, handler: H) -> Result<ServerHandle, ServerError> {
        let server = Self::bind(config, handler).await?;
        server.start()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Bind(ListenerError::Bind(e)))
    }

    /// Spawn the accept loop.
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        let local_addr = self.local_addr()?;
        let shutdown = Shutdown::new();
        let closed = Arc::new(AtomicBool::new(false));
        let tracker = ConnectionTracker::new();

        let accept_loop = AcceptLoop {
            listener: self.listener,
            handler: self.handler,
            settings: self.settings,
            tracker: tracker.clone(),
            closed: Arc::clone(&closed),
        };
        let task = tokio::spawn(accept_loop.run(shutdown.subscribe()));

        tracing::info!(address = %local_addr, "HTTP server started");

        Ok(ServerHandle {
            local_addr,
            closed,
            shutdown,
            tracker,
            task,
        })
    }
}

/// Control handle for a running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    closed: Arc<AtomicBool>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(address = %self.local_addr, "HTTP server closing");
        self.shutdown.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of connections still being served.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Wait for the accept loop to stop and in-flight connections to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Accept loop terminated abnormally");
        }
        self.tracker.wait_for_idle().await;
        tracing::info!(address = %self.local_addr, "HTTP server stopped");
    }
}

struct AcceptLoop<H> {
    listener: Listener,
    handler: Arc<H>,
    settings: ConnectionSettings,
    tracker: ConnectionTracker,
    closed: Arc<AtomicBool>,
}

impl<H: Handler> AcceptLoop<H> {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let span = tracing::info_span!(
                            "connection",
                            connection_id = %guard.id(),
                            request_id = %Uuid::new_v4(),
                            peer = %peer,
                        );
                        let handler = Arc::clone(&self.handler);
                        let settings = self.settings;

                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                let _guard = guard;
                                serve_connection(stream, peer, handler.as_ref(), settings).await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        if self.closed.load(Ordering::SeqCst) {
                            break;
                        }
                        accept_failed(&e).await;
                    }
                }
            }
        }
        tracing::debug!("Accept loop stopped");
    }
}

/// Pause before retrying after an accept error such as EMFILE.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(25);

async fn accept_failed(error: &ListenerError) {
    tracing::warn!(error = %error, "Accept failed");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

/// Await `fut`, giving up with `on_timeout` once `deadline` elapses.
async fn within<F, T, E>(deadline: Option<Duration>, fut: F, on_timeout: E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, fut)
            .await
            .unwrap_or(Err(on_timeout)),
        None => fut.await,
    }
}

async fn serve_connection<H: Handler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: &H,
    settings: ConnectionSettings,
) {
    let start = Instant::now();
    let remote_host = peer.ip();

    let request = match within(
        settings.read_timeout,
        read_request(&mut stream, &settings.limits),
        RequestError::Timeout,
    )
    .await
    {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, kind = %err.kind(), "Rejecting request");
            let written = within(
                settings.write_timeout,
                async {
                    stream.write_all(BAD_REQUEST_RESPONSE).await?;
                    stream.flush().await?;
                    Ok::<(), WriteError>(())
                },
                WriteError::Timeout,
            )
            .await;
            if let Err(e) = written {
                tracing::debug!(error = %e, "Failed to send 400 response");
            }

            AccessRecord::rejected(remote_host, start.elapsed(), &err).emit();
            metrics::record_request("-", 400, start);
            let _ = stream.shutdown().await;
            return;
        }
    };

    let (status, written) = {
        let mut writer =
            ResponseWriter::new(&mut stream).with_chunk_size(settings.limits.chunk_size);
        handler.handle(&request, &mut writer);
        let status = writer.status().as_u16();
        let written = within(
            settings.write_timeout,
            writer.write_response(),
            WriteError::Timeout,
        )
        .await;
        (status, written)
    };

    let record = match written {
        Ok(()) => AccessRecord {
            remote_host,
            method: request.method().to_string(),
            target: request.target().to_string(),
            status,
            duration: start.elapsed(),
            error: None,
        },
        Err(e) => AccessRecord {
            remote_host,
            method: request.method().to_string(),
            target: request.target().to_string(),
            status: 500,
            duration: start.elapsed(),
            error: Some(e.to_string()),
        },
    };
    record.emit();
    metrics::record_request(request.method().as_str(), record.status, start);

    let _ = stream.shutdown().await;
}
