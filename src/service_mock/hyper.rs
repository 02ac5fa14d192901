use crate::error::ActivationError;
use crate::request::ReceivedRequest;
use crate::request_log::RequestLog;
use crate::rest_mock::Routes;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Everything a listener thread needs, gathered before any thread is started.
pub(super) struct PreparedServer {
    endpoint: String,
    listener: std::net::TcpListener,
    acceptor: Option<TlsAcceptor>,
    routes: Arc<Routes>,
    log: Arc<RequestLog>,
}

/// A running listener thread. Dropping it without calling [`ServerHandle::shutdown`] still
/// stops the server, but does not wait for it.
pub(super) struct ServerHandle {
    endpoint: String,
    shutdown_trigger: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl PreparedServer {
    pub(super) fn new(
        endpoint: String,
        listener: std::net::TcpListener,
        acceptor: Option<TlsAcceptor>,
        routes: Arc<Routes>,
        log: Arc<RequestLog>,
    ) -> Self {
        Self {
            endpoint,
            listener,
            acceptor,
            routes,
            log,
        }
    }

    /// Spawn the listener thread and wait until it is ready to accept connections.
    ///
    /// The runtime lives and dies on the listener thread, so the host can be activated and
    /// disposed from within any async runtime.
    pub(super) fn start(self, grace_period: Duration) -> Result<ServerHandle, ActivationError> {
        let (shutdown_trigger, shutdown_receiver) = watch::channel(false);
        let (ready_trigger, ready_receiver) = std::sync::mpsc::channel();
        let endpoint = self.endpoint.clone();

        let thread = std::thread::Builder::new()
            .name(format!("servicemock {}", endpoint))
            .spawn(move || {
                let setup = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .and_then(|runtime| {
                        // Registering the socket needs the runtime's reactor.
                        let listener = {
                            let _guard = runtime.enter();
                            TcpListener::from_std(self.listener)?
                        };
                        Ok((runtime, listener))
                    });
                let (runtime, listener) = match setup {
                    Ok(setup) => {
                        let _ = ready_trigger.send(Ok(()));
                        setup
                    }
                    Err(e) => {
                        let _ = ready_trigger.send(Err(e));
                        return;
                    }
                };
                runtime.block_on(run_server(
                    self.endpoint,
                    listener,
                    self.acceptor,
                    self.routes,
                    self.log,
                    shutdown_receiver,
                    grace_period,
                ))
            })
            .map_err(|source| ActivationError::Runtime {
                endpoint: endpoint.clone(),
                source,
            })?;

        let ready = ready_receiver.recv().unwrap_or_else(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "The listener thread exited before it was ready",
            ))
        });
        if let Err(source) = ready {
            let _ = thread.join();
            return Err(ActivationError::Runtime { endpoint, source });
        }

        Ok(ServerHandle {
            endpoint,
            shutdown_trigger,
            thread: Some(thread),
        })
    }
}

impl ServerHandle {
    /// Stop accepting connections, let in-flight requests finish within the grace period and
    /// wait for the listener thread to release its port.
    pub(super) fn shutdown(mut self) {
        // An error means the server loop is already gone.
        let _ = self.shutdown_trigger.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("The listener thread of `{}` panicked", self.endpoint);
            }
        }
    }
}

/// Accept connections on `listener` until the shutdown signal fires.
async fn run_server(
    endpoint: String,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    routes: Arc<Routes>,
    log: Arc<RequestLog>,
    mut shutdown_signal: watch::Receiver<bool>,
    grace_period: Duration,
) {
    info!("Listening on `{}`", endpoint);
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept a connection on `{}`: {}", endpoint, e);
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let routes = routes.clone();
                let log = log.clone();
                let shutdown_signal = shutdown_signal.clone();
                connections.spawn(async move {
                    match acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => {
                                serve_connection(stream, peer, routes, log, shutdown_signal).await
                            }
                            Err(e) => warn!("TLS handshake with {} failed: {}", peer, e),
                        },
                        None => serve_connection(stream, peer, routes, log, shutdown_signal).await,
                    }
                });
            }
            // Fires on an explicit shutdown and when the handle is dropped.
            _ = shutdown_signal.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);

    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(grace_period, drain).await.is_err() {
        warn!(
            "Connections to `{}` still open after {:?}, closing them",
            endpoint, grace_period
        );
        connections.abort_all();
    }
    info!("Stopped listening on `{}`", endpoint);
}

async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    routes: Arc<Routes>,
    log: Arc<RequestLog>,
    mut shutdown_signal: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let routes = routes.clone();
        let log = log.clone();
        async move {
            let request = ReceivedRequest::from_hyper(request).await?;
            Ok::<_, hyper::Error>(routes.respond(request, &log))
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown_signal.changed() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(e) = result {
        warn!("Connection with {} ended with an error: {}", peer, e);
    }
}
