//! Blocking client.
//!
//! Every [`BaselogClient`] owns one worker thread running a current-thread
//! tokio runtime. Calls are forwarded to that thread over a channel and the
//! caller waits for the reply, so the async pipeline (retries, backoff,
//! pooling) is reused as is and no runtime is ever created per call.
//!
//! Calling a blocking method from inside a current-thread runtime would stall
//! that runtime for the whole retry schedule, so it fails with
//! [`FailureKind::Runtime`] instead. Inside a multi-thread runtime the wait
//! happens under [`tokio::task::block_in_place`].

use std::fmt;
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::runtime::{self, Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::{
    client::HEALTH_PATH, ApiConfig, BaselogError, ClientOptions, EventModel, Failure,
    FailureKind, LogModel, OutboundRequest, Outcome, Result, Transport,
};

type Reply<T> = std_mpsc::SyncSender<T>;

enum Job {
    Call(Call),
    Close(Reply<()>),
}

/// Work answered concurrently on the worker runtime.
enum Call {
    Execute(OutboundRequest, Reply<Outcome>),
    SendLog(LogModel, Reply<Outcome>),
    Probe(String, Reply<bool>),
}

struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    thread: thread::JoinHandle<()>,
}

struct Inner {
    worker: Mutex<Option<Worker>>,
}

impl Inner {
    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            shutdown(worker);
        }
    }
}

/// Blocking counterpart of [`crate::BaselogClient`] with identical outcomes.
#[derive(Clone)]
pub struct BaselogClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for BaselogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaselogClient")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BaselogClient {
    /// Blocking client for `base_url` with default options.
    pub fn new(base_url: impl AsRef<str>, api_key: impl AsRef<str>) -> Result<Self> {
        Self::from_config(ApiConfig::new(api_key.as_ref()).with_base_url(base_url.as_ref()))
    }

    /// Starts the worker thread and builds the async client on it.
    pub fn from_config(config: ApiConfig) -> Result<Self> {
        Self::spawn(move || crate::BaselogClient::from_config(config))
    }

    /// Reads `BASELOG_*` variables, see [`ApiConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::from_config(ApiConfig::from_env()?)
    }

    /// Runs an arbitrary transport on the worker thread.
    pub fn with_transport<T: Transport>(
        transport: T,
        api_key: &str,
        options: ClientOptions,
    ) -> Result<Self> {
        let api_key = api_key.to_owned();
        Self::spawn(move || crate::BaselogClient::with_transport(transport, &api_key, options))
    }

    fn spawn<T, F>(build: F) -> Result<Self>
    where
        T: Transport,
        F: FnOnce() -> Result<crate::BaselogClient<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);

        let thread = thread::Builder::new()
            .name("baselog-blocking-runtime".into())
            .spawn(move || {
                let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(err) => {
                        let _ = ready_tx.send(Err(BaselogError::Configuration(format!(
                            "failed to start blocking runtime: {err}"
                        ))));
                        return;
                    }
                };

                let built = {
                    let _guard = rt.enter();
                    build()
                };
                let client = match built {
                    Ok(client) => client,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                tracing::trace!("({:?}) start runtime::block_on", thread::current().id());
                rt.block_on(run(client, rx));
                tracing::trace!("({:?}) end runtime::block_on", thread::current().id());
            })
            .map_err(|err| {
                BaselogError::Configuration(format!("failed to spawn blocking worker: {err}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(BaselogError::Configuration(
                    "blocking worker exited during startup".to_owned(),
                ));
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                worker: Mutex::new(Some(Worker { tx, thread })),
            }),
        })
    }

    /// Blocks until the request has a final outcome.
    pub fn execute(&self, request: OutboundRequest) -> Outcome {
        self.call(|reply| Call::Execute(request, reply))
            .unwrap_or_else(Outcome::Failure)
    }

    /// Submits `log` to `/projects/logs` and blocks until it settles.
    pub fn send_log(&self, log: &LogModel) -> Outcome {
        let log = log.clone();
        self.call(|reply| Call::SendLog(log, reply))
            .unwrap_or_else(Outcome::Failure)
    }

    /// Returns [`Outcome::NotSupported`] without touching the worker.
    pub fn send_event(&self, event: &EventModel) -> Outcome {
        tracing::debug!(event_type = %event.event_type, "event submission is not supported");
        Outcome::NotSupported {
            operation: "event submission",
        }
    }

    /// Checks `/health` on the backend.
    pub fn health_check(&self) -> bool {
        self.probe(HEALTH_PATH)
    }

    /// Same as [`BaselogClient::health_check`] for an arbitrary path.
    pub fn probe(&self, path: &str) -> bool {
        let path = path.to_owned();
        self.call(|reply| Call::Probe(path, reply)).unwrap_or(false)
    }

    /// Closes the pool and stops the worker thread. Idempotent.
    pub fn close(&self) {
        let worker = self.inner.lock_worker().take();
        if let Some(worker) = worker {
            shutdown(worker);
        }
    }

    /// Returns true once [`BaselogClient::close`] has run on any clone.
    pub fn is_closed(&self) -> bool {
        self.inner.lock_worker().is_none()
    }

    fn call<R>(&self, call: impl FnOnce(Reply<R>) -> Call) -> std::result::Result<R, Failure> {
        if let Ok(handle) = Handle::try_current() {
            if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
                return Err(Failure::new(
                    FailureKind::Runtime,
                    "blocking client called from a current-thread async runtime; use the async client",
                ));
            }
        }

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        let sent = match self.inner.lock_worker().as_ref() {
            Some(worker) => worker.tx.send(Job::Call(call(reply_tx))).is_ok(),
            None => false,
        };
        if !sent {
            return Err(closed());
        }

        wait(|| reply_rx.recv()).map_err(|_| closed())
    }
}

async fn run<T: Transport>(client: crate::BaselogClient<T>, mut rx: mpsc::UnboundedReceiver<Job>) {
    let mut calls = JoinSet::new();
    let close_reply = loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(Job::Call(call)) => {
                    calls.spawn(handle(client.clone(), call));
                }
                Some(Job::Close(reply)) => break Some(reply),
                None => break None,
            },
            Some(_) = calls.join_next(), if !calls.is_empty() => {}
        }
    };

    // Calls still running see the closed transport and answer their callers
    // before the runtime goes away.
    client.close().await;
    while calls.join_next().await.is_some() {}
    if let Some(reply) = close_reply {
        let _ = reply.send(());
    }
    tracing::trace!("({:?}) receiver is shut down", thread::current().id());
}

async fn handle<T: Transport>(client: crate::BaselogClient<T>, call: Call) {
    match call {
        Call::Execute(request, reply) => {
            let _ = reply.send(client.execute(request).await);
        }
        Call::SendLog(log, reply) => {
            let _ = reply.send(client.send_log(&log).await);
        }
        Call::Probe(path, reply) => {
            let _ = reply.send(client.probe(&path).await);
        }
    }
}

fn shutdown(worker: Worker) {
    let Worker { tx, thread } = worker;
    let id = thread.thread().id();

    let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
    if tx.send(Job::Close(reply_tx)).is_ok() {
        let _ = wait(|| reply_rx.recv());
    }
    drop(tx);

    tracing::trace!("closing runtime thread ({:?})", id);
    if wait(|| thread.join()).is_err() {
        tracing::warn!("blocking worker thread ({:?}) panicked", id);
    }
    tracing::trace!("closed runtime thread ({:?})", id);
}

/// Runs a blocking wait, stepping out of a multi-thread runtime worker first.
fn wait<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() != RuntimeFlavor::CurrentThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn closed() -> Failure {
    Failure::new(FailureKind::ConnectivityFailure, "client is closed")
}
