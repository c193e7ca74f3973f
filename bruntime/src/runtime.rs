//! Process-wide scheduling loop and pooled outbound HTTP client.
//!
//! Every synchronous call site reaches the async core through one
//! [`SharedRuntime`] instead of spinning private loops; every outbound HTTP
//! call goes through one pooled client with bounded timeouts.

use std::future::Future;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use reqwest::Client;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::{RuntimeError, RuntimeErrorKind};

/// Timeout bounds applied to the pooled outbound client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub total_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
        }
    }
}

pub struct SharedRuntime {
    scheduler: OnceLock<Result<Runtime, RuntimeError>>,
    client: Mutex<Option<Client>>,
    http_config: HttpClientConfig,
}

static GLOBAL_RUNTIME: OnceLock<SharedRuntime> = OnceLock::new();

impl SharedRuntime {
    pub fn new() -> Self {
        Self::with_http_config(HttpClientConfig::default())
    }

    pub fn with_http_config(http_config: HttpClientConfig) -> Self {
        Self {
            scheduler: OnceLock::new(),
            client: Mutex::new(None),
            http_config,
        }
    }

    /// The one runtime shared by every call site in this process.
    pub fn global() -> &'static SharedRuntime {
        GLOBAL_RUNTIME.get_or_init(SharedRuntime::new)
    }

    fn owned_handle(&self) -> Result<Handle, RuntimeError> {
        let entry = self.scheduler.get_or_init(|| {
            Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|error| {
                    RuntimeError::scheduler(format!("failed to build scheduling loop: {error}"))
                })
        });

        match entry {
            Ok(runtime) => Ok(runtime.handle().clone()),
            Err(error) => Err(error.clone()),
        }
    }

    /// Resolves the loop that should drive synchronous work: the ambient one
    /// when the caller is already inside async context, otherwise the owned
    /// process loop (constructed on first use, never torn down implicitly).
    pub fn driver(&self) -> Result<LoopDriver, RuntimeError> {
        match Handle::try_current() {
            Ok(handle) => Ok(LoopDriver::Nested(handle)),
            Err(_) => Ok(LoopDriver::Owned(self.owned_handle()?)),
        }
    }

    /// Drives `future` to completion from a synchronous call site.
    ///
    /// Inside async context the future is driven on the ambient loop without
    /// starving it; outside, the owned loop runs it to completion.
    pub fn run<F>(&self, future: F) -> Result<F::Output, RuntimeError>
    where
        F: Future,
    {
        Ok(self.driver()?.block_on(future))
    }

    /// Pushes a synchronous call to the bounded blocking-worker pool and
    /// awaits its result, keeping the scheduling loop responsive.
    pub async fn unblock<T, F>(&self, f: F) -> Result<T, RuntimeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => self.owned_handle()?,
        };

        handle.spawn_blocking(f).await.map_err(|error| {
            RuntimeError::new(
                RuntimeErrorKind::Worker,
                format!("blocking worker failed: {error}"),
            )
        })
    }

    /// Returns the pooled outbound client, building it on first use and
    /// transparently rebuilding it after [`SharedRuntime::shutdown`].
    pub fn http_client(&self) -> Result<Client, RuntimeError> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| RuntimeError::client("pooled client lock poisoned"))?;

        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(self.http_config.total_timeout)
            .connect_timeout(self.http_config.connect_timeout)
            .read_timeout(self.http_config.read_timeout)
            .build()
            .map_err(|error| {
                RuntimeError::client(format!("failed to build pooled client: {error}"))
            })?;

        *slot = Some(client.clone());
        Ok(client)
    }

    /// Closes the pooled client. The scheduling loop is left to process exit.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| RuntimeError::client("pooled client lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

impl Default for SharedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the loop that drives synchronous call sites.
#[derive(Debug, Clone)]
pub enum LoopDriver {
    /// Caller is already inside the loop; work is driven in place on a
    /// blocking-capable worker so the loop is not starved.
    Nested(Handle),
    /// Caller is a plain thread; the owned process loop runs the work.
    Owned(Handle),
}

impl LoopDriver {
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        match self {
            Self::Nested(handle) => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            Self::Owned(handle) => handle.block_on(future),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_drives_futures_from_plain_threads() {
        let runtime = SharedRuntime::new();
        let value = runtime
            .run(async { 21 * 2 })
            .expect("run should drive the future");
        assert_eq!(value, 42);
    }

    #[test]
    fn run_reuses_the_same_owned_loop() {
        let runtime = SharedRuntime::new();
        let first = runtime.driver().expect("driver should resolve");
        let second = runtime.driver().expect("driver should resolve");

        let (LoopDriver::Owned(a), LoopDriver::Owned(b)) = (first, second) else {
            panic!("plain threads should resolve the owned loop");
        };
        assert_eq!(a.id(), b.id());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_inside_async_context_uses_ambient_loop() {
        let runtime = SharedRuntime::new();
        let driver = runtime.driver().expect("driver should resolve");
        assert!(matches!(driver, LoopDriver::Nested(_)));

        let value = runtime
            .run(async { "nested" })
            .expect("nested run should complete");
        assert_eq!(value, "nested");
    }

    #[test]
    fn unblock_runs_sync_work_on_worker_pool() {
        let runtime = SharedRuntime::new();
        let value = runtime
            .run(async {
                SharedRuntime::global()
                    .unblock(|| (0..100).sum::<u32>())
                    .await
            })
            .expect("run should complete")
            .expect("worker should complete");
        assert_eq!(value, 4950);
    }

    #[test]
    fn http_client_is_rebuilt_after_shutdown() {
        let runtime = SharedRuntime::new();
        let _first = runtime.http_client().expect("client should build");
        runtime.shutdown().expect("shutdown should succeed");
        let _second = runtime
            .http_client()
            .expect("client should rebuild after shutdown");
    }

    #[test]
    fn global_returns_one_instance() {
        let first = SharedRuntime::global() as *const SharedRuntime;
        let second = SharedRuntime::global() as *const SharedRuntime;
        assert_eq!(first, second);
    }
}
