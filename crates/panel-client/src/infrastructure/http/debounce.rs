//! Trailing-edge debouncing of control requests.
//!
//! Rapid repeated clicks (or a slider dragged across its range) would each
//! fire a `/control` request.  [`Debouncer`] keeps only the last call within
//! the window: every new call cancels the pending one and restarts the timer.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use super::device_api::DeviceApi;

/// Default quiet period before a debounced request fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `work` to run after the quiet period, cancelling any call
    /// still waiting.
    pub async fn call<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        }));
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// `/control` sender whose requests are debounced.
#[derive(Debug)]
pub struct DebouncedControl {
    api: DeviceApi,
    debouncer: Debouncer,
}

impl DebouncedControl {
    pub fn new(api: DeviceApi, delay: Duration) -> Self {
        Self {
            api,
            debouncer: Debouncer::new(delay),
        }
    }

    /// Sends `key=value` once no further call has arrived for the quiet
    /// period.  Failures are logged.
    pub async fn send(&self, key: &str, value: &str) {
        let api = self.api.clone();
        let (key, value) = (key.to_string(), value.to_string());
        self.debouncer
            .call(async move {
                if let Err(e) = api.send_control(&key, &value).await {
                    warn!("debounced control {key}={value} failed: {e}");
                }
            })
            .await;
    }
}
