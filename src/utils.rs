use std::{fmt::Display, future::Future};

use tokio::{
    signal,
    time::{Duration, sleep},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::models::retry::RetryConfig;

/// JSON lines in production, readable text elsewhere. `RUST_LOG` overrides
/// the level picked from the environment name.
pub fn init_tracing(app_env: &str) {
    let default_level = match app_env {
        "development" => "debug",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if app_env == "production" {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    if result.is_err() {
        debug!("Tracing subscriber already installed");
    }
}

/// Delay schedule for startup connection attempts: geometric growth from
/// the initial delay, capped at the maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: u64,
    max: u64,
    multiplier: u64,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay_ms.min(config.max_delay_ms),
            max: config.max_delay_ms,
            multiplier: config.backoff_multiplier.max(1),
        }
    }

    /// The un-jittered delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = current.saturating_mul(self.multiplier).min(self.max);
        Duration::from_millis(current)
    }
}

/// Spreads simultaneous restarts by up to 10% either way.
fn jitter(delay: Duration) -> Duration {
    delay.mul_f64(1.0 + rand::random_range(-0.1..=0.1))
}

/// Keeps calling `connect` until it succeeds or `config.max_attempts` calls
/// have failed, in which case the last error is returned.
pub async fn connect_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    dependency: &str,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut backoff = Backoff::new(config);
    let mut attempt = 1;

    loop {
        let error = match connect().await {
            Ok(connection) => {
                if attempt > 1 {
                    info!(dependency, attempt, "Connected after retrying");
                }
                return Ok(connection);
            }
            Err(e) => e,
        };

        if attempt >= config.max_attempts {
            warn!(dependency, attempts = attempt, error = %error, "Giving up on connection");
            return Err(error);
        }

        let delay = jitter(backoff.next_delay());
        debug!(
            dependency,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Connection attempt failed, backing off"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// The SIGTERM listener is installed when this is called, not when the
/// returned future is first polled, so a signal arriving in between is not
/// lost. Must be called inside a Tokio runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = signal::unix::signal(signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match terminate {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}
