use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run `tick` against `owner` every `period` until the owner is dropped.
///
/// The first tick fires one full period after spawning. Ticks that overrun
/// delay the next one rather than bursting.
pub fn spawn_periodic<T, F, Fut>(
    owner: Weak<T>,
    period: Duration,
    name: &'static str,
    tick: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(owner) = owner.upgrade() else {
                tracing::debug!(task = name, "owner dropped, stopping sweep");
                break;
            };
            tick(owner).await;
        }
    })
}
