//! Busy/idle timer support (§4.6.1, §4.6.5).
//!
//! Both timers are modeled as a race between the awaited future (a
//! recursive child deck run, or a model call) and a repeating sleep,
//! rather than a free-running background task — this keeps cancellation
//! automatic: the timer simply stops being polled once the race resolves
//! the other way, with no join-handle bookkeeping needed.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared quiescence clock for a single deck's idle timer. `touch()` is
/// called on every stream chunk, tool-dispatch boundary, and model-call
/// boundary; `pause`/`resume` bracket child-deck execution, during which
/// the idle timer must not fire (§4.6.5).
#[derive(Clone)]
pub struct ActivityClock {
    epoch: Instant,
    last_touch_ms: Arc<AtomicU64>,
    paused: Arc<AtomicBool>,
}

impl ActivityClock {
    pub fn new() -> Self {
        ActivityClock {
            epoch: Instant::now(),
            last_touch_ms: Arc::new(AtomicU64::new(0)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_touch_ms.store(now, Ordering::Relaxed);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.touch();
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.touch();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn idle_ms(&self) -> u64 {
        let now = self.epoch.elapsed().as_millis() as u64;
        now.saturating_sub(self.last_touch_ms.load(Ordering::Relaxed))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Race `fut` against a (possibly repeating) timer, firing `on_fire` with
/// the elapsed milliseconds each time the timer wins before the future
/// does. Shared by the busy-handler dispatch race and the deck-scope idle
/// race — both are "keep going, but say something if this takes a while"
/// timers with an identical shape.
pub async fn race_with_timer<'a, T, H, HFut>(
    fut: Pin<Box<dyn Future<Output = T> + Send + 'a>>,
    initial_delay: Duration,
    repeat: Option<Duration>,
    mut on_fire: H,
) -> T
where
    H: FnMut(u64) -> HFut,
    HFut: Future<Output = ()>,
{
    let started = Instant::now();
    let mut next_fire = tokio::time::Instant::now() + initial_delay;
    let mut fut = fut;
    loop {
        tokio::select! {
            result = &mut fut => return result,
            _ = tokio::time::sleep_until(next_fire) => {
                let elapsed = started.elapsed().as_millis() as u64;
                on_fire(elapsed).await;
                match repeat {
                    Some(r) => next_fire = tokio::time::Instant::now() + r,
                    None => return fut.await,
                }
            }
        }
    }
}
