//! Locally simulated progress. These ramps only exist so a slow call does not look
//! frozen; real completion is signalled by status changes, never by a percentage.

use std::{future::Future, time::Duration};

use tokio::time::MissedTickBehavior;

/// Upload ramp: starts at 10 %, climbs 15 points per tick, holds at 90 % until
/// the call resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRamp {
    percent: u8,
}

impl UploadRamp {
    pub const START: u8 = 10;
    pub const STEP: u8 = 15;
    pub const CEILING: u8 = 90;

    pub fn new() -> Self {
        Self {
            percent: Self::START,
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn tick(&mut self) -> u8 {
        self.percent = self.percent.saturating_add(Self::STEP).min(Self::CEILING);
        self.percent
    }
}

impl Default for UploadRamp {
    fn default() -> Self {
        Self::new()
    }
}

/// Deletion ramp for item `index` of `total`: moves from the item's base share in
/// 5-point steps up to 90 % of the item's slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeleteRamp {
    current: f64,
    cap: f64,
}

impl DeleteRamp {
    pub const STEP: f64 = 5.0;

    pub fn new(index: usize, total: usize) -> Self {
        let base = share(index, total);
        let next = share(index + 1, total);
        Self {
            current: base,
            cap: base + (next - base) * 0.9,
        }
    }

    pub fn percent(&self) -> f64 {
        self.current
    }

    pub fn tick(&mut self) -> f64 {
        self.current = (self.current + Self::STEP).min(self.cap);
        self.current
    }
}

/// Percentage of the batch done once `completed` items have resolved.
pub fn share(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Awaits `operation`, running `on_tick` every `period` until it resolves.
/// Completion always wins over a simultaneously ready tick.
pub async fn drive_with_ticks<F, T, G, GF>(period: Duration, operation: F, mut on_tick: G) -> T
where
    F: Future<Output = T>,
    G: FnMut() -> GF,
    GF: Future<Output = ()>,
{
    if period.is_zero() {
        return operation.await;
    }

    tokio::pin!(operation);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            output = &mut operation => return output,
            _ = interval.tick() => on_tick().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn upload_ramp_never_reaches_completion() {
        let mut ramp = UploadRamp::new();
        assert_eq!(ramp.percent(), 10);
        let seen: Vec<u8> = (0..8).map(|_| ramp.tick()).collect();
        assert_eq!(seen, vec![25, 40, 55, 70, 85, 90, 90, 90]);
    }

    #[test]
    fn delete_ramp_stays_inside_item_slice() {
        let mut ramp = DeleteRamp::new(1, 2);
        assert_eq!(ramp.percent(), 50.0);
        let mut last = ramp.percent();
        for _ in 0..20 {
            let next = ramp.tick();
            assert!(next >= last);
            assert!(next <= 95.0);
            last = next;
        }
        assert_eq!(last, 95.0);
        assert_eq!(share(2, 2), 100.0);
        assert_eq!(share(0, 0), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_while_operation_is_pending() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let output = drive_with_ticks(
            Duration::from_millis(100),
            async {
                tokio::time::sleep(Duration::from_millis(350)).await;
                "done"
            },
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        )
        .await;

        assert_eq!(output, "done");
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_period_skips_ticking() {
        let output = drive_with_ticks(Duration::ZERO, async { 7 }, || async {}).await;
        assert_eq!(output, 7);
    }
}
