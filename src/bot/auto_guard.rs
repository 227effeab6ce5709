// src/bot/auto_guard.rs - Scan cycles, the interval timer and debounced rescans

use log::{debug, error, info};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::bot::presence::{PresenceAction, PresenceController};
use crate::bot::scanner::ChannelActivityScanner;
use crate::config::GuardConfig;
use crate::types::{GuildId, ScanSnapshot};

/// Delay before a presence-triggered scan, letting member lists settle
pub const PRESENCE_DEBOUNCE: Duration = Duration::from_secs(2);
/// Delay before the first scan after the client becomes ready
pub const STARTUP_SCAN_DELAY: Duration = Duration::from_secs(3);

/// Outcome of one scan-and-reconcile pass for a guild
#[derive(Debug, Clone)]
pub struct GuildScanReport {
    pub snapshot: ScanSnapshot,
    pub action: Option<PresenceAction>,
}

/// One scan followed by a reconcile per guild.
///
/// Cycles are serialised so a timer tick and a presence-triggered rescan
/// never interleave their connect/disconnect calls. Once halted, no further
/// cycle touches the platform.
pub struct ScanCycle {
    scanner: ChannelActivityScanner,
    presence: Arc<PresenceController>,
    cycle_lock: Mutex<()>,
    halted: AtomicBool,
}

impl ScanCycle {
    pub fn new(scanner: ChannelActivityScanner, presence: Arc<PresenceController>) -> Self {
        Self {
            scanner,
            presence,
            cycle_lock: Mutex::new(()),
            halted: AtomicBool::new(false),
        }
    }

    pub async fn run(&self) -> BTreeMap<GuildId, GuildScanReport> {
        let _guard = self.cycle_lock.lock().await;
        let mut reports = BTreeMap::new();
        if self.halted.load(Ordering::Acquire) {
            debug!("Scan cycle skipped, auto-guard is halted");
            return reports;
        }

        for (guild_id, snapshot) in self.scanner.scan().await {
            let action = match self.presence.reconcile(guild_id, &snapshot).await {
                Ok(action) => Some(action),
                Err(e) => {
                    error!("Auto-guard failed in guild {}: {}", guild_id, e);
                    None
                }
            };
            reports.insert(guild_id, GuildScanReport { snapshot, action });
        }

        if !reports.is_empty() {
            info!("Dynamic scan complete");
        }
        reports
    }

    /// Refuse new cycles and wait for the one in flight, if any, to finish
    pub async fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        let _guard = self.cycle_lock.lock().await;
    }
}

/// Run a cycle on its own task. Aborting the caller while it waits here
/// detaches the cycle instead of cutting it short between a disconnect and
/// the following connect.
async fn run_detached(cycle: &Arc<ScanCycle>) {
    let cycle = Arc::clone(cycle);
    if let Err(e) = tokio::spawn(async move { cycle.run().await }).await {
        error!("Scan cycle task failed: {}", e);
    }
}

/// Periodic scan task plus a single pending debounced rescan.
pub struct AutoGuard {
    cycle: Arc<ScanCycle>,
    config: Arc<RwLock<GuardConfig>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    pending_scan: Mutex<Option<JoinHandle<()>>>,
}

impl AutoGuard {
    pub fn new(cycle: Arc<ScanCycle>, config: Arc<RwLock<GuardConfig>>) -> Self {
        Self {
            cycle,
            config,
            timer: Mutex::new(None),
            pending_scan: Mutex::new(None),
        }
    }

    pub fn cycle(&self) -> &Arc<ScanCycle> {
        &self.cycle
    }

    /// Start or stop the interval timer to match the current flags.
    /// Returns whether the timer is running afterwards.
    pub async fn sync_timer(&self) -> bool {
        let config = self.config.read().await.clone();
        let mut timer = self.timer.lock().await;

        if let Some(handle) = timer.take() {
            handle.abort();
            debug!("Stopped previous scan timer");
        }

        if !config.scanning_active() {
            info!("Dynamic channel scanning stopped");
            return false;
        }

        let period = config.scan_interval;
        info!("Starting dynamic channel scanning every {} seconds", period.as_secs_f64());

        let cycle = Arc::clone(&self.cycle);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_detached(&cycle).await;
            }
        }));
        true
    }

    pub async fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
            info!("Stopped dynamic channel scanning");
        }
    }

    pub async fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Run a scan after `delay`, replacing any scan still waiting. A scan
    /// that has already started runs to completion.
    pub async fn schedule_scan(&self, delay: Duration) {
        let cycle = Arc::clone(&self.cycle);
        let mut pending = self.pending_scan.lock().await;
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                debug!("Coalescing pending scan");
            }
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            run_detached(&cycle).await;
        }));
    }

    /// Stop the timer, drop any pending rescan and wait out a running cycle
    pub async fn shutdown(&self) {
        self.stop_timer().await;
        if let Some(pending) = self.pending_scan.lock().await.take() {
            pending.abort();
        }
        self.cycle.halt().await;
    }
}
