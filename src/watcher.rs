//! Theme change watching with a last-write-wins debounce.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::HostError;
use crate::host::{HostSignal, ThemeObserverHost};

/// Quiet period after the last change before the theme is re-evaluated.
pub const THEME_DEBOUNCE: Duration = Duration::from_millis(300);

/// How often the watcher polls for new signals.
pub const WATCH_TICK: Duration = Duration::from_millis(50);

/// Timer that fires once, `delay` after the most recent trigger.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Restart the timer; an earlier pending deadline is dropped.
    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once per burst, when the deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Which channel theme changes arrive through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSource {
    Observer,
    SettingsChanged,
}

/// Subscribe `tx` to theme changes, preferring the structural observer and
/// falling back to the host's settings-changed notification.
pub fn install_theme_watch<H>(host: &mut H, tx: Sender<HostSignal>) -> Result<WatchSource, HostError>
where
    H: ThemeObserverHost + ?Sized,
{
    match host.observe_theme_changes(tx.clone()) {
        Ok(()) => {
            debug!("theme observer installed");
            Ok(WatchSource::Observer)
        }
        Err(e) => {
            warn!(error = %e, "theme observer unavailable, falling back to settings notifications");
            host.subscribe_settings_changed(tx)?;
            Ok(WatchSource::SettingsChanged)
        }
    }
}

/// Run `on_change` once per burst of host signals.
///
/// Returns after every sender is gone and no evaluation is pending.
pub async fn run_theme_watcher<F>(rx: Receiver<HostSignal>, mut on_change: F)
where
    F: FnMut(),
{
    let mut debouncer = Debouncer::new(THEME_DEBOUNCE);
    let mut disconnected = false;

    info!("theme watcher started");
    loop {
        // Drain everything queued since the last tick
        loop {
            match rx.try_recv() {
                Ok(signal) => {
                    debug!(?signal, "theme signal");
                    debouncer.trigger();
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if debouncer.take_due(Instant::now()) {
            on_change();
        }

        if disconnected && !debouncer.pending() {
            break;
        }
        sleep(WATCH_TICK).await;
    }
    info!("theme watcher stopped");
}
