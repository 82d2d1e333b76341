//! File-backed persistence.
//!
//! Saves are handed to a background thread so callers never block on disk.
//! Requests arriving within [`SAVE_DEBOUNCE`] of each other are coalesced and
//! only the newest settings are written.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error};

use crate::config::{save_settings, Settings};
use crate::host::Persistence;

/// Quiet period before a pending save is written.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

enum SaveRequest {
    Save(Box<Settings>),
    /// Write anything pending now, then acknowledge.
    Flush(Sender<()>),
}

/// Debounced writer for the settings file.
pub struct DebouncedSaver {
    tx: Sender<SaveRequest>,
}

impl DebouncedSaver {
    /// Spawn the writer thread for `path`.
    pub fn new(path: PathBuf) -> Self {
        Self::with_delay(path, SAVE_DEBOUNCE)
    }

    pub fn with_delay(path: PathBuf, delay: Duration) -> Self {
        let (tx, rx) = unbounded::<SaveRequest>();
        thread::spawn(move || {
            run_saver_thread(rx, path, delay);
        });
        Self { tx }
    }

    /// Block until every save requested so far is on disk.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(SaveRequest::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Persistence for DebouncedSaver {
    fn request_save(&self, settings: &Settings) {
        // If send fails, the writer thread has stopped - nothing to do
        let _ = self.tx.send(SaveRequest::Save(Box::new(settings.clone())));
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        self.flush();
    }
}

fn write_pending(path: &Path, pending: &mut Option<Box<Settings>>) {
    if let Some(settings) = pending.take() {
        match save_settings(path, &settings) {
            Ok(()) => debug!(path = %path.display(), "settings saved"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to save settings"),
        }
    }
}

/// Background thread that owns all settings file I/O.
fn run_saver_thread(rx: Receiver<SaveRequest>, path: PathBuf, delay: Duration) {
    let mut pending: Option<Box<Settings>> = None;

    loop {
        let request = if pending.is_some() {
            match rx.recv_timeout(delay) {
                Ok(request) => request,
                Err(RecvTimeoutError::Timeout) => {
                    write_pending(&path, &mut pending);
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(request) => request,
                Err(_) => break,
            }
        };

        match request {
            SaveRequest::Save(settings) => pending = Some(settings),
            SaveRequest::Flush(ack) => {
                write_pending(&path, &mut pending);
                let _ = ack.send(());
            }
        }
    }

    // Write whatever is left on shutdown
    write_pending(&path, &mut pending);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_settings;
    use std::fs;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("font-manager-test-{}", Uuid::new_v4().simple()))
            .join("settings.json")
    }

    #[test]
    fn test_flush_writes_latest() {
        let path = temp_path();
        let saver = DebouncedSaver::with_delay(path.clone(), Duration::from_secs(60));

        let mut settings = Settings::default();
        for size in [15.0, 16.0, 17.0] {
            settings.typography.ui_font_size = size;
            saver.request_save(&settings);
        }
        // Nothing written until the window closes or a flush
        assert!(!path.exists());

        saver.flush();
        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.typography.ui_font_size, 17.0);

        drop(saver);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_debounce_window_writes() {
        let path = temp_path();
        let saver = DebouncedSaver::with_delay(path.clone(), Duration::from_millis(20));
        saver.request_save(&Settings::default());

        let mut waited = Duration::ZERO;
        while !path.exists() && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert!(path.exists());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_keeps_other_extensions() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "OtherExtension": { "enabled": true } }"#).unwrap();

        let saver = DebouncedSaver::new(path.clone());
        saver.request_save(&Settings::default());
        drop(saver);

        let bag: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(bag["OtherExtension"]["enabled"], serde_json::json!(true));
        assert!(bag.get("Font-Manager").is_some());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
