//! Background flusher
//!
//! Runs the every-second sync policy: one thread per log, woken by a
//! crossbeam ticker, stopped through a channel that `close` disconnects.

use std::fs::File;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::error::Result;
use super::file::SharedState;

/// Handle to a running flusher thread
pub(super) struct Flusher {
    /// Dropping this disconnects the thread's stop channel
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Flusher {
    /// Start flushing `file` every `interval` while the log has unsynced writes
    ///
    /// `file` is a clone of the log's handle, so the fsync itself runs outside
    /// the log's lock and never stalls appends.
    pub(super) fn spawn(state: SharedState, file: File, interval: Duration) -> Result<Self> {
        let (stop, stopped) = channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("aof-flusher".to_string())
            .spawn(move || run(state, file, interval, stopped))?;

        Ok(Self { stop, handle })
    }

    /// Stop the thread and wait for it; no flush happens after this returns
    pub(super) fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            tracing::error!("AOF flusher thread panicked");
        }
    }
}

fn run(state: SharedState, file: File, interval: Duration, stopped: Receiver<()>) {
    let ticker = channel::tick(interval);
    tracing::debug!("AOF flusher started ({:?} interval)", interval);

    loop {
        select! {
            recv(stopped) -> _ => break,
            recv(ticker) -> _ => flush_pending(&state, &file),
        }
    }

    tracing::debug!("AOF flusher stopped");
}

fn flush_pending(state: &SharedState, file: &File) {
    let pending = {
        let mut guard = state.lock();
        guard.is_open() && std::mem::replace(&mut guard.dirty, false)
    };
    if !pending {
        return;
    }

    if let Err(e) = file.sync_data() {
        tracing::warn!("Background AOF flush failed: {}", e);
        state.lock().dirty = true;
    }
}
