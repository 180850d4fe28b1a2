//! Wall-clock countdown timer.
//!
//! Each countdown runs on its own thread and reports every elapsed second
//! through a callback, independent of frame arrival. Dropping the timer wakes
//! the thread immediately and joins it.

use crate::phase::CountdownId;
use crate::{Error, Result};
use log::debug;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a running countdown thread
#[derive(Debug)]
pub struct CountdownTimer {
    id: CountdownId,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CountdownTimer {
    /// Start counting down from `seconds`.
    ///
    /// `on_tick` receives `seconds - 1` after the first interval, down to 0
    /// on expiry. Returning `false` from the callback stops the timer early.
    pub fn start<F>(id: CountdownId, seconds: u32, interval: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut(CountdownId, u32) -> bool + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("countdown-{}", id))
            .spawn(move || {
                let origin = Instant::now();
                for elapsed in 1..=seconds {
                    let deadline = origin + interval * elapsed;
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match cancel_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            debug!("Countdown {} stopped with {}s left", id, seconds - elapsed + 1);
                            return;
                        }
                    }
                    if !on_tick(id, seconds - elapsed) {
                        return;
                    }
                }
            })
            .map_err(|e| Error::IoError(format!("Failed to spawn countdown thread: {}", e)))?;

        Ok(Self {
            id,
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Countdown this timer ticks for
    #[must_use]
    pub fn id(&self) -> CountdownId {
        self.id
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the thread out of its wait
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Countdown {} thread panicked", self.id);
            }
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
