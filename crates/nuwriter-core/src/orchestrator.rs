//! Multi-device fan-out
//!
//! One logical operation is applied to every session by a pool of at most
//! [`MAX_WORKERS`] scoped threads. Workers pull the next idle session from a
//! shared queue, so each transport is only ever touched by one thread.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::session::DeviceSession;
use crate::transport::Transport;

/// Upper bound on concurrently running device tasks
pub const MAX_WORKERS: usize = 8;

/// Tally of a fan-out run
#[derive(Debug, Default)]
pub struct Outcome {
    /// Devices that completed the operation
    pub success: usize,
    /// Devices that failed
    pub failure: usize,
    /// Failure reasons keyed by device id, in completion order
    pub errors: Vec<(usize, Error)>,
}

impl Outcome {
    /// Whether every device succeeded
    pub fn all_ok(&self) -> bool {
        self.failure == 0
    }
}

/// Run `op` on every session and tally the results
///
/// A failing device does not stop the others. Fails with
/// [`Error::NoDeviceFound`] before doing anything if `sessions` is empty.
pub fn run_all<T, F>(sessions: &mut [DeviceSession<T>], op: F) -> Result<Outcome>
where
    T: Transport,
    F: Fn(&mut DeviceSession<T>) -> Result<()> + Sync,
{
    if sessions.is_empty() {
        return Err(Error::NoDeviceFound);
    }

    let workers = sessions.len().min(MAX_WORKERS);
    let queue = Mutex::new(sessions.iter_mut());
    let success = AtomicUsize::new(0);
    let failure = AtomicUsize::new(0);
    let errors = Mutex::new(Vec::new());

    log::debug!("running on {} device(s) with {} worker(s)", queue.lock().len(), workers);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                // Release the queue before running the task
                let next = queue.lock().next();
                let Some(session) = next else {
                    break;
                };

                let id = session.id();
                match op(session) {
                    Ok(()) => {
                        success.fetch_add(1, Ordering::Relaxed);
                        session.reporter().done(None);
                    }
                    Err(e) => {
                        log::error!("device {}: {}", id, e);
                        failure.fetch_add(1, Ordering::Relaxed);
                        session.reporter().done(Some(e.to_string()));
                        errors.lock().push((id, e));
                    }
                }
            });
        }
    });

    Ok(Outcome {
        success: success.into_inner(),
        failure: failure.into_inner(),
        errors: errors.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Media;
    use crate::transport::BlockAlign;

    struct Idle(usize);

    impl Transport for Idle {
        fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }
        fn read(&mut self, _len: usize) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn set_media(&mut self, _media: Media) -> Result<()> {
            Ok(())
        }
        fn get_align(&mut self) -> Result<BlockAlign> {
            Ok(BlockAlign::default())
        }
        fn get_info(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn get_id(&self) -> usize {
            self.0
        }
    }

    fn sessions(n: usize) -> Vec<DeviceSession<Idle>> {
        (0..n).map(|i| DeviceSession::new(Idle(i))).collect()
    }

    #[test]
    fn test_empty_is_no_device() {
        let mut none: Vec<DeviceSession<Idle>> = Vec::new();
        assert!(matches!(run_all(&mut none, |_| Ok(())), Err(Error::NoDeviceFound)));
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut s = sessions(5);
        let outcome = run_all(&mut s, |d| {
            if d.id() % 2 == 1 {
                Err(Error::Transport("gone".into()))
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(outcome.success, 3);
        assert_eq!(outcome.failure, 2);
        let mut ids: Vec<_> = outcome.errors.iter().map(|(id, _)| *id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_pool_is_bounded() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let mut s = sessions(20);
        let outcome = run_all(&mut s, |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(outcome.success, 20);
        assert!(peak.load(Ordering::SeqCst) <= MAX_WORKERS);
    }

    #[test]
    fn test_each_session_runs_once() {
        let mut s = sessions(11);
        run_all(&mut s, |d| {
            d.select_media(Media::SpiNor);
            Ok(())
        })
        .unwrap();
        assert!(s.iter().all(|d| d.media() == Media::SpiNor));
    }
}
