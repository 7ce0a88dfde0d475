//! Reader slots and the writer gate.

use crate::error::{EngineError, EngineResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Bounded pool of read transaction slots.
///
/// Acquisition never waits: when every slot is taken it fails immediately.
#[derive(Debug)]
pub(crate) struct ReaderSlots {
    active: AtomicU32,
    max: u32,
    /// Open read transactions per thread.
    threads: Mutex<HashMap<ThreadId, u32>>,
}

impl ReaderSlots {
    pub fn new(max: u32) -> Self {
        Self {
            active: AtomicU32::new(0),
            max,
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(&self, thread: ThreadId) -> EngineResult<()> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return Err(EngineError::MaxReadersExceeded);
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        *self.threads.lock().entry(thread).or_insert(0) += 1;
        Ok(())
    }

    pub fn release(&self, thread: ThreadId) {
        {
            let mut threads = self.threads.lock();
            if let Some(count) = threads.get_mut(&thread) {
                *count -= 1;
                if *count == 0 {
                    threads.remove(&thread);
                }
            }
        }
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Returns true if `thread` holds at least one read transaction.
    pub fn held_by(&self, thread: ThreadId) -> bool {
        self.threads.lock().contains_key(&thread)
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// The single writer slot.
#[derive(Debug, Default)]
pub(crate) struct WriterGate {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl WriterGate {
    /// Blocks until the slot is free, or until `timeout` elapses.
    pub fn acquire(&self, timeout: Option<Duration>) -> EngineResult<()> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();

        if *owner == Some(me) {
            return Err(EngineError::illegal_state(
                "Cannot start a write transaction while this thread already has one open",
            ));
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        while owner.is_some() {
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut owner, deadline).timed_out()
                        && owner.is_some()
                    {
                        return Err(EngineError::illegal_state(format!(
                            "Could not begin write transaction (timed out after {:?})",
                            timeout.unwrap_or_default()
                        )));
                    }
                }
                None => self.released.wait(&mut owner),
            }
        }

        *owner = Some(me);
        Ok(())
    }

    pub fn release(&self) {
        *self.owner.lock() = None;
        self.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn readers_fail_fast_at_the_bound() {
        let slots = ReaderSlots::new(2);
        let me = thread::current().id();

        slots.acquire(me).unwrap();
        slots.acquire(me).unwrap();
        assert!(matches!(
            slots.acquire(me),
            Err(EngineError::MaxReadersExceeded)
        ));
        assert!(slots.held_by(me));

        slots.release(me);
        slots.release(me);
        assert_eq!(slots.active(), 0);
        assert!(!slots.held_by(me));
    }

    #[test]
    fn writer_reentry_is_rejected() {
        let gate = WriterGate::default();
        gate.acquire(None).unwrap();
        assert!(matches!(
            gate.acquire(None),
            Err(EngineError::IllegalState { .. })
        ));
        gate.release();
        gate.acquire(None).unwrap();
        gate.release();
    }

    #[test]
    fn second_writer_times_out_while_first_holds_the_gate() {
        let gate = Arc::new(WriterGate::default());
        gate.acquire(None).unwrap();

        let contender = Arc::clone(&gate);
        let result = thread::spawn(move || contender.acquire(Some(Duration::from_millis(20))))
            .join()
            .unwrap();
        assert!(matches!(result, Err(EngineError::IllegalState { .. })));

        gate.release();
    }

    #[test]
    fn waiting_writer_proceeds_after_release() {
        let gate = Arc::new(WriterGate::default());
        gate.acquire(None).unwrap();

        let contender = Arc::clone(&gate);
        let waiter = thread::spawn(move || {
            contender.acquire(None).unwrap();
            contender.release();
        });

        thread::sleep(Duration::from_millis(10));
        gate.release();
        waiter.join().unwrap();
    }
}
