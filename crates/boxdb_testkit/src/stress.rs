//! Concurrency helpers.

use std::sync::Barrier;
use std::thread;

/// Runs `work` on `workers` threads at once and returns the results in
/// worker order.
///
/// Every worker receives its index and a barrier shared by all workers, so
/// they can line up before contending for a resource.
pub fn run_workers<F, R>(workers: usize, work: F) -> Vec<R>
where
    F: Fn(usize, &Barrier) -> R + Sync,
    R: Send,
{
    let barrier = Barrier::new(workers);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|index| {
                let barrier = &barrier;
                let work = &work;
                scope.spawn(move || work(index, barrier))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_worker_runs_once() {
        let counter = AtomicUsize::new(0);
        let results = run_workers(4, |index, barrier| {
            barrier.wait();
            counter.fetch_add(1, Ordering::SeqCst);
            index * 2
        });
        assert_eq!(results, vec![0, 2, 4, 6]);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
