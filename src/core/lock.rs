use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

fn log_poisoned(lock_type: &str, context: &str) {
    log::error!("{} lock poisoned in {}", lock_type, context);
}

pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("Mutex", context);
            poisoned.into_inner()
        }
    }
}

/// Waits on `condvar` for at most `timeout`, recovering the guard from a
/// poisoned lock. Returns the guard and whether the wait timed out.
pub fn wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    context: &str,
    timeout: Duration,
) -> (MutexGuard<'a, T>, bool) {
    match condvar.wait_timeout(guard, timeout) {
        Ok((guard, result)) => (guard, result.timed_out()),
        Err(poisoned) => {
            log_poisoned("Condvar", context);
            let (guard, result) = poisoned.into_inner();
            (guard, result.timed_out())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_mutex_recovers_from_poison() {
        let mutex = Arc::new(Mutex::new(5u32));
        let poisoner = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock_mutex(&mutex, "test"), 5);
    }

    #[test]
    fn test_wait_timeout_times_out() {
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let guard = lock_mutex(&mutex, "test");
        let (_guard, timed_out) = wait_timeout(&condvar, guard, "test", Duration::from_millis(5));
        assert!(timed_out);
    }
}
