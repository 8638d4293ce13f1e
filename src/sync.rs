//! Auxiliary concurrency primitives available to a host process embedding the store. None of
//! these are used by the core DB/DAL/Transaction/Collection stack, which relies on a plain
//! `std::sync::RwLock` instead (see `db.rs`); they exist as a standalone toolkit for hosts that
//! need finer-grained synchronization than a single DB-wide lock.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// A counting semaphore used as a mutex, with optional timed acquisition.
pub struct SemaphoreMutex {
    count: Mutex<i64>,
    cond: Condvar,
}

impl SemaphoreMutex {
    pub fn new(permits: i64) -> SemaphoreMutex {
        SemaphoreMutex {
            count: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        while *count <= 0 {
            count = self.cond.wait(count).expect("semaphore mutex poisoned");
        }
        *count -= 1;
    }

    pub fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        loop {
            if *count > 0 {
                *count -= 1;
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let (guard, result) = self
                .cond
                .wait_timeout(count, deadline - now)
                .expect("semaphore mutex poisoned");
            count = guard;
            if result.timed_out() && *count <= 0 {
                return Err(Error::Timeout);
            }
        }
    }

    pub fn release(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        *count += 1;
        self.cond.notify_one();
    }
}

/// A reader-writer mutex built atop two semaphores and an atomic reader counter: readers wait on
/// a read semaphore and, on becoming the first reader, also acquire the write semaphore;
/// writers acquire the write semaphore exclusively.
pub struct RwMutex {
    write_sem: SemaphoreMutex,
    read_sem: SemaphoreMutex,
    readers: Mutex<u64>,
}

impl Default for RwMutex {
    fn default() -> Self {
        RwMutex {
            write_sem: SemaphoreMutex::new(1),
            read_sem: SemaphoreMutex::new(1),
            readers: Mutex::new(0),
        }
    }
}

impl RwMutex {
    pub fn new() -> RwMutex {
        RwMutex::default()
    }

    pub fn read_lock(&self) {
        self.read_sem.acquire();
        let mut readers = self.readers.lock().expect("reader count poisoned");
        *readers += 1;
        if *readers == 1 {
            self.write_sem.acquire();
        }
        self.read_sem.release();
    }

    pub fn read_unlock(&self) {
        self.read_sem.acquire();
        let mut readers = self.readers.lock().expect("reader count poisoned");
        *readers -= 1;
        if *readers == 0 {
            self.write_sem.release();
        }
        self.read_sem.release();
    }

    pub fn write_lock(&self) {
        self.write_sem.acquire();
    }

    pub fn write_unlock(&self) {
        self.write_sem.release();
    }
}

/// A bounded, multi-producer/multi-consumer channel with both blocking and non-blocking
/// send/receive, and a `close` that wakes every waiter.
pub struct Channel<T> {
    state: Mutex<ChannelState<T>>,
    cond: Condvar,
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

impl<T> Channel<T> {
    pub fn new(capacity: usize) -> Channel<T> {
        Channel {
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                capacity,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn send(&self, value: T) -> Result<()> {
        let mut state = self.state.lock().expect("channel poisoned");
        loop {
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            if state.queue.len() < state.capacity {
                state.queue.push_back(value);
                self.cond.notify_all();
                return Ok(());
            }
            state = self.cond.wait(state).expect("channel poisoned");
        }
    }

    pub fn try_send(&self, value: T) -> Result<()> {
        let mut state = self.state.lock().expect("channel poisoned");
        if state.closed {
            return Err(Error::ChannelClosed);
        }
        if state.queue.len() >= state.capacity {
            return Err(Error::ChannelFull);
        }
        state.queue.push_back(value);
        self.cond.notify_all();
        Ok(())
    }

    pub fn recv(&self) -> Result<T> {
        let mut state = self.state.lock().expect("channel poisoned");
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.cond.notify_all();
                return Ok(value);
            }
            if state.closed {
                return Err(Error::ChannelClosed);
            }
            state = self.cond.wait(state).expect("channel poisoned");
        }
    }

    pub fn try_recv(&self) -> Result<T> {
        let mut state = self.state.lock().expect("channel poisoned");
        if let Some(value) = state.queue.pop_front() {
            self.cond.notify_all();
            return Ok(value);
        }
        if state.closed {
            return Err(Error::ChannelClosed);
        }
        Err(Error::ChannelEmpty)
    }

    /// Closes the channel, waking every blocked sender/receiver. Further operations return
    /// `Error::ChannelClosed`.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("channel poisoned");
        state.closed = true;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn semaphore_acquire_release() {
        let sem = SemaphoreMutex::new(1);
        sem.acquire();
        sem.release();
        sem.acquire();
        sem.release();
    }

    #[test]
    fn semaphore_timeout() {
        let sem = SemaphoreMutex::new(0);
        let result = sem.acquire_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn channel_send_recv() {
        let ch: Channel<i32> = Channel::new(2);
        ch.send(1).unwrap();
        ch.send(2).unwrap();
        assert!(matches!(ch.try_send(3), Err(Error::ChannelFull)));
        assert_eq!(ch.recv().unwrap(), 1);
        assert_eq!(ch.recv().unwrap(), 2);
        assert!(matches!(ch.try_recv(), Err(Error::ChannelEmpty)));
    }

    #[test]
    fn channel_close_wakes_waiters() {
        let ch: Arc<Channel<i32>> = Arc::new(Channel::new(1));
        let ch2 = ch.clone();
        let handle = thread::spawn(move || ch2.recv());
        thread::sleep(Duration::from_millis(20));
        ch.close();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(Error::ChannelClosed)));
    }
}
