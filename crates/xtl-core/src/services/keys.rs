//! Round-robin credential rotation.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Pool {
    keys: Vec<String>,
    cursor: usize,
}

/// Hands out credentials in circular order.
#[derive(Debug, Default)]
pub struct KeyRotator {
    pool: Mutex<Pool>,
}

impl KeyRotator {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            pool: Mutex::new(Pool { keys, cursor: 0 }),
        }
    }

    /// Replace the credential pool and reset the cursor.
    pub fn reconfigure(&self, keys: Vec<String>) {
        *self.pool.lock() = Pool { keys, cursor: 0 };
    }

    /// Next credential, or `None` when the pool is empty.
    pub fn draw(&self) -> Option<String> {
        let mut pool = self.pool.lock();
        if pool.keys.is_empty() {
            return None;
        }
        let key = pool.keys[pool.cursor].clone();
        pool.cursor = (pool.cursor + 1) % pool.keys.len();
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.pool.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().keys.is_empty()
    }
}
