//! Mock scheduler for testing interface creation.
//!
//! `MockSpawner` accepts tasks up to a fixed capacity and keeps them
//! instead of running them. Tests take a task back out with
//! [`MockSpawner::take`] and drive `run()` themselves, typically joined
//! with the calls under test:
//!
//! ```rust,ignore
//! let task = spawner.take().unwrap();
//! block_on(join(task.run(), async {
//!     let n = table.get(id, NetOpt::Address, &mut buf).await;
//!     table.destroy(id).await.unwrap();
//!     n
//! }));
//! ```

use core::ops::RangeInclusive;

use crate::netif::knx::{TaskId, TaskSpawner, TaskSpec};

/// Priorities the mock scheduler accepts.
pub const MOCK_PRIORITIES: RangeInclusive<u8> = 1..=7;

/// Scheduler stand-in that stores spawned tasks.
pub struct MockSpawner<T> {
    capacity: usize,
    next_id: u16,
    specs: Vec<TaskSpec>,
    tasks: Vec<T>,
}

impl<T> core::fmt::Debug for MockSpawner<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockSpawner")
            .field("capacity", &self.capacity)
            .field("spawned", &self.specs.len())
            .field("waiting", &self.tasks.len())
            .finish()
    }
}

impl<T> MockSpawner<T> {
    /// Accept at most `capacity` tasks over the spawner's lifetime.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, next_id: 1, specs: Vec::new(), tasks: Vec::new() }
    }

    /// Number of tasks accepted so far.
    pub fn spawned(&self) -> usize {
        self.specs.len()
    }

    pub fn last_spec(&self) -> Option<&TaskSpec> {
        self.specs.last()
    }

    /// Most recently spawned task that has not been taken yet.
    pub fn take(&mut self) -> Option<T> {
        self.tasks.pop()
    }
}

impl<T> TaskSpawner<T> for MockSpawner<T> {
    fn priority_range(&self) -> RangeInclusive<u8> {
        MOCK_PRIORITIES
    }

    fn spawn(&mut self, spec: TaskSpec, task: T) -> Result<TaskId, T> {
        if self.specs.len() >= self.capacity {
            return Err(task);
        }
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.specs.push(spec);
        self.tasks.push(task);
        Ok(id)
    }
}
