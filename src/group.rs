//! Registry of tasks whose lifetime is tied to an owner.
//!
//! A connection keeps its helper tasks in a [`TaskGroup`]. Tasks unlink
//! themselves when they finish; dropping the group destroys whatever is left,
//! which drops their futures and with them any descriptors they owned.

use crate::runtime::Handle;
use crate::task::TaskId;
use crate::utils::slab::{Key, Slab};

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use tracing::trace;

type Members = Rc<RefCell<Slab<Option<TaskId>>>>;

/// Removes a task from its group when its future is dropped, whether it ran
/// to completion or was cancelled.
struct Link {
    members: Weak<RefCell<Slab<Option<TaskId>>>>,
    key: Key,
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(members) = self.members.upgrade() {
            members.borrow_mut().remove(self.key);
        }
    }
}

/// Set of suspended tasks owned by a single owner.
///
/// # Example
/// ```ignore
/// let group = TaskGroup::new(&handle);
/// group.spawn(async move { pump(socket).await; });
///
/// // Destroys the pump task and closes the socket it owned.
/// drop(group);
/// ```
pub struct TaskGroup {
    members: Members,
    handle: Handle,
}

impl TaskGroup {
    pub fn new(handle: &Handle) -> Self {
        Self {
            members: Rc::new(RefCell::new(Slab::new())),
            handle: handle.clone(),
        }
    }

    /// Spawns `future` as a member of this group.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let key = self.members.borrow_mut().insert(None);
        let link = Link {
            members: Rc::downgrade(&self.members),
            key,
        };

        let id = self.handle.spawn_boxed(Box::pin(async move {
            let _link = link;
            future.await;
        }));

        if let Some(slot) = self.members.borrow_mut().get_mut(key) {
            *slot = Some(id);
        }

        id
    }

    /// Number of member tasks that have not finished.
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Destroys every member task.
    pub fn cancel_all(&self) {
        let members = self.members.borrow_mut().drain();

        if !members.is_empty() {
            trace!(count = members.len(), "cancelling task group");
        }

        for id in members.into_iter().flatten() {
            self.handle.cancel(id);
        }
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
