use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;
use std::sync::Weak;

/// A convenience type alias for [Arc<RwLock<T>>].
///
/// # Example
///
/// ```
/// use psyir::shared::Shared;
///
/// let lock: Shared<i32> = Shared::new(42.into());
/// assert_eq!(*lock.read(), 42);
/// ```
/// can also be used together with [SharedExt].
pub type Shared<T> = Arc<RwLock<T>>;

/// Non-owning counterpart of [Shared].
///
/// Used for back-references such as a node's parent or an argument's owning
/// call, so that the tree never owns itself.
pub type WeakShared<T> = Weak<RwLock<T>>;

/// A convenience trait around [RwLock].
///
/// The pipeline is single-threaded so any contention on a lock is a logic
/// error. Instead of hanging, the accessors crash at the offending call site.
///
/// # Example
///
/// ```
/// use psyir::shared::Shared;
/// use psyir::shared::SharedExt;
///
/// let lock: Shared<i32> = Shared::new(42.into());
/// assert_eq!(*lock.rd(), 42);
/// *lock.wr() = 43;
/// assert_eq!(*lock.rd(), 43);
/// ```
pub trait SharedExt<T: ?Sized> {
    /// Convenience method for reading.
    fn rd(&self) -> RwLockReadGuard<'_, T>;
    /// Convenience method for writing.
    fn wr(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T: ?Sized> SharedExt<T> for Shared<T> {
    fn rd(&self) -> RwLockReadGuard<'_, T> {
        self.try_read().expect("lock is held for writing")
    }
    fn wr(&self) -> RwLockWriteGuard<'_, T> {
        self.try_write().expect("lock is already held")
    }
}

#[test]
fn test_shared() {
    let lock: Shared<i32> = Shared::new(42.into());
    {
        let first = lock.rd();
        let second = lock.rd();
        assert_eq!(*first + *second, 84);
    }
    *lock.wr() += 1;
    assert_eq!(*lock.rd(), 43);
    let weak: WeakShared<i32> = Arc::downgrade(&lock);
    assert_eq!(*weak.upgrade().unwrap().rd(), 43);
}
