#![forbid(unsafe_code)]

//! Owned objects with non-owning handles that notice destruction.
//!
//! # Design
//!
//! [`Tracked<T>`] owns its value in a reference-counted cell together with a
//! `moved` and a `before_destroyed` signal. [`TrackingPtr<T>`] and
//! [`TrackingRef<T>`] hold `Weak` pointers to that cell, so they follow the
//! object across Rust moves and across [`Tracked::relocate`], and report
//! themselves dangling once the owner is dropped.
//!
//! Access through a handle never panics on a dead target: accessors return
//! `Option`, and the `try_*` forms return [`TrackingError`].
//!
//! | Handle           | Nullable | Created from                 |
//! |------------------|----------|------------------------------|
//! | `TrackingPtr<T>` | yes      | `Tracked::track`, `null()`   |
//! | `TrackingRef<T>` | no       | `Tracked::track_ref` only    |

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use weft_core::{Connection, Signal};

use crate::error::TrackingError;
use crate::observer::Observer;
use crate::track::{Track, Trackable};

struct TrackedInner<T: 'static> {
    value: RefCell<T>,
    moved: Signal<Tracked<T>>,
    before_destroyed: Signal<()>,
}

impl<T: 'static> TrackedInner<T> {
    fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            moved: Signal::new(),
            before_destroyed: Signal::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracked
// ---------------------------------------------------------------------------

/// An owned value that tracking handles can point at.
pub struct Tracked<T: 'static> {
    inner: Rc<TrackedInner<T>>,
}

impl<T: 'static> Tracked<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(TrackedInner::new(value)),
        }
    }

    /// Build the value with a tracking pointer to itself.
    ///
    /// The pointer cannot be dereferenced (and connecting through it yields
    /// inactive connections) until `init` has returned; store it for later.
    pub fn new_cyclic(init: impl FnOnce(TrackingPtr<T>) -> T) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<TrackedInner<T>>| {
            TrackedInner::new(init(TrackingPtr::from_weak(weak.clone())))
        });
        Self { inner }
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.value.borrow_mut()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.inner.value.borrow_mut())
    }

    /// Swap in `value`, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.inner.value.replace(value)
    }

    /// A nullable handle to this object.
    pub fn track(&self) -> TrackingPtr<T> {
        TrackingPtr::from_weak(Rc::downgrade(&self.inner))
    }

    /// A non-nullable handle to this object.
    pub fn track_ref(&self) -> TrackingRef<T> {
        TrackingRef { ptr: self.track() }
    }

    /// Emitted with the new owner after [`relocate`](Self::relocate).
    pub fn moved(&self) -> &Signal<Tracked<T>> {
        &self.inner.moved
    }

    /// Emitted when the owner is dropped, while the value is still readable.
    pub fn before_destroyed(&self) -> &Signal<()> {
        &self.inner.before_destroyed
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Default + 'static> Tracked<T> {
    /// Move this object's identity into a new owner.
    ///
    /// Handles keep pointing at the returned owner; `self` is left with a
    /// fresh default value that no handle refers to.
    #[must_use = "dropping the relocated object destroys it"]
    pub fn relocate(&mut self) -> Tracked<T> {
        let inner = std::mem::replace(&mut self.inner, Rc::new(TrackedInner::new(T::default())));
        let relocated = Tracked { inner };
        relocated.inner.moved.emit(&relocated);
        relocated
    }
}

impl<T: 'static> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.inner.before_destroyed.emit(&());
    }
}

impl<T: 'static> Track for Tracked<T> {
    type Handle = TrackingPtr<T>;

    fn track(&self) -> TrackingPtr<T> {
        Tracked::track(self)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(value) => f.debug_tuple("Tracked").field(&*value).finish(),
            Err(_) => f.write_str("Tracked(<borrowed>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackingPtr
// ---------------------------------------------------------------------------

/// Nullable, non-owning handle to a [`Tracked`] object.
///
/// Two pointers compare equal when they target the same live object or when
/// both are dangling.
pub struct TrackingPtr<T: 'static> {
    target: Option<Weak<TrackedInner<T>>>,
}

impl<T: 'static> TrackingPtr<T> {
    /// A pointer that targets nothing.
    #[must_use]
    pub const fn null() -> Self {
        Self { target: None }
    }

    fn from_weak(weak: Weak<TrackedInner<T>>) -> Self {
        Self { target: Some(weak) }
    }

    fn upgrade(&self) -> Option<Rc<TrackedInner<T>>> {
        self.target.as_ref()?.upgrade()
    }

    /// Whether the pointer was created null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    /// Whether there is no live target (null pointers included).
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        self.target
            .as_ref()
            .is_none_or(|weak| weak.strong_count() == 0)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.upgrade()?;
        let value = inner.value.borrow();
        Some(f(&*value))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let inner = self.upgrade()?;
        let mut value = inner.value.borrow_mut();
        Some(f(&mut *value))
    }

    /// Like [`with`](Self::with), reporting why access failed.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, TrackingError> {
        let inner = self.upgrade().ok_or(TrackingError::Dangling)?;
        let value = inner
            .value
            .try_borrow()
            .map_err(|_| TrackingError::Borrowed)?;
        Ok(f(&*value))
    }

    /// Like [`with_mut`](Self::with_mut), reporting why access failed.
    pub fn try_with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, TrackingError> {
        let inner = self.upgrade().ok_or(TrackingError::Dangling)?;
        let mut value = inner
            .value
            .try_borrow_mut()
            .map_err(|_| TrackingError::Borrowed)?;
        Ok(f(&mut *value))
    }

    /// Whether this pointer targets `object`.
    #[must_use]
    pub fn points_to(&self, object: &Tracked<T>) -> bool {
        self.upgrade()
            .is_some_and(|inner| Rc::ptr_eq(&inner, &object.inner))
    }

    /// Whether both pointers target the same live object. Unlike `==`, two
    /// dangling pointers are not identical.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.upgrade(), other.upgrade()) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    /// Call `slot` when the target is about to be destroyed. Inactive if the
    /// pointer is dangling.
    pub fn connect_before_destroyed(&self, slot: impl Fn() + 'static) -> Connection {
        self.upgrade().map_or_else(Connection::default, |inner| {
            inner.before_destroyed.connect(move |()| slot())
        })
    }

    /// Call `slot` with the new owner when the target is relocated. Inactive
    /// if the pointer is dangling.
    pub fn connect_moved(&self, slot: impl Fn(&Tracked<T>) + 'static) -> Connection {
        self.upgrade()
            .map_or_else(Connection::default, |inner| inner.moved.connect(slot))
    }
}

impl<T: Clone + 'static> TrackingPtr<T> {
    /// A copy of the target's value.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.with(T::clone)
    }
}

impl<T: 'static> Default for TrackingPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: 'static> Clone for TrackingPtr<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<T: 'static> PartialEq for TrackingPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.upgrade(), other.upgrade()) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: 'static> Eq for TrackingPtr<T> {}

impl<T: 'static> PartialEq<Tracked<T>> for TrackingPtr<T> {
    fn eq(&self, other: &Tracked<T>) -> bool {
        self.points_to(other)
    }
}

impl<T: 'static> From<&Tracked<T>> for TrackingPtr<T> {
    fn from(object: &Tracked<T>) -> Self {
        object.track()
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for TrackingPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("TrackingPtr(null)");
        }
        match self.try_with(|value| format!("{value:?}")) {
            Ok(value) => write!(f, "TrackingPtr({value})"),
            Err(TrackingError::Dangling) => f.write_str("TrackingPtr(<dangling>)"),
            Err(TrackingError::Borrowed) => f.write_str("TrackingPtr(<borrowed>)"),
        }
    }
}

impl<T: 'static> Trackable for TrackingPtr<T> {
    type Value = T;

    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.with(f)
    }

    fn watch(&self, observer: &mut Observer) {
        if let Some(inner) = self.upgrade() {
            observer.forward_destroyed(&inner.before_destroyed);
        }
    }

    fn is_dangling(&self) -> bool {
        TrackingPtr::is_dangling(self)
    }
}

impl<T: 'static> Track for TrackingPtr<T> {
    type Handle = Self;

    fn track(&self) -> Self {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// TrackingRef
// ---------------------------------------------------------------------------

/// Non-nullable, non-owning handle to a [`Tracked`] object.
///
/// Only obtainable from a live object, so it starts out valid; it still
/// dangles once the object is dropped.
pub struct TrackingRef<T: 'static> {
    ptr: TrackingPtr<T>,
}

impl<T: 'static> TrackingRef<T> {
    pub fn new(object: &Tracked<T>) -> Self {
        object.track_ref()
    }

    #[must_use]
    pub fn is_dangling(&self) -> bool {
        self.ptr.is_dangling()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.ptr.with(f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.ptr.with_mut(f)
    }

    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, TrackingError> {
        self.ptr.try_with(f)
    }

    pub fn try_with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, TrackingError> {
        self.ptr.try_with_mut(f)
    }

    #[must_use]
    pub fn points_to(&self, object: &Tracked<T>) -> bool {
        self.ptr.points_to(object)
    }

    pub fn connect_before_destroyed(&self, slot: impl Fn() + 'static) -> Connection {
        self.ptr.connect_before_destroyed(slot)
    }

    pub fn connect_moved(&self, slot: impl Fn(&Tracked<T>) + 'static) -> Connection {
        self.ptr.connect_moved(slot)
    }

    /// The underlying nullable pointer.
    pub fn as_ptr(&self) -> &TrackingPtr<T> {
        &self.ptr
    }
}

impl<T: Clone + 'static> TrackingRef<T> {
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.ptr.get()
    }
}

impl<T: 'static> Clone for TrackingRef<T> {
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr.clone(),
        }
    }
}

impl<T: 'static> PartialEq for TrackingRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: 'static> PartialEq<Tracked<T>> for TrackingRef<T> {
    fn eq(&self, other: &Tracked<T>) -> bool {
        self.ptr.points_to(other)
    }
}

impl<T: 'static> From<TrackingRef<T>> for TrackingPtr<T> {
    fn from(reference: TrackingRef<T>) -> Self {
        reference.ptr
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for TrackingRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_with(|value| format!("{value:?}")) {
            Ok(value) => write!(f, "TrackingRef({value})"),
            Err(TrackingError::Dangling) => f.write_str("TrackingRef(<dangling>)"),
            Err(TrackingError::Borrowed) => f.write_str("TrackingRef(<borrowed>)"),
        }
    }
}

impl<T: 'static> Trackable for TrackingRef<T> {
    type Value = T;

    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.ptr.with(f)
    }

    fn watch(&self, observer: &mut Observer) {
        self.ptr.watch(observer);
    }

    fn is_dangling(&self) -> bool {
        self.ptr.is_dangling()
    }
}

impl<T: 'static> Track for TrackingRef<T> {
    type Handle = Self;

    fn track(&self) -> Self {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
