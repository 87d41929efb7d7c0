#![forbid(unsafe_code)]

//! Observable value cells.
//!
//! # Design
//!
//! A [`Property<T>`] is the sole owner of a reference-counted cell holding the
//! value, an optional [`ValueProvider`] and four signals. Dependents
//! (bindings, observers, [`PropertyRef`]s) hold `Weak` pointers to the cell,
//! so the logical identity of a property is its cell. Moving a `Property`
//! value in Rust does not disturb dependents at all; [`Property::relocate`]
//! hands the identity to a new owner explicitly and announces it on `moved`.
//!
//! Bound properties are lazy. An input change marks the cell dirty and the
//! provider is only consulted when the value is read (or forced with
//! [`Property::materialize`]).
//!
//! Change notification has two phases. `value_changing` is emitted before a
//! batch of updates settles and `value_changed` once the new value is known.
//! A bound property forwards `value_changing` at most once per batch and
//! emits `value_changed` only if its value actually changed, so in diamond
//! shaped graphs every `value_changed` observer reads a consistent graph.
//!
//! # Invariants
//!
//! 1. `value_changed` is emitted only if the value changed, or on every
//!    update for properties created with [`Property::always_notify`].
//! 2. A property with a provider reads through the provider whenever it is
//!    dirty; one without a provider is never dirty.
//! 3. `before_destroyed` fires with the final value before the provider is
//!    released and before any dependent handle dangles.
//!
//! # Failure Modes
//!
//! - **Provider returns `None`**: the previous value is kept and no change
//!   is reported.
//! - **Provider panics**: the panic propagates to the reader. The dirty flag
//!   stays set so the next read retries.
//! - **Cyclic bindings**: unsupported; reading a property from inside its
//!   own provider panics on the `RefCell` borrow.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use weft_core::{Signal, diagnostics};

use crate::batch::{self, EpochFlag};
use crate::property_ref::PropertyRef;
use crate::provider::{Callback, ValueProvider};
use crate::track::Track;

type Equality<T> = fn(&T, &T) -> bool;

fn equality<T: PartialEq>() -> Equality<T> {
    |a, b| a == b
}

// ---------------------------------------------------------------------------
// PropertyCell
// ---------------------------------------------------------------------------

/// Shared interior of a [`Property`].
pub(crate) struct PropertyCell<T: 'static> {
    value: RefCell<T>,
    provider: RefCell<Option<Box<dyn ValueProvider<T>>>>,
    eq: Option<Equality<T>>,
    /// The provider may hold a newer value than `value`.
    dirty: Cell<bool>,
    /// `value_changing` was forwarded in the current batch and the matching
    /// `value_changed` is still outstanding.
    changing: EpochFlag,
    /// `value` differs from the one last reported on `value_changed`.
    modified: Cell<bool>,
    pub(crate) value_changing: Signal<()>,
    pub(crate) value_changed: Signal<T>,
    pub(crate) moved: Signal<Property<T>>,
    pub(crate) before_destroyed: Signal<T>,
}

impl<T: 'static> PropertyCell<T> {
    fn new(value: T, eq: Option<Equality<T>>) -> Self {
        Self {
            value: RefCell::new(value),
            provider: RefCell::new(None),
            eq,
            dirty: Cell::new(false),
            changing: EpochFlag::default(),
            modified: Cell::new(false),
            value_changing: Signal::new(),
            value_changed: Signal::new(),
            moved: Signal::new(),
            before_destroyed: Signal::new(),
        }
    }

    fn differs(&self, current: &T, next: &T) -> bool {
        self.eq.is_none_or(|eq| !eq(current, next))
    }

    /// Pull from the provider if dirty. Returns whether the value changed.
    pub(crate) fn materialize(&self) -> bool {
        if !self.dirty.get() {
            return false;
        }
        let next = {
            let provider = self.provider.borrow();
            let Some(provider) = provider.as_ref() else {
                self.dirty.set(false);
                return false;
            };
            provider.get()
        };
        self.dirty.set(false);
        match next {
            Some(next) => self.store(next),
            None => false,
        }
    }

    pub(crate) fn read(&self) -> Ref<'_, T> {
        self.materialize();
        self.value.borrow()
    }

    pub(crate) fn value_for_debug(&self) -> Option<Ref<'_, T>> {
        self.value.try_borrow().ok()
    }

    /// Replace the value if `next` differs from it.
    fn store(&self, next: T) -> bool {
        let changed = self.differs(&self.value.borrow(), &next);
        if !changed {
            return false;
        }
        let previous = std::mem::replace(&mut *self.value.borrow_mut(), next);
        drop(previous);
        self.modified.set(true);
        true
    }

    pub(crate) fn detach(&self) -> bool {
        self.materialize();
        let provider = self.provider.borrow_mut().take();
        let detached = provider.is_some();
        drop(provider);
        detached
    }

    fn notify_changing(&self) {
        if diagnostics::trace_propagation() {
            tracing::trace!(
                receivers = self.value_changing.connection_count(),
                "property value changing"
            );
        }
        self.value_changing.emit(&());
    }

    fn on_input_changing(&self) {
        self.dirty.set(true);
        if self.changing.raise() {
            self.notify_changing();
        }
    }

    fn on_input_invalid(&self) {
        tracing::debug!("property provider invalidated, detaching");
        self.detach();
    }
}

impl<T: Clone + 'static> PropertyCell<T> {
    fn notify_changed(&self) {
        self.modified.set(false);
        let snapshot = self.value.borrow().clone();
        if diagnostics::trace_propagation() {
            tracing::trace!(
                receivers = self.value_changed.connection_count(),
                "property value changed"
            );
        }
        self.value_changed.emit(&snapshot);
    }

    pub(crate) fn assign(&self, value: T) -> bool {
        let _batch = batch::begin();
        self.detach();
        let announced = self.changing.take();
        self.store(value);
        self.finish_change(announced)
    }

    /// Emit `value_changed` if the value differs from the last one reported,
    /// announcing it first unless that already happened in this batch.
    fn finish_change(&self, announced: bool) -> bool {
        if !self.modified.get() {
            return false;
        }
        if !announced {
            self.notify_changing();
        }
        self.notify_changed();
        true
    }

    fn attach(self: &Rc<Self>, mut provider: Box<dyn ValueProvider<T>>) -> bool {
        let _batch = batch::begin();
        self.detach();
        provider.set_changing_callback(self.hook(Self::on_input_changing));
        provider.set_updated_callback(self.hook(Self::on_input_updated));
        provider.set_before_invalid_callback(self.hook(Self::on_input_invalid));
        *self.provider.borrow_mut() = Some(provider);
        tracing::debug!("property provider attached");

        let announced = self.changing.take();
        self.dirty.set(true);
        self.materialize();
        self.finish_change(announced)
    }

    fn on_input_updated(&self) {
        let _batch = batch::begin();
        if !self.changing.take() {
            // Unannounced update: open and close the change in one go.
            self.dirty.set(true);
            self.notify_changing();
        }
        self.materialize();
        if self.modified.get() {
            self.notify_changed();
        }
    }

    fn hook(self: &Rc<Self>, notify: fn(&Self)) -> Callback {
        let cell = Rc::downgrade(self);
        Box::new(move || {
            if let Some(cell) = cell.upgrade() {
                notify(&cell);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// An observable value, optionally computed by a [`ValueProvider`].
///
/// ```
/// use weft_reactive::{make_binding, Property};
///
/// let width = Property::new(3);
/// let height = Property::new(4);
/// let area = Property::new(0);
/// area.bind(make_binding(|w: &i32, h: &i32| w * h, (&width, &height)));
/// assert_eq!(area.get(), 12);
///
/// width.set(5);
/// assert_eq!(area.get(), 20);
/// ```
pub struct Property<T: 'static> {
    cell: Rc<PropertyCell<T>>,
}

impl<T: PartialEq + 'static> Property<T> {
    /// A property that suppresses assignments equal to the current value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_parts(value, Some(equality::<T>()))
    }
}

impl<T: PartialEq + Default + Clone + 'static> Property<T> {
    /// A property backed by `provider` from the start.
    #[must_use]
    pub fn bound(provider: Box<dyn ValueProvider<T>>) -> Self {
        let property = Self::new(T::default());
        property.bind(provider);
        property
    }
}

impl<T: 'static> Property<T> {
    /// A property that notifies on every assignment, equal or not.
    #[must_use]
    pub fn always_notify(value: T) -> Self {
        Self::from_parts(value, None)
    }

    fn from_parts(value: T, eq: Option<Equality<T>>) -> Self {
        Self {
            cell: Rc::new(PropertyCell::new(value, eq)),
        }
    }

    /// Run `f` on the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.cell.read())
    }

    /// Borrow the current value.
    ///
    /// Holding the borrow across an assignment to this property panics.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.read()
    }

    /// Pull a pending value from the provider now. Returns whether the value
    /// changed. No notification is emitted.
    pub fn materialize(&self) -> bool {
        self.cell.materialize()
    }

    /// Materialize, then drop the provider. Returns whether one was attached.
    pub fn detach(&self) -> bool {
        self.cell.detach()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.cell.provider.borrow().is_some()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.cell.dirty.get()
    }

    /// Emitted before the value changes.
    pub fn value_changing(&self) -> &Signal<()> {
        &self.cell.value_changing
    }

    /// Emitted with the new value after it changed.
    pub fn value_changed(&self) -> &Signal<T> {
        &self.cell.value_changed
    }

    /// Emitted with the new owner after [`relocate`](Self::relocate).
    pub fn moved(&self) -> &Signal<Property<T>> {
        &self.cell.moved
    }

    /// Emitted with the final value when the property is dropped.
    pub fn before_destroyed(&self) -> &Signal<T> {
        &self.cell.before_destroyed
    }

    /// A non-owning handle that follows this property's identity.
    pub fn track(&self) -> PropertyRef<T> {
        PropertyRef::new(&self.cell)
    }
}

impl<T: Clone + 'static> Property<T> {
    /// Current value, pulled from the provider if needed.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.read().clone()
    }

    /// Detach any provider and store `value`. Returns whether the value
    /// differs from the one last reported on `value_changed`, in which case
    /// the change is emitted (always `true` for
    /// [`always_notify`](Self::always_notify) properties).
    ///
    /// A pending provider value that detaching pulls in counts as part of
    /// the change.
    pub fn set(&self, value: T) -> bool {
        self.cell.assign(value)
    }

    /// Replace any provider with `provider`. Returns whether the value
    /// differs from the one last reported on `value_changed`.
    pub fn bind(&self, provider: Box<dyn ValueProvider<T>>) -> bool {
        self.cell.attach(provider)
    }
}

impl<T: Default + 'static> Property<T> {
    /// Move this property's identity into a new owner.
    ///
    /// The returned property keeps the value, provider, signal connections and
    /// every dependent. `self` is left holding a fresh default property that
    /// nothing depends on. `moved` fires on the new owner.
    #[must_use = "dropping the relocated property destroys it"]
    pub fn relocate(&mut self) -> Property<T> {
        let fresh = Rc::new(PropertyCell::new(T::default(), self.cell.eq));
        let cell = std::mem::replace(&mut self.cell, fresh);
        let relocated = Property { cell };
        relocated.cell.moved.emit(&relocated);
        relocated
    }
}

impl<T: PartialEq + Default + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> Track for Property<T> {
    type Handle = PropertyRef<T>;

    fn track(&self) -> PropertyRef<T> {
        Property::track(self)
    }
}

impl<T: 'static> Drop for Property<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.cell.materialize();
        }
        {
            let value = self.cell.value.borrow();
            self.cell.before_destroyed.emit(&value);
        }
        let provider = self.cell.provider.borrow_mut().take();
        drop(provider);
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Property");
        match self.cell.value_for_debug() {
            Some(value) => s.field("value", &*value),
            None => s.field("value", &"<borrowed>"),
        };
        s.field("bound", &self.is_bound())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make_binding;

    fn count_changes<T: Clone + 'static>(property: &Property<T>) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        let _ = property
            .value_changed()
            .connect(move |_| handle.set(handle.get() + 1));
        count
    }

    /// Provider driven by hand from the test.
    #[derive(Default)]
    struct Manual {
        value: Rc<Cell<Option<i32>>>,
        updated: Rc<RefCell<Option<Callback>>>,
        invalid: Rc<RefCell<Option<Callback>>>,
    }

    impl ValueProvider<i32> for Manual {
        fn get(&self) -> Option<i32> {
            self.value.get()
        }

        fn set_updated_callback(&mut self, callback: Callback) {
            *self.updated.borrow_mut() = Some(callback);
        }

        fn set_before_invalid_callback(&mut self, callback: Callback) {
            *self.invalid.borrow_mut() = Some(callback);
        }
    }

    fn fire(slot: &Rc<RefCell<Option<Callback>>>) {
        if let Some(callback) = slot.borrow().as_ref() {
            callback();
        }
    }

    #[test]
    fn equal_assignment_is_suppressed() {
        let property = Property::new(5);
        let changes = count_changes(&property);
        assert!(!property.set(5));
        assert_eq!(changes.get(), 0);
        assert!(property.set(6));
        assert_eq!(changes.get(), 1);
        assert_eq!(property.get(), 6);
    }

    #[test]
    fn always_notify_reports_every_assignment() {
        let property = Property::always_notify(5);
        let changes = count_changes(&property);
        assert!(property.set(5));
        assert!(property.set(5));
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn changing_precedes_changed() {
        let property = Property::new(String::from("a"));
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            let _ = property
                .value_changing()
                .connect(move |()| log.borrow_mut().push("changing".to_string()));
        }
        {
            let log = Rc::clone(&log);
            let _ = property
                .value_changed()
                .connect(move |v| log.borrow_mut().push(format!("changed:{v}")));
        }
        property.set("b".into());
        assert_eq!(*log.borrow(), ["changing", "changed:b"]);
    }

    #[test]
    fn handler_may_assign_the_property_it_observes() {
        let property = Rc::new(Property::new(0));
        {
            let weak = Rc::downgrade(&property);
            let _ = property.value_changed().connect(move |v| {
                if *v < 3 {
                    if let Some(property) = weak.upgrade() {
                        property.set(v + 1);
                    }
                }
            });
        }
        property.set(1);
        assert_eq!(property.get(), 3);
    }

    #[test]
    fn manual_provider_is_lazy() {
        let provider = Manual::default();
        let value = Rc::clone(&provider.value);
        let updated = Rc::clone(&provider.updated);
        value.set(Some(1));
        let property = Property::new(0);
        assert!(property.bind(Box::new(provider)));
        assert_eq!(property.get(), 1);

        value.set(Some(2));
        assert_eq!(property.get(), 1, "no update was reported yet");
        let changes = count_changes(&property);
        fire(&updated);
        assert_eq!(changes.get(), 1);
        assert_eq!(property.get(), 2);
    }

    #[test]
    fn unchanged_provider_update_is_silent() {
        let provider = Manual::default();
        let value = Rc::clone(&provider.value);
        let updated = Rc::clone(&provider.updated);
        value.set(Some(7));
        let property = Property::bound(Box::new(provider));
        let changes = count_changes(&property);
        fire(&updated);
        assert_eq!(changes.get(), 0);
        assert_eq!(property.get(), 7);
    }

    #[test]
    fn provider_returning_none_keeps_previous_value() {
        let provider = Manual::default();
        let value = Rc::clone(&provider.value);
        let updated = Rc::clone(&provider.updated);
        value.set(Some(4));
        let property = Property::bound(Box::new(provider));
        value.set(None);
        let changes = count_changes(&property);
        fire(&updated);
        assert_eq!(property.get(), 4);
        assert_eq!(changes.get(), 0);
        assert!(!property.is_dirty());
    }

    #[test]
    fn invalidated_provider_detaches() {
        let provider = Manual::default();
        let value = Rc::clone(&provider.value);
        let invalid = Rc::clone(&provider.invalid);
        value.set(Some(9));
        let property = Property::bound(Box::new(provider));
        fire(&invalid);
        assert!(!property.is_bound());
        assert_eq!(property.get(), 9);
    }

    #[test]
    fn assignment_detaches_provider() {
        let source = Property::new(2);
        let target = Property::new(0);
        target.bind(make_binding(|s: &i32| s * 10, (&source,)));
        assert_eq!(target.get(), 20);
        assert!(target.set(1));
        assert!(!target.is_bound());
        source.set(3);
        assert_eq!(target.get(), 1);
    }

    #[test]
    fn detach_keeps_current_value() {
        let source = Property::new(2);
        let target = Property::new(0);
        target.bind(make_binding(|s: &i32| s + 1, (&source,)));
        source.set(10);
        assert!(target.detach());
        assert!(!target.detach());
        assert_eq!(target.get(), 11);
        source.set(20);
        assert_eq!(target.get(), 11);
    }

    #[test]
    fn bound_property_is_dirty_until_read() {
        let source = Property::new(1);
        let target = Property::new(0);
        target.bind(make_binding(|s: &i32| *s, (&source,)));
        assert!(!target.is_dirty());
        source.value_changing().emit(&());
        assert!(target.is_dirty());
        assert_eq!(target.get(), 1);
        assert!(!target.is_dirty());
    }

    fn record_changes(property: &Property<i32>) -> Rc<RefCell<Vec<i32>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _ = property
            .value_changed()
            .connect(move |v| sink.borrow_mut().push(*v));
        seen
    }

    #[test]
    fn assignment_mid_batch_reports_materialized_change() {
        let x = Property::new(1);
        let y = Rc::new(Property::new(0));
        y.bind(make_binding(|x: &i32| x * 10, (&x,)));
        assert_eq!(y.get(), 10);
        let changing = Rc::new(Cell::new(0));
        {
            let counter = Rc::clone(&changing);
            let _ = y
                .value_changing()
                .connect(move |()| counter.set(counter.get() + 1));
        }
        let changed = record_changes(&y);
        let returned = Rc::new(Cell::new(None));
        {
            let y = Rc::clone(&y);
            let returned = Rc::clone(&returned);
            let _ = x.value_changing().connect(move |()| returned.set(Some(y.set(20))));
        }

        x.set(2);
        assert_eq!(returned.get(), Some(true));
        assert_eq!(y.get(), 20);
        assert!(!y.is_bound());
        assert_eq!(changing.get(), 1);
        assert_eq!(*changed.borrow(), [20]);
    }

    #[test]
    fn rebinding_mid_batch_reports_materialized_change() {
        let x = Property::new(1);
        let y = Rc::new(Property::new(0));
        y.bind(make_binding(|x: &i32| x * 10, (&x,)));
        let changed = record_changes(&y);
        {
            let y = Rc::clone(&y);
            let source = x.track();
            let _ = x.value_changing().connect(move |()| {
                y.bind(make_binding(|x: &i32| x * 10, (&source,)));
            });
        }

        x.set(2);
        assert_eq!(y.get(), 20);
        assert!(y.is_bound());
        assert_eq!(*changed.borrow(), [20]);
    }

    #[test]
    fn unreported_lazy_value_is_reported_on_equal_assignment() {
        let source = Property::new(1);
        let target = Property::new(0);
        target.bind(make_binding(|s: &i32| *s, (&source,)));
        let changed = record_changes(&target);
        // Announce without completing: the next read pulls 5 silently.
        *source.cell.value.borrow_mut() = 5;
        source.value_changing().emit(&());
        assert_eq!(target.get(), 5);
        assert!(changed.borrow().is_empty());

        assert!(target.set(5));
        assert_eq!(*changed.borrow(), [5]);
        assert!(!target.set(5));
    }

    #[test]
    fn before_destroyed_carries_final_value() {
        let seen = Rc::new(Cell::new(0));
        {
            let property = Property::new(41);
            let sink = Rc::clone(&seen);
            let _ = property.before_destroyed().connect(move |v| sink.set(*v));
            property.set(42);
        }
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn relocate_hands_identity_to_new_owner() {
        let mut original = Property::new(8);
        let handle = original.track();
        let moved_to = Rc::new(Cell::new(0));
        {
            let sink = Rc::clone(&moved_to);
            let _ = original.moved().connect(move |p: &Property<i32>| sink.set(p.get()));
        }
        let relocated = original.relocate();
        assert_eq!(moved_to.get(), 8);
        assert_eq!(relocated.get(), 8);
        assert_eq!(original.get(), 0);
        assert_eq!(handle.get(), Some(8));
        relocated.set(9);
        assert_eq!(handle.get(), Some(9));
        original.set(100);
        assert_eq!(handle.get(), Some(9));
    }

    #[test]
    fn relocate_keeps_equality_policy() {
        let mut original = Property::always_notify(1);
        let relocated = original.relocate();
        let changes = count_changes(&original);
        original.set(0);
        assert_eq!(changes.get(), 1);
        drop(relocated);
    }

    #[test]
    fn debug_shows_value_and_state() {
        let property = Property::new(3);
        assert_eq!(
            format!("{property:?}"),
            "Property { value: 3, bound: false, dirty: false }"
        );
    }
}
