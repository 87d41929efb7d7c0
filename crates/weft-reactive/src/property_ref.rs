#![forbid(unsafe_code)]

//! Non-owning property handles.

use std::fmt;
use std::rc::{Rc, Weak};

use weft_core::Connection;

use crate::observer::Observer;
use crate::property::PropertyCell;
use crate::track::{Track, Trackable};

/// A weak handle to a [`Property`](crate::Property).
///
/// The handle follows the property's identity: it keeps working after the
/// owning `Property` is moved or [relocated](crate::Property::relocate), and
/// dangles once the property is dropped.
pub struct PropertyRef<T: 'static> {
    cell: Weak<PropertyCell<T>>,
}

impl<T: 'static> PropertyRef<T> {
    pub(crate) fn new(cell: &Rc<PropertyCell<T>>) -> Self {
        Self {
            cell: Rc::downgrade(cell),
        }
    }

    fn cell(&self) -> Option<Rc<PropertyCell<T>>> {
        self.cell.upgrade()
    }

    #[must_use]
    pub fn is_dangling(&self) -> bool {
        self.cell.strong_count() == 0
    }

    /// Run `f` on the current value, if the property is still alive.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let cell = self.cell()?;
        let value = cell.read();
        Some(f(&*value))
    }

    /// Whether both handles refer to the same property.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        !self.is_dangling() && Weak::ptr_eq(&self.cell, &other.cell)
    }

    /// Connect to `value_changing`. Returns an inactive connection if the
    /// property is gone.
    pub fn connect_value_changing(&self, slot: impl Fn() + 'static) -> Connection {
        self.cell().map_or_else(Connection::default, |cell| {
            cell.value_changing.connect(move |()| slot())
        })
    }

    /// Connect to `value_changed`. Returns an inactive connection if the
    /// property is gone.
    pub fn connect_value_changed(&self, slot: impl Fn(&T) + 'static) -> Connection {
        self.cell()
            .map_or_else(Connection::default, |cell| cell.value_changed.connect(slot))
    }

    /// Connect to `before_destroyed`. Returns an inactive connection if the
    /// property is gone.
    pub fn connect_before_destroyed(&self, slot: impl Fn(&T) + 'static) -> Connection {
        self.cell().map_or_else(Connection::default, |cell| {
            cell.before_destroyed.connect(slot)
        })
    }
}

impl<T: Clone + 'static> PropertyRef<T> {
    /// Current value, if the property is still alive.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.with(T::clone)
    }

    /// Assign through the handle. `None` if the property is gone, otherwise
    /// whether the value changed.
    pub fn set(&self, value: T) -> Option<bool> {
        self.cell().map(|cell| cell.assign(value))
    }
}

impl<T: 'static> Clone for PropertyRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for PropertyRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(cell) = self.cell() else {
            return f.write_str("PropertyRef(<dangling>)");
        };
        let value = cell.value_for_debug();
        match value {
            Some(value) => f.debug_tuple("PropertyRef").field(&*value).finish(),
            None => f.write_str("PropertyRef(<borrowed>)"),
        }
    }
}

impl<T: 'static> Trackable for PropertyRef<T> {
    type Value = T;

    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.with(f)
    }

    fn watch(&self, observer: &mut Observer) {
        if let Some(cell) = self.cell() {
            observer.forward_changing(&cell.value_changing);
            observer.forward_changed(&cell.value_changed);
            observer.forward_destroyed(&cell.before_destroyed);
        }
    }

    fn is_dangling(&self) -> bool {
        PropertyRef::is_dangling(self)
    }
}

impl<T: 'static> Track for PropertyRef<T> {
    type Handle = Self;

    fn track(&self) -> Self {
        self.clone()
    }
}
