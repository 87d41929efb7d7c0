#![forbid(unsafe_code)]

//! Value providers computed from tracked inputs.
//!
//! # Design
//!
//! A [`Binding`] owns weak handles to its inputs, a pure function over their
//! values and an [`Observer`] subscribed to every input. It never caches: the
//! property it backs does that, and calls [`ValueProvider::get`] when it needs
//! a fresh value.
//!
//! Notifications from the inputs are folded per batch. The first
//! `value_changing` seen in a batch is forwarded to the property; later ones
//! are swallowed. A `value_changed` is forwarded only if it answers a
//! forwarded `value_changing`, so an input reached through several paths
//! produces one update.
//!
//! # Failure Modes
//!
//! - **Input destroyed**: the binding reports itself invalid and the property
//!   detaches, keeping its last value.
//! - **Input already gone when evaluated**: `get` returns `None`.

use std::rc::Rc;

use crate::batch::EpochFlag;
use crate::observer::Observer;
use crate::provider::{Callback, ValueProvider};
use crate::track::{Track, Trackable};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A tuple of [`Trackable`] handles that can feed a function `F`.
///
/// Implemented for tuples of one to eight handles.
pub trait Inputs<F, T>: 'static {
    /// Apply `function` to the current values, or `None` if any input is
    /// gone.
    fn apply(&self, function: &F) -> Option<T>;

    /// Subscribe `observer` to every input.
    fn watch(&self, observer: &mut Observer);
}

/// A tuple of references to [`Track`] sources, turned into [`Inputs`].
pub trait Sources {
    type Handles;

    fn track_all(self) -> Self::Handles;
}

macro_rules! nest_values {
    ($function:ident; $($done:ident)*; ) => {
        Some($function($($done),*))
    };
    ($function:ident; $($done:ident)*; $head:ident $($rest:ident)*) => {
        $head
            .with_value(|$head| nest_values!($function; $($done)* $head; $($rest)*))
            .flatten()
    };
}

macro_rules! impl_inputs {
    ($($ty:ident $var:ident),+) => {
        impl<F, T, $($ty),+> Inputs<F, T> for ($($ty,)+)
        where
            $($ty: Trackable,)+
            F: Fn($(&$ty::Value),+) -> T + 'static,
            T: 'static,
        {
            fn apply(&self, function: &F) -> Option<T> {
                let ($($var,)+) = self;
                nest_values!(function; ; $($var)+)
            }

            fn watch(&self, observer: &mut Observer) {
                let ($($var,)+) = self;
                $( $var.watch(observer); )+
            }
        }

        impl<'a, $($ty),+> Sources for ($(&'a $ty,)+)
        where
            $($ty: Track,)+
        {
            type Handles = ($($ty::Handle,)+);

            fn track_all(self) -> Self::Handles {
                let ($($var,)+) = self;
                ($($var.track(),)+)
            }
        }
    };
}

impl_inputs!(A a);
impl_inputs!(A a, B b);
impl_inputs!(A a, B b, C c);
impl_inputs!(A a, B b, C c, D d);
impl_inputs!(A a, B b, C c, D d, E e);
impl_inputs!(A a, B b, C c, D d, E e, G g);
impl_inputs!(A a, B b, C c, D d, E e, G g, H h);
impl_inputs!(A a, B b, C c, D d, E e, G g, H h, J j);

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// A [`ValueProvider`] computing `function(inputs...)`.
pub struct Binding<I, F> {
    inputs: I,
    function: F,
    observer: Observer,
    pending: Rc<EpochFlag>,
}

impl<I, F> Binding<I, F> {
    /// Bind `function` to already-tracked `inputs`.
    pub fn new<T>(function: F, inputs: I) -> Self
    where
        I: Inputs<F, T>,
    {
        let mut observer = Observer::new();
        inputs.watch(&mut observer);
        let pending = Rc::new(EpochFlag::default());
        let flag = Rc::clone(&pending);
        observer.set_changing_callback(move || {
            flag.raise();
        });
        Self {
            inputs,
            function,
            observer,
            pending,
        }
    }

    /// Number of input signal subscriptions held.
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.observer.len()
    }
}

impl<T, I, F> ValueProvider<T> for Binding<I, F>
where
    I: Inputs<F, T>,
{
    fn get(&self) -> Option<T> {
        self.inputs.apply(&self.function)
    }

    fn set_changing_callback(&mut self, callback: Callback) {
        let pending = Rc::clone(&self.pending);
        self.observer.set_changing_callback(move || {
            if pending.raise() {
                callback();
            }
        });
    }

    fn set_updated_callback(&mut self, callback: Callback) {
        let pending = Rc::clone(&self.pending);
        self.observer.set_changed_callback(move || {
            if pending.take() {
                callback();
            }
        });
    }

    fn set_before_invalid_callback(&mut self, callback: Callback) {
        self.observer.set_destroyed_callback(callback);
    }
}

impl<I, F> std::fmt::Debug for Binding<I, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("subscriptions", &self.observer.len())
            .finish()
    }
}

/// Box a [`Binding`] of `function` over `sources`.
///
/// `sources` is a tuple of references to anything [`Track`]:
/// [`Property`](crate::Property), [`PropertyRef`](crate::PropertyRef),
/// [`Tracked`](crate::Tracked) and the tracking handles.
///
/// ```
/// use weft_reactive::{make_binding, Property};
///
/// let first = Property::new(String::from("Ada"));
/// let last = Property::new(String::from("Lovelace"));
/// let full = Property::new(String::new());
/// full.bind(make_binding(
///     |f: &String, l: &String| format!("{f} {l}"),
///     (&first, &last),
/// ));
/// assert_eq!(full.get(), "Ada Lovelace");
/// ```
pub fn make_binding<T, S, F>(function: F, sources: S) -> Box<dyn ValueProvider<T>>
where
    S: Sources,
    S::Handles: Inputs<F, T>,
    F: 'static,
    T: 'static,
{
    Box::new(Binding::new(function, sources.track_all()))
}
