//! Attributes that may defer to a parent entity
//!
//! Profiles inherit from distros (or other profiles) and systems inherit
//! from profiles. The remote service resolves the chain; this side only
//! records whether a field is meant to inherit.

/// A field value that is either set explicitly or inherited from the parent.
///
/// An inherited value carries no data for write purposes. Reads may still
/// fill in `resolved` with whatever the server computed, for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inheritable<T> {
    /// Value supplied by the user (or read back as explicit)
    Explicit(T),
    /// Defer to the parent entity
    Inherited { resolved: Option<T> },
}

impl<T> Inheritable<T> {
    /// Build the wrapper from a desired value and the resolved inherit intent.
    pub fn resolve(desired: T, want_inherit: bool) -> Self {
        if want_inherit {
            Self::Inherited { resolved: None }
        } else {
            Self::Explicit(desired)
        }
    }

    /// An inherited value with nothing resolved.
    pub fn inherited() -> Self {
        Self::Inherited { resolved: None }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Self::Inherited { .. })
    }

    /// The explicit value, if any. Never returns a resolved parent value.
    pub fn explicit(&self) -> Option<&T> {
        match self {
            Self::Explicit(v) => Some(v),
            Self::Inherited { .. } => None,
        }
    }

    /// The value in effect: explicit, or whatever the server resolved.
    pub fn effective(&self) -> Option<&T> {
        match self {
            Self::Explicit(v) => Some(v),
            Self::Inherited { resolved } => resolved.as_ref(),
        }
    }

    /// Split into `(value, is_inherited)` for desired-state output.
    ///
    /// An inherited field always yields `zero`, never the resolved value,
    /// so a field declared as "inherit" reads back as "inherit".
    pub fn unwrap_with(self, zero: T) -> (T, bool) {
        match self {
            Self::Explicit(v) => (v, false),
            Self::Inherited { .. } => (zero, true),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Inheritable<U> {
        match self {
            Self::Explicit(v) => Inheritable::Explicit(f(v)),
            Self::Inherited { resolved } => Inheritable::Inherited {
                resolved: resolved.map(f),
            },
        }
    }
}

impl<T: Default> Inheritable<T> {
    /// Like [`Inheritable::unwrap_with`] using `T::default()` as the zero value.
    pub fn unwrap_or_zero(self) -> (T, bool) {
        self.unwrap_with(T::default())
    }
}

/// Resolve the inherit intent of a field for this pass.
///
/// A stored inherit flag stays set until something clears it, so when the
/// user supplies a new concrete value in the same pass the flag is stale:
/// the new value wins.
pub fn is_option_inherited(inherit_flag: bool, value_changed: bool) -> bool {
    inherit_flag && !value_changed
}
