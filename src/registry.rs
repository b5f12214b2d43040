use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// String-keyed factory table used for the runtime selection of solvers,
/// preconditioners, smoothers, and processor agglomerators.
///
/// Registries are built by explicit registration calls (see the `standard()`
/// constructors in the component modules) rather than global statics, so the
/// set of available types is always visible at the construction site and can
/// be extended by callers before lookup.
pub struct Registry<F> {
    family: &'static str,
    entries: BTreeMap<&'static str, F>,
}

impl<F> Registry<F> {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &'static str, factory: F) {
        self.entries.insert(name, factory);
    }

    /// Looks a factory up by name. Unknown names fail with the full list of
    /// registered alternatives; there is no silent fallback to a default.
    pub fn get(&self, name: &str) -> Result<&F, UnknownTypeError> {
        self.entries.get(name).ok_or_else(|| UnknownTypeError {
            family: self.family,
            requested: name.to_string(),
            known: self.names(),
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}

/// Configuration error: a registry was asked for a type name that was never
/// registered. Reported at construction time, before any solve begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTypeError {
    pub family: &'static str,
    pub requested: String,
    pub known: Vec<&'static str>,
}

impl fmt::Display for UnknownTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown {} type '{}', valid {} types are: {}",
            self.family,
            self.requested,
            self.family,
            self.known.join(", ")
        )
    }
}

impl Error for UnknownTypeError {}
