//! Ordered fallback resolution
//!
//! Replaces "look in A, else B, else C" chains with one list of labelled
//! accessors tried in order. The label of the accessor that answered travels
//! with the value so callers can report where it came from.

/// Value found by a [`FallbackResolver`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<L, T> {
    pub value: T,
    /// Label of the accessor that produced the value
    pub label: L,
    /// Position of that accessor; 0 is the preferred one
    pub rank: usize,
}

impl<L, T> Resolved<L, T> {
    /// Whether a lower-priority accessor had to answer
    pub fn fell_back(&self) -> bool {
        self.rank > 0
    }
}

type Accessor<'a, S, T> = Box<dyn Fn(&S) -> Option<T> + Send + Sync + 'a>;

pub struct FallbackResolver<'a, S: ?Sized, L, T> {
    accessors: Vec<(L, Accessor<'a, S, T>)>,
}

impl<S: ?Sized, L, T> Default for FallbackResolver<'_, S, L, T> {
    fn default() -> Self {
        Self {
            accessors: Vec::new(),
        }
    }
}

impl<'a, S: ?Sized, L: Clone, T> FallbackResolver<'a, S, L, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accessor after the existing ones
    pub fn then<F>(mut self, label: L, accessor: F) -> Self
    where
        F: Fn(&S) -> Option<T> + Send + Sync + 'a,
    {
        self.accessors.push((label, Box::new(accessor)));
        self
    }

    /// First accessor that yields a value
    pub fn resolve(&self, subject: &S) -> Option<Resolved<L, T>> {
        self.accessors
            .iter()
            .enumerate()
            .find_map(|(rank, (label, accessor))| {
                accessor(subject).map(|value| Resolved {
                    value,
                    label: label.clone(),
                    rank,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_first_match_wins() {
        let primary = HashMap::from([("revenue", 10.0)]);
        let resolver = FallbackResolver::new()
            .then("primary", |key: &str| primary.get(key).copied())
            .then("default", |_: &str| Some(0.0));

        let hit = resolver.resolve("revenue").unwrap();
        assert_eq!((hit.value, hit.label, hit.rank), (10.0, "primary", 0));
        assert!(!hit.fell_back());

        let miss = resolver.resolve("ebitda").unwrap();
        assert_eq!(miss.label, "default");
        assert!(miss.fell_back());
    }

    #[test]
    fn test_nothing_found() {
        let resolver: FallbackResolver<'_, str, &str, f64> =
            FallbackResolver::new().then("never", |_| None);
        assert!(resolver.resolve("x").is_none());
        assert_eq!(resolver.len(), 1);
    }
}
