//! Labels are the key, value pairs that sit inside each `metric::Sample`. Think
//! of it as a specialized map. Identically named samples from different rails
//! or services are told apart by their labels, and the sorted order of the pairs
//! is what makes a series key stable from run to run.

use std::iter::FromIterator;
use std::slice::Iter;

/// The label key, value collection. Behaves similarly to
/// `std::collections::BTreeMap` but with a specialized implementation for fast
/// searching over a small collection. Pairs are always sorted by key and keys
/// are unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels {
    inner: Vec<(String, String)>,
}

impl Labels {
    /// Iterate the pairs in key order.
    pub fn iter(&self) -> Iter<(String, String)> {
        self.inner.iter()
    }

    /// Get a value from the labels, if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.inner.binary_search_by(|probe| probe.0.as_str().cmp(key)) {
            Ok(idx) => Some(&self.inner[idx].1),
            Err(_) => None,
        }
    }

    /// Insert a key / value into self
    ///
    /// This method will return the value previously stored under the given key,
    /// if there was such a value.
    pub fn insert<K, V>(&mut self, key: K, val: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let val = val.into();
        match self.inner.binary_search_by(|probe| probe.0.cmp(&key)) {
            Ok(idx) => Some(std::mem::replace(&mut self.inner[idx].1, val)),
            Err(idx) => {
                self.inner.insert(idx, (key, val));
                None
            }
        }
    }

    /// Determine if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Return the total number of key / value pairs.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a (String, String);
    type IntoIter = Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Labels {
        let mut labels = Labels::default();
        for (k, v) in iter {
            labels.insert(k, v);
        }
        labels
    }
}
