//! The tag set of a point and its canonical encoding.
use std::collections::{BTreeMap, btree_map};
use std::fmt;

use crate::escape::{self, EscapeClass};

/// Tag keys mapped to tag values.
///
/// Tags are always iterated, and therefore always serialized, in ascending
/// byte order of their keys. That order is the canonical form used by
/// [`Tags::hash_key`] and the series key of a point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value of `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the sorted, escaped `,key=value` sequence of every tag.
    ///
    /// ```
    /// use tsdb_points::Tags;
    ///
    /// let tags = Tags::from([("region", "uswest"), ("host", "serverA")]);
    /// assert_eq!(tags.hash_key(), b",host=serverA,region=uswest");
    /// ```
    pub fn hash_key(&self) -> Vec<u8> {
        let mut key = String::with_capacity(self.encoded_len());
        // writing into a String cannot fail
        let _ = self.write_hash_key(&mut key);
        key.into_bytes()
    }

    /// Appends the output of [`Self::hash_key`] to `w`.
    pub fn write_hash_key<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        for (k, v) in &self.0 {
            w.write_char(',')?;
            escape::write_escaped(w, k, EscapeClass::TagKeyOrValue)?;
            w.write_char('=')?;
            escape::write_escaped(w, v, EscapeClass::TagKeyOrValue)?;
        }
        Ok(())
    }

    /// Length of the unescaped encoding, a lower bound used to size buffers.
    pub(crate) fn encoded_len(&self) -> usize {
        self.0.iter().map(|(k, v)| k.len() + v.len() + 2).sum()
    }
}

impl<K, V> FromIterator<(K, V)> for Tags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Tags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Tags {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_key_is_sorted() {
        let tags = Tags::from([
            ("foo", "bar"),
            ("apple", "orange"),
            ("host", "serverA"),
            ("region", "uswest"),
        ]);

        assert_eq!(
            String::from_utf8(tags.hash_key()).unwrap(),
            ",apple=orange,foo=bar,host=serverA,region=uswest"
        );
    }

    #[test]
    fn hash_key_ignores_insertion_order() {
        let mut a = Tags::new();
        a.insert("region", "uswest");
        a.insert("host", "serverA");

        let mut b = Tags::new();
        b.insert("host", "serverA");
        b.insert("region", "uswest");

        assert_eq!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn hash_key_orders_by_key_bytes_only() {
        let tags = Tags::from([("b", "a"), ("a", "z"), ("B", "y")]);
        assert_eq!(tags.hash_key(), b",B=y,a=z,b=a");
    }

    #[test]
    fn hash_key_escapes() {
        let tags = Tags::from([("tag,bar", "value=foo"), ("tag bar", "x y")]);
        assert_eq!(
            String::from_utf8(tags.hash_key()).unwrap(),
            r",tag\ bar=x\ y,tag\,bar=value\=foo"
        );
    }

    #[test]
    fn empty_tags_have_empty_hash_key() {
        assert!(Tags::new().hash_key().is_empty());
    }

    #[test]
    fn lookups() {
        let tags = Tags::from([("host", "serverA")]);
        assert_eq!(tags.get("host"), Some("serverA"));
        assert_eq!(tags.get("region"), None);
        assert!(tags.contains_key("host"));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec![("host", "serverA")]);
    }
}
