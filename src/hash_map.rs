use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use crate::DefaultHashBuilder;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::OccupiedEntry as TableOccupiedEntry;
use crate::hash_table::VacantEntry as TableVacantEntry;

/// A key-value map backed by the linear-probing [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq`, using a configurable hasher builder `S` (by default
/// [`DefaultHashBuilder`]). The map owns the hasher and the equality
/// relation; the underlying table treats both as opaque capabilities.
///
/// Two semantics differ from `std::collections::HashMap`:
///
/// - [`insert`](HashMap::insert) never overwrites: inserting a present key
///   leaves the stored value untouched and returns `false`. Use the
///   [`entry`](HashMap::entry) API to update in place.
/// - Indexing with `map[&key]` panics on a missing key, which is the only
///   operation that treats absence as an error rather than a sentinel.
///
/// # Examples
///
/// ```rust
/// use probe_map::HashMap;
///
/// let mut map: HashMap<&str, i32> = HashMap::new();
/// map.insert("apple", 3);
/// map.insert("pear", 5);
///
/// assert_eq!(map.get(&"apple"), Some(&3));
/// assert_eq!(map.len(), 2);
///
/// *map.entry("apple").or_default() += 1;
/// assert_eq!(map[&"apple"], 4);
/// ```
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    table: HashTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::DefaultHashBuilder;
    /// use probe_map::HashMap;
    ///
    /// let map: HashMap<i32, i32> = HashMap::with_hasher(DefaultHashBuilder::default());
    /// assert!(map.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a map able to hold at least `capacity` entries without
    /// resizing, with the given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the map can hold before growing.
    ///
    /// Slots tombstoned by removals count against this limit until the next
    /// rehash reclaims them.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the current number of bucket slots (0 or a power of two).
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Returns the number of live entries stored in bucket `index` (0 or 1,
    /// since the table is open-addressed).
    pub fn bucket_size(&self, index: usize) -> usize {
        self.table.bucket_size(index)
    }

    /// Returns the fraction of buckets holding live entries.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Returns the maximum load factor used by the growth trigger
    /// (default 0.5).
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Sets the maximum load factor used by the growth trigger.
    ///
    /// Applies to subsequent insertions; the map is not resized
    /// retroactively.
    pub fn set_max_load_factor(&mut self, factor: f32) {
        self.table.set_max_load_factor(factor);
    }

    /// Removes all entries, keeping the current capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the entries in slot order.
    ///
    /// Slot order is neither insertion order nor key order, and is only
    /// stable between structural mutations.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let mut keys: Vec<i32> = map.iter().map(|(&k, _)| k).collect();
    /// keys.sort_unstable();
    /// assert_eq!(keys, vec![1, 2]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the keys in slot order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values in slot order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator that removes and yields every entry.
    ///
    /// When the iterator is dropped the map is left empty with its capacity
    /// retained, even if not fully consumed.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts a key-value pair if the key is absent.
    ///
    /// Returns `true` if the pair was inserted. If the key is already
    /// present the stored value is left untouched and `false` is returned;
    /// use [`entry`](HashMap::entry) or [`get_mut`](HashMap::get_mut) to
    /// update a present key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// assert!(map.insert(1, "one"));
    /// assert!(!map.insert(1, "uno"));
    /// assert_eq!(map.get(&1), Some(&"one"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let hash_builder = &self.hash_builder;
        let hash = hash_builder.hash_one(&key);
        match self.table.entry(
            hash,
            |entry| entry.0 == key,
            |entry| hash_builder.hash_one(&entry.0),
        ) {
            TableEntry::Occupied(_) => false,
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
                true
            }
        }
    }

    /// Returns a reference to the value associated with `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, |entry| entry.0 == *key)
            .map(|entry| &entry.1)
    }

    /// Returns a mutable reference to the value associated with `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let mut map: HashMap<i32, i32> = HashMap::new();
    /// map.insert(1, 10);
    /// if let Some(value) = map.get_mut(&1) {
    ///     *value += 1;
    /// }
    /// assert_eq!(map[&1], 11);
    /// ```
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, |entry| entry.0 == *key)
            .map(|entry| &mut entry.1)
    }

    /// Returns the stored key-value pair matching `key`.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, |entry| entry.0 == *key)
            .map(|entry| (&entry.0, &entry.1))
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of entries matching `key`: 0 or 1, since keys are
    /// unique.
    pub fn count(&self, key: &K) -> usize {
        if self.contains_key(key) { 1 } else { 0 }
    }

    /// Returns an iterator over the entries matching `key`.
    ///
    /// The range has length 0 or 1, since keys are unique; it exists for
    /// symmetry with multi-map interfaces.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// map.insert(1, "one");
    ///
    /// assert_eq!(map.equal_range(&1).count(), 1);
    /// assert_eq!(map.equal_range(&2).count(), 0);
    /// ```
    pub fn equal_range(&self, key: &K) -> EqualRange<'_, K, V> {
        EqualRange {
            entry: self.get_key_value(key),
        }
    }

    /// Removes `key` from the map, returning its value if it was present.
    ///
    /// The slot is tombstoned, so removal does not relieve load-factor
    /// pressure until the next rehash; capacity is never released by
    /// removal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// map.insert(1, "one");
    ///
    /// assert_eq!(map.remove(&1), Some("one"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes `key` from the map, returning the stored pair if it was
    /// present.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |entry| entry.0 == *key)
    }

    /// Returns a view into the entry for `key`, vacant or occupied.
    ///
    /// Capacity is ensured before probing (even if the key turns out to be
    /// present), so a vacant entry can always be inserted into without
    /// further allocation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let mut map: HashMap<&str, i32> = HashMap::new();
    /// for word in ["a", "b", "a", "c", "a"] {
    ///     *map.entry(word).or_insert(0) += 1;
    /// }
    ///
    /// assert_eq!(map[&"a"], 3);
    /// assert_eq!(map[&"b"], 1);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V> {
        let hash_builder = &self.hash_builder;
        let hash = hash_builder.hash_one(&key);
        match self.table.entry(
            hash,
            |entry| entry.0 == key,
            |entry| hash_builder.hash_one(&entry.0),
        ) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { key, entry }),
        }
    }

    /// Returns the home bucket `key` probes from.
    pub fn bucket(&self, key: &K) -> usize {
        self.table.bucket_of(self.hash_builder.hash_one(key))
    }

    /// Requests capacity for at least `count` live entries at the current
    /// max load factor.
    ///
    /// A no-op if the current capacity already suffices; the map never
    /// shrinks.
    pub fn reserve(&mut self, count: usize) {
        let hash_builder = &self.hash_builder;
        self.table
            .reserve(count, |entry| hash_builder.hash_one(&entry.0));
    }

    /// Requests a bucket array of at least `count` slots, rounded up to a
    /// power of two.
    ///
    /// A no-op if the bucket array is already large enough, except that
    /// `rehash(0)` explicitly clears the map and deallocates its storage.
    /// Any rehash that rebuilds the table reclaims all tombstones.
    pub fn rehash(&mut self, count: usize) {
        let hash_builder = &self.hash_builder;
        self.table
            .rehash(count, |entry| hash_builder.hash_one(&entry.0));
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    S: Default,
{
    /// Creates an empty map with the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let map: HashMap<i32, String> = HashMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map able to hold at least `capacity` entries without
    /// resizing, with the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::HashMap;
    ///
    /// let map: HashMap<i32, String> = HashMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Clone for HashMap<K, V, S>
where
    K: Clone + Hash + Eq,
    V: Clone,
    S: Clone + BuildHasher,
{
    /// Deep-copies the live entries into freshly sized storage.
    ///
    /// Tombstones are never copied: the clone reinserts only live pairs, so
    /// its occupied count equals its length.
    fn clone(&self) -> Self {
        let mut map = Self::with_capacity_and_hasher(self.len(), self.hash_builder.clone());
        map.set_max_load_factor(self.max_load_factor());
        for (key, value) in self.iter() {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

impl<K, V, S> Index<&K> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    /// Returns a reference to the value associated with `key`.
    ///
    /// # Panics
    ///
    /// Panics if the key is absent. Absence on indexed access is a
    /// programming error, not a normal outcome; use
    /// [`get`](HashMap::get) for fallible lookup.
    fn index(&self, key: &K) -> &V {
        self.get(key).expect("key not found")
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        self.reserve(self.len() + iter.size_hint().0);
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

/// A view into a single map entry, which is either vacant or occupied.
///
/// Created by [`HashMap::entry`].
pub enum Entry<'a, K, V> {
    /// The key is present.
    Occupied(OccupiedEntry<'a, K, V>),
    /// The key is absent; the insert slot has been resolved.
    Vacant(VacantEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Inserts `default` if the entry is vacant, then returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant, then returns
    /// a mutable reference to the value.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Inserts the default value if the entry is vacant, then returns a
    /// mutable reference to the value.
    ///
    /// This is the analogue of indexed insertion (`map[key]` in languages
    /// where indexing creates the entry).
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to the entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

/// A view into an occupied map entry.
pub struct OccupiedEntry<'a, K, V> {
    entry: TableOccupiedEntry<'a, (K, V)>,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    /// Returns a reference to the stored key.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference tied to the map borrow.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Replaces the value, returning the previous one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, returning its value. The slot is tombstoned.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry, returning the stored pair. The slot is
    /// tombstoned.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// A view into a vacant map entry.
pub struct VacantEntry<'a, K, V> {
    key: K,
    entry: TableVacantEntry<'a, (K, V)>,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Returns a reference to the key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key without inserting.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the key with `value` and returns a mutable reference to the
    /// value.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// An iterator over the entries of a [`HashMap`], in slot order.
///
/// Created by [`HashMap::iter`].
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| (&entry.0, &entry.1))
    }
}

/// An iterator over the keys of a [`HashMap`].
///
/// Created by [`HashMap::keys`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }
}

/// An iterator over the values of a [`HashMap`].
///
/// Created by [`HashMap::values`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }
}

/// A draining iterator over the entries of a [`HashMap`].
///
/// Created by [`HashMap::drain`]. The map is emptied when the iterator is
/// dropped, even if not fully consumed.
pub struct Drain<'a, K, V> {
    inner: crate::hash_table::Drain<'a, (K, V)>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// An owning iterator over the entries of a [`HashMap`].
///
/// Created by [`IntoIterator::into_iter`].
pub struct IntoIter<K, V> {
    inner: crate::hash_table::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<K, V, S> IntoIterator for HashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the entries matching a single key: length 0 or 1.
///
/// Created by [`HashMap::equal_range`].
pub struct EqualRange<'a, K, V> {
    entry: Option<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for EqualRange<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entry.take()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = if self.entry.is_some() { 1 } else { 0 };
        (len, Some(len))
    }
}

impl<K, V> ExactSizeIterator for EqualRange<'_, K, V> {}
