//! The core open-addressing table.
//!
//! [`HashTable`] stores values of type `V` in a power-of-two bucket array
//! with a packed side array recording each slot's state (empty, occupied, or
//! deleted) in 2 bits. Collisions are resolved by linear probing; deletion
//! leaves a tombstone that later probes skip and later insertions reuse.
//! Tombstones are reclaimed only when the table grows and rehashes.
//!
//! The table is hash-agnostic: every operation takes the value's hash, and
//! operations that compare values take an equality predicate. Operations
//! that can trigger a resize additionally take a hasher closure, since the
//! table does not store per-slot hashes and must re-derive them when
//! re-probing entries into fresh storage.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Number of slot states packed into one `u32` state word.
const SLOTS_PER_WORD: usize = 16;

/// Smallest non-zero bucket count. Growth targets and explicit requests are
/// rounded up to a power of two no smaller than this.
const MIN_BUCKETS: usize = 4;

/// Default fraction of buckets that may be occupied (live or tombstoned)
/// before an insertion triggers growth. 0.5 trades memory for short probe
/// chains.
const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.5;

// 2-bit slot states. `EMPTY` has both bits set so a freshly allocated state
// array can be initialized by filling every byte with `STATE_FILL`, with no
// per-slot loop.
const OCCUPIED: u8 = 0b00;
const DELETED: u8 = 0b01;
const EMPTY: u8 = 0b11;
const STATE_FILL: u8 = 0xFF;

#[inline(always)]
fn state_shift(slot: usize) -> u32 {
    ((slot & (SLOTS_PER_WORD - 1)) * 2) as u32
}

#[inline(always)]
fn state_in_word(word: u32, slot: usize) -> u8 {
    ((word >> state_shift(slot)) & 0b11) as u8
}

/// Reads the 2-bit state of `slot` from the packed word array.
///
/// # Safety
///
/// `slot / SLOTS_PER_WORD` must be within the bounds of `words`.
#[inline(always)]
unsafe fn read_state(words: &[u32], slot: usize) -> u8 {
    // SAFETY: The caller guarantees the word index is in bounds.
    unsafe { state_in_word(*words.get_unchecked(slot / SLOTS_PER_WORD), slot) }
}

/// Writes the 2-bit state of `slot` into the packed word array. No bits
/// outside the targeted pair are affected.
///
/// # Safety
///
/// `slot / SLOTS_PER_WORD` must be within the bounds of `words`.
#[inline(always)]
unsafe fn write_state(words: &mut [u32], slot: usize, state: u8) {
    // SAFETY: The caller guarantees the word index is in bounds.
    unsafe {
        let word = words.get_unchecked_mut(slot / SLOTS_PER_WORD);
        let shift = state_shift(slot);
        *word &= !(0b11 << shift);
        *word |= u32::from(state) << shift;
    }
}

/// Smallest valid bucket count able to index `requested` slots: a power of
/// two, at least `MIN_BUCKETS`.
#[inline(always)]
fn bucket_count_for(requested: usize) -> usize {
    requested
        .max(MIN_BUCKETS)
        .checked_next_power_of_two()
        .expect("capacity overflow")
}

/// Number of occupied slots (live plus tombstoned) a table of
/// `bucket_count` buckets may hold before growth is required.
#[inline(always)]
fn growth_limit(bucket_count: usize, max_load_factor: f32) -> usize {
    if bucket_count == 0 {
        return 0;
    }
    // At least one slot must remain empty for probes to terminate, whatever
    // load factor the caller configured.
    ((bucket_count as f32 * max_load_factor) as usize).min(bucket_count - 1)
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    states_offset: usize,
    buckets_offset: usize,
}

impl DataLayout {
    /// Combined layout for a table of `bucket_count` slots: the packed state
    /// words followed by the value slots, in a single allocation.
    fn new<V>(bucket_count: usize) -> Self {
        let states_layout = Layout::array::<u32>(bucket_count.div_ceil(SLOTS_PER_WORD))
            .expect("allocation size overflow");
        let buckets_layout =
            Layout::array::<MaybeUninit<V>>(bucket_count).expect("allocation size overflow");

        let (layout, states_offset) = Layout::new::<()>().extend(states_layout).unwrap();
        let (layout, buckets_offset) = layout.extend(buckets_layout).unwrap();

        DataLayout {
            layout,
            states_offset,
            buckets_offset,
        }
    }
}

/// Allocates a block for `layout` with every slot state marked empty.
///
/// Allocation is all-or-nothing: on failure this calls
/// [`handle_alloc_error`] without touching any existing storage.
fn allocate(layout: &DataLayout) -> NonNull<u8> {
    if layout.layout.size() == 0 {
        return NonNull::dangling();
    }

    // SAFETY: The layout size is non-zero, a null return is handled, and the
    // state region lies entirely within the fresh allocation.
    unsafe {
        let raw = alloc::alloc::alloc(layout.layout);
        if raw.is_null() {
            handle_alloc_error(layout.layout);
        }

        core::ptr::write_bytes(
            raw.add(layout.states_offset),
            STATE_FILL,
            layout.buckets_offset - layout.states_offset,
        );

        NonNull::new_unchecked(raw)
    }
}

/// Internal statistics for inspecting table structure in tests.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct DebugStats {
    /// Live entries.
    pub populated: usize,
    /// Live entries plus tombstones.
    pub occupied: usize,
    /// Tombstoned slots awaiting reclamation.
    pub tombstones: usize,
    /// Total bucket slots.
    pub bucket_count: usize,
    /// Entries the table can hold before the next growth.
    pub capacity: usize,
}

/// An open-addressing hash table with linear probing and tombstone deletion.
///
/// `HashTable<V>` stores values of type `V` and provides insertion, lookup,
/// removal, and forward iteration. Unlike a standard map, operations take
/// the value's hash and an equality predicate; operations that may resize
/// also take a hasher closure used to re-derive hashes during a rehash. See
/// [`HashMap`](crate::HashMap) for the keyed wrapper.
///
/// The bucket array is always empty or a power of two, and never shrinks
/// except through [`rehash(0, ..)`](HashTable::rehash). Erasing an entry
/// tombstones its slot; tombstones keep probe chains intact, are reused by
/// later insertions on the same chain, and are reclaimed wholesale when the
/// table grows.
///
/// # Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use probe_map::hash_table::Entry;
/// # use probe_map::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_u64(n: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     n.hash(&mut hasher);
/// #     hasher.finish()
/// # }
/// #
/// let mut table: HashTable<(u64, &str)> = HashTable::new();
///
/// match table.entry(hash_u64(1), |v| v.0 == 1, |v| hash_u64(v.0)) {
///     Entry::Vacant(entry) => {
///         entry.insert((1, "one"));
///     }
///     Entry::Occupied(_) => unreachable!(),
/// }
///
/// assert_eq!(table.find(hash_u64(1), |v| v.0 == 1), Some(&(1, "one")));
/// assert_eq!(table.len(), 1);
/// ```
pub struct HashTable<V> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    bucket_count: usize,
    populated: usize,
    occupied: usize,
    max_load_factor: f32,

    _phantom: core::marker::PhantomData<V>,
}

// SAFETY: The table exclusively owns its allocation and the values inside
// it; no internal aliasing outlives a borrow of the table itself.
unsafe impl<V: Send> Send for HashTable<V> {}
// SAFETY: Shared access only ever reads the allocation.
unsafe impl<V: Sync> Sync for HashTable<V> {}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.populated)
            .field("occupied", &self.occupied)
            .field("buckets", &self.bucket_count)
            .finish()
    }
}

impl<V> Drop for HashTable<V> {
    fn drop(&mut self) {
        self.drop_occupied();

        if self.layout.layout.size() != 0 {
            // SAFETY: The allocation was created with this layout and is not
            // referenced after this point.
            unsafe {
                alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
            }
        }
    }
}

impl<V> HashTable<V> {
    /// Creates a new, empty table.
    ///
    /// No memory is allocated until the first insertion or an explicit
    /// capacity request.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            layout: DataLayout::new::<V>(0),
            alloc: NonNull::dangling(),
            bucket_count: 0,
            populated: 0,
            occupied: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            _phantom: core::marker::PhantomData,
        }
    }

    /// Creates a table able to hold at least `capacity` entries without
    /// resizing, at the default max load factor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.bucket_count().is_power_of_two());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity > 0 {
            let requested = (capacity as f32 / table.max_load_factor) as usize + 1;
            table.grow_to(bucket_count_for(requested));
        }
        table
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table contains no live entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of entries the table can hold before growing.
    ///
    /// Tombstones left by removals count against this limit until the next
    /// rehash reclaims them.
    pub fn capacity(&self) -> usize {
        growth_limit(self.bucket_count, self.max_load_factor)
    }

    /// Returns the current number of bucket slots (0 or a power of two).
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Returns the home bucket a value with `hash` probes from.
    pub fn bucket_of(&self, hash: u64) -> usize {
        if self.bucket_count == 0 {
            return 0;
        }
        hash as usize & (self.bucket_count - 1)
    }

    /// Returns the number of live entries stored in bucket `index` (0 or 1
    /// in an open-addressing table).
    pub fn bucket_size(&self, index: usize) -> usize {
        if index < self.bucket_count && self.state(index) == OCCUPIED {
            1
        } else {
            0
        }
    }

    /// Returns the fraction of buckets holding live entries.
    pub fn load_factor(&self) -> f32 {
        if self.bucket_count == 0 {
            return 0.0;
        }
        self.populated as f32 / self.bucket_count as f32
    }

    /// Returns the configured maximum load factor.
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Sets the maximum load factor used by the growth trigger.
    ///
    /// The new factor applies to subsequent insertions; the table is not
    /// resized retroactively. Regardless of the configured value, the table
    /// always keeps at least one bucket empty so probes terminate.
    pub fn set_max_load_factor(&mut self, factor: f32) {
        debug_assert!(factor > 0.0);
        self.max_load_factor = factor;
    }

    fn states_ptr(&self) -> NonNull<[u32]> {
        // SAFETY: The allocation is valid and sized for the state words.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.states_offset).cast(),
                self.bucket_count.div_ceil(SLOTS_PER_WORD),
            )
        }
    }

    fn buckets_ptr(&self) -> NonNull<[MaybeUninit<V>]> {
        // SAFETY: The allocation is valid and sized for the bucket slots.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.buckets_offset).cast(),
                self.bucket_count,
            )
        }
    }

    #[inline(always)]
    fn state(&self, slot: usize) -> u8 {
        debug_assert!(slot < self.bucket_count);
        // SAFETY: `slot` is within the bucket array, so its state word
        // exists.
        unsafe { read_state(self.states_ptr().as_ref(), slot) }
    }

    #[inline(always)]
    fn set_state(&mut self, slot: usize, state: u8) {
        debug_assert!(slot < self.bucket_count);
        // SAFETY: `slot` is within the bucket array, so its state word
        // exists.
        unsafe { write_state(self.states_ptr().as_mut(), slot, state) }
    }

    /// Locates the slot holding the value matching `eq` on the probe chain
    /// of `hash`, if present.
    ///
    /// An occupied slot matching the predicate is a hit. An empty slot
    /// proves absence: insertion always fills the first empty or deleted
    /// slot on the chain, so the sought value can never live beyond a true
    /// empty. Deleted slots are skipped. A full cycle back to the home slot
    /// terminates the scan defensively.
    fn find_index(&self, hash: u64, eq: &impl Fn(&V) -> bool) -> Option<usize> {
        if self.bucket_count == 0 {
            return None;
        }

        let mask = self.bucket_count - 1;
        let mut slot = hash as usize & mask;
        let start = slot;

        // SAFETY: `slot` stays masked to the bucket count, so state-word and
        // bucket accesses are in bounds; occupied slots hold initialized
        // values.
        unsafe {
            let states = self.states_ptr();
            let buckets = self.buckets_ptr();

            // The current state word is cached and only reloaded when the
            // probe crosses a word boundary.
            let mut word_index = slot / SLOTS_PER_WORD;
            let mut word = *states.as_ref().get_unchecked(word_index);

            loop {
                match state_in_word(word, slot) {
                    OCCUPIED => {
                        if eq(buckets.as_ref().get_unchecked(slot).assume_init_ref()) {
                            return Some(slot);
                        }
                    }
                    EMPTY => return None,
                    _ => {}
                }

                slot = (slot + 1) & mask;
                if slot == start {
                    return None;
                }

                let next_word = slot / SLOTS_PER_WORD;
                if next_word != word_index {
                    word_index = next_word;
                    word = *states.as_ref().get_unchecked(word_index);
                }
            }
        }
    }

    /// Finds the slot a new value with `hash` should be placed in.
    ///
    /// The first deleted slot seen is remembered; reaching an empty slot
    /// returns the remembered tombstone if any, else the empty slot itself.
    /// Reusing tombstones keeps occupied runs from re-lengthening after
    /// removals.
    ///
    /// Only valid once the value is known to be absent and capacity has been
    /// ensured; calling it for a present value would duplicate it.
    fn find_insert_index(&self, hash: u64) -> usize {
        debug_assert!(self.bucket_count > 0);
        debug_assert!(self.occupied < self.bucket_count);

        let mask = self.bucket_count - 1;
        let mut slot = hash as usize & mask;
        let start = slot;
        let mut tombstone = None;

        // SAFETY: `slot` stays masked to the bucket count, so state-word
        // accesses are in bounds.
        unsafe {
            let states = self.states_ptr();
            let mut word_index = slot / SLOTS_PER_WORD;
            let mut word = *states.as_ref().get_unchecked(word_index);

            loop {
                match state_in_word(word, slot) {
                    DELETED => {
                        if tombstone.is_none() {
                            tombstone = Some(slot);
                        }
                    }
                    EMPTY => return tombstone.unwrap_or(slot),
                    _ => {}
                }

                slot = (slot + 1) & mask;
                if slot == start {
                    break;
                }

                let next_word = slot / SLOTS_PER_WORD;
                if next_word != word_index {
                    word_index = next_word;
                    word = *states.as_ref().get_unchecked(word_index);
                }
            }
        }

        // A full cycle means no slot is empty, so every slot is occupied or
        // deleted. The growth trigger keeps at least one slot non-occupied,
        // so a tombstone must have been recorded.
        match tombstone {
            Some(slot) => slot,
            None => unreachable!("probe cycled with no empty or deleted slot"),
        }
    }

    /// Grows the table if inserting one more entry would push the occupied
    /// count over the load-factor threshold.
    ///
    /// Implicit growth always at least doubles the bucket count. The rehash
    /// reclaims tombstones, so the doubling repeats until the live count
    /// fits under the new threshold.
    fn ensure_capacity(&mut self, hasher: &impl Fn(&V) -> u64) {
        if self.bucket_count > 0
            && self.occupied + 1 <= growth_limit(self.bucket_count, self.max_load_factor)
        {
            return;
        }

        let mut target = if self.bucket_count == 0 {
            MIN_BUCKETS
        } else {
            self.bucket_count.checked_mul(2).expect("capacity overflow")
        };
        while self.populated + 1 > growth_limit(target, self.max_load_factor) {
            target = target.checked_mul(2).expect("capacity overflow");
        }

        self.resize_rehash(target, hasher);
    }

    /// Allocates an empty bucket array of `new_bucket_count` slots for a
    /// table that currently holds no entries.
    fn grow_to(&mut self, new_bucket_count: usize) {
        debug_assert!(self.populated == 0 && self.bucket_count == 0);
        debug_assert!(new_bucket_count.is_power_of_two());

        self.layout = DataLayout::new::<V>(new_bucket_count);
        self.alloc = allocate(&self.layout);
        self.bucket_count = new_bucket_count;
    }

    /// Rebuilds the table into fresh storage of `new_bucket_count` slots.
    ///
    /// Every live entry is moved into its insert slot in the new array in
    /// ascending old-slot order; tombstones are not carried over, so after a
    /// rehash the occupied count equals the live count exactly. This is the
    /// only operation whose cost is proportional to the table size.
    fn resize_rehash(&mut self, new_bucket_count: usize, hasher: &impl Fn(&V) -> u64) {
        debug_assert!(new_bucket_count.is_power_of_two() && new_bucket_count >= MIN_BUCKETS);
        debug_assert!(new_bucket_count > self.bucket_count);

        // The fresh block is fully allocated and marked all-empty before any
        // old state is touched; a failed allocation aborts with the old
        // table intact.
        let new_layout = DataLayout::new::<V>(new_bucket_count);
        let new_alloc = allocate(&new_layout);

        let old_layout = core::mem::replace(&mut self.layout, new_layout);
        let old_alloc = core::mem::replace(&mut self.alloc, new_alloc);
        let old_bucket_count = core::mem::replace(&mut self.bucket_count, new_bucket_count);
        self.populated = 0;
        self.occupied = 0;

        // SAFETY: The old slices describe the storage just replaced; each
        // occupied old slot holds an initialized value which is moved out
        // exactly once before the old block is released.
        unsafe {
            if old_bucket_count > 0 {
                let old_states: NonNull<[u32]> = NonNull::slice_from_raw_parts(
                    old_alloc.add(old_layout.states_offset).cast(),
                    old_bucket_count.div_ceil(SLOTS_PER_WORD),
                );
                let old_buckets: NonNull<[MaybeUninit<V>]> = NonNull::slice_from_raw_parts(
                    old_alloc.add(old_layout.buckets_offset).cast(),
                    old_bucket_count,
                );

                for slot in 0..old_bucket_count {
                    if read_state(old_states.as_ref(), slot) != OCCUPIED {
                        continue;
                    }

                    let value = old_buckets.as_ref().get_unchecked(slot).assume_init_read();
                    let dest = self.find_insert_index(hasher(&value));
                    self.buckets_ptr().as_mut().get_unchecked_mut(dest).write(value);
                    self.set_state(dest, OCCUPIED);
                    self.populated += 1;
                    self.occupied += 1;
                }
            }

            if old_layout.layout.size() != 0 {
                alloc::alloc::dealloc(old_alloc.as_ptr(), old_layout.layout);
            }
        }
    }

    /// Drops every occupied slot's value. States and counters are left for
    /// the caller to reset.
    fn drop_occupied(&mut self) {
        if !core::mem::needs_drop::<V>() || self.populated == 0 {
            return;
        }

        // SAFETY: Occupied slots hold initialized values; each is dropped
        // exactly once here and the caller resets the states afterwards.
        unsafe {
            let states = self.states_ptr();
            for slot in 0..self.bucket_count {
                if read_state(states.as_ref(), slot) == OCCUPIED {
                    self.buckets_ptr()
                        .as_mut()
                        .get_unchecked_mut(slot)
                        .assume_init_drop();
                }
            }
        }
    }

    /// Returns a view into the entry for `hash`, vacant or occupied.
    ///
    /// Capacity is ensured before probing, so a vacant entry can always be
    /// inserted into without further allocation. `hasher` re-derives hashes
    /// if that capacity check triggers a rehash.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_map::hash_table::Entry;
    /// # use probe_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: HashTable<(u64, u64)> = HashTable::new();
    /// let hasher = |v: &(u64, u64)| hash_u64(v.0);
    ///
    /// table.entry(hash_u64(7), |v| v.0 == 7, hasher).or_insert((7, 1));
    /// match table.entry(hash_u64(7), |v| v.0 == 7, hasher) {
    ///     Entry::Occupied(mut entry) => entry.get_mut().1 += 1,
    ///     Entry::Vacant(_) => unreachable!(),
    /// }
    ///
    /// assert_eq!(table.find(hash_u64(7), |v| v.0 == 7), Some(&(7, 2)));
    /// ```
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        hasher: impl Fn(&V) -> u64,
    ) -> Entry<'_, V> {
        self.ensure_capacity(&hasher);

        match self.find_index(hash, &eq) {
            Some(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            None => {
                let index = self.find_insert_index(hash);
                Entry::Vacant(VacantEntry { table: self, index })
            }
        }
    }

    /// Returns a reference to the value matching `eq` on the probe chain of
    /// `hash`, if present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(hash_u64(3), |&v| v == 3, |&v| hash_u64(v)).or_insert(3);
    ///
    /// assert_eq!(table.find(hash_u64(3), |&v| v == 3), Some(&3));
    /// assert_eq!(table.find(hash_u64(4), |&v| v == 4), None);
    /// ```
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let index = self.find_index(hash, &eq)?;
        // SAFETY: `find_index` only returns occupied slots.
        unsafe {
            Some(
                self.buckets_ptr()
                    .as_ref()
                    .get_unchecked(index)
                    .assume_init_ref(),
            )
        }
    }

    /// Returns a mutable reference to the value matching `eq` on the probe
    /// chain of `hash`, if present.
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.find_index(hash, &eq)?;
        // SAFETY: `find_index` only returns occupied slots.
        unsafe {
            Some(
                self.buckets_ptr()
                    .as_mut()
                    .get_unchecked_mut(index)
                    .assume_init_mut(),
            )
        }
    }

    /// Removes and returns the value matching `eq` on the probe chain of
    /// `hash`, if present.
    ///
    /// The slot is tombstoned, not emptied: later probes for other values
    /// whose chains pass through it continue scanning, and a later insertion
    /// on the same chain may reuse it. The occupied count is unchanged, so
    /// removals do not relieve load-factor pressure until the next rehash.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(hash_u64(3), |&v| v == 3, |&v| hash_u64(v)).or_insert(3);
    ///
    /// assert_eq!(table.remove(hash_u64(3), |&v| v == 3), Some(3));
    /// assert_eq!(table.remove(hash_u64(3), |&v| v == 3), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let index = self.find_index(hash, &eq)?;
        // SAFETY: `find_index` only returns occupied slots; the value is
        // read out exactly once and the slot is tombstoned so it cannot be
        // read again.
        let value = unsafe {
            self.buckets_ptr()
                .as_ref()
                .get_unchecked(index)
                .assume_init_read()
        };
        self.set_state(index, DELETED);
        self.populated -= 1;
        Some(value)
    }

    /// Removes all entries, keeping the current capacity.
    ///
    /// Every occupied value is dropped and every slot (including tombstones)
    /// is reset to empty with a bulk fill.
    pub fn clear(&mut self) {
        self.drop_occupied();

        if self.layout.layout.size() != 0 {
            // SAFETY: The state region spans exactly the recorded offsets of
            // the live allocation.
            unsafe {
                core::ptr::write_bytes(
                    self.alloc.as_ptr().add(self.layout.states_offset),
                    STATE_FILL,
                    self.layout.buckets_offset - self.layout.states_offset,
                );
            }
        }

        self.populated = 0;
        self.occupied = 0;
    }

    /// Requests capacity for at least `count` live entries at the current
    /// max load factor.
    ///
    /// A no-op if the current bucket array already suffices; the table never
    /// shrinks. `hasher` re-derives hashes for the rehash if one occurs.
    pub fn reserve(&mut self, count: usize, hasher: impl Fn(&V) -> u64) {
        if count == 0 {
            return;
        }
        let requested = (count as f32 / self.max_load_factor) as usize + 1;
        let target = bucket_count_for(requested);
        if target > self.bucket_count {
            self.resize_rehash(target, &hasher);
        }
    }

    /// Requests a bucket array of at least `count` slots, rounded up to a
    /// power of two.
    ///
    /// A no-op if the current bucket array already suffices, except that
    /// `rehash(0, ..)` is the explicit zero-capacity request: it removes all
    /// entries and deallocates, returning the table to its
    /// freshly-constructed state. Any other rehash reclaims all tombstones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let hasher = |&v: &u64| hash_u64(v);
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(hash_u64(1), |&v| v == 1, hasher).or_insert(1);
    ///
    /// table.rehash(64, hasher);
    /// assert!(table.bucket_count() >= 64);
    ///
    /// table.rehash(0, hasher);
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), 0);
    /// ```
    pub fn rehash(&mut self, count: usize, hasher: impl Fn(&V) -> u64) {
        if count == 0 {
            self.reset();
            return;
        }
        let target = bucket_count_for(count);
        if target > self.bucket_count {
            self.resize_rehash(target, &hasher);
        }
    }

    /// Drops all entries and releases the backing storage.
    fn reset(&mut self) {
        self.drop_occupied();

        if self.layout.layout.size() != 0 {
            // SAFETY: The allocation was created with this layout; it is
            // replaced by the dangling empty state below.
            unsafe {
                alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
            }
        }

        self.layout = DataLayout::new::<V>(0);
        self.alloc = NonNull::dangling();
        self.bucket_count = 0;
        self.populated = 0;
        self.occupied = 0;
    }

    /// Returns an iterator over the live values in slot order.
    ///
    /// Slot order is neither insertion order nor key order, and is only
    /// stable between structural mutations.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            index: 0,
        }
    }

    /// Returns an iterator that removes and yields every live value.
    ///
    /// When the iterator is dropped the table is left empty with its
    /// capacity retained, even if not fully consumed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(hash_u64(1), |&v| v == 1, |&v| hash_u64(v)).or_insert(1);
    /// table.entry(hash_u64(2), |&v| v == 2, |&v| hash_u64(v)).or_insert(2);
    ///
    /// let mut drained: Vec<u64> = table.drain().collect();
    /// drained.sort_unstable();
    /// assert_eq!(drained, vec![1, 2]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            table: self,
            index: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn debug_stats(&self) -> DebugStats {
        DebugStats {
            populated: self.populated,
            occupied: self.occupied,
            tombstones: self.occupied - self.populated,
            bucket_count: self.bucket_count,
            capacity: self.capacity(),
        }
    }
}

/// A view into a single table slot, which is either vacant or occupied.
///
/// Created by [`HashTable::entry`].
pub enum Entry<'a, V> {
    /// The probed value is present.
    Occupied(OccupiedEntry<'a, V>),
    /// The probed value is absent; the insert slot has been resolved.
    Vacant(VacantEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
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
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }
}

/// A view into an occupied table slot.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Returns the slot index this entry occupies.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        // SAFETY: The entry references an occupied slot and holds an
        // exclusive borrow of the table.
        unsafe {
            self.table
                .buckets_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_ref()
        }
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: The entry references an occupied slot and holds an
        // exclusive borrow of the table.
        unsafe {
            self.table
                .buckets_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Converts the entry into a mutable reference tied to the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: The entry references an occupied slot and holds an
        // exclusive borrow of the table for 'a.
        unsafe {
            self.table
                .buckets_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Replaces the value, returning the previous one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the value, tombstoning its slot.
    pub fn remove(self) -> V {
        // SAFETY: The slot is occupied; the value is read out exactly once
        // and the slot is tombstoned so it cannot be read again.
        let value = unsafe {
            self.table
                .buckets_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_read()
        };
        self.table.set_state(self.index, DELETED);
        self.table.populated -= 1;
        value
    }
}

/// A view into a vacant table slot, ready to be inserted into.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts `value` into the resolved slot and returns a mutable
    /// reference to it.
    ///
    /// If the slot was a tombstone the occupied count is unchanged (the
    /// tombstone was already counted); only a previously empty slot
    /// increases it.
    pub fn insert(self, value: V) -> &'a mut V {
        let was_empty = self.table.state(self.index) == EMPTY;

        // SAFETY: The slot is not occupied, so writing does not leak a live
        // value; the entry holds an exclusive borrow of the table for 'a.
        unsafe {
            self.table
                .buckets_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .write(value);
        }
        self.table.set_state(self.index, OCCUPIED);
        self.table.populated += 1;
        if was_empty {
            self.table.occupied += 1;
        }

        // SAFETY: The slot was just initialized above.
        unsafe {
            self.table
                .buckets_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }
}

/// An iterator over the live values in a [`HashTable`], in slot order.
///
/// Created by [`HashTable::iter`].
pub struct Iter<'a, V> {
    table: &'a HashTable<V>,
    index: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.populated == 0 {
            return None;
        }

        // SAFETY: `slot` is bounds-checked against the bucket count and
        // occupied slots hold initialized values.
        unsafe {
            while self.index < self.table.bucket_count {
                let slot = self.index;
                self.index += 1;

                if read_state(self.table.states_ptr().as_ref(), slot) == OCCUPIED {
                    return Some(
                        self.table
                            .buckets_ptr()
                            .as_ref()
                            .get_unchecked(slot)
                            .assume_init_ref(),
                    );
                }
            }
        }

        None
    }
}

/// A draining iterator over the values in a [`HashTable`].
///
/// Created by [`HashTable::drain`]. Yields owned values; slots are
/// tombstoned as they are yielded and the whole table is reset to empty when
/// the iterator is dropped.
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.populated == 0 {
            return None;
        }

        while self.index < self.table.bucket_count {
            let slot = self.index;
            self.index += 1;

            if self.table.state(slot) == OCCUPIED {
                // SAFETY: The slot is occupied; the value is read out once
                // and the slot is tombstoned immediately after.
                let value = unsafe {
                    self.table
                        .buckets_ptr()
                        .as_ref()
                        .get_unchecked(slot)
                        .assume_init_read()
                };
                self.table.set_state(slot, DELETED);
                self.table.populated -= 1;
                return Some(value);
            }
        }

        None
    }
}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
        self.table.clear();
    }
}

/// An owning iterator over the values of a [`HashTable`].
///
/// Created by [`IntoIterator::into_iter`]. Values not consumed are dropped
/// with the table.
pub struct IntoIter<V> {
    table: HashTable<V>,
    index: usize,
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.populated == 0 {
            return None;
        }

        while self.index < self.table.bucket_count {
            let slot = self.index;
            self.index += 1;

            if self.table.state(slot) == OCCUPIED {
                // SAFETY: The slot is occupied; the value is read out once
                // and the slot is tombstoned immediately after.
                let value = unsafe {
                    self.table
                        .buckets_ptr()
                        .as_ref()
                        .get_unchecked(slot)
                        .assume_init_read()
                };
                self.table.set_state(slot, DELETED);
                self.table.populated -= 1;
                return Some(value);
            }
        }

        None
    }
}

impl<V> IntoIterator for HashTable<V> {
    type Item = V;
    type IntoIter = IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            table: self,
            index: 0,
        }
    }
}

impl<'a, V> IntoIterator for &'a HashTable<V> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::Hasher;
    use core::sync::atomic::AtomicUsize;
    use core::sync::atomic::Ordering;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn random() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn hash_u64(&self, key: u64) -> u64 {
            let mut h = SipHasher::new_with_keys(self.k0, self.k1);
            h.write_u64(key);
            h.finish()
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    fn insert_item(state: &HashState, table: &mut HashTable<Item>, key: u64, value: i32) -> bool {
        match table.entry(
            state.hash_u64(key),
            |item: &Item| item.key == key,
            |item: &Item| state.hash_u64(item.key),
        ) {
            Entry::Vacant(entry) => {
                entry.insert(Item { key, value });
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();

        for k in 0..32u64 {
            assert!(insert_item(&state, &mut table, k, (k as i32) * 2));
        }
        assert_eq!(table.len(), 32);

        for k in 0..32u64 {
            let found = table.find(state.hash_u64(k), |item| item.key == k);
            assert_eq!(
                found,
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
        }

        assert!(
            table
                .find(state.hash_u64(999), |item| item.key == 999)
                .is_none()
        );
    }

    #[test]
    fn duplicate_insert_leaves_value_untouched() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();

        assert!(insert_item(&state, &mut table, 42, 7));
        assert!(!insert_item(&state, &mut table, 42, 11));

        assert_eq!(table.len(), 1);
        let found = table.find(state.hash_u64(42), |item| item.key == 42).unwrap();
        assert_eq!(found.value, 7);
    }

    #[test]
    fn growth_from_empty() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        assert_eq!(table.bucket_count(), 0);

        insert_item(&state, &mut table, 1, 1);
        assert_eq!(table.bucket_count(), MIN_BUCKETS);
        assert!(table.max_load_factor() == DEFAULT_MAX_LOAD_FACTOR);

        let mut growths = 0;
        let mut last = table.bucket_count();
        for k in 2..=10u64 {
            insert_item(&state, &mut table, k, k as i32);
            if table.bucket_count() != last {
                assert_eq!(table.bucket_count(), last * 2);
                last = table.bucket_count();
                growths += 1;
            }
        }
        assert!(growths >= 1);
        assert_eq!(table.len(), 10);

        let stats = table.debug_stats();
        assert!(stats.populated <= stats.occupied);
        assert!(stats.occupied <= stats.capacity);
    }

    #[test]
    fn remove_then_find_fails_and_reinsert_succeeds() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();

        for k in 0..8u64 {
            insert_item(&state, &mut table, k, k as i32);
        }

        let removed = table
            .remove(state.hash_u64(3), |item| item.key == 3)
            .expect("should remove");
        assert_eq!(removed.key, 3);
        assert_eq!(table.len(), 7);
        assert!(
            table
                .find(state.hash_u64(3), |item| item.key == 3)
                .is_none()
        );

        assert!(insert_item(&state, &mut table, 3, 333));
        assert_eq!(table.len(), 8);
        let found = table.find(state.hash_u64(3), |item| item.key == 3).unwrap();
        assert_eq!(found.value, 333);

        assert!(
            table
                .remove(state.hash_u64(1000), |item| item.key == 1000)
                .is_none()
        );
    }

    #[test]
    fn tombstones_persist_until_rehash() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        table.reserve(8, |item| state.hash_u64(item.key));

        for k in 0..8u64 {
            insert_item(&state, &mut table, k, 0);
        }
        for k in 0..4u64 {
            table.remove(state.hash_u64(k), |item| item.key == k);
        }

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 4);
        assert_eq!(stats.occupied, 8);
        assert_eq!(stats.tombstones, 4);

        // Growing rehashes every live entry into fresh storage; no
        // tombstone survives.
        let target = stats.bucket_count * 2;
        table.rehash(target, |item| state.hash_u64(item.key));
        let stats = table.debug_stats();
        assert_eq!(stats.populated, 4);
        assert_eq!(stats.occupied, 4);
        assert_eq!(stats.tombstones, 0);

        for k in 4..8u64 {
            assert!(
                table
                    .find(state.hash_u64(k), |item| item.key == k)
                    .is_some()
            );
        }
    }

    #[test]
    fn tombstone_reuse_does_not_grow_occupancy() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        table.reserve(8, |item| state.hash_u64(item.key));

        for k in 0..6u64 {
            insert_item(&state, &mut table, k, 0);
        }
        let occupied_before = table.debug_stats().occupied;

        table.remove(state.hash_u64(2), |item| item.key == 2);
        assert!(insert_item(&state, &mut table, 2, 1));

        // The reinserted key lands on its own chain's first tombstone; the
        // occupied count must not have grown.
        assert_eq!(table.debug_stats().occupied, occupied_before);
    }

    #[test]
    fn clear_retains_capacity() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..32u64 {
            insert_item(&state, &mut table, k, 0);
        }
        let buckets = table.bucket_count();

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), buckets);
        assert_eq!(table.debug_stats().occupied, 0);

        for k in 0..32u64 {
            assert!(insert_item(&state, &mut table, k, 1));
        }
        assert_eq!(table.len(), 32);
    }

    #[test]
    fn rehash_zero_resets() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..16u64 {
            insert_item(&state, &mut table, k, 0);
        }

        table.rehash(0, |item| state.hash_u64(item.key));
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), 0);
        assert_eq!(table.capacity(), 0);

        // The table is usable again after the reset.
        assert!(insert_item(&state, &mut table, 1, 1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reserve_is_monotonic() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        let hasher = |item: &Item| state.hash_u64(item.key);

        table.reserve(100, hasher);
        let buckets = table.bucket_count();
        assert!(table.capacity() >= 100);
        assert!(buckets.is_power_of_two());

        table.reserve(10, hasher);
        assert_eq!(table.bucket_count(), buckets);

        table.rehash(buckets / 2, hasher);
        assert_eq!(table.bucket_count(), buckets);
    }

    #[test]
    fn iteration_visits_each_live_entry_once() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..64u64 {
            insert_item(&state, &mut table, k, 0);
        }
        for k in (0..64u64).step_by(3) {
            table.remove(state.hash_u64(k), |item| item.key == k);
        }

        let mut seen: Vec<u64> = table.iter().map(|item| item.key).collect();
        seen.sort_unstable();
        let expected: Vec<u64> = (0..64u64).filter(|k| k % 3 != 0).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn drain_empties_and_preserves_capacity() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..16u64 {
            insert_item(&state, &mut table, k, 0);
        }
        let buckets = table.bucket_count();

        let drained: Vec<Item> = table.drain().collect();
        assert_eq!(drained.len(), 16);
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), buckets);
        assert_eq!(table.debug_stats().occupied, 0);
    }

    #[test]
    fn partial_drain_drops_the_rest() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..16u64 {
            insert_item(&state, &mut table, k, 0);
        }

        {
            let mut drain = table.drain();
            assert!(drain.next().is_some());
            assert!(drain.next().is_some());
        }
        assert!(table.is_empty());
        assert_eq!(table.debug_stats().occupied, 0);
    }

    #[test]
    fn into_iter_yields_all_values() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..16u64 {
            insert_item(&state, &mut table, k, k as i32);
        }

        let mut keys: Vec<u64> = table.into_iter().map(|item| item.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..16u64).collect::<Vec<_>>());
    }

    #[test]
    fn occupied_entry_replace_and_remove() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        insert_item(&state, &mut table, 5, 1);

        match table.entry(
            state.hash_u64(5),
            |item| item.key == 5,
            |item| state.hash_u64(item.key),
        ) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(Item { key: 5, value: 2 });
                assert_eq!(previous.value, 1);
            }
            Entry::Vacant(_) => panic!("expected occupied"),
        }

        match table.entry(
            state.hash_u64(5),
            |item| item.key == 5,
            |item| state.hash_u64(item.key),
        ) {
            Entry::Occupied(entry) => {
                let removed = entry.remove();
                assert_eq!(removed.value, 2);
            }
            Entry::Vacant(_) => panic!("expected occupied"),
        }
        assert!(table.is_empty());
    }

    #[test]
    fn load_factor_bound_holds_under_churn() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();

        for k in 0..256u64 {
            insert_item(&state, &mut table, k, 0);
            if k % 5 == 0 {
                table.remove(state.hash_u64(k), |item| item.key == k);
            }

            let stats = table.debug_stats();
            assert!(stats.populated <= stats.occupied, "{stats:?}");
            assert!(stats.occupied <= stats.capacity, "{stats:?}");
            assert!(stats.occupied < stats.bucket_count, "{stats:?}");
        }
    }

    #[test]
    fn tiny_max_load_factor_still_restores_bound() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        table.set_max_load_factor(0.05);

        for k in 0..20u64 {
            insert_item(&state, &mut table, k, 0);
            let stats = table.debug_stats();
            assert!(stats.occupied <= stats.capacity, "{stats:?}");
        }
        assert_eq!(table.len(), 20);
    }

    #[test]
    fn oversized_max_load_factor_keeps_an_empty_slot() {
        let state = HashState::random();
        let mut table: HashTable<Item> = HashTable::new();
        table.set_max_load_factor(4.0);

        for k in 0..64u64 {
            insert_item(&state, &mut table, k, 0);
            let stats = table.debug_stats();
            assert!(stats.occupied < stats.bucket_count, "{stats:?}");
        }
        for k in 0..64u64 {
            assert!(
                table
                    .find(state.hash_u64(k), |item| item.key == k)
                    .is_some()
            );
        }
    }

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Counted {
        key: u64,
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn construct_destroy_pairing() {
        let state = HashState::random();
        DROPS.store(0, Ordering::SeqCst);

        {
            let mut table: HashTable<Counted> = HashTable::new();
            let insert = |table: &mut HashTable<Counted>, k: u64| match table.entry(
                state.hash_u64(k),
                |item: &Counted| item.key == k,
                |item: &Counted| state.hash_u64(item.key),
            ) {
                Entry::Vacant(entry) => {
                    entry.insert(Counted { key: k });
                }
                Entry::Occupied(_) => panic!("duplicate"),
            };

            // Growth happens several times here; moves must not drop.
            for k in 0..64u64 {
                insert(&mut table, k);
            }
            assert_eq!(DROPS.load(Ordering::SeqCst), 0);

            for k in 0..8u64 {
                table.remove(state.hash_u64(k), |item| item.key == k);
            }
            assert_eq!(DROPS.load(Ordering::SeqCst), 8);

            table.clear();
            assert_eq!(DROPS.load(Ordering::SeqCst), 64);

            for k in 0..16u64 {
                insert(&mut table, k);
            }
        }

        // Dropping the table destroys the remaining 16.
        assert_eq!(DROPS.load(Ordering::SeqCst), 80);
    }

    #[test]
    fn string_values_drop_cleanly() {
        let state = HashState::random();
        let mut table: HashTable<(u64, String)> = HashTable::new();

        for k in 0..32u64 {
            match table.entry(
                state.hash_u64(k),
                |entry: &(u64, String)| entry.0 == k,
                |entry: &(u64, String)| state.hash_u64(entry.0),
            ) {
                Entry::Vacant(entry) => {
                    entry.insert((k, k.to_string()));
                }
                Entry::Occupied(_) => panic!("duplicate"),
            }
        }

        assert_eq!(
            table
                .find(state.hash_u64(7), |entry| entry.0 == 7)
                .map(|entry| entry.1.as_str()),
            Some("7")
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn randomized_churn_matches_model() {
        let state = HashState::random();
        let mut seed_rng = OsRng;
        let mut rng = SmallRng::seed_from_u64(seed_rng.try_next_u64().unwrap());

        let mut table: HashTable<Item> = HashTable::new();
        let mut model: Vec<Option<i32>> = alloc::vec![None; 512];

        for _ in 0..100_000 {
            let key = rng.random_range(0..512u64);
            let hash = state.hash_u64(key);
            if rng.random_bool(0.6) {
                let value = rng.random::<i32>();
                match table.entry(
                    hash,
                    |item| item.key == key,
                    |item| state.hash_u64(item.key),
                ) {
                    Entry::Vacant(entry) => {
                        entry.insert(Item { key, value });
                        assert!(model[key as usize].is_none());
                        model[key as usize] = Some(value);
                    }
                    Entry::Occupied(entry) => {
                        assert_eq!(model[key as usize], Some(entry.get().value));
                    }
                }
            } else {
                let removed = table.remove(hash, |item| item.key == key);
                assert_eq!(model[key as usize], removed.map(|item| item.value));
                model[key as usize] = None;
            }
        }

        let live = model.iter().filter(|slot| slot.is_some()).count();
        assert_eq!(table.len(), live);
        for (key, expected) in model.iter().enumerate() {
            let found = table
                .find(state.hash_u64(key as u64), |item| item.key == key as u64)
                .map(|item| item.value);
            assert_eq!(found, *expected);
        }
    }
}
