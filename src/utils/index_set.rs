use std::{fmt::Debug, marker::PhantomData};

/// Keys that map densely onto `usize`, such as block and value ids.
pub trait KeyIndex: Copy {
    fn index(&self) -> usize;
}

impl KeyIndex for usize {
    fn index(&self) -> usize {
        *self
    }
}

const WORD_BITS: usize = u64::BITS as usize;

/// Bit set over [`KeyIndex`] keys.
pub struct IndexSet<T: KeyIndex> {
    words: Vec<u64>,
    marker: PhantomData<T>,
}

impl<T: KeyIndex> Default for IndexSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: KeyIndex> Clone for IndexSet<T> {
    fn clone(&self) -> Self {
        Self {
            words: self.words.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: KeyIndex> IndexSet<T> {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            marker: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> bool {
        let index = value.index();
        let (word, bit) = (index / WORD_BITS, index % WORD_BITS);

        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }

        let mask = 1u64 << bit;
        if self.words[word] & mask != 0 {
            return false;
        }

        self.words[word] |= mask;
        true
    }

    pub fn remove(&mut self, value: &T) -> bool {
        let index = value.index();
        let (word, bit) = (index / WORD_BITS, index % WORD_BITS);

        match self.words.get_mut(word) {
            Some(w) if *w & (1u64 << bit) != 0 => {
                *w &= !(1u64 << bit);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        let index = value.index();
        self.words
            .get(index / WORD_BITS)
            .map_or(false, |w| w & (1u64 << (index % WORD_BITS)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word, bits)| {
            (0..WORD_BITS)
                .filter(move |bit| bits & (1u64 << bit) != 0)
                .map(move |bit| word * WORD_BITS + bit)
        })
    }
}

impl<T: KeyIndex> Debug for IndexSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.indices()).finish()
    }
}

/// Dense map over [`KeyIndex`] keys.
pub struct IndexMap<V, T: KeyIndex> {
    map: Vec<Option<V>>,
    marker: PhantomData<T>,
}

impl<V, T: KeyIndex> IndexMap<V, T> {
    pub fn new() -> Self {
        Self {
            map: Vec::new(),
            marker: PhantomData,
        }
    }

    pub fn insert(&mut self, key: T, item: V) -> Option<V> {
        let index = key.index();
        if index >= self.map.len() {
            self.map.resize_with(index + 1, || None);
        }

        std::mem::replace(&mut self.map[index], Some(item))
    }

    pub fn get(&self, key: &T) -> Option<&V> {
        self.map.get(key.index()).and_then(|x| x.as_ref())
    }

    pub fn get_mut(&mut self, key: &T) -> Option<&mut V> {
        self.map.get_mut(key.index()).and_then(|x| x.as_mut())
    }

    pub fn contains(&self, key: &T) -> bool {
        self.get(key).is_some()
    }

    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, key: T, default: F) -> &mut V {
        let index = key.index();
        if index >= self.map.len() {
            self.map.resize_with(index + 1, || None);
        }

        self.map[index].get_or_insert_with(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> + '_ {
        self.map
            .iter()
            .enumerate()
            .filter_map(|(index, value)| value.as_ref().map(|value| (index, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.map.iter().all(|x| x.is_none())
    }

    pub fn len(&self) -> usize {
        self.map.iter().filter(|x| x.is_some()).count()
    }
}

impl<V, T: KeyIndex> Default for IndexMap<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone, T: KeyIndex> Clone for IndexMap<V, T> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            marker: PhantomData,
        }
    }
}

impl<V: Debug, T: KeyIndex> Debug for IndexMap<V, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
