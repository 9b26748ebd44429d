/// Arena that hands out stable ids. Removed slots are recycled by later insertions.
pub struct SparseCollection<T: SparseElement> {
    vector: Vec<Option<T>>,
    index_free_list: Vec<usize>,
}

impl<T: SparseElement> Default for SparseCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SparseElement> SparseCollection<T> {
    pub fn new() -> Self {
        Self {
            vector: Vec::new(),
            index_free_list: Vec::new(),
        }
    }

    pub fn add(&mut self, mut element: T) -> T::Id {
        let id = if let Some(id) = self.index_free_list.pop() {
            id
        } else {
            self.vector.push(None);
            self.vector.len() - 1
        };
        element.set_id(id.into());
        self.vector[id] = Some(element);

        id.into()
    }

    pub fn size(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.iter().all(|x| x.is_none())
    }

    pub fn at(&self, id: T::Id) -> Option<&T> {
        self.vector.get(id.into()).and_then(|x| x.as_ref())
    }

    pub fn at_mut(&mut self, id: T::Id) -> Option<&mut T> {
        self.vector.get_mut(id.into()).and_then(|x| x.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.vector.iter().filter_map(|x| x.as_ref())
    }

    pub fn remove(&mut self, id: T::Id) -> Option<T> {
        let index = id.into();
        let removed = self.vector.get_mut(index).and_then(|x| x.take());

        if removed.is_some() {
            self.index_free_list.push(index);
        }

        removed
    }
}

pub trait SparseElement {
    type Id: Copy + Eq + std::hash::Hash + Into<usize> + From<usize>;

    fn id(&self) -> Self::Id;
    fn set_id(&mut self, id: Self::Id);
}
