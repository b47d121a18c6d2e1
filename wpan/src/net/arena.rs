//! Fixed pools addressed by generational handles.
use core::marker::PhantomData;

/// A key into an [`Arena`].
///
/// The handle stays valid until its entry is removed. Using it afterwards
/// fails, even when the slot was reused for another entry.
pub struct Handle<T> {
    index: u8,
    generation: u16,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> core::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[cfg(feature = "defmt")]
impl<T> defmt::Format for Handle<T> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// A pool of at most `N` entries.
pub struct Arena<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T, const N: usize> Default for Arena<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Arena<T, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                value: None,
            }),
        }
    }

    /// Store `value` in a free slot. Gives it back when the pool is full.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, T> {
        let Some(index) = self.slots.iter().position(|slot| slot.value.is_none()) else {
            return Err(value);
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        Ok(Handle {
            index: index as u8,
            generation: slot.generation,
            _marker: PhantomData,
        })
    }

    /// Take the entry out. The handle and its copies become stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        value
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slot_mut(handle).and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u8,
                        generation: slot.generation,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }

    /// The handle of the first entry matching `f`.
    pub fn find(&self, mut f: impl FnMut(&T) -> bool) -> Option<Handle<T>> {
        self.iter()
            .find(|(_, value)| f(value))
            .map(|(handle, _)| handle)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handles_miss() {
        let mut arena: Arena<u32, 2> = Arena::new();
        let a = arena.insert(1).unwrap();
        let b = arena.insert(2).unwrap();
        assert_eq!(arena.insert(3), Err(3));

        assert_eq!(arena.remove(a), Some(1));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);

        let c = arena.insert(4).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(c), Some(&4));
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn find_and_iterate() {
        let mut arena: Arena<u32, 4> = Arena::new();
        let handles: [_; 3] = core::array::from_fn(|i| arena.insert(i as u32 * 10).unwrap());
        arena.remove(handles[1]);

        assert_eq!(arena.find(|value| *value == 20), Some(handles[2]));
        assert_eq!(arena.find(|value| *value == 10), None);
        assert_eq!(arena.iter().count(), 2);
    }
}
