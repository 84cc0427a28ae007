//! A [RecencyList] is the ordering half of the caches: a vec-backed doubly linked list, oldest at the front and most
//! recently touched at the back.
//!
//! Slots are stable `usize` handles which stay valid until the value in them is removed, so the key and size indices
//! can point at them and unlink in O(1).  Freed slots are threaded onto a free list and reused.

struct OccupiedSlot<V> {
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct EmptySlot {
    next_empty: Option<usize>,
}

enum Slot<V> {
    /// This slot is empty, possibly with a pointer at the next empty slot.
    Empty(EmptySlot),
    /// This slot is occupied, and doubly linked to the previous and next slot.
    Occupied(OccupiedSlot<V>),
}

impl<V> Slot<V> {
    fn as_occupied_mut(&mut self) -> &mut OccupiedSlot<V> {
        match self {
            Self::Occupied(ref mut x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_occupied(&self) -> &OccupiedSlot<V> {
        match self {
            Self::Occupied(ref x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_empty_mut(&mut self) -> &mut EmptySlot {
        match self {
            Self::Empty(ref mut x) => x,
            _ => panic!("Slot should be empty"),
        }
    }
}

pub(crate) struct RecencyList<V> {
    slots: Vec<Slot<V>>,
    /// Least recent.
    head: Option<usize>,
    /// Most recent.
    tail: Option<usize>,
    empty_head: Option<usize>,
    len: usize,
}

impl<V> RecencyList<V> {
    pub(crate) fn new() -> RecencyList<V> {
        RecencyList {
            slots: Vec::new(),
            head: None,
            tail: None,
            empty_head: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// The least recent slot.
    pub(crate) fn front(&self) -> Option<usize> {
        self.head
    }

    /// The slot after `slot`, toward the most recent end.
    pub(crate) fn next(&self, slot: usize) -> Option<usize> {
        self.slots[slot].as_occupied().next
    }

    pub(crate) fn get(&self, slot: usize) -> &V {
        &self.slots[slot].as_occupied().value
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut V {
        &mut self.slots[slot].as_occupied_mut().value
    }

    /// Entirely unlink an occupied slot from the list, leaving its value in place.
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let occupied = self.slots[slot].as_occupied_mut();
            (occupied.prev.take(), occupied.next.take())
        };

        match prev {
            Some(p) => self.slots[p].as_occupied_mut().next = next,
            None => self.head = next,
        }

        match next {
            Some(n) => self.slots[n].as_occupied_mut().prev = prev,
            None => self.tail = prev,
        }
    }

    /// Link an already-unlinked occupied slot at the most recent end.
    fn link_back(&mut self, slot: usize) {
        self.slots[slot].as_occupied_mut().prev = self.tail;
        match self.tail {
            Some(t) => self.slots[t].as_occupied_mut().next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    /// Find an available empty slot, or make one if necessary.
    fn find_empty(&mut self) -> usize {
        if let Some(e) = self.empty_head {
            self.empty_head = self.slots[e].as_empty_mut().next_empty;
            return e;
        }

        self.slots.push(Slot::Empty(EmptySlot { next_empty: None }));
        self.slots.len() - 1
    }

    /// Append a value as the most recent, returning its slot.
    pub(crate) fn push_back(&mut self, value: V) -> usize {
        let slot = self.find_empty();
        self.slots[slot] = Slot::Occupied(OccupiedSlot {
            value,
            prev: None,
            next: None,
        });
        self.link_back(slot);
        self.len += 1;
        slot
    }

    /// Given an occupied slot, make it the most recent.
    pub(crate) fn move_to_back(&mut self, slot: usize) {
        if self.tail == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_back(slot);
    }

    /// Empty a slot, handing back its value.
    pub(crate) fn remove(&mut self, slot: usize) -> V {
        self.unlink(slot);
        let mut old = Slot::Empty(EmptySlot {
            next_empty: self.empty_head,
        });
        std::mem::swap(&mut old, &mut self.slots[slot]);
        self.empty_head = Some(slot);
        self.len -= 1;
        match old {
            Slot::Occupied(OccupiedSlot { value, .. }) => value,
            _ => panic!("Should have been occupied"),
        }
    }

    /// Iterator visiting values from least to most recent.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &V> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let current = cursor?;
            let occupied = self.slots[current].as_occupied();
            cursor = occupied.next;
            Some(&occupied.value)
        })
    }
}
