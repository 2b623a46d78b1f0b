/*!
 * Slot Lists
 *
 * Arena-backed doubly linked lists addressed by generation-checked handles.
 *
 * A process is a member of two lists at once (its process group and the
 * scheduler run list). Instead of embedding link pointers in the process,
 * each list owns its nodes and hands out a `SlotHandle`; the process only
 * remembers the handle. Push, remove and pop are O(1).
 */

/// Handle to a node in a `SlotList`
///
/// Handles are invalidated when their node is removed; a stale handle never
/// aliases a node that reused the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    index: u32,
    generation: u32,
}

impl SlotHandle {
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    prev: Option<u32>,
    next: Option<u32>,
    generation: u32,
}

/// Doubly linked list stored in a slot arena
#[derive(Debug)]
pub struct SlotList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> SlotList<T> {
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append at the tail
    pub fn push_back(&mut self, value: T) -> SlotHandle {
        let index = self.claim(value);
        self.nodes[index as usize].prev = self.tail;
        match self.tail {
            Some(tail) => self.nodes[tail as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.handle(index)
    }

    /// Insert at the head
    pub fn push_front(&mut self, value: T) -> SlotHandle {
        let index = self.claim(value);
        self.nodes[index as usize].next = self.head;
        match self.head {
            Some(head) => self.nodes[head as usize].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.handle(index)
    }

    /// Unlink the node behind `handle`; `None` if the handle is stale
    pub fn remove(&mut self, handle: SlotHandle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        Some(self.unlink(handle.index))
    }

    /// Remove and return the head element
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        Some(self.unlink(head))
    }

    /// Head element without removing it
    pub fn front(&self) -> Option<&T> {
        self.head
            .and_then(|head| self.nodes[head as usize].value.as_ref())
    }

    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        if !self.contains(handle) {
            return None;
        }
        self.nodes[handle.index as usize].value.as_ref()
    }

    /// Whether `handle` still refers to a live node of this list
    #[inline]
    pub fn contains(&self, handle: SlotHandle) -> bool {
        self.nodes
            .get(handle.index as usize)
            .map_or(false, |node| {
                node.generation == handle.generation && node.value.is_some()
            })
    }

    /// Iterate from head to tail
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn claim(&mut self, value: T) -> u32 {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index as usize];
            node.value = Some(value);
            node.prev = None;
            node.next = None;
            return index;
        }
        let index = self.nodes.len() as u32;
        self.nodes.push(Node {
            value: Some(value),
            prev: None,
            next: None,
            generation: 0,
        });
        index
    }

    fn unlink(&mut self, index: u32) -> T {
        let (prev, next) = {
            let node = &self.nodes[index as usize];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.nodes[prev as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next as usize].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[index as usize];
        node.prev = None;
        node.next = None;
        node.generation = node.generation.wrapping_add(1);
        let value = node.value.take();

        self.free.push(index);
        self.len -= 1;

        match value {
            Some(value) => value,
            None => unreachable!("linked slot {} without a value", index),
        }
    }

    #[inline]
    fn handle(&self, index: u32) -> SlotHandle {
        SlotHandle {
            index,
            generation: self.nodes[index as usize].generation,
        }
    }
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-to-tail iterator over a `SlotList`
pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.list.nodes[index as usize];
        self.cursor = node.next;
        node.value.as_ref()
    }
}
