//! Segment Manager
//!
//! Maintains the three logical regions of the cache and nominates victims on
//! overflow. All admissions land in the **Window** first; entries the gate
//! admits out of the Window move to **Probation**; a second hit promotes a
//! Probation entry to **Protected**. Aggregate occupancy never exceeds the
//! configured capacity.
//!
//! # Entry state machine
//!
//! | From      | Event              | To                                |
//! |-----------|--------------------|-----------------------------------|
//! | (absent)  | insert             | Window                            |
//! | Window    | hit                | Window, bumped to MRU             |
//! | Window    | Window overflow    | candidate for Probation via gate  |
//! | Probation | hit                | Protected                         |
//! | Protected | hit                | Protected, bumped to MRU          |
//! | Protected | Protected overflow | Probation (LRU demoted)           |
//! | Probation | Probation overflow | removed (gate victim)             |
//! | any       | delete / expire    | removed                           |
//!
//! # Representation
//!
//! Each region is an intrusive LRU list threaded through a flat arena of
//! `u32` links indexed by slot index: slots refer to list positions by index
//! and lists refer back to slots by index, so neither owns the other and
//! there are no back-pointers to keep alive. List updates are O(1).
//!
//! The manager holds no locks itself; the cache serializes access through a
//! single policy mutex. Recency updates on the read path are best-effort
//! (the reader only tries the mutex) because the admission gate re-samples
//! frequencies at decision time.

/// Which region an entry currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentTag {
    /// The small front window where every admission lands first.
    Window,
    /// Main-region newcomers, admitted out of the window by the gate.
    Probation,
    /// Main-region entries that proved themselves with a second hit.
    Protected,
}

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: u32,
    next: u32,
    tag: Option<SegmentTag>,
}

impl Link {
    const DETACHED: Link = Link {
        prev: NIL,
        next: NIL,
        tag: None,
    };
}

/// One LRU-ordered region: head is the LRU end, tail the MRU end.
#[derive(Debug, Clone, Copy)]
struct Lru {
    head: u32,
    tail: u32,
    len: usize,
}

impl Lru {
    const EMPTY: Lru = Lru {
        head: NIL,
        tail: NIL,
        len: 0,
    };
}

fn push_mru(links: &mut [Link], list: &mut Lru, idx: u32, tag: SegmentTag) {
    let link = &mut links[idx as usize];
    link.prev = list.tail;
    link.next = NIL;
    link.tag = Some(tag);
    if list.tail != NIL {
        links[list.tail as usize].next = idx;
    } else {
        list.head = idx;
    }
    list.tail = idx;
    list.len += 1;
}

fn unlink(links: &mut [Link], list: &mut Lru, idx: u32) {
    let Link { prev, next, .. } = links[idx as usize];
    if prev != NIL {
        links[prev as usize].next = next;
    } else {
        list.head = next;
    }
    if next != NIL {
        links[next as usize].prev = prev;
    } else {
        list.tail = prev;
    }
    links[idx as usize] = Link::DETACHED;
    list.len -= 1;
}

fn pop_lru(links: &mut [Link], list: &mut Lru) -> Option<u32> {
    let head = list.head;
    if head == NIL {
        return None;
    }
    unlink(links, list, head);
    Some(head)
}

/// Region bookkeeping for every slot of the index.
pub(crate) struct SegmentManager {
    links: Box<[Link]>,
    window: Lru,
    probation: Lru,
    protected: Lru,
    window_cap: usize,
    probation_cap: usize,
    protected_cap: usize,
}

impl SegmentManager {
    /// Creates a manager for `slot_count` slots with the given region
    /// capacities.
    pub(crate) fn new(
        slot_count: usize,
        window_cap: usize,
        probation_cap: usize,
        protected_cap: usize,
    ) -> Self {
        Self {
            links: vec![Link::DETACHED; slot_count].into_boxed_slice(),
            window: Lru::EMPTY,
            probation: Lru::EMPTY,
            protected: Lru::EMPTY,
            window_cap,
            probation_cap,
            protected_cap,
        }
    }

    /// Number of resident entries across all regions.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.window.len + self.probation.len + self.protected.len
    }

    /// Total configured capacity.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.window_cap + self.probation_cap + self.protected_cap
    }

    /// Whether the cache holds as many entries as it is allowed to.
    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// The region currently holding `idx`, if any.
    #[cfg(test)]
    pub(crate) fn tag(&self, idx: usize) -> Option<SegmentTag> {
        self.links[idx].tag
    }

    /// Places a freshly inserted entry at the window's MRU end.
    pub(crate) fn push_window(&mut self, idx: usize) {
        push_mru(&mut self.links, &mut self.window, idx as u32, SegmentTag::Window);
    }

    /// Whether the window holds more entries than its share.
    #[inline]
    pub(crate) fn window_over_cap(&self) -> bool {
        self.window.len > self.window_cap
    }

    /// Detaches and returns the window's least-recently-inserted entry, the
    /// candidate for admission into the main region.
    pub(crate) fn pop_window_lru(&mut self) -> Option<usize> {
        pop_lru(&mut self.links, &mut self.window).map(|idx| idx as usize)
    }

    /// Whether the main region can take another entry without a victim.
    #[inline]
    pub(crate) fn main_has_room(&self) -> bool {
        self.probation.len + self.protected.len < self.probation_cap + self.protected_cap
    }

    /// The incumbent the gate weighs a candidate against: the probation LRU,
    /// falling back to the protected LRU, then the window LRU.
    pub(crate) fn victim(&self) -> Option<usize> {
        let idx = if self.probation.head != NIL {
            self.probation.head
        } else if self.protected.head != NIL {
            self.protected.head
        } else {
            self.window.head
        };
        (idx != NIL).then_some(idx as usize)
    }

    /// Moves a detached candidate into probation's MRU end.
    pub(crate) fn admit_probation(&mut self, idx: usize) {
        debug_assert!(self.links[idx].tag.is_none());
        push_mru(
            &mut self.links,
            &mut self.probation,
            idx as u32,
            SegmentTag::Probation,
        );
    }

    /// Applies the hit transition for `idx`: recency bump in Window and
    /// Protected, promotion out of Probation. Demotes the protected LRU back
    /// to probation when the promotion overflows the protected region.
    pub(crate) fn on_hit(&mut self, idx: usize) {
        let idx32 = idx as u32;
        match self.links[idx].tag {
            Some(SegmentTag::Window) => {
                unlink(&mut self.links, &mut self.window, idx32);
                push_mru(&mut self.links, &mut self.window, idx32, SegmentTag::Window);
            }
            Some(SegmentTag::Probation) => {
                unlink(&mut self.links, &mut self.probation, idx32);
                push_mru(
                    &mut self.links,
                    &mut self.protected,
                    idx32,
                    SegmentTag::Protected,
                );
                if self.protected.len > self.protected_cap {
                    if let Some(demoted) = pop_lru(&mut self.links, &mut self.protected) {
                        push_mru(
                            &mut self.links,
                            &mut self.probation,
                            demoted,
                            SegmentTag::Probation,
                        );
                    }
                }
            }
            Some(SegmentTag::Protected) => {
                unlink(&mut self.links, &mut self.protected, idx32);
                push_mru(
                    &mut self.links,
                    &mut self.protected,
                    idx32,
                    SegmentTag::Protected,
                );
            }
            None => {}
        }
    }

    /// Detaches `idx` from whichever region holds it (delete, expire, evict).
    pub(crate) fn remove(&mut self, idx: usize) {
        let idx32 = idx as u32;
        match self.links[idx].tag {
            Some(SegmentTag::Window) => unlink(&mut self.links, &mut self.window, idx32),
            Some(SegmentTag::Probation) => unlink(&mut self.links, &mut self.probation, idx32),
            Some(SegmentTag::Protected) => unlink(&mut self.links, &mut self.protected, idx32),
            None => {}
        }
    }

    /// Detaches every entry.
    pub(crate) fn clear(&mut self) {
        for link in self.links.iter_mut() {
            *link = Link::DETACHED;
        }
        self.window = Lru::EMPTY;
        self.probation = Lru::EMPTY;
        self.protected = Lru::EMPTY;
    }

    /// Occupancy of (window, probation, protected) for assertions.
    #[cfg(test)]
    pub(crate) fn region_lens(&self) -> (usize, usize, usize) {
        (self.window.len, self.probation.len, self.protected.len)
    }
}

impl core::fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentManager")
            .field("window", &(self.window.len, self.window_cap))
            .field("probation", &(self.probation.len, self.probation_cap))
            .field("protected", &(self.protected.len, self.protected_cap))
            .finish()
    }
}
