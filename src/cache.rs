//! Sub-palette cache: fixed-capacity ring buffers of recently emitted
//! sub-palettes, one bank per sub-palette size.
//!
//! Slot ids are physical ring positions and go on the wire as-is, so the
//! decoder's banks stay in lockstep with the encoder's simply by replaying
//! the same sequence of fresh-sub-palette registrations.

/// Number of slots in one cache bank.
pub const CACHE_CAPACITY: usize = 256;

/// One ring buffer of previously emitted sub-palettes.
#[derive(Debug, Clone)]
pub struct PaletteCache {
    slots: Vec<Vec<u8>>,
    head: usize,
    count: usize,
}

impl PaletteCache {
    /// Create an empty cache bank.
    pub fn new() -> Self {
        Self {
            slots: vec![Vec::new(); CACHE_CAPACITY],
            head: CACHE_CAPACITY - 1,
            count: 0,
        }
    }

    /// Store a sub-palette in the next slot, overwriting the oldest entry
    /// once the ring is full. Returns the slot id written.
    pub fn add(&mut self, subpal: &[u8]) -> u8 {
        self.head = (self.head + 1) % CACHE_CAPACITY;
        self.slots[self.head].clear();
        self.slots[self.head].extend_from_slice(subpal);
        if self.count < CACHE_CAPACITY {
            self.count += 1;
        }
        self.head as u8
    }

    /// Logically empty the bank. Physical slots keep stale data but become
    /// unreachable.
    pub fn reset(&mut self) {
        self.head = CACHE_CAPACITY - 1;
        self.count = 0;
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when no entry is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The sub-palette at a physical slot, if that slot is live.
    pub fn get(&self, slot: u8) -> Option<&[u8]> {
        let slot = slot as usize;
        if self.count == CACHE_CAPACITY || slot < self.count {
            Some(&self.slots[slot])
        } else {
            None
        }
    }

    /// Live entries in insertion order (oldest first), with slot ids.
    ///
    /// Deliberately not recency order: lookup scoring iterates all entries
    /// and breaks ties toward the earliest, so search order is stable but
    /// not LRU-ranked.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        (0..self.count).map(move |i| {
            let slot = if self.count == CACHE_CAPACITY {
                (self.head + 1 + i) % CACHE_CAPACITY
            } else {
                i
            };
            (slot as u8, self.slots[slot].as_slice())
        })
    }
}

impl Default for PaletteCache {
    fn default() -> Self {
        Self::new()
    }
}

/// The three cache banks, one per sub-palette size.
#[derive(Debug, Clone, Default)]
pub struct CacheBanks {
    /// Bank for 2-color sub-palettes.
    pub pal2: PaletteCache,
    /// Bank for 4-color sub-palettes.
    pub pal4: PaletteCache,
    /// Bank for 8-color sub-palettes.
    pub pal8: PaletteCache,
}

impl CacheBanks {
    /// Create three empty banks.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bank holding sub-palettes of `colors` entries (2, 4 or 8).
    pub fn bank(&self, colors: usize) -> &PaletteCache {
        match colors {
            2 => &self.pal2,
            4 => &self.pal4,
            8 => &self.pal8,
            _ => unreachable!("no cache bank for {}-color sub-palettes", colors),
        }
    }

    /// Mutable access to the bank for `colors`-entry sub-palettes.
    pub fn bank_mut(&mut self, colors: usize) -> &mut PaletteCache {
        match colors {
            2 => &mut self.pal2,
            4 => &mut self.pal4,
            8 => &mut self.pal8,
            _ => unreachable!("no cache bank for {}-color sub-palettes", colors),
        }
    }

    /// Reset all three banks. Runs at the start of every frame's encode
    /// and decode; caches never persist across frames.
    pub fn reset_all(&mut self) {
        self.pal2.reset();
        self.pal4.reset();
        self.pal8.reset();
    }
}
