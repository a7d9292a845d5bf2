/// Memoized outcome of one instruction slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Unknown,
    True,
    False,
}

impl From<bool> for Slot {
    fn from(value: bool) -> Self {
        if value {
            Slot::True
        } else {
            Slot::False
        }
    }
}

/// Per-VM memo of result-producing instructions, one [`Slot`] per code slot.
///
/// Values are the raw outcome of the instruction, before any pending `Not`
/// is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCache {
    slots: Vec<Slot>,
}

impl ResultCache {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![Slot::Unknown; len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The cached value for `slot`, if one was recorded.
    #[must_use]
    pub fn get(&self, slot: u32) -> Option<bool> {
        match self.slots.get(slot as usize)? {
            Slot::Unknown => None,
            Slot::True => Some(true),
            Slot::False => Some(false),
        }
    }

    #[must_use]
    pub fn slot(&self, slot: u32) -> Slot {
        self.slots.get(slot as usize).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_valid(&self, slot: u32) -> bool {
        self.get(slot).is_some()
    }

    /// # Panics
    ///
    /// Panics if `slot` is outside the program.
    pub fn set(&mut self, slot: u32, value: bool) {
        self.slots[slot as usize] = Slot::from(value);
    }

    pub fn clear(&mut self) {
        self.slots.fill(Slot::Unknown);
    }

    /// Slots holding a memoized value, with that value, in slot order.
    pub fn valid(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        (0_u32..)
            .zip(&self.slots)
            .filter_map(|(i, s)| match s {
                Slot::Unknown => None,
                Slot::True => Some((i, true)),
                Slot::False => Some((i, false)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let cache = ResultCache::new(4);
        assert_eq!(cache.len(), 4);
        assert!((0..4).all(|i| !cache.is_valid(i)));
        assert_eq!(cache.valid().count(), 0);
    }

    #[test]
    fn remembers_both_values() {
        let mut cache = ResultCache::new(3);
        cache.set(0, false);
        cache.set(2, true);
        assert_eq!(cache.get(0), Some(false));
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(2), Some(true));
        assert_eq!(cache.slot(1), Slot::Unknown);
        assert_eq!(cache.valid().collect::<Vec<_>>(), [(0, false), (2, true)]);
    }

    #[test]
    fn out_of_range_reads_are_unknown() {
        let cache = ResultCache::new(1);
        assert_eq!(cache.get(7), None);
        assert_eq!(cache.slot(7), Slot::Unknown);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut cache = ResultCache::new(2);
        cache.set(1, true);
        cache.clear();
        assert_eq!(cache.valid().count(), 0);
    }

    #[test]
    #[should_panic]
    fn write_past_end_panics() {
        let mut cache = ResultCache::new(1);
        cache.set(1, true);
    }
}
