use crate::limits::DepthLimits;

/// Caps how many neighbours are kept per user and how many generations are
/// explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLimiter {
    generations: u32,
    cap: usize,
}

impl DepthLimiter {
    pub fn new(limits: &DepthLimits) -> Self {
        Self {
            generations: limits.generations,
            cap: limits.followers,
        }
    }

    pub fn cap(&self) -> Option<usize> {
        (self.cap != 0).then_some(self.cap)
    }

    /// Generation 0 expands the root; `generations` more follow it.
    pub fn allows_generation(&self, generation: u32) -> bool {
        generation <= self.generations
    }

    pub fn reached(&self, collected: usize) -> bool {
        self.cap().is_some_and(|cap| collected >= cap)
    }

    /// Split the new profiles of a page into the ones that still fit under
    /// the cap and the excess.
    pub fn split<'a, T>(&self, collected: usize, fresh: &'a [T]) -> (&'a [T], &'a [T]) {
        match self.cap() {
            None => (fresh, &fresh[fresh.len()..]),
            Some(cap) => fresh.split_at(cap.saturating_sub(collected).min(fresh.len())),
        }
    }
}
