use crate::memory::AllocId;
use rustc_hash::FxHashSet;

/// Set of allocations a command buffer (or a whole submission) references. Duplicates are
/// permitted on insert; the queue deduplicates exactly once per submission rather than once
/// per command list to bound the cost.
#[derive(Debug, Default, Clone)]
pub struct ResidencyContainer {
	ids: Vec<AllocId>,
}

impl ResidencyContainer {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub fn add(&mut self, id: AllocId) {
		self.ids.push(id);
	}

	pub fn merge(&mut self, other: &ResidencyContainer) {
		self.ids.extend_from_slice(&other.ids);
	}

	/// Remove duplicates, preserving first-seen order.
	pub fn dedup(&mut self) {
		let mut seen = FxHashSet::with_capacity_and_hasher(self.ids.len(), Default::default());
		self.ids.retain(|id| seen.insert(*id));
	}

	pub fn contains(&self, id: AllocId) -> bool {
		self.ids.contains(&id)
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.ids.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = AllocId> + '_ {
		self.ids.iter().copied()
	}

	pub fn clear(&mut self) {
		self.ids.clear();
	}
}
