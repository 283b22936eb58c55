//! Persistent scope stack backing the ambient context accessors.

// self
use crate::_prelude::*;

/// Lazily evaluated value source; `None` means "no value at this level".
pub type Supplier<T> = Arc<dyn Fn() -> Option<T> + Send + Sync>;

/// Immutable linked stack of scoped values.
///
/// Pushing returns a new stack that shares its tail with the original, so restoring the previous
/// state on scope exit is a matter of dropping the pushed handle.
pub struct ScopeStack<T>(Option<Arc<Frame<T>>>);
impl<T> ScopeStack<T>
where
	T: Clone,
{
	pub(crate) fn push_explicit(&self, value: T) -> Self {
		self.push(Entry::Explicit(value))
	}

	pub(crate) fn push_fallback(&self, supplier: Supplier<T>) -> Self {
		self.push(Entry::Fallback(supplier))
	}

	/// Innermost explicit value, else the innermost scoped fallback.
	pub(crate) fn resolve(&self) -> Option<T> {
		let mut fallback = None;
		let mut cursor = self.0.as_deref();

		while let Some(frame) = cursor {
			match &frame.entry {
				Entry::Explicit(value) => return Some(value.clone()),
				Entry::Fallback(supplier) if fallback.is_none() => fallback = Some(supplier),
				Entry::Fallback(_) => {},
			}

			cursor = frame.parent.0.as_deref();
		}

		fallback.and_then(|supplier| (**supplier)())
	}

	/// Number of frames, innermost included.
	pub(crate) fn depth(&self) -> usize {
		let mut depth = 0;
		let mut cursor = self.0.as_deref();

		while let Some(frame) = cursor {
			depth += 1;
			cursor = frame.parent.0.as_deref();
		}

		depth
	}

	fn push(&self, entry: Entry<T>) -> Self {
		Self(Some(Arc::new(Frame { entry, parent: self.clone() })))
	}
}
impl<T> Clone for ScopeStack<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}
impl<T> Default for ScopeStack<T> {
	fn default() -> Self {
		Self(None)
	}
}
impl<T> Debug for ScopeStack<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut explicit = 0_usize;
		let mut fallback = 0_usize;
		let mut cursor = self.0.as_deref();

		while let Some(frame) = cursor {
			match frame.entry {
				Entry::Explicit(_) => explicit += 1,
				Entry::Fallback(_) => fallback += 1,
			}

			cursor = frame.parent.0.as_deref();
		}

		f.debug_struct("ScopeStack")
			.field("explicit", &explicit)
			.field("fallback", &fallback)
			.finish()
	}
}

struct Frame<T> {
	entry: Entry<T>,
	parent: ScopeStack<T>,
}

enum Entry<T> {
	Explicit(T),
	Fallback(Supplier<T>),
}
