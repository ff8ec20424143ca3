use crate::virtual_machine::errors::ATError;

/// Fixed-capacity LIFO used for both the call stack and the user stack.
///
/// Overflow and underflow are errors, never truncation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundedStack<T> {
    name: &'static str,
    entries: Vec<T>,
    capacity: usize,
}

impl<T: Copy> BoundedStack<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: Vec::new(),
            capacity,
        }
    }

    /// Rebuilds a stack from entries listed oldest first.
    pub fn from_entries(name: &'static str, capacity: usize, entries: Vec<T>) -> Result<Self, ATError> {
        if entries.len() > capacity {
            return Err(ATError::MalformedState(format!(
                "{name} stack holds {} entries but capacity is {capacity}",
                entries.len()
            )));
        }
        Ok(Self {
            name,
            entries,
            capacity,
        })
    }

    pub fn push(&mut self, value: T) -> Result<(), ATError> {
        if self.entries.len() >= self.capacity {
            return Err(ATError::StackBounds {
                stack: self.name,
                reason: "overflow",
            });
        }
        self.entries.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, ATError> {
        self.entries.pop().ok_or(ATError::StackBounds {
            stack: self.name,
            reason: "underflow",
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }
}
