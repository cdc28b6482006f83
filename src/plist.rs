//! Persistent singly linked list with structural sharing.
//!
//! Pushing or popping returns a new list and leaves the receiver untouched, so
//! execution branches that forked from one list keep sharing its tail.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

struct Node<T> {
    value: T,
    next: Option<Arc<Node<T>>>,
}

/// Immutable list, newest element first.
pub struct PersistentList<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

impl<T> PersistentList<T> {
    /// Empty list
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the list has no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// New list with `value` in front
    pub fn push(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Most recently pushed element
    pub fn peek(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.value)
    }

    /// List without its most recently pushed element
    pub fn pop(&self) -> Self {
        match &self.head {
            Some(node) => Self {
                head: node.next.clone(),
                len: self.len - 1,
            },
            None => Self::new(),
        }
    }

    /// Iterate from the newest element to the oldest
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    fn shares_head_with(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Clone> PersistentList<T> {
    /// Elements oldest first
    pub fn to_vec(&self) -> Vec<T> {
        let mut items: Vec<T> = self.iter().cloned().collect();
        items.reverse();
        items
    }
}

impl<T> Clone for PersistentList<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for PersistentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for PersistentList<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        if self.shares_head_with(other) {
            return true;
        }
        self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Eq> Eq for PersistentList<T> {}

impl<T: Hash> Hash for PersistentList<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        for item in self.iter() {
            item.hash(state);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Clone> FromIterator<T> for PersistentList<T> {
    /// Builds the list so that the last yielded item ends up on top.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PersistentList::new(), |list, item| list.push(item))
    }
}

/// Borrowing iterator over a [`PersistentList`]
pub struct Iter<'a, T> {
    next: Option<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| {
            self.next = node.next.as_deref();
            &node.value
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_does_not_disturb_original() {
        let base: PersistentList<u32> = [1, 2].into_iter().collect();
        let left = base.push(3);
        let right = base.push(4);

        assert_eq!(base.to_vec(), vec![1, 2]);
        assert_eq!(left.to_vec(), vec![1, 2, 3]);
        assert_eq!(right.to_vec(), vec![1, 2, 4]);
        assert_eq!(left.pop(), base);
    }

    #[test]
    fn test_pop_empty_is_empty() {
        let list: PersistentList<u8> = PersistentList::new();
        assert!(list.pop().is_empty());
        assert_eq!(list.peek(), None);
    }

    #[test]
    fn test_equality_by_content() {
        let a: PersistentList<u32> = [5, 6].into_iter().collect();
        let b: PersistentList<u32> = [5, 6].into_iter().collect();
        let c: PersistentList<u32> = [6, 5].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
