// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// A doubly-linked intrusive node typed by its owner and by the adapter
// naming the field it is embedded at. We deliberately avoid Pin APIs:
// nodes are reached through smart pointers or statics, and it's
// conventional that the owner never moves while linked. The node itself
// is **NOT** concurrency safe; callers serialize with their own lock.

use crate::intrusive::Adapter;
use core::{marker::PhantomData, ptr::NonNull};

#[derive(Debug)]
pub struct ListHead<T, A: Adapter> {
    pub prev: Option<NonNull<ListHead<T, A>>>,
    pub next: Option<NonNull<ListHead<T, A>>>,
    _t: PhantomData<T>,
    _a: PhantomData<A>,
}

impl<T, A: Adapter> Default for ListHead<T, A> {
    fn default() -> Self {
        Self::const_new()
    }
}

impl<T, A: Adapter> ListHead<T, A> {
    pub const fn const_new() -> Self {
        Self {
            prev: None,
            next: None,
            _t: PhantomData,
            _a: PhantomData,
        }
    }

    pub const fn new() -> Self {
        Self::const_new()
    }

    /// Recovers the owning object from the embedded node.
    pub fn owner(&self) -> &T {
        let ptr = self as *const _ as *const u8;
        let base = unsafe { ptr.sub(A::offset()) as *const T };
        unsafe { &*base }
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.prev.is_none() && self.next.is_none()
    }

    pub fn insert_after(head: &mut ListHead<T, A>, mut me: NonNull<ListHead<T, A>>) -> bool {
        unsafe {
            if !me.as_ref().is_detached() {
                return false;
            }
            let next = core::mem::replace(&mut head.next, Some(me));
            me.as_mut().next = next;
            me.as_mut().prev = match next {
                Some(mut v) => core::mem::replace(&mut v.as_mut().prev, Some(me)),
                None => Some(NonNull::from(head)),
            };
            true
        }
    }

    pub fn insert_before(tail: &mut ListHead<T, A>, mut me: NonNull<ListHead<T, A>>) -> bool {
        unsafe {
            if !me.as_ref().is_detached() {
                return false;
            }
            let prev = core::mem::replace(&mut tail.prev, Some(me));
            me.as_mut().prev = prev;
            me.as_mut().next = match prev {
                Some(mut v) => core::mem::replace(&mut v.as_mut().next, Some(me)),
                None => Some(NonNull::from(tail)),
            };
            true
        }
    }

    pub fn detach(mut me: NonNull<ListHead<T, A>>) -> bool {
        unsafe {
            let node = me.as_mut();
            if node.is_detached() {
                return false;
            }
            if let Some(mut prev) = node.prev {
                prev.as_mut().next = node.next;
            }
            if let Some(mut next) = node.next {
                next.as_mut().prev = node.prev;
            }
            node.prev = None;
            node.next = None;
            true
        }
    }
}

pub struct ListIterator<T, A: Adapter> {
    next: Option<NonNull<ListHead<T, A>>>,
    tail: Option<NonNull<ListHead<T, A>>>,
    _t: PhantomData<T>,
    _a: PhantomData<A>,
}

impl<T, A: Adapter> ListIterator<T, A> {
    pub fn new(head: &ListHead<T, A>, tail: Option<NonNull<ListHead<T, A>>>) -> Self {
        Self {
            next: head.next,
            tail,
            _t: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T, A: Adapter> Iterator for ListIterator<T, A> {
    type Item = NonNull<ListHead<T, A>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.tail {
            return None;
        }
        let Some(current) = self.next else {
            panic!("Tail node is specified, but encountered None during iteration");
        };
        self.next = unsafe { current.as_ref().next };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrusive::Adapter;
    use core::mem::offset_of;

    #[derive(Default, Debug)]
    struct OffsetOfNode;

    impl Adapter for OffsetOfNode {
        #[inline]
        fn offset() -> usize {
            offset_of!(Item, node)
        }
    }

    #[derive(Default, Debug)]
    struct Item {
        before: [u8; 8],
        node: ListHead<Item, OffsetOfNode>,
        after: [u8; 8],
    }

    type Node = ListHead<Item, OffsetOfNode>;

    #[test]
    fn owner_recovers_base_address() {
        let item = Item::default();
        let owner = item.node.owner();
        assert_eq!(&item as *const _, owner as *const _);
        let _ = (&item.before, &item.after);
    }

    #[test]
    fn insert_and_detach_round_trip() {
        let mut a = Item::default();
        let b = Item::default();
        assert!(a.node.is_detached());
        assert!(b.node.is_detached());
        assert!(Node::insert_after(&mut a.node, NonNull::from(&b.node)));
        assert!(!a.node.is_detached());
        assert!(!b.node.is_detached());
        // Double insertion of a linked node must be rejected.
        assert!(!Node::insert_after(&mut a.node, NonNull::from(&b.node)));
        assert!(Node::detach(NonNull::from(&b.node)));
        assert!(a.node.is_detached());
        assert!(b.node.is_detached());
        assert!(!Node::detach(NonNull::from(&b.node)));
    }

    #[test]
    fn iteration_follows_links() {
        let mut head = Node::default();
        let items = [Item::default(), Item::default(), Item::default()];
        for item in items.iter().rev() {
            assert!(Node::insert_after(&mut head, NonNull::from(&item.node)));
        }
        let visited: Vec<*const Item> = ListIterator::new(&head, None)
            .map(|n| unsafe { n.as_ref().owner() as *const Item })
            .collect();
        let expected: Vec<*const Item> = items.iter().map(|i| i as *const Item).collect();
        assert_eq!(visited, expected);
    }
}
