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

extern crate alloc;
use crate::{
    intrusive::Adapter,
    list::typed_list::{ListHead, ListIterator},
};
use alloc::boxed::Box;
use core::{
    marker::PhantomData,
    ops::Deref,
    ptr::NonNull,
    sync::atomic::{fence, Ordering},
};

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "32")] {
        type AtomicUint = core::sync::atomic::AtomicU8;
    } else {
        type AtomicUint = core::sync::atomic::AtomicUsize;
    }
}

/// Control block of a [`SlimArc`]. Unlike `alloc::sync::Arc` there is no
/// weak counter, and on 32-bit targets the strong counter is a single
/// byte, so intrusive kernel objects stay small.
#[derive(Debug)]
pub struct SlimArcInner<T: Sized> {
    data: T,
    rc: AtomicUint,
}

impl<T: Sized> SlimArcInner<T> {
    pub const fn const_new(data: T) -> Self {
        Self {
            data,
            rc: AtomicUint::new(1),
        }
    }

    pub const fn new(data: T) -> Self {
        Self::const_new(data)
    }
}

unsafe impl<T> Send for SlimArcInner<T> {}
unsafe impl<T> Sync for SlimArcInner<T> {}

// repr(transparent) so Option<SlimArc<T>> has no space overhead, see
// discriminant elision on option-like enums.
#[derive(Debug)]
#[repr(transparent)]
pub struct SlimArc<T: Sized> {
    inner: NonNull<SlimArcInner<T>>,
}

impl<T> SlimArc<T> {
    #[inline]
    pub fn new(data: T) -> Self {
        let boxed = Box::new(SlimArcInner::const_new(data));
        Self {
            inner: unsafe { NonNull::new_unchecked(Box::into_raw(boxed)) },
        }
    }

    /// Wraps a statically allocated control block. The block must stay
    /// alive forever; its initial count of one represents the static
    /// reference itself, so the pointee is never freed.
    ///
    /// # Safety
    /// `inner` must never be handed to more than one `const_new` call.
    #[inline]
    pub const unsafe fn const_new(inner: &'static SlimArcInner<T>) -> Self {
        SlimArc {
            inner: unsafe { NonNull::new_unchecked(inner as *const _ as *mut SlimArcInner<T>) },
        }
    }

    /// # Safety
    /// `inner` must point to a live control block.
    #[inline]
    pub unsafe fn from_inner(inner: NonNull<SlimArcInner<T>>) -> Self {
        inner.as_ref().rc.fetch_add(1, Ordering::Release);
        SlimArc { inner }
    }

    /// # Safety
    /// The returned address is only meaningful for identity comparison.
    pub unsafe fn get_handle(this: &Self) -> *const u8 {
        this.inner.as_ref() as *const _ as *const u8
    }

    pub fn strong_count(this: &Self) -> usize {
        unsafe { this.inner.as_ref().rc.load(Ordering::Relaxed) as usize }
    }

    /// # Safety
    /// Caller becomes responsible for pairing with a decrement.
    pub unsafe fn increment_strong_count(this: &Self) {
        let old = this.inner.as_ref().rc.fetch_add(1, Ordering::Relaxed);
        assert_ne!(old, 0);
    }

    /// # Safety
    /// The count must stay above zero; the last reference is released
    /// through `drop`, never through this.
    pub unsafe fn decrement_strong_count(this: &Self) {
        let old = this.inner.as_ref().rc.fetch_sub(1, Ordering::Relaxed);
        assert_ne!(old, 1);
    }

    #[inline]
    pub fn is(&self, other: &Self) -> bool {
        unsafe { Self::get_handle(self) == Self::get_handle(other) }
    }
}

impl<T: Sized> Clone for SlimArc<T> {
    #[inline]
    fn clone(&self) -> SlimArc<T> {
        let old = unsafe { self.inner.as_ref() }
            .rc
            .fetch_add(1, Ordering::Relaxed);
        assert!(old >= 1);
        SlimArc { inner: self.inner }
    }
}

impl<T: Sized> Drop for SlimArc<T> {
    #[inline]
    fn drop(&mut self) {
        let old = unsafe { self.inner.as_ref() }
            .rc
            .fetch_sub(1, Ordering::Acquire);
        if old != 1 {
            return;
        }
        fence(Ordering::SeqCst);
        // Static data should never reach here.
        let boxed = unsafe { Box::from_raw(self.inner.as_ptr()) };
        drop(boxed);
    }
}

impl<T: Sized> Deref for SlimArc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &self.inner.as_ref().data }
    }
}

// SlimArc holds a pointer to the managed value, not the value itself.
unsafe impl<T: Sized> Send for SlimArc<T> {}
unsafe impl<T: Sized> Sync for SlimArc<T> {}

// A FIFO of refcounted objects linked through an embedded node. The list
// shares ownership of every linked element. Callers serialize access with
// their own lock; detaching a node that may sit in several lists is only
// safe while holding the lock of the list it is currently on.
#[derive(Debug)]
pub struct SlimArcList<T: Sized, A: Adapter> {
    len: usize,
    head: ListHead<T, A>,
    tail: ListHead<T, A>,
    _t: PhantomData<T>,
    _a: PhantomData<A>,
}

impl<T: Sized, A: Adapter> Default for SlimArcList<T, A> {
    fn default() -> Self {
        Self::const_new()
    }
}

impl<T: Sized, A: Adapter> SlimArcList<T, A> {
    pub const fn const_new() -> Self {
        Self {
            len: 0,
            head: ListHead::<T, A>::const_new(),
            tail: ListHead::<T, A>::const_new(),
            _t: PhantomData,
            _a: PhantomData,
        }
    }

    pub const fn new() -> Self {
        Self::const_new()
    }

    /// Links the sentinels. Must run once before any other operation;
    /// returns false if the list was already initialized.
    #[inline]
    pub fn init(&mut self) -> bool {
        ListHead::<T, A>::insert_after(&mut self.head, NonNull::from(&self.tail))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(
            self.head.next == Some(NonNull::from(&self.tail)),
            self.len == 0
        );
        self.head.next == Some(NonNull::from(&self.tail))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn node_of(this: &SlimArc<T>) -> NonNull<ListHead<T, A>> {
        let ptr = this.deref() as *const _ as *const u8;
        let node = unsafe { ptr.add(A::offset()) as *const ListHead<T, A> };
        NonNull::from(unsafe { &*node })
    }

    /// # Safety
    /// Caller must serialize against every list the element may be on.
    #[inline]
    pub unsafe fn node_of_mut(this: &SlimArc<T>) -> &mut ListHead<T, A> {
        let ptr = this.deref() as *const _ as *const u8;
        &mut *(ptr.add(A::offset()) as *mut ListHead<T, A>)
    }

    /// Rebuilds a shared reference from an embedded node.
    ///
    /// # Safety
    /// `node` must be embedded at `A::offset()` inside the data of a live
    /// `SlimArcInner<T>`.
    #[inline]
    pub unsafe fn make_arc_from(node: &ListHead<T, A>) -> SlimArc<T> {
        let ptr = node as *const _ as *const u8;
        let offset = core::mem::offset_of!(SlimArcInner<T>, data) + A::offset();
        let inner = &*(ptr.sub(offset) as *const SlimArcInner<T>);
        SlimArc::from_inner(NonNull::from(inner))
    }

    pub fn insert_after(other: &mut ListHead<T, A>, me: SlimArc<T>) -> bool {
        let node = Self::node_of(&me);
        if !ListHead::<T, A>::insert_after(other, node) {
            return false;
        }
        // The list shares ownership of me.
        unsafe { SlimArc::<T>::increment_strong_count(&me) };
        true
    }

    pub fn insert_before(other: &mut ListHead<T, A>, me: SlimArc<T>) -> bool {
        let node = Self::node_of(&me);
        if !ListHead::<T, A>::insert_before(other, node) {
            return false;
        }
        unsafe { SlimArc::<T>::increment_strong_count(&me) };
        true
    }

    pub fn push_back(&mut self, me: SlimArc<T>) -> bool {
        if Self::insert_before(&mut self.tail, me) {
            self.len += 1;
            return true;
        }
        false
    }

    /// Inserts `me` before the first element for which `goes_before`
    /// answers true, or at the back. Keeps a list sorted when every
    /// insert goes through this.
    pub fn insert_sorted_by<F>(&mut self, me: SlimArc<T>, goes_before: F) -> bool
    where
        F: Fn(&T, &T) -> bool,
    {
        let mut found: Option<SlimArc<T>> = None;
        for other in self.iter() {
            if goes_before(&me, &other) {
                found = Some(other);
                break;
            }
        }
        let ok = match found {
            Some(other) => {
                let node = unsafe { Self::node_of_mut(&other) };
                Self::insert_before(node, me)
            }
            None => Self::insert_before(&mut self.tail, me),
        };
        if ok {
            self.len += 1;
        }
        ok
    }

    pub fn pop_front(&mut self) -> Option<SlimArc<T>> {
        assert!(self.head.next.is_some());
        if self.is_empty() {
            return None;
        }
        let next = self.head.next.expect("initialized list has a first node");
        let arc = unsafe { Self::make_arc_from(next.as_ref()) };
        let ok = ListHead::<T, A>::detach(next);
        assert!(ok);
        unsafe { SlimArc::<T>::decrement_strong_count(&arc) };
        self.len -= 1;
        Some(arc)
    }

    pub fn front(&self) -> Option<SlimArc<T>> {
        assert!(self.head.next.is_some());
        if self.is_empty() {
            return None;
        }
        let next = self.head.next.expect("initialized list has a first node");
        Some(unsafe { Self::make_arc_from(next.as_ref()) })
    }

    /// Unlinks the element from whichever position it holds in this list.
    pub fn remove(&mut self, me: &SlimArc<T>) -> bool {
        if Self::detach(me) {
            self.len -= 1;
            return true;
        }
        false
    }

    pub fn detach(me: &SlimArc<T>) -> bool {
        let node = Self::node_of(me);
        if !ListHead::<T, A>::detach(node) {
            return false;
        }
        unsafe { SlimArc::<T>::decrement_strong_count(me) };
        true
    }

    pub fn clear(&mut self) -> usize {
        let mut n = 0;
        for e in self.iter() {
            Self::detach(&e);
            n += 1;
        }
        self.len = 0;
        n
    }

    pub fn iter(&self) -> SlimArcListIterator<T, A> {
        SlimArcListIterator::new(&self.head, Some(NonNull::from(&self.tail)))
    }
}

impl<T: Sized, A: Adapter> Drop for SlimArcList<T, A> {
    #[inline]
    fn drop(&mut self) {
        // Elements must have been cleared explicitly; dropping the list
        // moves the sentinels, which would corrupt live links.
    }
}

pub struct SlimArcListIterator<T, A: Adapter> {
    it: ListIterator<T, A>,
}

impl<T, A: Adapter> SlimArcListIterator<T, A> {
    pub fn new(head: &ListHead<T, A>, tail: Option<NonNull<ListHead<T, A>>>) -> Self {
        Self {
            it: ListIterator::new(head, tail),
        }
    }
}

impl<T, A: Adapter> Iterator for SlimArcListIterator<T, A> {
    type Item = SlimArc<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.it.next()?;
        Some(unsafe { SlimArcList::<T, A>::make_arc_from(node.as_ref()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_intrusive_adapter;

    impl_intrusive_adapter!(OffsetOfRun, Task, run_node);
    impl_intrusive_adapter!(OffsetOfWait, Task, wait_node);

    #[derive(Default, Debug)]
    struct Task {
        run_node: ListHead<Task, OffsetOfRun>,
        wait_node: ListHead<Task, OffsetOfWait>,
        id: usize,
    }

    impl Task {
        fn new(id: usize) -> Self {
            Self {
                id,
                ..Default::default()
            }
        }
    }

    type RunList = SlimArcList<Task, OffsetOfRun>;
    type WaitList = SlimArcList<Task, OffsetOfWait>;

    #[test]
    fn nodes_resolve_to_their_fields() {
        let t = SlimArc::new(Task::default());
        assert_eq!(&t.run_node as *const _, RunList::node_of(&t).as_ptr());
        assert_eq!(&t.wait_node as *const _, WaitList::node_of(&t).as_ptr());
    }

    #[test]
    fn refcount_follows_clone_and_drop() {
        let t = SlimArc::new(Task::new(7));
        assert_eq!(SlimArc::strong_count(&t), 1);
        let u = t.clone();
        assert_eq!(SlimArc::strong_count(&t), 2);
        assert!(t.is(&u));
        drop(u);
        assert_eq!(SlimArc::strong_count(&t), 1);
    }

    #[test]
    fn list_is_fifo_and_shares_ownership() {
        let mut list = RunList::new();
        assert!(list.init());
        assert!(!list.init());
        assert!(list.is_empty());

        let tasks: Vec<SlimArc<Task>> = (0..4).map(|i| SlimArc::new(Task::new(i))).collect();
        for t in &tasks {
            assert!(list.push_back(t.clone()));
            assert_eq!(SlimArc::strong_count(t), 2);
        }
        assert_eq!(list.len(), 4);
        assert_eq!(list.front().unwrap().id, 0);

        for want in 0..4 {
            let got = list.pop_front().unwrap();
            assert_eq!(got.id, want);
            assert_eq!(SlimArc::strong_count(&got), 2); // got + tasks[want]
        }
        assert!(list.pop_front().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn remove_from_middle() {
        let mut list = RunList::new();
        list.init();
        let a = SlimArc::new(Task::new(0));
        let b = SlimArc::new(Task::new(1));
        let c = SlimArc::new(Task::new(2));
        for t in [&a, &b, &c] {
            list.push_back(t.clone());
        }
        assert!(list.remove(&b));
        assert!(!list.remove(&b));
        assert_eq!(SlimArc::strong_count(&b), 1);
        let order: Vec<usize> = core::iter::from_fn(|| list.pop_front())
            .map(|t| t.id)
            .collect();
        assert_eq!(order, [0, 2]);
    }

    #[test]
    fn sorted_insert_keeps_order() {
        let mut list = RunList::new();
        list.init();
        for id in [5usize, 1, 3, 2, 4] {
            assert!(list.insert_sorted_by(SlimArc::new(Task::new(id)), |a, b| a.id < b.id));
        }
        assert_eq!(list.len(), 5);
        let order: Vec<usize> = core::iter::from_fn(|| list.pop_front())
            .map(|t| t.id)
            .collect();
        assert_eq!(order, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn element_on_two_lists_at_once() {
        let mut run = RunList::new();
        let mut wait = WaitList::new();
        run.init();
        wait.init();
        let t = SlimArc::new(Task::new(3));
        assert!(run.push_back(t.clone()));
        assert!(wait.push_back(t.clone()));
        assert_eq!(SlimArc::strong_count(&t), 3);
        assert_eq!(run.pop_front().unwrap().id, 3);
        assert_eq!(wait.pop_front().unwrap().id, 3);
        assert_eq!(SlimArc::strong_count(&t), 1);
    }
}
