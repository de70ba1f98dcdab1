// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Minimal single-threaded observable value holder.
//!
//! A [`Publisher`] stores its last value and pushes every new one to its
//! subscribers synchronously, in subscription order. Values published from
//! inside a subscriber are queued until the current delivery finishes, so
//! every subscriber observes values in publishing order.
//!
//! Subscribers are detached by disposing (or dropping) the [`Subscription`]
//! guard returned from [`Publisher::subscribe()`].

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

/// Replay policy of [`Publisher::subscribe()`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Replay {
    /// Only values published after subscribing are delivered.
    #[default]
    Never,

    /// The current value (if any) is delivered synchronously, before
    /// [`Publisher::subscribe()`] returns.
    Immediately,
}

type Callback<T> = Rc<dyn Fn(&T)>;

type Hook = Rc<dyn Fn()>;

struct Inner<T> {
    value: RefCell<Option<T>>,
    queue: RefCell<VecDeque<T>>,
    delivering: Cell<bool>,
    subscribers: RefCell<Vec<(u64, Callback<T>)>>,
    next_id: Cell<u64>,
    on_first_subscribe: RefCell<Option<Hook>>,
    on_last_unsubscribe: RefCell<Option<Hook>>,
}

/// Observable value holder with synchronous multi-subscriber notification.
///
/// Clones share the same value and subscribers.
pub struct Publisher<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("has_value", &self.inner.value.borrow().is_some())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Publisher<T> {
    /// Creates a new [`Publisher`] without any value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(None),
                queue: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                on_first_subscribe: RefCell::new(None),
                on_last_unsubscribe: RefCell::new(None),
            }),
        }
    }

    /// Creates a new [`Publisher`] holding the given `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        let this = Self::new();
        *this.inner.value.borrow_mut() = Some(value);
        this
    }

    /// Sets a hook invoked whenever the number of subscribers grows from zero.
    #[must_use]
    pub fn on_first_subscribe(self, hook: impl Fn() + 'static) -> Self {
        *self.inner.on_first_subscribe.borrow_mut() = Some(Rc::new(hook));
        self
    }

    /// Sets a hook invoked whenever the last subscriber is detached.
    #[must_use]
    pub fn on_last_unsubscribe(self, hook: impl Fn() + 'static) -> Self {
        *self.inner.on_last_unsubscribe.borrow_mut() = Some(Rc::new(hook));
        self
    }

    /// Returns the last published value.
    #[must_use]
    pub fn read(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Stores the given `value` and pushes it to all the current subscribers.
    ///
    /// When called from inside a subscriber, the `value` is delivered right
    /// after the value being delivered currently reaches every subscriber.
    pub fn next(&self, value: T) {
        Inner::publish(&self.inner, value);
    }

    /// Returns the number of attached subscribers.
    #[must_use]
    pub fn subscribers_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Detaches all the subscribers, including the ones which
    /// [`Subscription`]s were detached.
    pub fn clear_subscribers(&self) {
        let had_any = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            let had_any = !subscribers.is_empty();
            subscribers.clear();
            had_any
        };
        if had_any {
            let hook = self.inner.on_last_unsubscribe.borrow().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    /// Attaches the given `callback`, which stays subscribed until the
    /// returned [`Subscription`] is disposed or dropped.
    pub fn subscribe(
        &self,
        callback: impl Fn(&T) + 'static,
        replay: Replay,
    ) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        // Hook runs before attaching, so values it causes to be published
        // aren't observed twice together with the replay below.
        if self.subscribers_count() == 0 {
            let hook = self.inner.on_first_subscribe.borrow().clone();
            if let Some(hook) = hook {
                hook();
            }
        }

        let callback: Callback<T> = Rc::new(callback);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::clone(&callback)));

        if replay == Replay::Immediately {
            if let Some(value) = self.read() {
                callback(&value);
            }
        }

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || Inner::unsubscribe(&weak, id))
    }

    /// Returns a [`Publisher`] mirroring this one through the given function.
    ///
    /// The source is only subscribed to while the returned [`Publisher`] has
    /// subscribers. On attaching, the current source value is mapped.
    #[must_use]
    pub fn map<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> U + 'static,
    ) -> Publisher<U> {
        forward(vec![self.clone()], f)
    }

    /// Returns a [`Publisher`] receiving the values of all the given
    /// `publishers`.
    #[must_use]
    pub fn merge(publishers: impl IntoIterator<Item = Self>) -> Self {
        forward(publishers.into_iter().collect(), T::clone)
    }
}

impl<T: Clone + 'static> Inner<T> {
    fn publish(this: &Rc<Self>, value: T) {
        *this.value.borrow_mut() = Some(value.clone());
        if this.delivering.replace(true) {
            this.queue.borrow_mut().push_back(value);
            return;
        }

        let mut next = Some(value);
        while let Some(value) = next {
            this.deliver(&value);
            next = this.queue.borrow_mut().pop_front();
        }
        this.delivering.set(false);
    }

    fn deliver(&self, value: &T) {
        let snapshot = self.subscribers.borrow().clone();
        for (id, callback) in snapshot {
            // Previous callbacks may have detached this one.
            let attached =
                self.subscribers.borrow().iter().any(|(i, _)| *i == id);
            if attached {
                callback(value);
            }
        }
    }

    fn unsubscribe(weak: &Weak<Self>, id: u64) {
        let Some(this) = weak.upgrade() else {
            return;
        };

        let became_empty = {
            let mut subscribers = this.subscribers.borrow_mut();
            let before = subscribers.len();
            subscribers.retain(|(i, _)| *i != id);
            before != subscribers.len() && subscribers.is_empty()
        };
        if became_empty {
            let hook = this.on_last_unsubscribe.borrow().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }
}

fn forward<S, U>(
    sources: Vec<Publisher<S>>,
    f: impl Fn(&S) -> U + 'static,
) -> Publisher<U>
where
    S: Clone + 'static,
    U: Clone + 'static,
{
    let out = Publisher::<U>::new();
    let upstream = Rc::new(RefCell::new(DisposeBag::new()));
    let f = Rc::new(f);

    let weak = Rc::downgrade(&out.inner);
    let attach = {
        let upstream = Rc::clone(&upstream);
        move || {
            let mut bag = upstream.borrow_mut();
            for source in &sources {
                let weak = weak.clone();
                let f = Rc::clone(&f);
                bag.add(source.subscribe(
                    move |v| {
                        if let Some(out) = weak.upgrade() {
                            Inner::publish(&out, f(v));
                        }
                    },
                    Replay::Immediately,
                ));
            }
        }
    };
    let detach = move || upstream.borrow_mut().dispose();

    out.on_first_subscribe(attach).on_last_unsubscribe(detach)
}

/// Guard detaching something (usually a [`Publisher`] subscriber) once
/// disposed or dropped.
#[must_use = "dropping a `Subscription` disposes it right away"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a new [`Subscription`] running the given function on disposal.
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self { dispose: Some(Box::new(dispose)) }
    }

    /// Creates a new [`Subscription`] doing nothing on disposal.
    pub fn empty() -> Self {
        Self { dispose: None }
    }

    /// Disposes this [`Subscription`]. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    /// Indicates whether this [`Subscription`] has been disposed already.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.dispose.is_none()
    }

    /// Keeps whatever this [`Subscription`] guards attached forever.
    pub fn detach(mut self) {
        drop(self.dispose.take());
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Collection of [`Subscription`]s disposed all at once.
#[derive(Debug, Default)]
pub struct DisposeBag {
    subscriptions: Vec<Subscription>,
}

impl DisposeBag {
    /// Creates a new empty [`DisposeBag`].
    #[must_use]
    pub const fn new() -> Self {
        Self { subscriptions: Vec::new() }
    }

    /// Adds the given [`Subscription`] to this [`DisposeBag`].
    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Disposes every [`Subscription`] added so far, in the order they were
    /// added.
    pub fn dispose(&mut self) {
        for mut s in self.subscriptions.drain(..) {
            s.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::{DisposeBag, Publisher, Replay, Subscription};

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |v: &T| sink.borrow_mut().push(v.clone()))
    }

    #[test]
    fn delivers_in_subscription_order() {
        let publisher = Publisher::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let (o1, o2) = (Rc::clone(&order), Rc::clone(&order));
        let _s1 = publisher
            .subscribe(move |v| o1.borrow_mut().push((1, *v)), Replay::Never);
        let _s2 = publisher
            .subscribe(move |v| o2.borrow_mut().push((2, *v)), Replay::Never);
        publisher.next(7);

        assert_eq!(*order.borrow(), [(1, 7), (2, 7)]);
        assert_eq!(publisher.read(), Some(7));
    }

    #[test]
    fn replays_only_when_asked() {
        let publisher = Publisher::with_value("a");

        let (never, cb) = recorder();
        let _s1 = publisher.subscribe(cb, Replay::Never);
        let (immediately, cb) = recorder();
        let _s2 = publisher.subscribe(cb, Replay::Immediately);

        assert!(never.borrow().is_empty());
        assert_eq!(*immediately.borrow(), ["a"]);
    }

    #[test]
    fn dispose_is_idempotent_and_happens_on_drop() {
        let publisher = Publisher::new();
        let (seen, cb) = recorder();

        let mut sub = publisher.subscribe(cb, Replay::Never);
        publisher.next(1);
        sub.dispose();
        sub.dispose();
        publisher.next(2);
        assert_eq!(*seen.borrow(), [1]);

        let (seen, cb) = recorder();
        drop(publisher.subscribe(cb, Replay::Never));
        publisher.next(3);
        assert!(seen.borrow().is_empty());
        assert_eq!(publisher.subscribers_count(), 0);
    }

    #[test]
    fn tolerates_reentrant_unsubscribe_and_publish() {
        let publisher = Publisher::new();
        let later = Rc::new(RefCell::new(None));
        let (seen, cb) = recorder::<i32>();

        let p = publisher.clone();
        let l = Rc::clone(&later);
        let _first = publisher.subscribe(
            move |v: &i32| {
                if *v == 1 {
                    // Detaches the second subscriber and publishes again.
                    let second: Option<Subscription> = l.borrow_mut().take();
                    if let Some(mut s) = second {
                        s.dispose();
                    }
                    p.next(2);
                }
            },
            Replay::Never,
        );
        *later.borrow_mut() = Some(publisher.subscribe(cb, Replay::Never));

        publisher.next(1);

        assert!(seen.borrow().is_empty());
        assert_eq!(publisher.read(), Some(2));
    }

    #[test]
    fn nested_publish_keeps_order_for_later_subscribers() {
        let publisher = Publisher::new();
        let p = publisher.clone();
        let (first_seen, first) = recorder::<i32>();
        let _first = publisher.subscribe(
            move |v: &i32| {
                first(v);
                if *v == 1 {
                    p.next(2);
                }
            },
            Replay::Never,
        );
        let (later_seen, later) = recorder::<i32>();
        let _later = publisher.subscribe(later, Replay::Never);

        publisher.next(1);

        assert_eq!(*first_seen.borrow(), [1, 2]);
        assert_eq!(*later_seen.borrow(), [1, 2]);
        assert_eq!(publisher.read(), Some(2));

        publisher.next(3);
        assert_eq!(*later_seen.borrow(), [1, 2, 3]);
    }

    #[test]
    fn hooks_track_first_and_last_subscriber() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (e1, e2) = (Rc::clone(&events), Rc::clone(&events));
        let publisher = Publisher::<u8>::new()
            .on_first_subscribe(move || e1.borrow_mut().push("first"))
            .on_last_unsubscribe(move || e2.borrow_mut().push("last"));

        let a = publisher.subscribe(|_| {}, Replay::Never);
        let b = publisher.subscribe(|_| {}, Replay::Never);
        drop(a);
        drop(b);

        assert_eq!(*events.borrow(), ["first", "last"]);
    }

    #[test]
    fn map_and_merge_forward_values() {
        let numbers = Publisher::with_value(1);
        let others = Publisher::new();

        let doubled = numbers.map(|n| n * 2);
        let (seen, cb) = recorder();
        let sub = doubled.subscribe(cb, Replay::Never);
        assert_eq!(doubled.read(), Some(2));
        numbers.next(5);
        assert_eq!(*seen.borrow(), [10]);
        drop(sub);
        assert_eq!(numbers.subscribers_count(), 0);

        let merged = Publisher::merge([numbers.clone(), others.clone()]);
        let (seen, cb) = recorder();
        let _sub = merged.subscribe(cb, Replay::Never);
        others.next(8);
        numbers.next(9);
        assert_eq!(merged.read(), Some(9));
        assert_eq!(*seen.borrow(), [8, 9]);
    }

    #[test]
    fn clears_even_detached_subscribers() {
        let publisher = Publisher::new();
        let (seen, cb) = recorder();
        publisher.subscribe(cb, Replay::Never).detach();

        publisher.clear_subscribers();
        publisher.next(1);

        assert!(seen.borrow().is_empty());
        assert_eq!(publisher.subscribers_count(), 0);
    }

    #[test]
    fn dispose_bag_disposes_everything() {
        let publisher = Publisher::new();
        let mut bag = DisposeBag::new();
        bag.add(publisher.subscribe(|_: &u8| {}, Replay::Never));
        bag.add(publisher.subscribe(|_: &u8| {}, Replay::Never));

        bag.dispose();
        bag.dispose();

        assert_eq!(publisher.subscribers_count(), 0);
    }
}
