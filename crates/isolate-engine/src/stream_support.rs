//! Per-isolate state for guest-constructed `ReadableStream`/`TransformStream`
//! instances (spec.md §4.3, §4.4). `isolate_bridge::globals::streams::StreamsApi`
//! only ever sees a stream's *consumer* half -- it was built for streams the
//! host already owns both ends of (an inbound request body, a tee branch).
//! A guest-constructed `new ReadableStream({start(controller) {...}})` needs
//! somewhere for the *producer* half (the guest's own `enqueue`/`close`/
//! `error` calls) to live, and an open `getReader()` needs somewhere to keep
//! the consumer across repeated `read()` calls. This module is that missing
//! bookkeeping; `crate::ops` is the only caller.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use isolate_stream::{StreamConsumer, StreamProducer};

pub type ReadableControllers = Rc<RefCell<HashMap<u64, Rc<StreamProducer>>>>;
pub type ReadableReaders = Rc<RefCell<HashMap<u64, Rc<RefCell<StreamConsumer>>>>>;
pub type TransformWriters = Rc<RefCell<HashMap<u64, Rc<StreamProducer>>>>;

#[must_use]
pub fn new_controllers() -> ReadableControllers {
    Rc::new(RefCell::new(HashMap::new()))
}

#[must_use]
pub fn new_readers() -> ReadableReaders {
    Rc::new(RefCell::new(HashMap::new()))
}

#[must_use]
pub fn new_transform_writers() -> TransformWriters {
    Rc::new(RefCell::new(HashMap::new()))
}

/// Guest-constructed streams share the same numeric namespace as
/// protocol-level stream sessions conceptually, but never cross the wire
/// directly, so a plain per-isolate counter is enough to keep them distinct.
#[derive(Default)]
pub struct StreamIdAllocator {
    next: u64,
}

impl StreamIdAllocator {
    pub fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

pub type SharedStreamIdAllocator = Rc<RefCell<StreamIdAllocator>>;

#[must_use]
pub fn new_id_allocator() -> SharedStreamIdAllocator {
    Rc::new(RefCell::new(StreamIdAllocator::default()))
}
