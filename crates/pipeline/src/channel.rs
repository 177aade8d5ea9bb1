//! Channel registry
//!
//! [`SchedulerHandle`] is the connection factory receivers call: each call
//! creates a channel buffer, queues it for the scheduler to adopt on its
//! next tick, and returns a [`SchedulerChannel`] the receiver pushes into.
//!
//! Both sides share the buffer through `Rc<RefCell<_>>`. Borrows never span
//! an `.await`, so a failed borrow only happens on re-entrant use and is
//! reported as [`ChannelError::Busy`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use strand_framing::{ChannelBuffer, ChannelConfig, ChannelStats, Message};
use strand_sources::{ChannelError, ChannelFactory, ConnectionInfo, IngressChannel};
use tokio::sync::Notify;

use crate::error::{Result, SchedulerError};
use crate::message::FramedMessage;

/// Messages completed during the current tick
pub(crate) type Outbound = Rc<RefCell<Vec<FramedMessage>>>;

/// One registered channel
pub(crate) struct ChannelSlot {
    pub id: u64,
    pub info: ConnectionInfo,
    pub buffer: RefCell<ChannelBuffer<Bytes>>,
    notify: Rc<Notify>,
}

/// State shared by the scheduler and every handle
pub(crate) struct Shared {
    pub channel_config: ChannelConfig,
    pub outbound: Outbound,
    pub notify: Rc<Notify>,
    /// Channels created since the last tick
    pub pending: RefCell<Vec<Rc<ChannelSlot>>>,
    /// Aggregate ingress switch requested through handles
    pub ingress_enabled: Cell<bool>,
    pub shutting_down: Cell<bool>,
    next_id: Cell<u64>,
}

impl Shared {
    pub fn new(channel_config: ChannelConfig) -> Self {
        Self {
            channel_config,
            outbound: Rc::new(RefCell::new(Vec::new())),
            notify: Rc::new(Notify::new()),
            pending: RefCell::new(Vec::new()),
            ingress_enabled: Cell::new(true),
            shutting_down: Cell::new(false),
            next_id: Cell::new(0),
        }
    }
}

// =============================================================================
// Scheduler Handle
// =============================================================================

/// Cloneable handle for registering channels and toggling ingress
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Rc<Shared>,
}

impl SchedulerHandle {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    /// Register a channel for `info`
    pub fn try_open(&self, info: &ConnectionInfo) -> Result<SchedulerChannel> {
        if self.shared.shutting_down.get() {
            return Err(SchedulerError::ShuttingDown);
        }
        let slot = self.new_slot(info);
        self.shared.pending.borrow_mut().push(Rc::clone(&slot));
        self.shared.notify.notify_one();

        tracing::debug!(channel_id = slot.id, source = %info, "channel opened");
        Ok(SchedulerChannel { slot })
    }

    fn new_slot(&self, info: &ConnectionInfo) -> Rc<ChannelSlot> {
        let id = self.shared.next_id.get() + 1;
        self.shared.next_id.set(id);

        let outbound = Rc::clone(&self.shared.outbound);
        let source = *info;
        let on_message = Box::new(move |message: Message<Bytes>| {
            outbound
                .borrow_mut()
                .push(FramedMessage::from_message(message, source, id));
        });

        let mut buffer = ChannelBuffer::new(self.shared.channel_config.clone(), on_message);
        if !self.shared.ingress_enabled.get() {
            buffer.disable_ingress();
        }
        Rc::new(ChannelSlot {
            id,
            info: *info,
            buffer: RefCell::new(buffer),
            notify: Rc::clone(&self.shared.notify),
        })
    }

    /// Apply backpressure to every channel
    pub fn disable_ingress(&self) {
        self.shared.ingress_enabled.set(false);
        self.shared.notify.notify_one();
    }

    /// Lift backpressure from every channel
    pub fn enable_ingress(&self) {
        self.shared.ingress_enabled.set(true);
        self.shared.notify.notify_one();
    }

    pub fn ingress_enabled(&self) -> bool {
        self.shared.ingress_enabled.get()
    }
}

impl ChannelFactory for SchedulerHandle {
    type Channel = SchedulerChannel;

    /// After shutdown the returned channel is already closed and refuses data
    fn open(&self, info: &ConnectionInfo) -> SchedulerChannel {
        self.try_open(info).unwrap_or_else(|_| {
            let slot = self.new_slot(info);
            slot.buffer.borrow_mut().close();
            SchedulerChannel { slot }
        })
    }
}

// =============================================================================
// Scheduler Channel
// =============================================================================

/// Receiver-side handle to one channel buffer
#[derive(Clone)]
pub struct SchedulerChannel {
    slot: Rc<ChannelSlot>,
}

impl SchedulerChannel {
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.slot.info
    }

    pub fn disable_ingress(&self) -> std::result::Result<(), ChannelError> {
        self.buffer_mut()?.disable_ingress();
        Ok(())
    }

    pub fn enable_ingress(&self) -> std::result::Result<(), ChannelError> {
        self.buffer_mut()?.enable_ingress();
        self.slot.notify.notify_one();
        Ok(())
    }

    /// Lifetime counters of the underlying buffer
    pub fn stats(&self) -> ChannelStats {
        self.slot
            .buffer
            .try_borrow()
            .map(|b| b.stats())
            .unwrap_or_default()
    }

    /// Closed and fully drained
    pub fn is_done(&self) -> bool {
        self.slot
            .buffer
            .try_borrow()
            .is_ok_and(|b| b.is_done())
    }

    fn buffer_mut(
        &self,
    ) -> std::result::Result<std::cell::RefMut<'_, ChannelBuffer<Bytes>>, ChannelError> {
        self.slot
            .buffer
            .try_borrow_mut()
            .map_err(|_| ChannelError::Busy)
    }
}

impl IngressChannel for SchedulerChannel {
    fn push(&self, data: Bytes) -> std::result::Result<(), ChannelError> {
        let mut buffer = self.buffer_mut()?;
        if buffer.is_closed() {
            return Err(ChannelError::Closed);
        }
        // A chunk shed by the overload strategy is not an error for the sender
        buffer.push(data);
        drop(buffer);
        self.slot.notify.notify_one();
        Ok(())
    }

    fn close(&self) -> std::result::Result<(), ChannelError> {
        self.buffer_mut()?.close();
        self.slot.notify.notify_one();
        Ok(())
    }

    fn last_push_elapsed(&self) -> Duration {
        self.slot
            .buffer
            .try_borrow()
            .map(|b| b.last_push_elapsed())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SchedulerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerChannel")
            .field("id", &self.slot.id)
            .field("source", &self.slot.info)
            .finish()
    }
}
