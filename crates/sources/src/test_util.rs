//! Recording channel factory for receiver tests

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::channel::{ChannelError, ChannelFactory, IngressChannel};
use crate::common::ConnectionInfo;

#[derive(Debug)]
pub struct ChannelState {
    pub info: ConnectionInfo,
    pub data: Vec<u8>,
    pub pushes: usize,
    pub closed: bool,
    pub last_push: Instant,
}

#[derive(Debug, Clone)]
pub struct TestChannel(pub Rc<RefCell<ChannelState>>);

impl IngressChannel for TestChannel {
    fn push(&self, data: Bytes) -> Result<(), ChannelError> {
        let mut state = self.0.borrow_mut();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        state.data.extend_from_slice(&data);
        state.pushes += 1;
        state.last_push = Instant::now();
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.0.borrow_mut().closed = true;
        Ok(())
    }

    fn last_push_elapsed(&self) -> Duration {
        self.0.borrow().last_push.elapsed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    pub channels: Rc<RefCell<Vec<TestChannel>>>,
}

impl RecordingFactory {
    pub fn opened(&self) -> usize {
        self.channels.borrow().len()
    }

    pub fn channel(&self, idx: usize) -> TestChannel {
        self.channels.borrow()[idx].clone()
    }

    pub fn data(&self, idx: usize) -> Vec<u8> {
        self.channel(idx).0.borrow().data.clone()
    }

    pub fn is_closed(&self, idx: usize) -> bool {
        self.channel(idx).0.borrow().closed
    }
}

impl ChannelFactory for RecordingFactory {
    type Channel = TestChannel;

    fn open(&self, info: &ConnectionInfo) -> TestChannel {
        let channel = TestChannel(Rc::new(RefCell::new(ChannelState {
            info: *info,
            data: Vec::new(),
            pushes: 0,
            closed: false,
            last_push: Instant::now(),
        })));
        self.channels.borrow_mut().push(channel.clone());
        channel
    }
}

/// Poll `cond` until it holds or two seconds pass
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
