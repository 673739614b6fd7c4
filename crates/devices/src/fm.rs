use std::cell::RefCell;
use std::rc::Rc;

/// OPL-style FM synthesizer attachment point.
///
/// The card forwards FM register accesses and mixer-derived volume to
/// whatever chip model the embedder attaches; the card itself does not
/// synthesize FM audio.
pub trait FmChip {
    fn write(&mut self, index: u8, val: u8);
    fn read(&mut self, index: u8) -> u8;
    fn set_volume(&mut self, left: i32, right: i32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmEvent {
    Write { index: u8, val: u8 },
    Volume { left: i32, right: i32 },
}

#[derive(Debug, Default)]
struct FmRecorderInner {
    events: Vec<FmEvent>,
    status: u8,
}

/// Recording stub used by tests in place of a real synthesizer. Clones share
/// state, so a test can attach one handle and assert through another.
#[derive(Debug, Clone, Default)]
pub struct FmRecorder {
    inner: Rc<RefCell<FmRecorderInner>>,
}

impl FmRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: u8) {
        self.inner.borrow_mut().status = status;
    }

    pub fn events(&self) -> Vec<FmEvent> {
        self.inner.borrow().events.clone()
    }

    pub fn last_volume(&self) -> Option<(i32, i32)> {
        self.inner.borrow().events.iter().rev().find_map(|e| match e {
            FmEvent::Volume { left, right } => Some((*left, *right)),
            _ => None,
        })
    }
}

impl FmChip for FmRecorder {
    fn write(&mut self, index: u8, val: u8) {
        self.inner
            .borrow_mut()
            .events
            .push(FmEvent::Write { index, val });
    }

    fn read(&mut self, _index: u8) -> u8 {
        self.inner.borrow().status
    }

    fn set_volume(&mut self, left: i32, right: i32) {
        self.inner
            .borrow_mut()
            .events
            .push(FmEvent::Volume { left, right });
    }
}
