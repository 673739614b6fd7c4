use std::collections::BTreeSet;

/// Sink for ISA interrupt line changes.
///
/// Devices do not talk to an interrupt controller directly; they report line
/// transitions to whatever the embedder wires in (a PIC model, a recorder in
/// tests).
pub trait IrqSink {
    fn raise_irq(&mut self, irq: u8);
    fn lower_irq(&mut self, irq: u8);

    fn pulse_irq(&mut self, irq: u8) {
        self.raise_irq(irq);
        self.lower_irq(irq);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    Raise(u8),
    Lower(u8),
}

/// Test sink that tracks line levels and records every transition.
#[derive(Debug, Default)]
pub struct IrqRecorder {
    asserted: BTreeSet<u8>,
    events: Vec<IrqEvent>,
}

impl IrqRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_asserted(&self, irq: u8) -> bool {
        self.asserted.contains(&irq)
    }

    pub fn take_events(&mut self) -> Vec<IrqEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of rising edges seen on `irq` (including re-raises).
    pub fn raise_count(&self, irq: u8) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, IrqEvent::Raise(n) if *n == irq))
            .count()
    }
}

impl IrqSink for IrqRecorder {
    fn raise_irq(&mut self, irq: u8) {
        self.asserted.insert(irq);
        self.events.push(IrqEvent::Raise(irq));
    }

    fn lower_irq(&mut self, irq: u8) {
        self.asserted.remove(&irq);
        self.events.push(IrqEvent::Lower(irq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_tracks_levels_and_edges() {
        let mut sink = IrqRecorder::new();
        sink.raise_irq(5);
        assert!(sink.is_asserted(5));
        sink.lower_irq(5);
        assert!(!sink.is_asserted(5));
        sink.pulse_irq(7);

        assert_eq!(
            sink.take_events(),
            vec![
                IrqEvent::Raise(5),
                IrqEvent::Lower(5),
                IrqEvent::Raise(7),
                IrqEvent::Lower(7),
            ]
        );
    }
}
