//! Device run state shared by the control and real-time contexts

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Output device run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    Running = 0,
    Suspended = 1,
    Stopped = 2,
}

impl DeviceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DeviceState::Running,
            1 => DeviceState::Suspended,
            _ => DeviceState::Stopped,
        }
    }
}

/// Lock-free device gate
///
/// The epoch increments every time the device leaves `Running`. A job
/// remembers the epoch it was dispatched in; if the epoch has moved by the
/// time its result lands, the result belongs to audio the device no longer
/// wants and is discarded. That holds even if the device was restarted in
/// between.
#[derive(Debug)]
pub struct DeviceGate {
    state: AtomicU8,
    epoch: AtomicU64,
}

impl DeviceGate {
    pub fn new(initial: DeviceState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current state (lock-free)
    #[inline]
    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == DeviceState::Running
    }

    /// Current epoch (lock-free)
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Resume output; returns the previous state
    pub fn start(&self) -> DeviceState {
        self.transition(DeviceState::Running)
    }

    /// Pause output; returns the previous state
    pub fn suspend(&self) -> DeviceState {
        self.transition(DeviceState::Suspended)
    }

    /// Stop output; returns the previous state
    pub fn stop(&self) -> DeviceState {
        self.transition(DeviceState::Stopped)
    }

    fn transition(&self, to: DeviceState) -> DeviceState {
        let previous = DeviceState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        if previous == DeviceState::Running && to != DeviceState::Running {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        previous
    }
}

impl Default for DeviceGate {
    fn default() -> Self {
        Self::new(DeviceState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_advances_when_leaving_running() {
        let gate = DeviceGate::default();
        assert!(gate.is_running());
        assert_eq!(gate.epoch(), 0);

        assert_eq!(gate.suspend(), DeviceState::Running);
        assert_eq!(gate.state(), DeviceState::Suspended);
        assert_eq!(gate.epoch(), 1);

        // Suspended -> Stopped is not a new interruption
        gate.stop();
        assert_eq!(gate.epoch(), 1);

        assert_eq!(gate.start(), DeviceState::Stopped);
        assert!(gate.is_running());
        assert_eq!(gate.epoch(), 1);

        gate.stop();
        assert_eq!(gate.epoch(), 2);
    }
}
