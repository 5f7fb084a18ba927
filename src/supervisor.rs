//! Fault policy for the control loop.
//!
//! Transport faults are counted and otherwise ignored: a BLE link with
//! no subscriber or a USB port nobody opened is normal operation.
//! Acquisition faults trigger an ADC reset + reconfigure once
//! `reinit_after` of them arrive in a row.

use crate::error::Error;

/// What the control loop should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Continue,
    ReinitAdc,
}

pub struct Supervisor {
    reinit_after: u32,
    consecutive_acquisition_faults: u32,
    transport_faults: u32,
    reinits: u32,
}

impl Supervisor {
    pub const fn new(reinit_after: u32) -> Self {
        Self {
            reinit_after: if reinit_after == 0 { 1 } else { reinit_after },
            consecutive_acquisition_faults: 0,
            transport_faults: 0,
            reinits: 0,
        }
    }

    /// A sample went through the acquisition step.
    pub fn on_sample(&mut self) {
        self.consecutive_acquisition_faults = 0;
    }

    pub fn on_fault(&mut self, fault: &Error) -> Action {
        match fault {
            Error::Transport(_) => {
                self.transport_faults = self.transport_faults.wrapping_add(1);
                Action::Continue
            }
            Error::Acquisition(_) => {
                self.consecutive_acquisition_faults += 1;
                if self.consecutive_acquisition_faults >= self.reinit_after {
                    self.consecutive_acquisition_faults = 0;
                    self.reinits = self.reinits.wrapping_add(1);
                    Action::ReinitAdc
                } else {
                    Action::Continue
                }
            }
        }
    }

    pub fn transport_faults(&self) -> u32 {
        self.transport_faults
    }

    pub fn reinits(&self) -> u32 {
        self.reinits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AcquisitionFault, TransportFault};

    const TIMEOUT: Error = Error::Acquisition(AcquisitionFault::Timeout);
    const NOTIFY: Error = Error::Transport(TransportFault::NotifyFailed);

    #[test]
    fn transport_faults_never_reinit() {
        let mut sup = Supervisor::new(1);
        for _ in 0..100 {
            assert_eq!(sup.on_fault(&NOTIFY), Action::Continue);
        }
        assert_eq!(sup.transport_faults(), 100);
        assert_eq!(sup.reinits(), 0);
    }

    #[test]
    fn reinit_after_threshold() {
        let mut sup = Supervisor::new(3);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::Continue);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::Continue);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::ReinitAdc);
        // Counter restarts after a re-init.
        assert_eq!(sup.on_fault(&TIMEOUT), Action::Continue);
        assert_eq!(sup.reinits(), 1);
    }

    #[test]
    fn good_sample_resets_fault_streak() {
        let mut sup = Supervisor::new(2);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::Continue);
        sup.on_sample();
        assert_eq!(sup.on_fault(&TIMEOUT), Action::Continue);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::ReinitAdc);
    }

    #[test]
    fn transport_faults_do_not_break_acquisition_streak() {
        let mut sup = Supervisor::new(2);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::Continue);
        assert_eq!(sup.on_fault(&NOTIFY), Action::Continue);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::ReinitAdc);
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        let mut sup = Supervisor::new(0);
        assert_eq!(sup.on_fault(&TIMEOUT), Action::ReinitAdc);
    }
}
