//! Timer register block of a 6526 CIA: timers A and B, their control
//! registers and the timer half of the interrupt control register.
//!
//! Ports, TOD clock and the serial shift register belong to the rest of the
//! chip and are not handled here.

use std::cell::Cell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::alarm::{AlarmScheduler, AlarmToken};
use crate::clock::{self, Clock};
use crate::debug_flags;
use crate::interrupt::{InterruptLine, IrqLine};
use crate::snapshot::CiaSnapshot;
use crate::timer::{ControlBits, TimerLatency, TimerUnit};

pub const CIA_TAL: u8 = 0x04;
pub const CIA_TAH: u8 = 0x05;
pub const CIA_TBL: u8 = 0x06;
pub const CIA_TBH: u8 = 0x07;
pub const CIA_ICR: u8 = 0x0D;
pub const CIA_CRA: u8 = 0x0E;
pub const CIA_CRB: u8 = 0x0F;

// CRB input mode: count timer A underflows
const CRB_INMODE_TA: u8 = 0x40;
const CR_INMODE_MASK: u8 = 0x60;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IcrFlags: u8 {
        const TA = 0b00000001;
        const TB = 0b00000010;
        const TOD = 0b00000100;
        const SDR = 0b00001000;
        const FLAG = 0b00010000;
        const IR = 0b10000000;
    }
}

/// Routes a timer's underflows into its ICR bit.
struct IcrSource {
    flags: Rc<Cell<IcrFlags>>,
    bit: IcrFlags,
}

impl InterruptLine for IcrSource {
    fn timer_underflow(&mut self, _clock: Clock, _count: u32) {
        self.flags.set(self.flags.get() | self.bit);
    }
}

pub struct CiaTimers {
    pub timer_a: TimerUnit,
    pub timer_b: TimerUnit,
    cra: u8,
    crb: u8,
    /// Timer B input is timer A, as of the last sync.
    b_counts_a: bool,
    /// Input mode written to CRB that is not in effect yet.
    b_input_change: Option<(Clock, bool)>,
    icr_mask: IcrFlags,
    icr_flags: Rc<Cell<IcrFlags>>,
    irq_active: bool,
    irq: Box<dyn IrqLine>,
}

impl CiaTimers {
    pub fn new(
        clock: Clock,
        tokens: (AlarmToken, AlarmToken),
        latency: TimerLatency,
        irq: Box<dyn IrqLine>,
    ) -> Self {
        let icr_flags = Rc::new(Cell::new(IcrFlags::empty()));
        let timer_a = TimerUnit::new(
            "ciaTimerA",
            clock,
            tokens.0,
            latency,
            Box::new(IcrSource {
                flags: Rc::clone(&icr_flags),
                bit: IcrFlags::TA,
            }),
        );
        let timer_b = TimerUnit::new(
            "ciaTimerB",
            clock,
            tokens.1,
            latency,
            Box::new(IcrSource {
                flags: Rc::clone(&icr_flags),
                bit: IcrFlags::TB,
            }),
        );
        Self {
            timer_a,
            timer_b,
            cra: 0,
            crb: 0,
            b_counts_a: false,
            b_input_change: None,
            icr_mask: IcrFlags::empty(),
            icr_flags,
            irq_active: false,
            irq,
        }
    }

    pub fn reset(&mut self, clock: Clock, alarms: &mut dyn AlarmScheduler) {
        self.timer_a.reset(clock, alarms);
        self.timer_b.reset(clock, alarms);
        self.cra = 0;
        self.crb = 0;
        self.b_counts_a = false;
        self.b_input_change = None;
        self.icr_mask = IcrFlags::empty();
        self.icr_flags.set(IcrFlags::empty());
        if self.irq_active {
            self.irq_active = false;
            self.irq.set_irq(clock, false);
        }
    }

    fn b_counts_a_at(&mut self, clock: Clock) -> bool {
        if let Some((at, counts_a)) = self.b_input_change {
            if clock >= at {
                self.b_counts_a = counts_a;
                self.b_input_change = None;
            }
        }
        self.b_counts_a
    }

    /// Bring both timers to `clock`, feeding timer A underflows into a cascaded timer B.
    ///
    /// While timer B has changes pending, each underflow of A is delivered at
    /// the clock it happens so B counts it with the state in effect then.
    fn sync(&mut self, clock: Clock) {
        while self.timer_b.history().len() > 1 || self.b_input_change.is_some() {
            let next = self.timer_a.next_underflow();
            if next > clock {
                break;
            }
            self.feed_timer_b(next);
        }
        self.feed_timer_b(clock);
        self.timer_b.update(clock);
        self.update_irq(clock);
    }

    fn feed_timer_b(&mut self, clock: Clock) {
        let a_underflows = self.timer_a.update(clock);
        let counts_a = self.b_counts_a_at(clock);
        if a_underflows > 0 && counts_a {
            self.timer_b.step_cascade(clock, a_underflows);
        }
    }

    fn update_irq(&mut self, clock: Clock) {
        let pending = !(self.icr_flags.get() & self.icr_mask).is_empty();
        if pending && !self.irq_active {
            self.irq_active = true;
            self.irq.set_irq(clock, true);
        }
    }

    pub fn irq_active(&self) -> bool {
        self.irq_active
    }

    /// Interrupt flags without the side effect of an ICR read.
    pub fn peek_icr(&self) -> u8 {
        let ir = if self.irq_active { IcrFlags::IR } else { IcrFlags::empty() };
        (self.icr_flags.get() | ir).bits()
    }

    pub fn read(&mut self, addr: u8, clock: Clock) -> u8 {
        self.sync(clock);
        let value = match addr & 0x0F {
            CIA_TAL => self.timer_a.read_low(clock),
            CIA_TAH => self.timer_a.read_high(clock),
            CIA_TBL => self.timer_b.read_low(clock),
            CIA_TBH => self.timer_b.read_high(clock),
            CIA_ICR => {
                let value = self.peek_icr();
                self.icr_flags.set(IcrFlags::empty());
                if self.irq_active {
                    self.irq_active = false;
                    self.irq.set_irq(clock, false);
                }
                value
            }
            CIA_CRA => {
                Self::visible_control(self.cra, self.timer_a.is_running() || self.timer_a.is_cascaded())
            }
            CIA_CRB => {
                Self::visible_control(self.crb, self.timer_b.is_running() || self.timer_b.is_cascaded())
            }
            _ => 0xFF,
        };
        if debug_flags::trace_regs() {
            log::trace!("read  ${:X} = {:02X} at {}", addr & 0x0F, value, clock);
        }
        value
    }

    // The load strobe never reads back and the start bit follows the counter.
    fn visible_control(written: u8, counting: bool) -> u8 {
        let mut value = written & !ControlBits::FORCE_LOAD.bits();
        if !counting {
            value &= !ControlBits::START.bits();
        }
        value
    }

    pub fn write(&mut self, addr: u8, clock: Clock, byte: u8, alarms: &mut dyn AlarmScheduler) {
        if debug_flags::trace_regs() {
            log::trace!("write ${:X} = {:02X} at {}", addr & 0x0F, byte, clock);
        }
        self.sync(clock);
        match addr & 0x0F {
            CIA_TAL => self.timer_a.set_latch_low(clock, byte, alarms),
            CIA_TAH => self.timer_a.set_latch_high(clock, byte, alarms),
            CIA_TBL => self.timer_b.set_latch_low(clock, byte, alarms),
            CIA_TBH => self.timer_b.set_latch_high(clock, byte, alarms),
            CIA_ICR => {
                let bits = IcrFlags::from_bits_truncate(byte & 0x1F);
                if byte & 0x80 != 0 {
                    self.icr_mask |= bits;
                } else {
                    self.icr_mask &= !bits;
                }
                self.update_irq(clock);
            }
            CIA_CRA => {
                self.cra = byte;
                let bits = ControlBits::from_bits_truncate(byte & 0x3F);
                self.timer_a.set_control(clock, bits, alarms);
            }
            CIA_CRB => {
                self.crb = byte;
                self.b_counts_a_at(clock);
                let input_at = clock + self.timer_b.latency().control;
                self.b_input_change = Some((input_at, byte & CRB_INMODE_TA != 0));
                let mut bits = ControlBits::from_bits_truncate(byte & 0x1F);
                if byte & CR_INMODE_MASK != 0 {
                    bits |= ControlBits::COUNT_SIBLING;
                }
                self.timer_b.set_control(clock, bits, alarms);
            }
            _ => {
                log::debug!("write to non-timer register ${:X} ignored", addr & 0x0F);
            }
        }
    }

    /// Dispatch an alarm registered by one of the timers.
    pub fn alarm_fired(&mut self, token: AlarmToken, clock: Clock, alarms: &mut dyn AlarmScheduler) {
        self.sync(clock);
        let timer = if token == self.timer_a.token() {
            &mut self.timer_a
        } else if token == self.timer_b.token() {
            &mut self.timer_b
        } else {
            log::warn!("alarm {:?} does not belong to this CIA", token);
            return;
        };
        if debug_flags::trace_alarm() {
            log::trace!("{}: alarm at {}", timer.name(), clock);
        }
        timer.acknowledge_alarm(clock, alarms);
    }

    pub fn owns_alarm(&self, token: AlarmToken) -> bool {
        token == self.timer_a.token() || token == self.timer_b.token()
    }

    pub fn prevent_clock_overflow(&mut self, sub: Clock) {
        self.timer_a.prevent_clock_overflow(sub);
        self.timer_b.prevent_clock_overflow(sub);
        if let Some((at, _)) = &mut self.b_input_change {
            *at = clock::rebase(*at, sub);
        }
    }

    pub fn snapshot(&mut self, clock: Clock) -> CiaSnapshot {
        self.sync(clock);
        CiaSnapshot {
            version: CiaSnapshot::CURRENT_VERSION,
            clock,
            timer_a: self.timer_a.snapshot(clock),
            timer_b: self.timer_b.snapshot(clock),
            cra: self.cra,
            crb: self.crb,
            icr_mask: self.icr_mask.bits(),
            icr_flags: self.icr_flags.get().bits(),
            irq_active: self.irq_active,
        }
    }

    pub fn restore(&mut self, clock: Clock, snap: &CiaSnapshot, alarms: &mut dyn AlarmScheduler) {
        self.timer_a.restore(clock, &snap.timer_a, alarms);
        self.timer_b.restore(clock, &snap.timer_b, alarms);
        self.cra = snap.cra;
        self.crb = snap.crb;
        self.b_counts_a = snap.crb & CRB_INMODE_TA != 0;
        self.b_input_change = None;
        self.icr_mask = IcrFlags::from_bits_truncate(snap.icr_mask);
        self.icr_flags.set(IcrFlags::from_bits_truncate(snap.icr_flags));
        if snap.irq_active != self.irq_active {
            self.irq_active = snap.irq_active;
            self.irq.set_irq(clock, snap.irq_active);
        }
    }
}
