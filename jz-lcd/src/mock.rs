//! Test doubles for the platform traits.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
    vec::Vec,
};

use embedded_hal::delay::DelayNs;
use fugit::HertzU32;

use crate::{
    clock::{ClockError, ClockSource},
    plane::{BufferHandle, BufferProvider, DmaRegion},
    regs::{ctrl, state, Register, RegisterInterface, CTRL, STATE},
};

/// A register file that remembers every write.
///
/// Writing `CTRL.DISABLE` immediately reports the controller as stopped,
/// unless switched off with [`MockRegisters::set_auto_disable`].
#[derive(Debug)]
pub(crate) struct MockRegisters {
    values: RefCell<BTreeMap<u32, u32>>,
    writes: RefCell<Vec<(u32, u32)>>,
    auto_disable: Cell<bool>,
}

impl MockRegisters {
    pub(crate) fn new() -> Self {
        Self {
            values: RefCell::new(BTreeMap::new()),
            writes: RefCell::new(Vec::new()),
            auto_disable: Cell::new(true),
        }
    }

    /// Sets a register the way hardware would, without logging a write.
    pub(crate) fn poke(&self, offset: u32, value: u32) {
        self.values.borrow_mut().insert(offset, value);
    }

    pub(crate) fn write_count(&self, offset: u32) -> usize {
        self.writes
            .borrow()
            .iter()
            .filter(|(o, _)| *o == offset)
            .count()
    }

    pub(crate) fn writes(&self) -> Vec<(u32, u32)> {
        self.writes.borrow().clone()
    }

    pub(crate) fn clear_log(&self) {
        self.writes.borrow_mut().clear();
    }

    pub(crate) fn set_auto_disable(&self, enabled: bool) {
        self.auto_disable.set(enabled);
    }
}

impl RegisterInterface for MockRegisters {
    fn read(&self, offset: u32) -> u32 {
        self.values.borrow().get(&offset).copied().unwrap_or(0)
    }

    fn write(&self, offset: u32, value: u32) {
        self.writes.borrow_mut().push((offset, value));
        self.poke(offset, value);

        if offset == CTRL::OFFSET && value & ctrl::DISABLE != 0 && self.auto_disable.get() {
            let status = self.read(STATE::OFFSET);
            self.poke(STATE::OFFSET, status | state::DISABLED);
        }
    }
}

#[derive(Debug, Default)]
struct ClockState {
    enabled: bool,
    fail_enable: bool,
    rates: Vec<HertzU32>,
}

/// A clock that can produce any rate up to its parent rate.
///
/// Clones share their state, so a test can keep a handle after moving the
/// clock into the driver.
#[derive(Debug, Clone)]
pub(crate) struct MockClock {
    max: HertzU32,
    state: Rc<RefCell<ClockState>>,
}

impl MockClock {
    pub(crate) fn new(max: HertzU32) -> Self {
        Self {
            max,
            state: Rc::default(),
        }
    }

    pub(crate) fn fail_enable(&mut self) {
        self.state.borrow_mut().fail_enable = true;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    pub(crate) fn rates_set(&self) -> Vec<HertzU32> {
        self.state.borrow().rates.clone()
    }
}

impl ClockSource for MockClock {
    fn round_rate(&self, rate: HertzU32) -> Result<HertzU32, ClockError> {
        if rate <= self.max {
            Ok(rate)
        } else {
            Err(ClockError::UnsupportedRate)
        }
    }

    fn set_rate(&mut self, rate: HertzU32) -> Result<(), ClockError> {
        let rate = self.round_rate(rate)?;
        self.state.borrow_mut().rates.push(rate);
        Ok(())
    }

    fn enable(&mut self) -> Result<(), ClockError> {
        let mut state = self.state.borrow_mut();
        if state.fail_enable {
            return Err(ClockError::Failed);
        }
        state.enabled = true;
        Ok(())
    }

    fn disable(&mut self) {
        self.state.borrow_mut().enabled = false;
    }

    fn parent_rate(&self) -> HertzU32 {
        self.max
    }
}

/// Buffer handle `n` maps to 4 MiB at a fixed address, handle 0 resolves to
/// nothing.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockBuffers {
    syncs: Rc<RefCell<Vec<(u32, u32)>>>,
}

impl MockBuffers {
    const BASE: u32 = 0x1000_0000;
    const SIZE: u32 = 0x0040_0000;

    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn paddr_of(&self, handle: BufferHandle) -> u32 {
        Self::BASE + handle.0 * Self::SIZE
    }

    pub(crate) fn syncs(&self) -> Vec<(u32, u32)> {
        self.syncs.borrow().clone()
    }
}

impl BufferProvider for MockBuffers {
    fn resolve(&self, handle: BufferHandle) -> Option<DmaRegion> {
        (handle.0 != 0).then(|| DmaRegion {
            paddr: self.paddr_of(handle),
            len: Self::SIZE,
        })
    }

    fn sync_for_device(&mut self, paddr: u32, len: u32) {
        self.syncs.borrow_mut().push((paddr, len));
    }
}

/// A delay that only counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDelay {
    elapsed_ns: Rc<Cell<u64>>,
}

impl MockDelay {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn elapsed_us(&self) -> u64 {
        self.elapsed_ns.get() / 1000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + u64::from(ns));
    }
}
