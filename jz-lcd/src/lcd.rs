//! # LCD controller peripheral
//!
//! [`Lcd`] owns the register block and the state shared with interrupt
//! context. The platform places it somewhere both the interrupt handler and
//! the [`DisplayController`](crate::DisplayController) can reach it, for
//! example in a `static`. Its interrupt handler then calls
//! [`Lcd::handle_interrupt`].
//!
//! ## Example
//!
//! ```rust, ignore
//! static LCD: Lcd<Mmio> = Lcd::new(Mmio::new(0x1305_0000));
//!
//! #[interrupt]
//! fn LCD() {
//!     LCD.handle_interrupt();
//! }
//!
//! async fn page_flip(display: &mut DisplayController<'_, Mmio, Cgu, Gem, Delay>) {
//!     display.submit(Transaction::new().with_plane(Plane::Primary, next_frame))?;
//!     LCD.wait_for_vblank().await?;
//! }
//! ```

use core::{cell::RefCell, future::poll_fn, task::Poll};

use critical_section::Mutex;
use embassy_sync::waitqueue::AtomicWaker;
use enumset::{EnumSet, EnumSetType};

use crate::{
    error::Error,
    regs::{self, ctrl, state, Registers, RegisterInterface},
    vblank::{Completion, EventStatus, Notification, VblankState},
};

/// Events reported in the status register.
#[derive(Debug, EnumSetType)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LcdInterrupt {
    /// A frame has been scanned out.
    EndOfFrame,
    /// A new frame has started.
    StartOfFrame,
    /// The output FIFO ran dry.
    OutFifoUnderrun,
    /// Layer 0 could not fetch pixels fast enough.
    InFifo0Underrun,
    /// Layer 1 could not fetch pixels fast enough.
    InFifo1Underrun,
    /// The controller acknowledged a quick disable.
    QuickDisable,
}

impl LcdInterrupt {
    fn from_status(status: u32) -> EnumSet<Self> {
        [
            (state::EOF_IRQ, LcdInterrupt::EndOfFrame),
            (state::SOF_IRQ, LcdInterrupt::StartOfFrame),
            (state::OUT_FIFO_UNDERRUN, LcdInterrupt::OutFifoUnderrun),
            (state::IN_FIFO0_UNDERRUN, LcdInterrupt::InFifo0Underrun),
            (state::IN_FIFO1_UNDERRUN, LcdInterrupt::InFifo1Underrun),
            (state::QD, LcdInterrupt::QuickDisable),
        ]
        .into_iter()
        .filter(|(bit, _)| status & bit != 0)
        .map(|(_, event)| event)
        .collect()
    }
}

/// The LCD controller register block and its interrupt-side state.
pub struct Lcd<R> {
    regs: Registers<R>,
    vblank: Mutex<RefCell<VblankState>>,
    waker: AtomicWaker,
}

impl<R: RegisterInterface> Lcd<R> {
    /// Wraps the register block.
    pub const fn new(raw: R) -> Self {
        Self {
            regs: Registers::new(raw),
            vblank: Mutex::new(RefCell::new(VblankState::new())),
            waker: AtomicWaker::new(),
        }
    }

    /// Typed access to the registers.
    pub fn registers(&self) -> &Registers<R> {
        &self.regs
    }

    /// Services the controller interrupt.
    ///
    /// Clears the end-of-frame status bit, leaving the others untouched, and
    /// returns every event that was pending. Underruns are logged and
    /// otherwise ignored.
    pub fn handle_interrupt(&self) -> EnumSet<LcdInterrupt> {
        let status = self.regs.read(regs::STATE);
        self.regs.clear_bits(regs::STATE, state::EOF_IRQ);

        let events = LcdInterrupt::from_status(status);

        if events.contains(LcdInterrupt::OutFifoUnderrun) {
            warn!("output FIFO underrun, status {:#x}", status);
        }
        if !events.is_disjoint(LcdInterrupt::InFifo0Underrun | LcdInterrupt::InFifo1Underrun) {
            warn!("input FIFO underrun, status {:#x}", status);
        }

        if events.contains(LcdInterrupt::EndOfFrame) {
            let frame = self.with_vblank(|vblank| vblank.end_of_frame());
            self.waker.wake();
            trace!("end of frame {}", frame);
        }

        events
    }

    /// Unmasks the end-of-frame interrupt.
    pub fn enable_vblank(&self) {
        self.regs.set_bits(regs::CTRL, ctrl::EOF_IRQ);
        self.with_vblank(|vblank| vblank.set_enabled(true));
    }

    /// Masks the end-of-frame interrupt.
    ///
    /// Armed notifications are delivered immediately and pending
    /// [`wait_for_vblank`](Self::wait_for_vblank) calls fail.
    pub fn disable_vblank(&self) {
        self.regs.clear_bits(regs::CTRL, ctrl::EOF_IRQ);
        self.with_vblank(|vblank| vblank.set_enabled(false));
        self.waker.wake();
    }

    /// Whether end-of-frame interrupts are delivered.
    pub fn vblank_enabled(&self) -> bool {
        self.with_vblank(|vblank| vblank.enabled())
    }

    /// Number of end-of-frame interrupts handled so far.
    pub fn frame_count(&self) -> u64 {
        self.with_vblank(|vblank| vblank.frame())
    }

    /// Takes the oldest delivered notification.
    pub fn take_completion(&self) -> Option<Completion> {
        self.with_vblank(|vblank| vblank.take_completion())
    }

    /// Waits for the next end-of-frame and returns the new frame count.
    ///
    /// Only one task can wait at a time.
    pub async fn wait_for_vblank(&self) -> Result<u64, Error> {
        let start = self
            .with_vblank(|vblank| vblank.enabled().then(|| vblank.frame()))
            .ok_or(Error::VblankUnavailable)?;

        poll_fn(|cx| {
            self.waker.register(cx.waker());
            self.with_vblank(|vblank| {
                if vblank.frame() != start {
                    Poll::Ready(Ok(vblank.frame()))
                } else if !vblank.enabled() {
                    Poll::Ready(Err(Error::VblankUnavailable))
                } else {
                    Poll::Pending
                }
            })
        })
        .await
    }

    pub(crate) fn awaiting_frame(&self) -> bool {
        self.with_vblank(|vblank| vblank.awaiting_frame())
    }

    pub(crate) fn has_completion_room(&self) -> bool {
        self.with_vblank(|vblank| vblank.has_completion_room())
    }

    /// Registers a transaction's notification in the same critical section
    /// the interrupt handler uses, so an end-of-frame cannot slip in between.
    pub(crate) fn finish_commit(
        &self,
        notification: Option<Notification>,
        frame_expected: bool,
        modeset: bool,
    ) -> EventStatus {
        self.with_vblank(|vblank| vblank.commit(notification, frame_expected, modeset))
    }

    fn with_vblank<T>(&self, f: impl FnOnce(&mut VblankState) -> T) -> T {
        critical_section::with(|cs| f(&mut *self.vblank.borrow_ref_mut(cs)))
    }
}
