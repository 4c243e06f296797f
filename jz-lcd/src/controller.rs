//! # Display controller
//!
//! [`DisplayController`] is the commit entry point. It brings the controller
//! up, checks and applies [`Transaction`]s, and exposes the individual plane
//! operations the commit path is built from.
//!
//! A modeset is applied in this order:
//! 1. device clock, on the first output enable
//! 2. output disable, when requested
//! 3. panel configuration
//! 4. composition routing of the image-processing plane
//! 5. plane descriptors, formats and geometry
//! 6. timings and pixel clock
//! 7. output enable, when requested
//! 8. notification arming
//!
//! If the controller does not stop within the configured timeout, the disable
//! is rolled back: `CTRL.DISABLE` is cleared again and vertical-blank
//! interrupts are switched back on.
//!
//! A fast update only reprograms the descriptors of the planes it names and
//! arms its notification.

use embedded_hal::delay::DelayNs;

use crate::{
    clock::{ClockCoordinator, ClockSource},
    commit::{self, CheckedCommit, CommitKind, CommitOutcome, CommitPhase, CommittedState, Transaction},
    config::{Config, SocInfo},
    dma::{self, DescriptorAllocator, DescriptorRing, HardwareDescriptor, Layer},
    error::{Error, RejectReason, Resource},
    lcd::Lcd,
    plane::{self, BufferProvider, PixelFormat, Plane, PlaneState, ScanoutBuffer},
    regs::{self, ctrl, osdc, osdctrl, state, RegisterInterface},
    timing::OutputMode,
};

/// Collaborators the controller takes ownership of.
#[derive(Debug)]
pub struct Resources<C, B, D> {
    /// The pixel clock.
    pub pixel_clock: C,
    /// The device clock, required on SoCs that have one.
    pub device_clock: Option<C>,
    /// Resolves framebuffer handles and maintains cache coherency.
    pub buffers: B,
    /// Used while waiting for the controller to stop.
    pub delay: D,
}

/// What a layer is currently fetching, as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanoutStatus {
    /// Address of the pixel data being fetched.
    pub source_address: u32,
    /// Tag of the descriptor in use.
    pub frame_id: u32,
    /// Bytes left in the current transfer.
    pub transfer_len: u32,
}

/// Drives one LCD controller.
pub struct DisplayController<'d, R, C, B, D>
where
    R: RegisterInterface,
    C: ClockSource,
    B: BufferProvider,
    D: DelayNs,
{
    lcd: &'d Lcd<R>,
    config: Config,
    info: SocInfo,
    clocks: ClockCoordinator<C>,
    buffers: B,
    delay: D,
    ring: DescriptorRing<'d>,
    committed: CommittedState,
    phase: CommitPhase,
}

impl<'d, R, C, B, D> DisplayController<'d, R, C, B, D>
where
    R: RegisterInterface,
    C: ClockSource,
    B: BufferProvider,
    D: DelayNs,
{
    /// Brings up the controller.
    ///
    /// Allocates both scan-out descriptors, ungates the pixel clock and points
    /// the layers at their descriptors. The output stays off until a
    /// transaction activates it. Fails without side effects on the hardware
    /// when a resource cannot be acquired.
    pub fn new(
        lcd: &'d Lcd<R>,
        config: Config,
        resources: Resources<C, B, D>,
        descriptors: &mut impl DescriptorAllocator<'d>,
    ) -> Result<Self, Error> {
        let info = config.info();
        if info.needs_device_clock && resources.device_clock.is_none() {
            return Err(Error::ResourceExhausted(Resource::DeviceClock));
        }

        let ring = DescriptorRing::new(descriptors)?;

        let mut clocks = ClockCoordinator::new(resources.pixel_clock, resources.device_clock);
        clocks.start()?;

        let regs = lcd.registers();
        regs.write(regs::DA0, ring.paddr(Layer::F0));
        regs.write(regs::DA1, ring.paddr(Layer::F1));
        if info.has_osd {
            regs.write(regs::OSDC, osdc::OSDEN);
        }

        info!(
            "{:?} LCD controller up, {}x{} max",
            config.soc,
            info.max_width,
            info.max_height
        );

        Ok(Self {
            lcd,
            config,
            info,
            clocks,
            buffers: resources.buffers,
            delay: resources.delay,
            ring,
            committed: CommittedState::new(),
            phase: CommitPhase::Idle,
        })
    }

    /// The peripheral this controller drives.
    pub fn lcd(&self) -> &'d Lcd<R> {
        self.lcd
    }

    /// The configuration the controller was brought up with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current state of the commit state machine.
    pub fn phase(&self) -> CommitPhase {
        if self.phase == CommitPhase::Idle && self.lcd.awaiting_frame() {
            CommitPhase::AwaitingFrameBoundary
        } else {
            self.phase
        }
    }

    /// The committed output mode.
    pub fn mode(&self) -> Option<OutputMode> {
        self.committed.mode
    }

    /// Whether the output is running.
    pub fn is_active(&self) -> bool {
        self.committed.active
    }

    /// The committed state of a plane.
    pub fn plane_state(&self, plane: Plane) -> PlaneState {
        self.committed.planes[plane.index()]
    }

    /// A snapshot of the descriptor feeding a plane.
    pub fn descriptor(&self, plane: Plane) -> Option<HardwareDescriptor> {
        plane.layer().map(|layer| self.ring.descriptor(layer))
    }

    /// What the hardware is fetching for a plane.
    pub fn scanout_status(&self, plane: Plane) -> Option<ScanoutStatus> {
        let regs = self.lcd.registers();
        let (sa, fid, cmd) = match plane.layer()? {
            Layer::F0 => (regs.read(regs::SA0), regs.read(regs::FID0), regs.read(regs::CMD0)),
            Layer::F1 => (regs.read(regs::SA1), regs.read(regs::FID1), regs.read(regs::CMD1)),
        };
        Some(ScanoutStatus {
            source_address: sa,
            frame_id: fid,
            transfer_len: dma::command_transfer_len(cmd),
        })
    }

    /// Checks and applies a transaction.
    ///
    /// A rejected transaction leaves hardware and committed state untouched.
    /// A transaction submitted while a modeset still waits for its frame
    /// boundary is rejected with [`RejectReason::Busy`], as is a transaction
    /// asking for a notification while undelivered completions fill the
    /// queue (see [`Lcd::take_completion`]).
    pub fn submit(&mut self, txn: Transaction) -> Result<CommitOutcome, Error> {
        if self.phase() != CommitPhase::Idle {
            return Err(RejectReason::Busy.into());
        }
        if txn.notification.is_some() && !self.lcd.has_completion_room() {
            debug!("completion queue full, collect completions first");
            return Err(RejectReason::Busy.into());
        }

        self.set_phase(CommitPhase::Checking);
        let checked = commit::check(&self.committed, &txn, &self.config, &self.clocks, &self.buffers);
        let checked = match checked {
            Ok(checked) => checked,
            Err(err) => {
                debug!("transaction rejected: {:?}", err);
                self.set_phase(CommitPhase::Idle);
                return Err(err);
            }
        };

        self.set_phase(CommitPhase::Applying);
        let outcome = self.apply(checked);
        self.set_phase(CommitPhase::Idle);
        outcome
    }

    fn apply(&mut self, checked: CheckedCommit) -> Result<CommitOutcome, Error> {
        let was_active = self.committed.active;
        let modeset = checked.needs_modeset;
        let enabling = !was_active && checked.next.active;

        // Acquired before any register write, a failure leaves the hardware
        // as it was.
        if enabling {
            self.clocks.enable_device_clock()?;
        }

        if was_active && !checked.next.active {
            self.disable_output()?;
        }

        if modeset {
            if let Some(mode) = &checked.next.mode {
                let primary_cpp = checked.next.planes[Plane::Primary.index()]
                    .format()
                    .map(PixelFormat::bytes_per_pixel);
                let value = self.config.panel.panel_config(mode, primary_cpp);
                self.lcd.registers().write(regs::CFG, value);
            }
            self.begin(&checked);
        }

        self.program_planes(&checked)?;

        if modeset {
            if let Some(timings) = &checked.timings {
                timings.apply(self.lcd.registers());
            }
            if let Some(rate) = checked.pixel_rate {
                self.clocks.apply_pixel_rate(rate);
            }
        }

        if enabling {
            self.enable_output();
        }

        self.committed = checked.next;

        let frame_expected = checked.frame_expected();
        let notification = self
            .lcd
            .finish_commit(checked.notification, frame_expected, modeset);

        let kind = if modeset {
            CommitKind::Modeset
        } else {
            CommitKind::FastUpdate
        };
        trace!("commit applied: {:?}, notification {:?}", kind, notification);

        Ok(CommitOutcome { kind, notification })
    }

    /// Routes the image-processing plane into the composition path before
    /// any geometry of the new frame is written.
    fn begin(&mut self, checked: &CheckedCommit) {
        if !self.info.has_osd {
            return;
        }
        let ipu_live = checked.next.planes[Plane::ImageProcessing.index()].is_live();
        self.lcd
            .registers()
            .set_bits_if(regs::OSDCTRL, osdctrl::IPU, ipu_live);
    }

    fn program_planes(&mut self, checked: &CheckedCommit) -> Result<(), Error> {
        for plane in Plane::ALL {
            let i = plane.index();
            if !checked.touched[i] && !checked.needs_modeset {
                continue;
            }
            let state = checked.next.planes[i];

            match (checked.buffers[i], state.framebuffer) {
                (Some(buffer), Some(fb)) => {
                    self.program_descriptor(plane, &buffer)?;
                    if checked.needs_modeset {
                        plane::configure(
                            self.lcd.registers(),
                            &self.info,
                            plane,
                            fb.format,
                            &state.dst,
                        )?;
                    }
                }
                (None, None) if self.committed.planes[i].is_live() => self.disable_plane(plane),
                _ => {}
            }
        }
        Ok(())
    }

    /// Programs a plane's pixel format and, with an OSD block, its position
    /// and size from the committed destination rectangle. Enables the plane.
    pub fn configure_plane(&mut self, plane: Plane, format: PixelFormat) -> Result<(), Error> {
        plane.check_available(&self.info, self.config.image_processing)?;
        let dst = self.committed.planes[plane.index()].dst;
        plane::configure(self.lcd.registers(), &self.info, plane, format, &dst)
    }

    /// Points a plane's descriptor at `buffer`.
    ///
    /// Fails with [`RejectReason::InvalidBuffer`] when the transfer does not
    /// fit a descriptor.
    ///
    /// With the cached buffer policy, the fetched range is written back from
    /// the CPU caches first. The buffer must stay valid until it has been
    /// replaced and a frame has completed.
    pub fn update_plane(&mut self, plane: Plane, buffer: &ScanoutBuffer) -> Result<(), Error> {
        plane.check_available(&self.info, self.config.image_processing)?;
        self.program_descriptor(plane, buffer)
    }

    fn program_descriptor(&mut self, plane: Plane, buffer: &ScanoutBuffer) -> Result<(), Error> {
        let layer = plane.layer().ok_or(RejectReason::PlaneUnavailable)?;
        let len = buffer.transfer_len()?;

        if self.config.cached_buffers {
            self.buffers.sync_for_device(buffer.paddr, len);
        }
        self.ring.program(layer, buffer.paddr, len);

        trace!("{:?} scanning out {} bytes at {:#x}", plane, len, buffer.paddr);
        Ok(())
    }

    /// Switches a plane's layer on. Its descriptor is left as is.
    pub fn enable_plane(&mut self, plane: Plane) {
        plane::set_enabled(self.lcd.registers(), &self.info, plane, true);
    }

    /// Switches a plane's layer off. Its descriptor is left as is.
    pub fn disable_plane(&mut self, plane: Plane) {
        plane::set_enabled(self.lcd.registers(), &self.info, plane, false);
    }

    fn enable_output(&mut self) {
        let regs = self.lcd.registers();
        regs.write(regs::STATE, 0);
        regs.modify(regs::CTRL, ctrl::ENABLE | ctrl::DISABLE, ctrl::ENABLE);
        self.lcd.enable_vblank();

        info!("output enabled");
    }

    fn disable_output(&mut self) -> Result<(), Error> {
        self.lcd.disable_vblank();

        let regs = self.lcd.registers();
        regs.set_bits(regs::CTRL, ctrl::DISABLE);

        let interval = self.config.poll_interval.ticks().max(1);
        let timeout = self.config.disable_timeout.ticks();
        let mut waited = 0;
        while regs.read(regs::STATE) & state::DISABLED == 0 {
            if waited >= timeout {
                error!("controller did not stop within {} us", timeout);
                // Still scanning out, back to the last applied state.
                regs.clear_bits(regs::CTRL, ctrl::DISABLE);
                self.lcd.enable_vblank();
                return Err(Error::Timeout);
            }
            self.delay.delay_us(interval);
            waited += interval;
        }

        self.committed.active = false;
        info!("output disabled");
        Ok(())
    }

    fn set_phase(&mut self, phase: CommitPhase) {
        trace!("commit phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

impl<R, C, B, D> Drop for DisplayController<'_, R, C, B, D>
where
    R: RegisterInterface,
    C: ClockSource,
    B: BufferProvider,
    D: DelayNs,
{
    fn drop(&mut self) {
        if self.committed.active && self.disable_output().is_err() {
            warn!("dropping display controller while the output is still running");
        }
        self.lcd.disable_vblank();
        self.clocks.stop();
    }
}
