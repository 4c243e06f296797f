//! # Atomic commits
//!
//! A [`Transaction`] bundles an optional mode change, an optional output
//! enable or disable, new states for any number of planes and an optional
//! completion [`Notification`]. Checking validates the whole transaction
//! against the committed state before any register is touched, and classifies
//! it as a modeset or a fast update.

use fugit::HertzU32;

use crate::{
    clock::{ClockCoordinator, ClockSource},
    config::Config,
    error::{Error, RejectReason},
    plane::{BufferProvider, Plane, PlaneState, ScanoutBuffer},
    timing::{OutputMode, SyncTimings},
    vblank::{EventStatus, Notification},
};

/// A proposed display update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transaction {
    pub(crate) mode: Option<OutputMode>,
    pub(crate) active: Option<bool>,
    pub(crate) planes: [Option<PlaneState>; 3],
    pub(crate) notification: Option<Notification>,
}

impl Transaction {
    /// An empty transaction.
    pub const fn new() -> Self {
        Self {
            mode: None,
            active: None,
            planes: [None; 3],
            notification: None,
        }
    }

    /// Switches to a new output mode.
    pub const fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Turns the output on or off.
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Replaces the state of `plane`.
    pub const fn with_plane(mut self, plane: Plane, state: PlaneState) -> Self {
        self.planes[plane.index()] = Some(state);
        self
    }

    /// Asks for a notification once the transaction is on screen.
    pub const fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }
}

/// How a transaction was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommitKind {
    /// Timings, panel configuration and plane layout were reprogrammed.
    Modeset,
    /// Only scan-out addresses changed.
    FastUpdate,
}

/// Result of an accepted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommitOutcome {
    /// How the transaction was applied.
    pub kind: CommitKind,
    /// What happened to the requested notification.
    pub notification: EventStatus,
}

/// Where the commit state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommitPhase {
    /// Ready for the next transaction.
    Idle,
    /// Validating a transaction.
    Checking,
    /// Programming the hardware.
    Applying,
    /// A modeset was written and takes effect at the next frame boundary.
    AwaitingFrameBoundary,
}

/// What the hardware currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommittedState {
    pub mode: Option<OutputMode>,
    pub active: bool,
    pub planes: [PlaneState; 3],
}

impl CommittedState {
    pub(crate) const fn new() -> Self {
        Self {
            mode: None,
            active: false,
            planes: [PlaneState::DISABLED; 3],
        }
    }
}

/// A transaction that passed checking, with everything needed to apply it.
#[derive(Debug)]
pub(crate) struct CheckedCommit {
    pub next: CommittedState,
    pub touched: [bool; 3],
    pub needs_modeset: bool,
    pub timings: Option<SyncTimings>,
    pub pixel_rate: Option<HertzU32>,
    pub buffers: [Option<ScanoutBuffer>; 3],
    pub notification: Option<Notification>,
}

impl CheckedCommit {
    /// Whether the hardware will raise an end-of-frame interrupt after this
    /// commit. A controller with no live plane fetches nothing and stays
    /// silent.
    pub(crate) fn frame_expected(&self) -> bool {
        self.next.active && self.next.planes.iter().any(PlaneState::is_live)
    }
}

/// Validates `txn` against `current`. Nothing is modified.
pub(crate) fn check<C: ClockSource>(
    current: &CommittedState,
    txn: &Transaction,
    config: &Config,
    clocks: &ClockCoordinator<C>,
    provider: &impl BufferProvider,
) -> Result<CheckedCommit, Error> {
    let info = config.info();

    let mut next = CommittedState {
        mode: txn.mode.or(current.mode),
        active: txn.active.unwrap_or(current.active),
        planes: current.planes,
    };

    let mut touched = [false; 3];
    let mut planes_changed = false;
    for plane in Plane::ALL {
        let Some(state) = txn.planes[plane.index()] else {
            continue;
        };
        if state.is_live() {
            plane.check_available(&info, config.image_processing)?;
        }
        planes_changed |= current.planes[plane.index()].needs_modeset(&state);
        next.planes[plane.index()] = state;
        touched[plane.index()] = true;
    }

    let mode_changed = txn.mode.is_some() && txn.mode != current.mode;
    let active_changed = next.active != current.active;
    let needs_modeset = mode_changed || active_changed || planes_changed;

    if next.planes[Plane::Overlay.index()].is_live()
        && next.planes[Plane::ImageProcessing.index()].is_live()
    {
        return Err(RejectReason::OverlayConflict.into());
    }

    let any_live = next.planes.iter().any(PlaneState::is_live);
    let mut timings = None;
    let mut pixel_rate = None;

    match next.mode {
        Some(mode) => {
            if needs_modeset {
                if mode.hdisplay > info.max_width || mode.vdisplay > info.max_height {
                    return Err(RejectReason::ModeTooLarge.into());
                }
                timings = Some(SyncTimings::from_mode(&mode, config.panel.special_tft)?);
                pixel_rate = Some(clocks.check(mode.clock)?);
                config.panel.check()?;
            }
            for plane in Plane::ALL {
                next.planes[plane.index()].check_geometry(plane, &info, &mode)?;
            }
        }
        None if any_live || next.active => return Err(RejectReason::NoMode.into()),
        None => {}
    }

    let mut buffers = [None; 3];
    for plane in Plane::ALL {
        let i = plane.index();
        if plane.layer().is_some() && (touched[i] || needs_modeset) {
            buffers[i] = ScanoutBuffer::resolve(&next.planes[i], provider)?;
        }
    }

    debug!(
        "commit checked: modeset {}, mode changed {}, active {} -> {}",
        needs_modeset,
        mode_changed,
        current.active,
        next.active
    );

    Ok(CheckedCommit {
        next,
        touched,
        needs_modeset,
        timings,
        pixel_rate,
        buffers,
        notification: txn.notification,
    })
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;
    use crate::{
        clock::ClockCoordinator,
        config::Soc,
        encoder::{BusFormat, PanelInfo},
        mock::{MockBuffers, MockClock},
        plane::{BufferHandle, Framebuffer, PixelFormat, Rect},
    };

    fn mode() -> OutputMode {
        OutputMode::new(320, 330, 340, 400, 240, 245, 246, 260, 6.MHz())
    }

    fn fb(handle: u32, format: PixelFormat) -> Framebuffer {
        Framebuffer {
            handle: BufferHandle(handle),
            format,
            width: 320,
            height: 240,
        }
    }

    struct Fixture {
        config: Config,
        clocks: ClockCoordinator<MockClock>,
        buffers: MockBuffers,
    }

    impl Fixture {
        fn new(soc: Soc) -> Self {
            Self {
                config: Config::new(soc).with_image_processing(true),
                clocks: ClockCoordinator::new(MockClock::new(50.MHz()), None),
                buffers: MockBuffers::new(),
            }
        }

        fn check(&self, current: &CommittedState, txn: &Transaction) -> Result<CheckedCommit, Error> {
            check(current, txn, &self.config, &self.clocks, &self.buffers)
        }
    }

    fn running(primary: Framebuffer) -> CommittedState {
        let mut state = CommittedState::new();
        state.mode = Some(mode());
        state.active = true;
        state.planes[Plane::Primary.index()] = PlaneState::new(primary, 0, 0);
        state
    }

    #[test]
    fn first_commit_is_a_modeset() {
        let fx = Fixture::new(Soc::Jz4770);
        let txn = Transaction::new()
            .with_mode(mode())
            .with_active(true)
            .with_plane(Plane::Primary, PlaneState::new(fb(1, PixelFormat::Rgb565), 0, 0));

        let checked = fx.check(&CommittedState::new(), &txn).unwrap();

        assert!(checked.needs_modeset);
        assert!(checked.timings.is_some());
        assert_eq!(checked.pixel_rate, Some(6.MHz()));
        assert!(checked.buffers[Plane::Primary.index()].is_some());
        assert!(checked.frame_expected());
    }

    #[test]
    fn buffer_swap_is_a_fast_update() {
        let fx = Fixture::new(Soc::Jz4770);
        let current = running(fb(1, PixelFormat::Rgb565));
        let txn = Transaction::new()
            .with_plane(Plane::Primary, PlaneState::new(fb(2, PixelFormat::Rgb565), 0, 0))
            .with_notification(Notification(1));

        let checked = fx.check(&current, &txn).unwrap();

        assert!(!checked.needs_modeset);
        assert!(checked.timings.is_none());
        assert!(checked.pixel_rate.is_none());
        assert!(checked.buffers[Plane::Primary.index()].is_some());
        assert_eq!(checked.touched, [true, false, false]);
    }

    #[test]
    fn resubmitting_the_current_mode_is_not_a_modeset() {
        let fx = Fixture::new(Soc::Jz4770);
        let current = running(fb(1, PixelFormat::Rgb565));

        let checked = fx
            .check(&current, &Transaction::new().with_mode(mode()).with_active(true))
            .unwrap();

        assert!(!checked.needs_modeset);
    }

    #[test]
    fn overlay_and_image_processing_are_exclusive() {
        let fx = Fixture::new(Soc::Jz4770);
        let current = running(fb(1, PixelFormat::Rgb565));
        let small = Framebuffer {
            width: 64,
            height: 64,
            ..fb(2, PixelFormat::Xrgb8888)
        };
        let txn = Transaction::new()
            .with_plane(Plane::Overlay, PlaneState::new(small, 0, 0))
            .with_plane(Plane::ImageProcessing, PlaneState::new(small, 64, 64));

        assert_eq!(
            fx.check(&current, &txn).err(),
            Some(Error::Rejected(RejectReason::OverlayConflict))
        );
    }

    #[test]
    fn oversized_modes_are_rejected() {
        let fx = Fixture::new(Soc::Jz4725b);
        let big = OutputMode::new(1024, 1048, 1184, 1344, 768, 771, 777, 806, 40.MHz());

        assert_eq!(
            fx.check(&CommittedState::new(), &Transaction::new().with_mode(big).with_active(true))
                .err(),
            Some(Error::Rejected(RejectReason::ModeTooLarge))
        );
    }

    #[test]
    fn unachievable_pixel_clock_is_rejected() {
        let fx = Fixture::new(Soc::Jz4770);
        let mut fast = mode();
        fast.clock = 75.MHz();

        assert_eq!(
            fx.check(&CommittedState::new(), &Transaction::new().with_mode(fast).with_active(true))
                .err(),
            Some(Error::Rejected(RejectReason::UnachievableClock))
        );
    }

    #[test]
    fn single_layer_source_offset_is_rejected() {
        let fx = Fixture::new(Soc::Jz4740);
        let current = running(fb(1, PixelFormat::Rgb565));
        let mut state = PlaneState::new(
            Framebuffer {
                width: 640,
                ..fb(2, PixelFormat::Rgb565)
            },
            0,
            0,
        );
        state.src = Rect::new(8, 0, 320, 240);
        state.dst = Rect::new(0, 0, 320, 240);

        assert_eq!(
            fx.check(&current, &Transaction::new().with_plane(Plane::Primary, state))
                .err(),
            Some(Error::Rejected(RejectReason::GeometryMismatch))
        );
    }

    #[test]
    fn overlay_is_unavailable_without_osd() {
        let fx = Fixture::new(Soc::Jz4740);
        let current = running(fb(1, PixelFormat::Rgb565));
        let txn = Transaction::new()
            .with_plane(Plane::Overlay, PlaneState::new(fb(2, PixelFormat::Rgb565), 0, 0));

        assert_eq!(
            fx.check(&current, &txn).err(),
            Some(Error::Rejected(RejectReason::PlaneUnavailable))
        );
    }

    #[test]
    fn all_planes_off_expects_no_frame() {
        let fx = Fixture::new(Soc::Jz4770);
        let current = running(fb(1, PixelFormat::Rgb565));
        let txn = Transaction::new().with_plane(Plane::Primary, PlaneState::DISABLED);

        let checked = fx.check(&current, &txn).unwrap();

        assert!(checked.needs_modeset);
        assert!(!checked.frame_expected());
    }

    #[test]
    fn planes_need_a_mode() {
        let fx = Fixture::new(Soc::Jz4770);
        let txn = Transaction::new()
            .with_plane(Plane::Primary, PlaneState::new(fb(1, PixelFormat::Rgb565), 0, 0));

        assert_eq!(
            fx.check(&CommittedState::new(), &txn).err(),
            Some(Error::Rejected(RejectReason::NoMode))
        );
    }

    #[test]
    fn unsupported_panel_bus_is_rejected_on_modeset() {
        let mut fx = Fixture::new(Soc::Jz4770);
        fx.config = fx
            .config
            .with_panel(PanelInfo::new().with_bus_format(Some(BusFormat::Other(0x1018))));

        assert_eq!(
            fx.check(&CommittedState::new(), &Transaction::new().with_mode(mode()).with_active(true))
                .err(),
            Some(Error::Rejected(RejectReason::UnsupportedBusFormat))
        );
    }
}
