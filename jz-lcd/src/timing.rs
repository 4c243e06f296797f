//! # Output timing
//!
//! Converts an [`OutputMode`] into the values of the sync and display-area
//! registers. The controller counts from the start of the sync pulse, so the
//! "data start" of each axis is the distance from sync start to the end of
//! the blanking interval.

use fugit::HertzU32;

use crate::{
    error::{Error, RejectReason},
    regs::{self, ctrl, ipur, Registers, RegisterInterface},
};

/// Largest value the 12-bit timing fields can hold.
const MAX_FIELD: u32 = 0xfff;

/// Display timing parameters.
///
/// Sync positions are absolute, counted from the first active pixel or line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputMode {
    /// Active width.
    pub hdisplay: u32,
    /// First pixel of the horizontal sync pulse.
    pub hsync_start: u32,
    /// First pixel after the horizontal sync pulse.
    pub hsync_end: u32,
    /// Total pixels per line.
    pub htotal: u32,
    /// Active height.
    pub vdisplay: u32,
    /// First line of the vertical sync pulse.
    pub vsync_start: u32,
    /// First line after the vertical sync pulse.
    pub vsync_end: u32,
    /// Total lines per frame.
    pub vtotal: u32,
    /// Pixel clock.
    pub clock: HertzU32,
    /// The horizontal sync pulse is active low.
    pub hsync_active_low: bool,
    /// The vertical sync pulse is active low.
    pub vsync_active_low: bool,
    /// The mode is interlaced.
    pub interlaced: bool,
}

impl OutputMode {
    /// Creates a progressive mode with active-high sync pulses.
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        hdisplay: u32,
        hsync_start: u32,
        hsync_end: u32,
        htotal: u32,
        vdisplay: u32,
        vsync_start: u32,
        vsync_end: u32,
        vtotal: u32,
        clock: HertzU32,
    ) -> Self {
        Self {
            hdisplay,
            hsync_start,
            hsync_end,
            htotal,
            vdisplay,
            vsync_start,
            vsync_end,
            vtotal,
            clock,
            hsync_active_low: false,
            vsync_active_low: false,
            interlaced: false,
        }
    }
}

/// Derived values for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisTiming {
    /// Sync pulse end.
    pub pulse_end: u32,
    /// First active pixel or line.
    pub data_start: u32,
    /// First pixel or line after the active area.
    pub data_end: u32,
    /// Total.
    pub total: u32,
}

impl AxisTiming {
    fn derive(display: u32, sync_start: u32, sync_end: u32, total: u32) -> Result<Self, Error> {
        if display == 0 || sync_start <= display || sync_end <= sync_start || total < sync_end {
            return Err(RejectReason::InvalidTiming.into());
        }

        let pulse_end = sync_end - sync_start;
        let data_start = total - sync_start;
        let data_end = data_start + display;
        let total = data_end + sync_start - display;

        if total > MAX_FIELD {
            return Err(RejectReason::InvalidTiming.into());
        }

        Ok(Self {
            pulse_end,
            data_start,
            data_end,
            total,
        })
    }
}

/// Edges of the special TFT drive signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpecialTftTiming {
    /// `PS` value.
    pub ps: u32,
    /// `CLS` value.
    pub cls: u32,
    /// `SPL` value.
    pub spl: u32,
    /// `REV` value.
    pub rev: u32,
}

/// Register values for one output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncTimings {
    /// Horizontal axis.
    pub horizontal: AxisTiming,
    /// Vertical axis.
    pub vertical: AxisTiming,
    /// Special TFT signals, when the panel is driven in that mode.
    pub special_tft: Option<SpecialTftTiming>,
    /// Underrun threshold written to `IPUR`.
    pub underrun_threshold: u32,
}

impl SyncTimings {
    /// Derives the register values for `mode`.
    ///
    /// Fails without side effects when a derived interval is zero, negative
    /// or does not fit its register field.
    pub fn from_mode(mode: &OutputMode, special_tft: bool) -> Result<Self, Error> {
        let horizontal =
            AxisTiming::derive(mode.hdisplay, mode.hsync_start, mode.hsync_end, mode.htotal)?;
        let vertical =
            AxisTiming::derive(mode.vdisplay, mode.vsync_start, mode.vsync_end, mode.vtotal)?;

        let special_tft = special_tft.then(|| {
            let hde = horizontal.data_end;
            let hpe = horizontal.pulse_end;
            SpecialTftTiming {
                ps: regs::pack(hde, hde + 1),
                cls: regs::pack(hde, hde + 1),
                spl: regs::pack(hpe, hpe + 1),
                rev: regs::pack(mode.htotal, 0),
            }
        });

        let underrun_threshold = horizontal.total * vertical.pulse_end / 3;
        if underrun_threshold > ipur::IPUR_MASK {
            return Err(RejectReason::InvalidTiming.into());
        }

        Ok(Self {
            horizontal,
            vertical,
            special_tft,
            underrun_threshold,
        })
    }

    /// Writes the timing registers.
    ///
    /// The caller decides when this happens relative to the frame boundary.
    pub fn apply<R: RegisterInterface>(&self, regs: &Registers<R>) {
        let (h, v) = (&self.horizontal, &self.vertical);

        regs.write(regs::VSYNC, v.pulse_end);
        regs.write(regs::HSYNC, h.pulse_end);
        regs.write(regs::VAT, regs::pack(h.total, v.total));
        regs.write(regs::DAH, regs::pack(h.data_start, h.data_end));
        regs.write(regs::DAV, regs::pack(v.data_start, v.data_end));

        if let Some(tft) = &self.special_tft {
            regs.write(regs::PS, tft.ps);
            regs.write(regs::CLS, tft.cls);
            regs.write(regs::SPL, tft.spl);
            regs.write(regs::REV, tft.rev);
        }

        regs.modify(
            regs::CTRL,
            ctrl::OFUP | ctrl::BURST_MASK,
            ctrl::OFUP | ctrl::BURST_16,
        );
        regs.write(regs::IPUR, ipur::IPUREN | self.underrun_threshold);

        debug!(
            "timings: h {}/{}/{}/{} v {}/{}/{}/{}",
            h.pulse_end,
            h.data_start,
            h.data_end,
            h.total,
            v.pulse_end,
            v.data_start,
            v.data_end,
            v.total
        );
    }
}
