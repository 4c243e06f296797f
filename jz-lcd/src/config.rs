//! # Driver configuration
//!
//! The SoC variant decides what the controller can do: whether an on-screen
//! display (OSD) block with a second layer exists, whether a separate device
//! clock feeds the controller and how large a frame can be.

use fugit::MicrosDurationU32;

use crate::encoder::PanelInfo;

/// Supported SoC variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Soc {
    /// JZ4740: single layer, separate device clock.
    Jz4740,
    /// JZ4725B: two layers.
    Jz4725b,
    /// JZ4770: two layers, 720p capable.
    Jz4770,
}

impl Soc {
    /// Capabilities of this SoC's LCD controller.
    pub const fn info(self) -> SocInfo {
        match self {
            Soc::Jz4740 => SocInfo {
                needs_device_clock: true,
                has_osd: false,
                max_width: 800,
                max_height: 600,
            },
            Soc::Jz4725b => SocInfo {
                needs_device_clock: false,
                has_osd: true,
                max_width: 800,
                max_height: 600,
            },
            Soc::Jz4770 => SocInfo {
                needs_device_clock: false,
                has_osd: true,
                max_width: 1280,
                max_height: 720,
            },
        }
    }
}

/// LCD controller capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocInfo {
    /// The controller is fed by a device clock that must be brought up along
    /// with the pixel clock.
    pub needs_device_clock: bool,
    /// The OSD block is present: two layers, with per-layer position, size
    /// and enable registers.
    pub has_osd: bool,
    /// Largest active width, in pixels.
    pub max_width: u32,
    /// Largest active height, in lines.
    pub max_height: u32,
}

/// Display controller configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// The SoC variant.
    pub soc: Soc,

    /// The attached panel.
    pub panel: PanelInfo,

    /// An image-processing unit is wired into the OSD composition path.
    ///
    /// Ignored on SoCs without an OSD block.
    pub image_processing: bool,

    /// Framebuffers are mapped cacheable, so the transferred range has to be
    /// written back before the controller fetches it.
    pub cached_buffers: bool,

    /// Interval between two reads of the status register while waiting for
    /// the controller to stop.
    pub poll_interval: MicrosDurationU32,

    /// Give up waiting for the controller to stop after this long.
    pub disable_timeout: MicrosDurationU32,
}

impl Config {
    /// Creates a configuration for the given SoC with a generic 24-bit TFT
    /// panel.
    pub const fn new(soc: Soc) -> Self {
        Self {
            soc,
            panel: PanelInfo::new(),
            image_processing: false,
            cached_buffers: false,
            poll_interval: MicrosDurationU32::millis(1),
            disable_timeout: MicrosDurationU32::millis(100),
        }
    }

    /// Sets the attached panel.
    pub const fn with_panel(mut self, panel: PanelInfo) -> Self {
        self.panel = panel;
        self
    }

    /// Declares an image-processing unit in the composition path.
    pub const fn with_image_processing(mut self, present: bool) -> Self {
        self.image_processing = present;
        self
    }

    /// Selects the cached framebuffer policy.
    pub const fn with_cached_buffers(mut self, cached: bool) -> Self {
        self.cached_buffers = cached;
        self
    }

    /// Sets the status polling interval used when stopping the controller.
    pub const fn with_poll_interval(mut self, interval: MicrosDurationU32) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how long to wait for the controller to stop.
    pub const fn with_disable_timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.disable_timeout = timeout;
        self
    }

    /// Capabilities of the configured SoC.
    pub const fn info(&self) -> SocInfo {
        self.soc.info()
    }

    /// Whether the image-processing plane is usable.
    pub const fn has_image_processing(&self) -> bool {
        self.image_processing && self.soc.info().has_osd
    }
}
