//! # Panel interface
//!
//! Describes how the panel is wired to the controller and derives the
//! value of the `CFG` register from it.

use crate::{
    error::{Error, RejectReason},
    regs::cfg,
    timing::OutputMode,
};

/// Kind of connector the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Connector {
    /// Parallel RGB panel.
    Dpi,
    /// Analog TV encoder.
    Tv,
}

/// Pixel bus format advertised by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusFormat {
    /// 16-bit parallel RGB565.
    Rgb565_1x16,
    /// 18-bit parallel RGB666.
    Rgb666_1x18,
    /// 24-bit parallel RGB888.
    Rgb888_1x24,
    /// 8-bit serial RGB, three cycles per pixel.
    Rgb888_3x8,
    /// Any other media bus code.
    Other(u32),
}

/// Static description of the attached panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelInfo {
    /// Connector type.
    pub connector: Connector,
    /// The panel's single bus format, `None` if it advertises none or
    /// several.
    pub bus_format: Option<BusFormat>,
    /// Data-enable is active low.
    pub de_active_low: bool,
    /// Pixel data is sampled on the falling clock edge.
    pub pixdata_falling_edge: bool,
    /// The panel needs the special TFT signals (PS, CLS, SPL, REV).
    pub special_tft: bool,
}

impl Default for PanelInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelInfo {
    /// A 24-bit parallel panel with default polarities.
    pub const fn new() -> Self {
        Self {
            connector: Connector::Dpi,
            bus_format: Some(BusFormat::Rgb888_1x24),
            de_active_low: false,
            pixdata_falling_edge: false,
            special_tft: false,
        }
    }

    /// Sets the connector type.
    pub const fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    /// Sets the bus format.
    pub const fn with_bus_format(mut self, format: Option<BusFormat>) -> Self {
        self.bus_format = format;
        self
    }

    /// Sets the data-enable polarity.
    pub const fn with_de_active_low(mut self, active_low: bool) -> Self {
        self.de_active_low = active_low;
        self
    }

    /// Sets the sampling edge of pixel data.
    pub const fn with_pixdata_falling_edge(mut self, falling: bool) -> Self {
        self.pixdata_falling_edge = falling;
        self
    }

    /// Enables the special TFT signals.
    pub const fn with_special_tft(mut self, special: bool) -> Self {
        self.special_tft = special;
        self
    }

    /// Rejects panels the controller cannot drive.
    pub fn check(&self) -> Result<(), Error> {
        let Some(format) = self.bus_format else {
            return Err(RejectReason::UnsupportedBusFormat.into());
        };

        match (self.connector, format) {
            (Connector::Tv, _) => Ok(()),
            (_, BusFormat::Other(_)) => Err(RejectReason::UnsupportedBusFormat.into()),
            _ => Ok(()),
        }
    }

    /// Computes the `CFG` register.
    ///
    /// `primary_cpp` is the bytes-per-pixel of the buffer on the primary
    /// plane, if any. A 24-bit panel fed from a 16bpp primary plane is driven
    /// in 18-bit mode so each component lands on the MSBs of the bus.
    pub fn panel_config(&self, mode: &OutputMode, primary_cpp: Option<u32>) -> u32 {
        let mut value = if self.special_tft {
            cfg::MODE_SPECIAL_TFT_1 | cfg::REV_POLARITY
        } else {
            cfg::PS_DISABLE | cfg::CLS_DISABLE | cfg::SPL_DISABLE | cfg::REV_DISABLE
        };

        if mode.hsync_active_low {
            value |= cfg::HSYNC_ACTIVE_LOW;
        }
        if mode.vsync_active_low {
            value |= cfg::VSYNC_ACTIVE_LOW;
        }
        if self.de_active_low {
            value |= cfg::DE_ACTIVE_LOW;
        }
        if self.pixdata_falling_edge {
            value |= cfg::PCLK_FALLING_EDGE;
        }

        if self.special_tft {
            return value;
        }

        value |= match (self.connector, self.bus_format) {
            (Connector::Tv, _) if mode.interlaced => cfg::MODE_TV_OUT_I,
            (Connector::Tv, _) => cfg::MODE_TV_OUT_P,
            (_, Some(BusFormat::Rgb565_1x16)) => cfg::MODE_GENERIC_16BIT,
            (_, Some(BusFormat::Rgb666_1x18)) => cfg::MODE_GENERIC_18BIT,
            (_, Some(BusFormat::Rgb888_1x24)) => match primary_cpp {
                Some(cpp) if cpp < 3 => cfg::MODE_GENERIC_18BIT,
                _ => cfg::MODE_GENERIC_24BIT,
            },
            (_, Some(BusFormat::Rgb888_3x8)) => cfg::MODE_8BIT_SERIAL,
            _ => 0,
        };

        value
    }
}
