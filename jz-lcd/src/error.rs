//! # Error types
//!
//! A transaction refused during checking has no effect on the hardware and
//! carries a [`RejectReason`]. Bring-up failures are fatal and carry the
//! [`Resource`] that could not be acquired.

/// Driver errors.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The transaction was refused during checking and nothing was applied.
    Rejected(RejectReason),
    /// The controller did not report the disabled state within the configured
    /// timeout.
    Timeout,
    /// A resource needed to bring up the controller could not be acquired.
    ResourceExhausted(Resource),
    /// Vertical-blank interrupts are turned off, so no frame boundary will be
    /// signalled.
    VblankUnavailable,
}

impl core::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Rejected(reason) => write!(f, "transaction rejected: {reason}"),
            Error::Timeout => write!(f, "timed out waiting for the controller to stop"),
            Error::ResourceExhausted(resource) => {
                write!(f, "could not acquire {resource}")
            }
            Error::VblankUnavailable => write!(f, "vertical blank interrupt is disabled"),
        }
    }
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self {
        Error::Rejected(reason)
    }
}

/// Why a transaction was refused.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RejectReason {
    /// A plane needs an output mode but none was ever committed.
    #[strum(to_string = "no output mode")]
    NoMode,
    /// The active area is larger than the SoC can scan out.
    #[strum(to_string = "mode exceeds maximum size")]
    ModeTooLarge,
    /// A derived timing interval is zero, negative or out of register range.
    #[strum(to_string = "invalid mode timings")]
    InvalidTiming,
    /// The pixel clock cannot produce the requested rate, or the device clock
    /// cannot keep up with it.
    #[strum(to_string = "unachievable clock rate")]
    UnachievableClock,
    /// Overlay and image-processing planes would both carry a buffer.
    #[strum(to_string = "overlay and image-processing planes both live")]
    OverlayConflict,
    /// Source and destination sizes differ.
    #[strum(to_string = "scaling is not supported")]
    ScalingUnsupported,
    /// Plane geometry is not representable on this hardware.
    #[strum(to_string = "plane geometry mismatch")]
    GeometryMismatch,
    /// The plane does not exist on this hardware, or has no scan-out layer.
    #[strum(to_string = "plane unavailable")]
    PlaneUnavailable,
    /// The framebuffer could not be resolved or is too small.
    #[strum(to_string = "invalid buffer")]
    InvalidBuffer,
    /// The panel bus format cannot be driven.
    #[strum(to_string = "unsupported bus format")]
    UnsupportedBusFormat,
    /// A previous modeset has not reached its frame boundary yet.
    #[strum(to_string = "previous commit pending")]
    Busy,
}

/// A resource acquired at bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resource {
    /// DMA descriptor memory.
    #[strum(to_string = "descriptor memory")]
    Descriptor,
    /// The pixel clock.
    #[strum(to_string = "pixel clock")]
    PixelClock,
    /// The device clock.
    #[strum(to_string = "device clock")]
    DeviceClock,
}
