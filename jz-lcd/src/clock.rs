//! # Clock coordination
//!
//! The pixel clock follows the output mode and is reprogrammed on every
//! modeset. Some SoCs additionally feed the controller from a device clock,
//! which has to run at least 1.5 times faster than the pixel clock for TFT
//! panels. The device clock is set once, to the fastest rate its parent
//! allows, the first time the output is enabled. It is never changed while
//! the panel is being driven.

use fugit::HertzU32;

use crate::error::{Error, RejectReason, Resource};

/// Clock operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// The clock cannot produce the requested rate.
    UnsupportedRate,
    /// The clock could not be switched on or reconfigured.
    Failed,
}

/// A clock feeding the LCD controller.
pub trait ClockSource {
    /// Returns the rate the clock would actually run at if asked for `rate`.
    fn round_rate(&self, rate: HertzU32) -> Result<HertzU32, ClockError>;

    /// Reprograms the clock.
    fn set_rate(&mut self, rate: HertzU32) -> Result<(), ClockError>;

    /// Ungates the clock.
    fn enable(&mut self) -> Result<(), ClockError>;

    /// Gates the clock.
    fn disable(&mut self);

    /// Rate of the upstream clock.
    fn parent_rate(&self) -> HertzU32;
}

/// Owns the pixel clock and the optional device clock.
#[derive(Debug)]
pub struct ClockCoordinator<C> {
    pixel: C,
    device: Option<C>,
    device_rate: Option<HertzU32>,
    running: bool,
}

impl<C: ClockSource> ClockCoordinator<C> {
    /// Takes ownership of the clocks. Nothing is switched on yet.
    pub fn new(pixel: C, device: Option<C>) -> Self {
        Self {
            pixel,
            device,
            device_rate: None,
            running: false,
        }
    }

    /// Ungates the pixel clock.
    pub fn start(&mut self) -> Result<(), Error> {
        self.pixel
            .enable()
            .map_err(|_| Error::ResourceExhausted(Resource::PixelClock))?;
        self.running = true;
        Ok(())
    }

    /// Validates a pixel clock rate against both clocks.
    ///
    /// Returns the rate the pixel clock will run at.
    pub fn check(&self, rate: HertzU32) -> Result<HertzU32, Error> {
        let pixel = self
            .pixel
            .round_rate(rate)
            .map_err(|_| RejectReason::UnachievableClock)?;

        if let Some(device) = self.device_rate_or_planned()? {
            // TFT panels need the device clock 1.5 times above pixel rate.
            if u64::from(pixel.to_Hz()) * 3 > u64::from(device.to_Hz()) * 2 {
                return Err(RejectReason::UnachievableClock.into());
            }
        }

        Ok(pixel)
    }

    /// The device clock rate, either the one already programmed or the one
    /// the first enable will program.
    fn device_rate_or_planned(&self) -> Result<Option<HertzU32>, Error> {
        match (&self.device, self.device_rate) {
            (None, _) => Ok(None),
            (Some(_), Some(rate)) => Ok(Some(rate)),
            (Some(device), None) => device
                .round_rate(device.parent_rate())
                .map(Some)
                .map_err(|_| RejectReason::UnachievableClock.into()),
        }
    }

    /// Programs the pixel clock after the timing registers were written.
    pub fn apply_pixel_rate(&mut self, rate: HertzU32) {
        if let Err(err) = self.pixel.set_rate(rate) {
            error!("unable to set pixel clock to {} Hz: {:?}", rate.to_Hz(), err);
        }
    }

    /// Brings up the device clock on the first enable of the output.
    ///
    /// Later calls leave the device clock untouched.
    pub fn enable_device_clock(&mut self) -> Result<(), Error> {
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        if self.device_rate.is_some() {
            return Ok(());
        }

        let exhausted = |_| Error::ResourceExhausted(Resource::DeviceClock);
        let rate = device.round_rate(device.parent_rate()).map_err(exhausted)?;
        device.set_rate(rate).map_err(exhausted)?;
        device.enable().map_err(exhausted)?;
        self.device_rate = Some(rate);

        info!("device clock running at {} Hz", rate.to_Hz());
        Ok(())
    }

    /// Device clock rate, once it has been programmed.
    pub fn device_rate(&self) -> Option<HertzU32> {
        self.device_rate
    }

    /// Gates every clock that was switched on.
    pub fn stop(&mut self) {
        if let Some(device) = self.device.as_mut() {
            if self.device_rate.take().is_some() {
                device.disable();
            }
        }
        if core::mem::take(&mut self.running) {
            self.pixel.disable();
        }
    }
}
