//! Display pipeline driver for the LCD controller of Ingenic JZ47xx SoCs.
//!
//! The controller scans pixels out of memory through self-linked DMA
//! descriptors, one per hardware layer, and drives a parallel RGB panel or
//! a TV encoder. SoCs with an OSD block compose a second layer, which can
//! also be fed by an image-processing unit.
//!
//! Updates are expressed as [`Transaction`]s. A transaction is checked in
//! full before any register is written and then applied either as a modeset,
//! which reprograms timings, clocks and plane layout, or as a fast update
//! that only swaps scan-out buffers.
//!
//! The platform supplies register access ([`regs::RegisterInterface`]),
//! clocks ([`clock::ClockSource`]), buffer lookup ([`plane::BufferProvider`]),
//! descriptor memory ([`dma::DescriptorAllocator`]) and a delay provider
//! implementing [`embedded_hal::delay::DelayNs`].
//!
//! ## Example
//!
//! ```rust, ignore
//! let config = Config::new(Soc::Jz4770).with_panel(PanelInfo::new());
//! let mut display = DisplayController::new(&LCD, config, resources, &mut pool)?;
//!
//! display.submit(
//!     Transaction::new()
//!         .with_mode(mode)
//!         .with_active(true)
//!         .with_plane(Plane::Primary, PlaneState::new(framebuffer, 0, 0)),
//! )?;
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![no_std]
#![deny(missing_docs, rust_2018_idioms)]

#[cfg(test)]
extern crate std;

// MUST be the first module
mod fmt;

pub mod clock;
pub mod commit;
pub mod config;
mod controller;
pub mod dma;
pub mod encoder;
pub mod error;
pub mod lcd;
#[cfg(test)]
mod mock;
pub mod plane;
pub mod regs;
pub mod timing;
pub mod vblank;

pub use self::{
    commit::{CommitKind, CommitOutcome, CommitPhase, Transaction},
    config::{Config, Soc},
    controller::{DisplayController, Resources, ScanoutStatus},
    error::{Error, RejectReason},
    lcd::{Lcd, LcdInterrupt},
    plane::{Plane, PlaneState},
    timing::OutputMode,
};
