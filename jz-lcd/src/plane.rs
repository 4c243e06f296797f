//! # Planes
//!
//! The controller composes at most two DMA-fed layers. [`Plane::Primary`]
//! scans out of layer F0. On SoCs with an OSD block, [`Plane::Overlay`] scans
//! out of layer F1. [`Plane::ImageProcessing`] stands for an image-processing
//! unit feeding layer F1 directly, so it can never be live together with the
//! overlay.
//!
//! Enabling a plane and programming its descriptor are separate steps: a
//! plane can hold a valid descriptor while its layer is switched off.

use crate::{
    config::SocInfo,
    dma::{self, Layer},
    error::{Error, RejectReason},
    regs::{self, ctrl, osdc, osdctrl, Registers, RegisterInterface},
    timing::OutputMode,
};

/// A display plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Plane {
    /// The primary plane, always present.
    Primary,
    /// The overlay plane, only on SoCs with an OSD block.
    Overlay,
    /// Output of an image-processing unit, exclusive with the overlay.
    ImageProcessing,
}

impl Plane {
    /// All planes, in composition order.
    pub const ALL: [Plane; 3] = [Plane::Primary, Plane::Overlay, Plane::ImageProcessing];

    pub(crate) const fn index(self) -> usize {
        match self {
            Plane::Primary => 0,
            Plane::Overlay => 1,
            Plane::ImageProcessing => 2,
        }
    }

    /// The layer this plane scans out of, `None` for the image-processing
    /// plane whose DMA is driven elsewhere.
    pub const fn layer(self) -> Option<Layer> {
        match self {
            Plane::Primary => Some(Layer::F0),
            Plane::Overlay => Some(Layer::F1),
            Plane::ImageProcessing => None,
        }
    }

    /// Whether this plane exists on the given hardware.
    pub(crate) fn check_available(self, info: &SocInfo, image_processing: bool) -> Result<(), Error> {
        let available = match self {
            Plane::Primary => true,
            Plane::Overlay => info.has_osd,
            Plane::ImageProcessing => image_processing && info.has_osd,
        };
        if available {
            Ok(())
        } else {
            Err(RejectReason::PlaneUnavailable.into())
        }
    }
}

/// Pixel formats the layers can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelFormat {
    /// 15-bit RGB in 16-bit words.
    Xrgb1555,
    /// 16-bit RGB.
    Rgb565,
    /// 24-bit RGB in 32-bit words.
    Xrgb8888,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Xrgb1555 | PixelFormat::Rgb565 => 2,
            PixelFormat::Xrgb8888 => 4,
        }
    }

    const fn ctrl_bits(self) -> u32 {
        match self {
            PixelFormat::Xrgb1555 => ctrl::RGB555 | ctrl::BPP_15_16,
            PixelFormat::Rgb565 => ctrl::BPP_15_16,
            PixelFormat::Xrgb8888 => ctrl::BPP_18_24,
        }
    }

    const fn osdctrl_bits(self) -> u32 {
        match self {
            PixelFormat::Xrgb1555 => osdctrl::RGB555 | osdctrl::BPP_15_16,
            PixelFormat::Rgb565 => osdctrl::BPP_15_16,
            PixelFormat::Xrgb8888 => osdctrl::BPP_18_24,
        }
    }
}

/// An axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// Opaque handle of a buffer owned by the buffer provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferHandle(pub u32);

/// A framebuffer as seen by the composition layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Framebuffer {
    /// Backing memory.
    pub handle: BufferHandle,
    /// Pixel format.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in lines.
    pub height: u32,
}

/// State of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlaneState {
    /// The buffer shown on the plane, `None` when the plane is off.
    pub framebuffer: Option<Framebuffer>,
    /// Region of the framebuffer to fetch.
    pub src: Rect,
    /// Where the region lands on the output.
    pub dst: Rect,
}

impl PlaneState {
    /// A plane without a buffer.
    pub const DISABLED: Self = Self {
        framebuffer: None,
        src: Rect::new(0, 0, 0, 0),
        dst: Rect::new(0, 0, 0, 0),
    };

    /// Shows `framebuffer`, unscaled, with its top-left corner at `(x, y)`.
    pub const fn new(framebuffer: Framebuffer, x: u32, y: u32) -> Self {
        Self {
            framebuffer: Some(framebuffer),
            src: Rect::new(0, 0, framebuffer.width, framebuffer.height),
            dst: Rect::new(x, y, framebuffer.width, framebuffer.height),
        }
    }

    /// Whether a buffer is attached.
    pub const fn is_live(&self) -> bool {
        self.framebuffer.is_some()
    }

    /// Pixel format of the attached buffer.
    pub fn format(&self) -> Option<PixelFormat> {
        self.framebuffer.map(|fb| fb.format)
    }

    /// Whether going from `self` to `next` needs a full modeset: the buffer
    /// appears or disappears, or a live plane moves, resizes or changes
    /// format. Panning inside the framebuffer only moves the scan-out
    /// address.
    pub(crate) fn needs_modeset(&self, next: &PlaneState) -> bool {
        match (self.framebuffer, next.framebuffer) {
            (None, None) => false,
            (Some(old), Some(new)) => old.format != new.format || self.dst != next.dst,
            _ => true,
        }
    }

    /// Validates the geometry of a live plane against the output mode.
    pub(crate) fn check_geometry(
        &self,
        plane: Plane,
        info: &SocInfo,
        mode: &OutputMode,
    ) -> Result<(), Error> {
        let Some(fb) = self.framebuffer else {
            return Ok(());
        };

        if !self.dst.fits_within(mode.hdisplay, mode.vdisplay) {
            return Err(RejectReason::GeometryMismatch.into());
        }

        // Scaling happens inside the image-processing unit, not here.
        if plane == Plane::ImageProcessing {
            return Ok(());
        }

        if self.src.width != self.dst.width || self.src.height != self.dst.height {
            return Err(RejectReason::ScalingUnsupported.into());
        }
        if !self.src.fits_within(fb.width, fb.height) {
            return Err(RejectReason::GeometryMismatch.into());
        }

        let full_screen = Rect::new(0, 0, mode.hdisplay, mode.vdisplay);
        if !info.has_osd && (self.src.x != 0 || self.src.y != 0 || self.dst != full_screen) {
            return Err(RejectReason::GeometryMismatch.into());
        }

        Ok(())
    }
}

/// Physical memory backing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaRegion {
    /// Physical start address.
    pub paddr: u32,
    /// Length in bytes.
    pub len: u32,
}

/// Resolves buffer handles to DMA-visible memory.
pub trait BufferProvider {
    /// Looks up the memory behind `handle`.
    fn resolve(&self, handle: BufferHandle) -> Option<DmaRegion>;

    /// Writes back CPU caches for `len` bytes at `paddr` so the controller
    /// fetches what the CPU wrote.
    fn sync_for_device(&mut self, paddr: u32, len: u32);
}

/// A buffer ready to be scanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanoutBuffer {
    /// Physical address of the first fetched pixel.
    pub paddr: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in lines.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
}

impl ScanoutBuffer {
    /// Bytes fetched per frame.
    ///
    /// Fails with [`RejectReason::InvalidBuffer`] when the transfer does not
    /// fit the length field of a descriptor.
    pub fn transfer_len(&self) -> Result<u32, Error> {
        let len = u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.format.bytes_per_pixel());
        if len > u64::from(dma::MAX_TRANSFER_LEN) {
            return Err(RejectReason::InvalidBuffer.into());
        }
        // Bounded by the check above.
        Ok(len as u32)
    }

    /// Resolves the source region of a live plane.
    pub(crate) fn resolve(
        state: &PlaneState,
        provider: &impl BufferProvider,
    ) -> Result<Option<Self>, Error> {
        let Some(fb) = state.framebuffer else {
            return Ok(None);
        };
        let invalid = || Error::Rejected(RejectReason::InvalidBuffer);

        let region = provider.resolve(fb.handle).ok_or_else(invalid)?;

        let cpp = u64::from(fb.format.bytes_per_pixel());
        let pitch = u64::from(fb.width) * cpp;
        let offset = u64::from(state.src.y) * pitch + u64::from(state.src.x) * cpp;
        let paddr = u32::try_from(u64::from(region.paddr) + offset).map_err(|_| invalid())?;

        let buffer = Self {
            paddr,
            width: state.src.width,
            height: state.src.height,
            format: fb.format,
        };
        let len = buffer.transfer_len()?;
        if offset + u64::from(len) > u64::from(region.len) {
            return Err(invalid());
        }

        Ok(Some(buffer))
    }
}

/// Switches a plane's layer on or off.
///
/// Without an OSD block the single layer has no enable bit.
pub(crate) fn set_enabled<R: RegisterInterface>(
    regs: &Registers<R>,
    info: &SocInfo,
    plane: Plane,
    enabled: bool,
) {
    if !info.has_osd {
        return;
    }
    let bit = match plane.layer() {
        Some(Layer::F0) => osdc::F0EN,
        Some(Layer::F1) => osdc::F1EN,
        None => return,
    };
    regs.set_bits_if(regs::OSDC, bit, enabled);
}

/// Enables a plane's layer and programs its format, position and size.
pub(crate) fn configure<R: RegisterInterface>(
    regs: &Registers<R>,
    info: &SocInfo,
    plane: Plane,
    format: PixelFormat,
    dst: &Rect,
) -> Result<(), Error> {
    let layer = plane.layer().ok_or(RejectReason::PlaneUnavailable)?;

    set_enabled(regs, info, plane, true);

    match layer {
        Layer::F1 => regs.modify(regs::OSDCTRL, osdctrl::BPP_MASK, format.osdctrl_bits()),
        Layer::F0 => regs.modify(regs::CTRL, ctrl::BPP_MASK, format.ctrl_bits()),
    }

    if info.has_osd {
        let position = regs::pack(dst.y, dst.x);
        let size = regs::pack(dst.height, dst.width);
        match layer {
            Layer::F0 => {
                regs.write(regs::XYP0, position);
                regs.write(regs::SIZE0, size);
            }
            Layer::F1 => {
                regs.write(regs::XYP1, position);
                regs.write(regs::SIZE1, size);
            }
        }
    }

    debug!("{:?} configured as {:?}", plane, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;
    use crate::{
        config::Soc,
        mock::{MockBuffers, MockRegisters},
        regs::Register,
    };

    fn mode() -> OutputMode {
        OutputMode::new(320, 330, 340, 400, 240, 245, 246, 260, 6.MHz())
    }

    fn fb(format: PixelFormat, width: u32, height: u32) -> Framebuffer {
        Framebuffer {
            handle: BufferHandle(1),
            format,
            width,
            height,
        }
    }

    #[test]
    fn buffer_swap_alone_is_not_a_modeset() {
        let old = PlaneState::new(fb(PixelFormat::Rgb565, 320, 240), 0, 0);
        let mut new = old;
        new.framebuffer.as_mut().unwrap().handle = BufferHandle(2);

        assert!(!old.needs_modeset(&new));
        assert!(!PlaneState::DISABLED.needs_modeset(&PlaneState::DISABLED));
    }

    #[test]
    fn panning_is_not_a_modeset() {
        let mut old = PlaneState::new(fb(PixelFormat::Rgb565, 640, 240), 0, 0);
        old.src = Rect::new(0, 0, 320, 240);
        old.dst = Rect::new(0, 0, 320, 240);
        let mut panned = old;
        panned.src.x = 8;

        assert!(!old.needs_modeset(&panned));
    }

    #[test]
    fn presence_format_and_geometry_changes_are_modesets() {
        let old = PlaneState::new(fb(PixelFormat::Rgb565, 320, 240), 0, 0);

        assert!(old.needs_modeset(&PlaneState::DISABLED));
        assert!(PlaneState::DISABLED.needs_modeset(&old));
        assert!(old.needs_modeset(&PlaneState::new(fb(PixelFormat::Xrgb8888, 320, 240), 0, 0)));
        assert!(old.needs_modeset(&PlaneState::new(fb(PixelFormat::Rgb565, 320, 240), 0, 1)));
    }

    #[test]
    fn single_layer_hardware_rejects_source_offsets() {
        let info = Soc::Jz4740.info();
        let mut state = PlaneState::new(fb(PixelFormat::Rgb565, 640, 240), 0, 0);
        state.src = Rect::new(16, 0, 320, 240);
        state.dst = Rect::new(0, 0, 320, 240);

        assert_eq!(
            state.check_geometry(Plane::Primary, &info, &mode()),
            Err(Error::Rejected(RejectReason::GeometryMismatch))
        );

        let windowed = PlaneState::new(fb(PixelFormat::Rgb565, 160, 120), 0, 0);
        assert!(windowed.check_geometry(Plane::Primary, &info, &mode()).is_err());

        let full = PlaneState::new(fb(PixelFormat::Rgb565, 320, 240), 0, 0);
        assert!(full.check_geometry(Plane::Primary, &info, &mode()).is_ok());
    }

    #[test]
    fn osd_hardware_allows_positioning_but_not_scaling() {
        let info = Soc::Jz4770.info();
        let windowed = PlaneState::new(fb(PixelFormat::Rgb565, 160, 120), 32, 16);
        assert!(windowed.check_geometry(Plane::Overlay, &info, &mode()).is_ok());

        let mut scaled = windowed;
        scaled.dst.width = 320;
        scaled.dst.x = 0;
        assert_eq!(
            scaled.check_geometry(Plane::Overlay, &info, &mode()),
            Err(Error::Rejected(RejectReason::ScalingUnsupported))
        );

        let offscreen = PlaneState::new(fb(PixelFormat::Rgb565, 160, 120), 200, 0);
        assert_eq!(
            offscreen.check_geometry(Plane::Overlay, &info, &mode()),
            Err(Error::Rejected(RejectReason::GeometryMismatch))
        );
    }

    #[test]
    fn scanout_address_starts_at_the_source_origin() {
        let buffers = MockBuffers::new();
        let mut state = PlaneState::new(fb(PixelFormat::Xrgb8888, 320, 240), 0, 0);
        state.src = Rect::new(8, 2, 100, 50);
        state.dst = Rect::new(0, 0, 100, 50);
        let base = buffers.resolve(BufferHandle(1)).unwrap().paddr;

        let buffer = ScanoutBuffer::resolve(&state, &buffers).unwrap().unwrap();

        assert_eq!(buffer.paddr, base + 2 * 320 * 4 + 8 * 4);
        assert_eq!(buffer.transfer_len(), Ok(100 * 50 * 4));
    }

    #[test]
    fn unknown_or_short_buffers_are_rejected() {
        let buffers = MockBuffers::new();
        let mut state = PlaneState::new(fb(PixelFormat::Rgb565, 320, 240), 0, 0);
        state.framebuffer.as_mut().unwrap().handle = BufferHandle(0);
        assert_eq!(
            ScanoutBuffer::resolve(&state, &buffers),
            Err(Error::Rejected(RejectReason::InvalidBuffer))
        );

        let huge = PlaneState::new(fb(PixelFormat::Xrgb8888, 4000, 4000), 0, 0);
        assert!(ScanoutBuffer::resolve(&huge, &buffers).is_err());

        assert_eq!(ScanoutBuffer::resolve(&PlaneState::DISABLED, &buffers), Ok(None));
    }

    #[test]
    fn very_wide_framebuffers_do_not_wrap_the_offset() {
        let buffers = MockBuffers::new();
        let mut state = PlaneState::new(fb(PixelFormat::Xrgb8888, 0x4000_0001, 240), 0, 0);
        state.src = Rect::new(0, 1, 320, 200);
        state.dst = Rect::new(0, 0, 320, 200);

        assert_eq!(
            ScanoutBuffer::resolve(&state, &buffers),
            Err(Error::Rejected(RejectReason::InvalidBuffer))
        );
    }

    #[test]
    fn transfers_must_fit_a_descriptor() {
        let buffer = |width, height| ScanoutBuffer {
            paddr: 0,
            width,
            height,
            format: PixelFormat::Xrgb8888,
        };
        let invalid = Err(Error::Rejected(RejectReason::InvalidBuffer));

        assert_eq!(buffer(u32::MAX, u32::MAX).transfer_len(), invalid);
        assert_eq!(buffer(8192, 4096).transfer_len(), invalid);
        assert_eq!(buffer(0xff_ffff, 1).transfer_len(), Ok(dma::MAX_TRANSFER_LEN));
    }

    #[test]
    fn configure_overlay_programs_osd_registers() {
        let regs = Registers::new(MockRegisters::new());
        let info = Soc::Jz4770.info();

        configure(
            &regs,
            &info,
            Plane::Overlay,
            PixelFormat::Xrgb1555,
            &Rect::new(10, 20, 100, 50),
        )
        .unwrap();

        assert_eq!(regs.read(regs::OSDC), osdc::F1EN);
        assert_eq!(
            regs.read(regs::OSDCTRL),
            osdctrl::RGB555 | osdctrl::BPP_15_16
        );
        assert_eq!(regs.read(regs::XYP1), (20 << 16) | 10);
        assert_eq!(regs.read(regs::SIZE1), (50 << 16) | 100);
        assert_eq!(regs.read(regs::CTRL), 0);
    }

    #[test]
    fn configure_primary_without_osd_only_sets_the_format() {
        let regs = Registers::new(MockRegisters::new());
        let info = Soc::Jz4740.info();

        configure(
            &regs,
            &info,
            Plane::Primary,
            PixelFormat::Xrgb8888,
            &Rect::new(0, 0, 320, 240),
        )
        .unwrap();

        assert_eq!(regs.read(regs::CTRL), ctrl::BPP_18_24);
        assert_eq!(regs.raw().write_count(regs::XYP0::OFFSET), 0);
        assert_eq!(regs.read(regs::OSDC), 0);
    }

    #[test]
    fn image_processing_has_no_layer() {
        let regs = Registers::new(MockRegisters::new());
        let info = Soc::Jz4770.info();

        assert_eq!(
            configure(
                &regs,
                &info,
                Plane::ImageProcessing,
                PixelFormat::Rgb565,
                &Rect::default()
            ),
            Err(Error::Rejected(RejectReason::PlaneUnavailable))
        );
        assert_eq!(
            Plane::Overlay.check_available(&Soc::Jz4740.info(), false),
            Err(Error::Rejected(RejectReason::PlaneUnavailable))
        );
        assert!(Plane::ImageProcessing.check_available(&info, true).is_ok());
    }
}
