//! # LCD controller register block
//!
//! Registers are zero-sized marker types. Each one carries its offset in the
//! block, and only registers implementing [`Writable`] can be written.
//! Writing a hardware status mirror such as [`SA0`] or [`CMD1`] is therefore
//! a compile error rather than a runtime check.
//!
//! Raw access goes through a [`RegisterInterface`] supplied by the platform.
//! On hardware this is a volatile MMIO window. Tests use a mock register
//! file.

/// Raw 32-bit access to the register block.
///
/// Offsets are byte offsets from the start of the block, with a stride of
/// four.
pub trait RegisterInterface {
    /// Reads the register at `offset`.
    fn read(&self, offset: u32) -> u32;

    /// Writes `value` to the register at `offset`.
    fn write(&self, offset: u32, value: u32);

    /// Replaces the bits selected by `mask` with those of `value`.
    ///
    /// The write is skipped when nothing changes.
    fn update_bits(&self, offset: u32, mask: u32, value: u32) {
        let old = self.read(offset);
        let new = (old & !mask) | (value & mask);
        if new != old {
            self.write(offset, new);
        }
    }
}

impl<T: RegisterInterface + ?Sized> RegisterInterface for &T {
    fn read(&self, offset: u32) -> u32 {
        T::read(self, offset)
    }

    fn write(&self, offset: u32, value: u32) {
        T::write(self, offset, value)
    }

    fn update_bits(&self, offset: u32, mask: u32, value: u32) {
        T::update_bits(self, offset, mask, value)
    }
}

/// A register of the block.
pub trait Register {
    /// Byte offset from the start of the block.
    const OFFSET: u32;
}

/// Marker for registers software may write.
pub trait Writable: Register {}

macro_rules! registers {
    ($($(#[$meta:meta])* $name:ident @ $offset:literal : $access:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;

            impl Register for $name {
                const OFFSET: u32 = $offset;
            }

            registers!(@access $name $access);
        )*
    };
    (@access $name:ident rw) => {
        impl Writable for $name {}
    };
    (@access $name:ident ro) => {};
}

registers! {
    /// Panel configuration.
    CFG @ 0x00: rw;
    /// Vertical sync pulse.
    VSYNC @ 0x04: rw;
    /// Horizontal sync pulse.
    HSYNC @ 0x08: rw;
    /// Horizontal and vertical totals.
    VAT @ 0x0c: rw;
    /// Horizontal display area.
    DAH @ 0x10: rw;
    /// Vertical display area.
    DAV @ 0x14: rw;
    /// Special TFT PS signal.
    PS @ 0x18: rw;
    /// Special TFT CLS signal.
    CLS @ 0x1c: rw;
    /// Special TFT SPL signal.
    SPL @ 0x20: rw;
    /// Special TFT REV signal.
    REV @ 0x24: rw;
    /// Control.
    CTRL @ 0x30: rw;
    /// Status.
    STATE @ 0x34: rw;
    /// Interrupt ID.
    IID @ 0x38: ro;
    /// Descriptor address, layer 0.
    DA0 @ 0x40: rw;
    /// Source address, layer 0.
    SA0 @ 0x44: ro;
    /// Frame ID, layer 0.
    FID0 @ 0x48: ro;
    /// DMA command, layer 0.
    CMD0 @ 0x4c: ro;
    /// Descriptor address, layer 1.
    DA1 @ 0x50: rw;
    /// Source address, layer 1.
    SA1 @ 0x54: ro;
    /// Frame ID, layer 1.
    FID1 @ 0x58: ro;
    /// DMA command, layer 1.
    CMD1 @ 0x5c: ro;
    /// OSD configuration.
    OSDC @ 0x100: rw;
    /// OSD control.
    OSDCTRL @ 0x104: rw;
    /// IPU restart.
    IPUR @ 0x11c: rw;
    /// Layer 0 position.
    XYP0 @ 0x120: rw;
    /// Layer 1 position.
    XYP1 @ 0x124: rw;
    /// Layer 0 size.
    SIZE0 @ 0x128: rw;
    /// Layer 1 size.
    SIZE1 @ 0x12c: rw;
}

/// `CFG` fields.
#[allow(missing_docs)]
pub mod cfg {
    pub const PS_DISABLE: u32 = 1 << 23;
    pub const CLS_DISABLE: u32 = 1 << 22;
    pub const SPL_DISABLE: u32 = 1 << 21;
    pub const REV_DISABLE: u32 = 1 << 20;
    pub const REV_POLARITY: u32 = 1 << 12;
    pub const HSYNC_ACTIVE_LOW: u32 = 1 << 11;
    pub const PCLK_FALLING_EDGE: u32 = 1 << 10;
    pub const DE_ACTIVE_LOW: u32 = 1 << 9;
    pub const VSYNC_ACTIVE_LOW: u32 = 1 << 8;

    pub const MODE_GENERIC_16BIT: u32 = 0;
    pub const MODE_GENERIC_18BIT: u32 = 1 << 7;
    pub const MODE_GENERIC_24BIT: u32 = 1 << 6;
    pub const MODE_SPECIAL_TFT_1: u32 = 1;
    pub const MODE_TV_OUT_P: u32 = 6;
    pub const MODE_TV_OUT_I: u32 = 7;
    pub const MODE_8BIT_SERIAL: u32 = 0xc;
}

/// `CTRL` fields.
#[allow(missing_docs)]
pub mod ctrl {
    pub const BURST_16: u32 = 0x2 << 28;
    pub const BURST_MASK: u32 = 0x3 << 28;
    pub const RGB555: u32 = 1 << 27;
    pub const OFUP: u32 = 1 << 26;
    pub const EOF_IRQ: u32 = 1 << 13;
    pub const DISABLE: u32 = 1 << 4;
    pub const ENABLE: u32 = 1 << 3;
    pub const BPP_15_16: u32 = 0x4;
    pub const BPP_18_24: u32 = 0x5;
    pub const BPP_MASK: u32 = RGB555 | 0x7;
}

/// `STATE` fields.
#[allow(missing_docs)]
pub mod state {
    pub const QD: u32 = 1 << 7;
    pub const EOF_IRQ: u32 = 1 << 5;
    pub const SOF_IRQ: u32 = 1 << 4;
    pub const OUT_FIFO_UNDERRUN: u32 = 1 << 3;
    pub const IN_FIFO0_UNDERRUN: u32 = 1 << 2;
    pub const IN_FIFO1_UNDERRUN: u32 = 1 << 1;
    pub const DISABLED: u32 = 1 << 0;
}

/// `OSDC` fields.
#[allow(missing_docs)]
pub mod osdc {
    pub const F1EN: u32 = 1 << 4;
    pub const F0EN: u32 = 1 << 3;
    pub const OSDEN: u32 = 1 << 0;
}

/// `OSDCTRL` fields.
#[allow(missing_docs)]
pub mod osdctrl {
    pub const IPU: u32 = 1 << 15;
    pub const RGB555: u32 = 1 << 4;
    pub const BPP_15_16: u32 = 0x4;
    pub const BPP_18_24: u32 = 0x5;
    pub const BPP_MASK: u32 = RGB555 | 0x7;
}

/// `IPUR` fields.
#[allow(missing_docs)]
pub mod ipur {
    pub const IPUREN: u32 = 1 << 31;
    pub const IPUR_MASK: u32 = 0x00ff_ffff;
}

/// Packs two 16-bit fields, `high` in bits 31:16 and `low` in bits 15:0.
pub(crate) const fn pack(high: u32, low: u32) -> u32 {
    (high << 16) | (low & 0xffff)
}

/// Typed access to the register block.
#[derive(Debug)]
pub struct Registers<R> {
    raw: R,
}

impl<R: RegisterInterface> Registers<R> {
    /// Wraps a raw register window.
    pub const fn new(raw: R) -> Self {
        Self { raw }
    }

    /// Reads a register.
    pub fn read<T: Register>(&self, _reg: T) -> u32 {
        self.raw.read(T::OFFSET)
    }

    /// Writes a register.
    pub fn write<T: Writable>(&self, _reg: T, value: u32) {
        self.raw.write(T::OFFSET, value)
    }

    /// Replaces the bits selected by `mask` with those of `value`.
    pub fn modify<T: Writable>(&self, _reg: T, mask: u32, value: u32) {
        self.raw.update_bits(T::OFFSET, mask, value)
    }

    /// Sets the bits in `bits`.
    pub fn set_bits<T: Writable>(&self, reg: T, bits: u32) {
        self.modify(reg, bits, bits)
    }

    /// Clears the bits in `bits`.
    pub fn clear_bits<T: Writable>(&self, reg: T, bits: u32) {
        self.modify(reg, bits, 0)
    }

    /// Sets or clears the bits in `bits`.
    pub fn set_bits_if<T: Writable>(&self, reg: T, bits: u32, condition: bool) {
        self.modify(reg, bits, if condition { bits } else { 0 })
    }

    /// The raw register window.
    pub fn raw(&self) -> &R {
        &self.raw
    }
}
