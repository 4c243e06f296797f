//! # Scan-out DMA descriptors
//!
//! Each hardware layer fetches pixels through one descriptor whose `next`
//! pointer refers to itself, so the same buffer is refreshed every frame
//! until the descriptor is reprogrammed. Descriptors are allocated once, and
//! their physical addresses are written to `DA0`/`DA1` at bring-up. They must
//! never move afterwards.

use core::{
    ptr::{addr_of, addr_of_mut},
    sync::atomic::{compiler_fence, Ordering},
};

use crate::error::{Error, Resource};

bitfield::bitfield! {
    #[doc(hidden)]
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CommandWord(u32);
    impl Debug;

    u32;
    length, set_length: 23, 0;
    eof_irq, set_eof_irq: 30;
}

/// Longest transfer a descriptor can describe, in bytes. The command word
/// counts 32-bit words in 24 bits.
pub(crate) const MAX_TRANSFER_LEN: u32 = 0x00ff_ffff * 4;

/// Tags written into the descriptors' ID word, reported back in `FID0/1`.
const TAGS: [u32; 2] = [0xdeaf_bead, 0xdead_babe];

/// A hardware scan-out layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Layer {
    /// Foreground 0, fetched through `DA0`.
    F0,
    /// Foreground 1, fetched through `DA1`.
    F1,
}

impl Layer {
    const fn index(self) -> usize {
        match self {
            Layer::F0 => 0,
            Layer::F1 => 1,
        }
    }
}

/// A DMA descriptor as the LCD controller reads it.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct HardwareDescriptor {
    next: u32,
    addr: u32,
    id: u32,
    cmd: CommandWord,
}

const _: () = core::assert!(core::mem::size_of::<HardwareDescriptor>() == 16);

impl HardwareDescriptor {
    /// A zeroed descriptor used to initialize descriptor storage.
    pub const EMPTY: Self = Self {
        next: 0,
        addr: 0,
        id: 0,
        cmd: CommandWord(0),
    };

    /// Physical address of the next descriptor.
    pub fn next(&self) -> u32 {
        self.next
    }

    /// Physical address of the pixel data.
    pub fn buffer_address(&self) -> u32 {
        self.addr
    }

    /// Identifying tag.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Transfer length in bytes.
    pub fn transfer_len(&self) -> u32 {
        self.cmd.length() * 4
    }

    /// Whether an end-of-frame interrupt is raised after the transfer.
    pub fn eof_irq(&self) -> bool {
        self.cmd.eof_irq()
    }
}

/// A descriptor together with the physical address the controller sees it
/// at.
#[derive(Debug)]
pub struct DescriptorSlot<'d> {
    desc: &'d mut HardwareDescriptor,
    paddr: u32,
}

impl<'d> DescriptorSlot<'d> {
    /// Wraps descriptor memory located at physical address `paddr`.
    ///
    /// The memory must be coherent with the LCD controller's DMA.
    pub fn new(desc: &'d mut HardwareDescriptor, paddr: u32) -> Self {
        Self { desc, paddr }
    }

    /// Physical address of the descriptor.
    pub fn paddr(&self) -> u32 {
        self.paddr
    }
}

/// Source of coherent descriptor memory.
pub trait DescriptorAllocator<'d> {
    /// Hands out one descriptor, or `None` when the memory is exhausted.
    fn allocate(&mut self) -> Option<DescriptorSlot<'d>>;
}

/// Allocates descriptors from a contiguous array at a known physical address.
#[derive(Debug)]
pub struct DescriptorPool<'d> {
    free: &'d mut [HardwareDescriptor],
    next_paddr: u32,
}

impl<'d> DescriptorPool<'d> {
    /// Creates a pool over `storage`, whose first element lives at physical
    /// address `phys_base`.
    pub fn new(storage: &'d mut [HardwareDescriptor], phys_base: u32) -> Self {
        Self {
            free: storage,
            next_paddr: phys_base,
        }
    }
}

impl<'d> DescriptorAllocator<'d> for DescriptorPool<'d> {
    fn allocate(&mut self) -> Option<DescriptorSlot<'d>> {
        let (desc, rest) = core::mem::take(&mut self.free).split_first_mut()?;
        self.free = rest;

        let paddr = self.next_paddr;
        self.next_paddr += core::mem::size_of::<HardwareDescriptor>() as u32;
        Some(DescriptorSlot::new(desc, paddr))
    }
}

/// The descriptor arena, one self-linked descriptor per layer.
#[derive(Debug)]
pub struct DescriptorRing<'d> {
    slots: [DescriptorSlot<'d>; 2],
}

impl<'d> DescriptorRing<'d> {
    /// Allocates and initializes both descriptors.
    pub fn new(allocator: &mut impl DescriptorAllocator<'d>) -> Result<Self, Error> {
        let mut allocate = || {
            allocator
                .allocate()
                .ok_or(Error::ResourceExhausted(Resource::Descriptor))
        };
        let mut slots = [allocate()?, allocate()?];

        for (slot, tag) in slots.iter_mut().zip(TAGS) {
            let paddr = slot.paddr;
            let desc: *mut HardwareDescriptor = &mut *slot.desc;
            // SAFETY: `desc` comes from a live exclusive reference.
            unsafe {
                addr_of_mut!((*desc).next).write_volatile(paddr);
                addr_of_mut!((*desc).addr).write_volatile(0);
                addr_of_mut!((*desc).id).write_volatile(tag);
                addr_of_mut!((*desc).cmd).write_volatile(CommandWord(0));
            }
        }
        compiler_fence(Ordering::SeqCst);

        Ok(Self { slots })
    }

    /// Physical address of a layer's descriptor.
    pub fn paddr(&self, layer: Layer) -> u32 {
        self.slots[layer.index()].paddr
    }

    /// Points a layer's descriptor at `len` bytes of pixel data at `addr`,
    /// requesting an end-of-frame interrupt.
    pub fn program(&mut self, layer: Layer, addr: u32, len: u32) {
        let mut cmd = CommandWord(0);
        cmd.set_length(len / 4);
        cmd.set_eof_irq(true);

        let desc: *mut HardwareDescriptor = &mut *self.slots[layer.index()].desc;
        // SAFETY: `desc` comes from a live exclusive reference. The controller
        // reads the descriptor concurrently, so every store is volatile.
        unsafe {
            addr_of_mut!((*desc).addr).write_volatile(addr);
            addr_of_mut!((*desc).cmd).write_volatile(cmd);
        }
        compiler_fence(Ordering::SeqCst);
    }

    /// A snapshot of a layer's descriptor.
    pub fn descriptor(&self, layer: Layer) -> HardwareDescriptor {
        let desc: *const HardwareDescriptor = &*self.slots[layer.index()].desc;
        // SAFETY: `desc` comes from a live reference.
        unsafe {
            HardwareDescriptor {
                next: addr_of!((*desc).next).read_volatile(),
                addr: addr_of!((*desc).addr).read_volatile(),
                id: addr_of!((*desc).id).read_volatile(),
                cmd: addr_of!((*desc).cmd).read_volatile(),
            }
        }
    }
}

/// Decodes a command word read back from `CMD0/1`.
pub(crate) fn command_transfer_len(raw: u32) -> u32 {
    CommandWord(raw).length() * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_are_self_linked_and_tagged() {
        let mut storage = [HardwareDescriptor::EMPTY; 2];
        let mut pool = DescriptorPool::new(&mut storage, 0x0100_0000);
        let ring = DescriptorRing::new(&mut pool).unwrap();

        let d0 = ring.descriptor(Layer::F0);
        let d1 = ring.descriptor(Layer::F1);
        assert_eq!(ring.paddr(Layer::F0), 0x0100_0000);
        assert_eq!(ring.paddr(Layer::F1), 0x0100_0010);
        assert_eq!(d0.next(), ring.paddr(Layer::F0));
        assert_eq!(d1.next(), ring.paddr(Layer::F1));
        assert_eq!(d0.id(), 0xdeaf_bead);
        assert_eq!(d1.id(), 0xdead_babe);
        assert!(!d0.eof_irq());
    }

    #[test]
    fn program_sets_length_and_eof_request() {
        let mut storage = [HardwareDescriptor::EMPTY; 2];
        let mut pool = DescriptorPool::new(&mut storage, 0x0100_0000);
        let mut ring = DescriptorRing::new(&mut pool).unwrap();

        ring.program(Layer::F1, 0x0200_0000, 320 * 240 * 2);

        let d1 = ring.descriptor(Layer::F1);
        assert_eq!(d1.buffer_address(), 0x0200_0000);
        assert_eq!(d1.transfer_len(), 320 * 240 * 2);
        assert!(d1.eof_irq());
        assert_eq!(d1.next(), ring.paddr(Layer::F1));
        assert_eq!(ring.descriptor(Layer::F0).buffer_address(), 0);
    }

    #[test]
    fn short_pool_is_exhausted() {
        let mut storage = [HardwareDescriptor::EMPTY; 1];
        let mut pool = DescriptorPool::new(&mut storage, 0x0100_0000);

        assert_eq!(
            DescriptorRing::new(&mut pool).err(),
            Some(Error::ResourceExhausted(Resource::Descriptor))
        );
    }

    #[test]
    fn command_word_layout() {
        assert_eq!(command_transfer_len((1 << 30) | 0x12c00), 0x12c00 * 4);
    }
}
