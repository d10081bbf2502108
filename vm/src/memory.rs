use crate::consts::DRAM_SIZE;

/// A byte-addressable access that fell outside DRAM bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "address {addr:#010x} (size {size}) is out of DRAM bounds")]
pub struct SegFault {
    pub addr: u32,
    pub size: u8,
}

impl std::error::Error for SegFault {}

/// The VM's flat DRAM, addressed by 32-bit byte offsets: a single
/// contiguous byte array with little-endian, variable-width loads and
/// stores.
#[derive(Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self::with_size(DRAM_SIZE)
    }

    pub fn with_size(size: u64) -> Self {
        Self {
            bytes: vec![0u8; size as usize],
        }
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn bounds_check(&self, addr: u32, size: u8) -> Result<(), SegFault> {
        let end = (addr as u64) + (size as u64);
        if end > self.bytes.len() as u64 {
            Err(SegFault { addr, size })
        } else {
            Ok(())
        }
    }

    /// Load `size` little-endian bytes starting at `addr`, zero-extended
    /// into a [`toylang_asm::Word`].
    pub fn load(&self, addr: u32, size: u8) -> Result<u64, SegFault> {
        self.bounds_check(addr, size)?;
        let mut data: u64 = 0;
        for i in 0..size as usize {
            data |= (self.bytes[addr as usize + i] as u64) << (8 * i);
        }
        Ok(data)
    }

    /// Store the low `size` bytes of `value`, little-endian, at `addr`.
    pub fn store(&mut self, addr: u32, size: u8, value: u64) -> Result<(), SegFault> {
        self.bounds_check(addr, size)?;
        for i in 0..size as usize {
            self.bytes[addr as usize + i] = (value >> (8 * i)) as u8;
        }
        Ok(())
    }

    /// Copy `length` bytes from `src` to `dest`, allowing overlap.
    pub fn copy(&mut self, src: u32, dest: u32, length: u32) -> Result<(), SegFault> {
        self.bounds_check(src, 0)?;
        self.bounds_check(dest, 0)?;
        let src_end = src as u64 + length as u64;
        let dest_end = dest as u64 + length as u64;
        if src_end > self.bytes.len() as u64 {
            return Err(SegFault { addr: src, size: 0 });
        }
        if dest_end > self.bytes.len() as u64 {
            return Err(SegFault { addr: dest, size: 0 });
        }
        self.bytes
            .copy_within(src as usize..src as usize + length as usize, dest as usize);
        Ok(())
    }

    pub fn write_image(&mut self, addr: u32, image: &[u8]) -> Result<(), SegFault> {
        self.bounds_check(addr, 0)?;
        let end = addr as u64 + image.len() as u64;
        if end > self.bytes.len() as u64 {
            return Err(SegFault {
                addr,
                size: image.len().min(u8::MAX as usize) as u8,
            });
        }
        self.bytes[addr as usize..addr as usize + image.len()].copy_from_slice(image);
        Ok(())
    }

    pub fn slice(&self, addr: u32, len: u32) -> Result<&[u8], SegFault> {
        self.bounds_check(addr, 0)?;
        let end = addr as u64 + len as u64;
        if end > self.bytes.len() as u64 {
            return Err(SegFault {
                addr,
                size: len.min(u8::MAX as u32) as u8,
            });
        }
        Ok(&self.bytes[addr as usize..addr as usize + len as usize])
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn contains(&self, addr: u32) -> bool {
        (addr as u64) < self.bytes.len() as u64
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
