//! Flat, byte-addressable memory.
//!
//! The reference memory model backs every byte with a sparse map with
//! no upper bound, and rebuilds halfwords/words/doublewords recursively
//! out of single-byte writes on every store. This one is a fixed-size
//! buffer with in-place slice writes and an explicit out-of-bounds
//! error, matching the flat model described in section 1.4 of the
//! RISC-V unprivileged reference.
use crate::error::MemoryError;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Construct a zero-initialized memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Memory {
            data: vec![0u8; size],
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), MemoryError> {
        let end = addr as usize + len;
        if end > self.data.len() {
            return Err(MemoryError {
                addr,
                len: len as u32,
                size: self.data.len() as u32,
            });
        }
        Ok(())
    }

    /// Overlay `bytes` onto `[addr, addr+bytes.len())`.
    pub fn write(&mut self, bytes: &[u8], addr: u32) -> Result<(), MemoryError> {
        self.check_range(addr, bytes.len())?;
        let start = addr as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read `n` bytes starting at `addr`.
    pub fn read(&self, addr: u32, n: usize) -> Result<&[u8], MemoryError> {
        self.check_range(addr, n)?;
        let start = addr as usize;
        Ok(&self.data[start..start + n])
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.read(addr, 1)?[0])
    }

    pub fn read_u16(&self, addr: u32) -> Result<u16, MemoryError> {
        let bytes = self.read(addr, 2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, MemoryError> {
        let bytes = self.read(addr, 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write(&[value], addr)
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write(&value.to_le_bytes(), addr)
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write(&value.to_le_bytes(), addr)
    }

    /// Load a program image: each element of `words` is serialized
    /// little-endian and written consecutively starting at `base`.
    pub fn load_program(&mut self, words: &[u32], base: u32) -> Result<(), MemoryError> {
        for (i, word) in words.iter().enumerate() {
            self.write_u32(base + (i as u32) * 4, *word)?;
        }
        Ok(())
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Memory {{")?;
        for addr in (0..self.data.len().min(32)).step_by(4) {
            let value = self.read_u32(addr as u32).unwrap_or(0);
            writeln!(f, " {addr:02x}: {value:08x}")?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialized() {
        let mem = Memory::new(16);
        assert_eq!(mem.read_u32(0).unwrap(), 0);
    }

    #[test]
    fn round_trip_word() {
        let mut mem = Memory::new(16);
        mem.write_u32(4, 0xdead_beef).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 0xdead_beef);
    }

    #[test]
    fn little_endian_byte_order() {
        let mut mem = Memory::new(8);
        mem.write_u32(0, 0x0102_0304).unwrap();
        assert_eq!(mem.read_u8(0).unwrap(), 0x04);
        assert_eq!(mem.read_u8(3).unwrap(), 0x01);
    }

    #[test]
    fn out_of_bounds_errors() {
        let mem = Memory::new(4);
        assert!(mem.read_u32(2).is_err());
        assert!(mem.read_u8(4).is_err());
    }

    #[test]
    fn load_program_writes_consecutive_words() {
        let mut mem = Memory::new(16);
        mem.load_program(&[1, 2, 3], 4).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 1);
        assert_eq!(mem.read_u32(8).unwrap(), 2);
        assert_eq!(mem.read_u32(12).unwrap(), 3);
    }
}
