use crate::bitnum::{Num32, Num8};

/// Byte-addressed RAM backing the board. Cells are stored as [`Num8`] bit
/// vectors so every access stays inside the gate-level model; word reads and
/// writes compose their addresses with gate-level adds.
pub struct Memory {
    cells: Vec<Num8>,
}

impl Memory {
    pub fn new(length: usize) -> Memory {
        Memory {
            cells: vec![Num8::ZERO; length],
        }
    }

    pub fn length(&self) -> usize {
        self.cells.len()
    }

    fn index(&self, address: Num32) -> Result<usize, ()> {
        let index = address.to_u32() as usize;
        if index < self.cells.len() {
            Ok(index)
        } else {
            Err(())
        }
    }

    pub fn read8(&self, address: Num32) -> Result<Num8, ()> {
        Ok(self.cells[self.index(address)?])
    }

    pub fn write8(&mut self, address: Num32, value: Num8) -> Result<(), ()> {
        let index = self.index(address)?;
        self.cells[index] = value;
        Ok(())
    }

    pub fn read32(&self, address: Num32) -> Result<Num32, ()> {
        Ok(Num32::from_bytes([
            self.read8(address)?,
            self.read8(address + Num32::ONE)?,
            self.read8(address + Num32::TWO)?,
            self.read8(address + Num32::THREE)?,
        ]))
    }

    pub fn write32(&mut self, address: Num32, value: Num32) -> Result<(), ()> {
        self.write8(address, value.byte(0))?;
        self.write8(address + Num32::ONE, value.byte(1))?;
        self.write8(address + Num32::TWO, value.byte(2))?;
        self.write8(address + Num32::THREE, value.byte(3))?;
        Ok(())
    }
}
