//! A paged, append-only byte buffer with out-of-place backfill support.
//!
//! The buffer presents one logical byte stream over a list of fixed-size blocks. Blocks are never
//! moved or reallocated once created, so growing the buffer never copies earlier output; `reset`
//! keeps the blocks for the next batch of writes.

use std::io::Write;

use bigdecimal::num_bigint::{BigInt, BigUint};

use super::varint::{FixedInt, FixedUInt, FlexInt, FlexUInt};
use crate::IonResult;

pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

#[derive(Debug)]
pub struct WriteBuffer {
    blocks: Vec<Box<[u8]>>,
    block_size: usize,
    position: usize,
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.max(16),
            position: 0,
        }
    }

    /// The logical write position, which is also the number of bytes written.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    fn ensure_capacity(&mut self, end: usize) {
        while self.blocks.len() * self.block_size < end {
            self.blocks.push(vec![0u8; self.block_size].into_boxed_slice());
        }
    }

    #[inline]
    fn locate(&self, position: usize) -> (usize, usize) {
        (position / self.block_size, position % self.block_size)
    }

    /// Advances the position by `n` zeroed bytes, leaving room for a later `write_*_at`.
    pub fn reserve(&mut self, n: usize) {
        let start = self.position;
        self.ensure_capacity(start + n);
        for position in start..start + n {
            let (block, offset) = self.locate(position);
            self.blocks[block][offset] = 0;
        }
        self.position += n;
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.ensure_capacity(self.position + 1);
        let (block, offset) = self.locate(self.position);
        self.blocks[block][offset] = byte;
        self.position += 1;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure_capacity(self.position + bytes.len());
        self.copy_in(self.position, bytes);
        self.position += bytes.len();
    }

    /// Overwrites one already-written or reserved byte. Does not move the position.
    pub fn write_byte_at(&mut self, position: usize, byte: u8) {
        debug_assert!(position < self.position);
        let (block, offset) = self.locate(position);
        self.blocks[block][offset] = byte;
    }

    pub fn write_bytes_at(&mut self, position: usize, bytes: &[u8]) {
        debug_assert!(position + bytes.len() <= self.position);
        self.copy_in(position, bytes);
    }

    fn copy_in(&mut self, mut position: usize, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let (block, offset) = self.locate(position);
            let room = self.block_size - offset;
            let count = room.min(bytes.len());
            self.blocks[block][offset..offset + count].copy_from_slice(&bytes[..count]);
            bytes = &bytes[count..];
            position += count;
        }
    }

    pub fn get(&self, position: usize) -> Option<u8> {
        if position >= self.position {
            return None;
        }
        let (block, offset) = self.locate(position);
        Some(self.blocks[block][offset])
    }

    // ------------------------------------------------------------------------
    // Integer encodings
    // ------------------------------------------------------------------------

    /// Appends a FlexUInt and returns its length.
    pub fn write_flex_uint(&mut self, value: u64) -> usize {
        let length = FlexUInt::length_of(value);
        let mut scratch = [0u8; 16];
        FlexUInt::write(&mut scratch, 0, value, length);
        self.write_bytes(&scratch[..length]);
        length
    }

    pub fn write_flex_uint_big(&mut self, value: &BigUint) -> usize {
        let length = FlexUInt::length_of_big(value);
        let mut scratch = vec![0u8; length];
        FlexUInt::write_big(&mut scratch, 0, value, length);
        self.write_bytes(&scratch);
        length
    }

    pub fn write_flex_int(&mut self, value: i64) -> usize {
        let length = FlexInt::length_of(value);
        let mut scratch = [0u8; 16];
        FlexInt::write(&mut scratch, 0, value, length);
        self.write_bytes(&scratch[..length]);
        length
    }

    pub fn write_flex_int_big(&mut self, value: &BigInt) -> usize {
        let length = FlexInt::length_of_big(value);
        let mut scratch = vec![0u8; length];
        FlexInt::write_big(&mut scratch, 0, value, length);
        self.write_bytes(&scratch);
        length
    }

    /// Appends `value` as a FixedUInt of exactly `length` bytes.
    pub fn write_fixed_uint(&mut self, value: u64, length: usize) {
        let mut scratch = [0u8; 8];
        FixedUInt::write(&mut scratch, 0, value, length);
        self.write_bytes(&scratch[..length]);
    }

    pub fn write_fixed_int(&mut self, value: i64, length: usize) {
        let mut scratch = [0u8; 8];
        FixedInt::write(&mut scratch, 0, value, length);
        self.write_bytes(&scratch[..length]);
    }

    pub fn write_fixed_int_big(&mut self, value: &BigInt, length: usize) {
        let mut scratch = vec![0u8; length];
        FixedInt::write_big(&mut scratch, 0, value, length);
        self.write_bytes(&scratch);
    }

    pub fn write_fixed_uint_big(&mut self, value: &BigUint, length: usize) {
        let mut scratch = vec![0u8; length];
        FixedUInt::write_big(&mut scratch, 0, value, length);
        self.write_bytes(&scratch);
    }

    /// Writes a FlexUInt of exactly `length` bytes at `position`.
    pub fn write_flex_uint_at(&mut self, position: usize, value: u64, length: usize) {
        let mut scratch = [0u8; 16];
        FlexUInt::write(&mut scratch, 0, value, length);
        self.write_bytes_at(position, &scratch[..length]);
    }

    pub fn write_fixed_uint_at(&mut self, position: usize, value: u64, length: usize) {
        let mut scratch = [0u8; 8];
        FixedUInt::write(&mut scratch, 0, value, length);
        self.write_bytes_at(position, &scratch[..length]);
    }

    pub fn write_fixed_int_at(&mut self, position: usize, value: i64, length: usize) {
        let mut scratch = [0u8; 8];
        FixedInt::write(&mut scratch, 0, value, length);
        self.write_bytes_at(position, &scratch[..length]);
    }

    pub fn write_flex_int_at(&mut self, position: usize, value: i64, length: usize) {
        let mut scratch = [0u8; 16];
        FlexInt::write(&mut scratch, 0, value, length);
        self.write_bytes_at(position, &scratch[..length]);
    }

    // ------------------------------------------------------------------------
    // Compaction
    // ------------------------------------------------------------------------

    /// Moves the last `length` bytes `amount` bytes toward the start and pulls the position back
    /// by `amount`.
    pub fn shift_bytes_left(&mut self, length: usize, amount: usize) {
        if amount == 0 {
            return;
        }
        debug_assert!(length + amount <= self.position);
        let source = self.position - length;
        let target = source - amount;
        for i in 0..length {
            let (block, offset) = self.locate(source + i);
            let byte = self.blocks[block][offset];
            let (block, offset) = self.locate(target + i);
            self.blocks[block][offset] = byte;
        }
        self.position -= amount;
    }

    /// Discards everything at or after `position`.
    pub fn truncate(&mut self, position: usize) {
        if position < self.position {
            self.position = position;
        }
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    pub fn write_to<W: Write>(&self, sink: &mut W) -> IonResult<()> {
        self.write_range_to(sink, 0, self.position)
    }

    /// Copies `length` bytes starting at `from` into `sink`.
    pub fn write_range_to<W: Write>(&self, sink: &mut W, from: usize, length: usize) -> IonResult<()> {
        let mut position = from;
        let end = from + length;
        while position < end {
            let (block, offset) = self.locate(position);
            let count = (self.block_size - offset).min(end - position);
            sink.write_all(&self.blocks[block][offset..offset + count])?;
            position += count;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.position);
        for position in 0..self.position {
            let (block, offset) = self.locate(position);
            bytes.push(self.blocks[block][offset]);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_span_block_boundaries() {
        let mut buffer = WriteBuffer::with_block_size(16);
        let bytes: Vec<u8> = (0..40).collect();
        buffer.write_bytes(&bytes);
        assert_eq!(buffer.position(), 40);
        assert_eq!(buffer.to_vec(), bytes);
        let mut sink = Vec::new();
        buffer.write_range_to(&mut sink, 10, 20).unwrap();
        assert_eq!(sink, (10..30).collect::<Vec<u8>>());
    }

    #[test]
    fn reserve_then_backfill() {
        let mut buffer = WriteBuffer::with_block_size(16);
        buffer.write_byte(0xB0);
        let length_at = buffer.position();
        buffer.reserve(2);
        buffer.write_bytes(&[0x6E; 20]);
        buffer.write_flex_uint_at(length_at, 20, 2);
        let bytes = buffer.to_vec();
        assert_eq!(&bytes[..3], &[0xB0, 0x52, 0x00]);
        assert_eq!(bytes.len(), 23);
    }

    #[test]
    fn shift_left_compacts_across_blocks() {
        let mut buffer = WriteBuffer::with_block_size(16);
        buffer.write_bytes(&[0xAA; 14]);
        buffer.reserve(3);
        buffer.write_bytes(&[1, 2, 3, 4, 5]);
        buffer.shift_bytes_left(5, 3);
        assert_eq!(buffer.position(), 19);
        assert_eq!(&buffer.to_vec()[14..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn truncate_and_reset_reuse_blocks() {
        let mut buffer = WriteBuffer::with_block_size(16);
        buffer.write_bytes(&[7; 30]);
        buffer.truncate(3);
        assert_eq!(buffer.to_vec(), vec![7, 7, 7]);
        buffer.reset();
        assert!(buffer.is_empty());
        buffer.write_byte(9);
        assert_eq!(buffer.to_vec(), vec![9]);
        assert_eq!(buffer.get(1), None);
    }
}
