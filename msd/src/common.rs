// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Bit-packing helpers shared by the register accessors.

/// A mask covering the low `size` bits.
pub const fn mask(size: u8) -> u32 {
    if size >= 32 { u32::MAX } else { (1u32 << size) - 1 }
}

/// Extract `size` bits of a 16-bit register starting at `offset`.
pub fn get_field(word: u16, offset: u8, size: u8) -> u16 {
    ((word as u32 >> offset) & mask(size)) as u16
}

/// Replace `size` bits of a 16-bit register starting at `offset`.  Bits of
/// `val` that don't fit are dropped.
pub fn set_field(word: u16, offset: u8, size: u8, val: u16) -> u16 {
    let m = mask(size) << offset;
    ((word as u32 & !m) | ((val as u32) << offset & m)) as u16
}

/// Does `val` fit in a field `size` bits wide?
pub fn fits(val: u64, size: u8) -> bool {
    size >= 64 || val >> size == 0
}

pub fn get_bit(word: impl std::convert::Into<u32>, bit: usize) -> u64 {
    let w: u32 = word.into();
    ((w >> bit) & 0x1) as u64
}

/// Read bits `start..=end` of a multi-word record, where word 0 holds bits
/// 0-31.
pub fn get_bits(regs: &[u32], start: u16, end: u16) -> u64 {
    let mut rval = 0u64;

    for idx in (start..=end).rev() {
        let word = (idx / 32) as usize;
        let bit = (idx % 32) as usize;
        rval = (rval << 1) | get_bit(regs[word], bit);
    }
    rval
}

/// Write bits `start..=end` of a multi-word record.
pub fn set_bits(regs: &mut [u32], start: u16, end: u16, mut val: u64) {
    for idx in start..=end {
        let word = (idx / 32) as usize;
        let bit = idx % 32;
        if val & 1 == 1 {
            regs[word] |= 1 << bit;
        } else {
            regs[word] &= !(1 << bit);
        }
        val >>= 1;
    }
}

/// Assemble a value from 16-bit register words, least significant first.
pub fn join_words(words: &[u16]) -> u64 {
    words
        .iter()
        .rev()
        .fold(0u64, |acc, w| (acc << 16) | *w as u64)
}

/// Split a value into `N` 16-bit register words, least significant first.
pub fn split_words<const N: usize>(mut val: u64) -> [u16; N] {
    let mut words = [0u16; N];
    for w in words.iter_mut() {
        *w = val as u16;
        val >>= 16;
    }
    words
}

#[test]
fn test_get_bits() {
    assert_eq!(get_bits(&[0xabcd], 0, 3), 0xd);
    assert_eq!(get_bits(&[0xabcd], 4, 7), 0xc);
    assert_eq!(get_bits(&[0xabcd], 8, 11), 0xb);
    assert_eq!(get_bits(&[0xabcd], 12, 15), 0xa);
    assert_eq!(get_bits(&[0x8000_0000, 0x1], 31, 32), 0x3);
}

#[test]
fn test_fields() {
    assert_eq!(get_field(0x3f1f, 8, 6), 0x3f);
    assert_eq!(set_field(0xffff, 4, 4, 0), 0xff0f);
    assert_eq!(set_field(0x0000, 12, 4, 0x1f), 0xf000);
    assert!(fits(0xfff, 12));
    assert!(!fits(0x1000, 12));
    assert_eq!(join_words(&[0x5678, 0x1234]), 0x1234_5678);
    assert_eq!(split_words::<3>(0x0001_0002_0003), [3, 2, 1]);
}
