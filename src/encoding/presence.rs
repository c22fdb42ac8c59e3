//! The presence bitmap that prefixes e-expression arguments.
//!
//! Each parameter owns a two-bit slot. Slots for `One` parameters are never physically encoded:
//! they always read back as [`Presence::Expression`]. The remaining slots are packed four to a
//! byte, lowest slot in the lowest bits, in parameter order.

use crate::macros::{Cardinality, Parameter};
use crate::{err_msg, IonResult};

pub const MAX_PARAMETERS: usize = 128;

/// Above this many non-`One` parameters the bitmap is always written.
const BITMAP_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Void = 0b00,
    Expression = 0b01,
    Group = 0b10,
    Reserved = 0b11,
}

impl Presence {
    fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0b00 => Presence::Void,
            0b01 => Presence::Expression,
            0b10 => Presence::Group,
            _ => Presence::Reserved,
        }
    }
}

/// Fixed-capacity bitmap over at most [`MAX_PARAMETERS`] parameters.
///
/// The slots live inline; only the per-parameter cardinalities are heap allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceBitmap {
    words: [u64; 4],
    // Cardinality of each parameter, used for validation and for skipping `One` slots.
    cardinalities: Vec<Cardinality>,
    size: usize,
}

impl PresenceBitmap {
    /// Builds an all-`Void` bitmap for `signature`.
    pub fn new(signature: &[Parameter]) -> IonResult<Self> {
        if signature.len() > MAX_PARAMETERS {
            return Err(err_msg!(
                Encoding,
                "a signature with {} parameters exceeds the limit of {}",
                signature.len(),
                MAX_PARAMETERS
            ));
        }
        Ok(Self {
            words: [0; 4],
            cardinalities: signature.iter().map(|p| p.cardinality).collect(),
            size: Self::size_for(signature),
        })
    }

    /// Number of physically encoded slots for `signature` (zero when no bitmap is written).
    pub fn size_for(signature: &[Parameter]) -> usize {
        let variadic = signature
            .iter()
            .filter(|p| p.cardinality != Cardinality::One)
            .count();
        let any_tagless = signature.iter().any(|p| p.encoding.is_tagless());
        if variadic > BITMAP_THRESHOLD || any_tagless {
            variadic
        } else {
            0
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total_parameter_count(&self) -> usize {
        self.cardinalities.len()
    }

    /// Number of bytes the encoded slots occupy.
    pub fn byte_size(&self) -> usize {
        self.size.div_ceil(4)
    }

    pub fn is_written(&self) -> bool {
        self.size > 0
    }

    pub fn get(&self, index: usize) -> Presence {
        if self.cardinalities.get(index) == Some(&Cardinality::One) {
            return Presence::Expression;
        }
        let (word, shift) = (index / 32, (index % 32) * 2);
        Presence::from_bits(self.words[word] >> shift)
    }

    pub fn set(&mut self, index: usize, presence: Presence) {
        debug_assert!(index < self.cardinalities.len());
        let (word, shift) = (index / 32, (index % 32) * 2);
        self.words[word] &= !(0b11 << shift);
        self.words[word] |= (presence as u64) << shift;
    }

    /// Appends the encoded slots to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        if !self.is_written() {
            return;
        }
        let mut byte = 0u8;
        let mut used = 0;
        for (index, cardinality) in self.cardinalities.iter().enumerate() {
            if *cardinality == Cardinality::One {
                continue;
            }
            byte |= (self.get(index) as u8) << (used * 2);
            used += 1;
            if used == 4 {
                out.push(byte);
                byte = 0;
                used = 0;
            }
        }
        if used > 0 {
            out.push(byte);
        }
    }

    /// Reads the encoded slots from `bytes` at `offset`, returning the number of bytes consumed.
    pub fn read_from(&mut self, bytes: &[u8], offset: usize) -> IonResult<usize> {
        let needed = self.byte_size();
        if offset + needed > bytes.len() {
            return Err(err_msg!(
                Encoding,
                "incomplete presence bitmap: needed {} bytes at offset {}",
                needed,
                offset
            ));
        }
        self.words = [0; 4];
        let mut slot = 0;
        for index in 0..self.cardinalities.len() {
            if self.cardinalities[index] == Cardinality::One {
                continue;
            }
            let byte = bytes[offset + slot / 4];
            let bits = (byte >> ((slot % 4) * 2)) & 0b11;
            self.set(index, Presence::from_bits(bits as u64));
            slot += 1;
        }
        Ok(needed)
    }

    /// Checks that each slot is allowed by its parameter's cardinality.
    pub fn validate(&self) -> IonResult<()> {
        for (index, cardinality) in self.cardinalities.iter().enumerate() {
            let presence = self.get(index);
            let allowed = match cardinality {
                Cardinality::One => presence == Presence::Expression,
                Cardinality::AtMostOne => matches!(presence, Presence::Void | Presence::Expression),
                Cardinality::AtLeastOne => matches!(presence, Presence::Expression | Presence::Group),
                Cardinality::Any => presence != Presence::Reserved,
            };
            if !allowed {
                return Err(err_msg!(
                    Encoding,
                    "presence {:?} is not allowed for parameter {} with cardinality '{}'",
                    presence,
                    index,
                    cardinality.sigil()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::ParameterEncoding;

    fn signature(cardinalities: &[Cardinality]) -> Vec<Parameter> {
        cardinalities
            .iter()
            .enumerate()
            .map(|(i, c)| Parameter::tagged(format!("p{i}"), *c))
            .collect()
    }

    #[test]
    fn small_signatures_skip_the_bitmap() {
        let sig = signature(&[Cardinality::One, Cardinality::AtMostOne, Cardinality::Any]);
        assert_eq!(PresenceBitmap::size_for(&sig), 0);
        let sig = signature(&[Cardinality::Any, Cardinality::Any, Cardinality::AtMostOne]);
        assert_eq!(PresenceBitmap::size_for(&sig), 3);
    }

    #[test]
    fn tagless_parameters_force_the_bitmap() {
        let sig = vec![Parameter::new("x", ParameterEncoding::UInt8, Cardinality::AtMostOne)];
        assert_eq!(PresenceBitmap::size_for(&sig), 1);
    }

    #[test]
    fn one_slots_are_implicit() {
        let sig = signature(&[Cardinality::One, Cardinality::Any]);
        let bitmap = PresenceBitmap::new(&sig).unwrap();
        assert_eq!(bitmap.get(0), Presence::Expression);
        assert_eq!(bitmap.get(1), Presence::Void);
    }

    #[test]
    fn packs_more_than_one_byte() {
        let sig = signature(&[Cardinality::Any; 6]);
        let mut bitmap = PresenceBitmap::new(&sig).unwrap();
        bitmap.set(4, Presence::Group);
        bitmap.set(5, Presence::Expression);
        let mut out = Vec::new();
        bitmap.write_to(&mut out);
        assert_eq!(out, vec![0x00, 0b0110]);
    }

    #[test]
    fn validate_rejects_groups_for_at_most_one() {
        let sig = signature(&[Cardinality::AtMostOne, Cardinality::Any, Cardinality::Any]);
        let mut bitmap = PresenceBitmap::new(&sig).unwrap();
        bitmap.set(0, Presence::Group);
        assert!(bitmap.validate().is_err());
        bitmap.set(0, Presence::Expression);
        bitmap.set(1, Presence::Reserved);
        assert!(bitmap.validate().is_err());
    }
}
