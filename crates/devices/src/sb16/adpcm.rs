//! 4-bit IMA-style ADPCM decoder behind the legacy transfer commands.

const INDEX_TABLE: [i32; 16] = [
    -1, -1, -1, -1, 2, 4, 6, 8, //
    -1, -1, -1, -1, 2, 4, 6, 8,
];

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Decoder state carried across DMA chunks of one compressed stream.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct AdpcmDecoder {
    pub(super) predictor: i32,
    pub(super) step_index: i32,
}

impl AdpcmDecoder {
    /// Reseed from a reference sample and restart the step ladder.
    pub(super) fn reset(&mut self, predictor: i16) {
        self.predictor = i32::from(predictor);
        self.step_index = 0;
    }

    /// Decode one 4-bit code into a signed 16-bit sample.
    pub(super) fn decode_nibble(&mut self, code: u8) -> i16 {
        let step = STEP_TABLE[self.step_index as usize];
        let mut diff = step >> 3;
        if code & 4 != 0 {
            diff += step;
        }
        if code & 2 != 0 {
            diff += step >> 1;
        }
        if code & 1 != 0 {
            diff += step >> 2;
        }

        if code & 8 != 0 {
            self.predictor -= diff;
        } else {
            self.predictor += diff;
        }
        self.predictor = self.predictor.clamp(-32768, 32767);

        self.step_index = (self.step_index + INDEX_TABLE[code as usize & 0xf]).clamp(0, 88);
        self.predictor as i16
    }

    /// Decode a packed byte, high nibble first.
    pub(super) fn decode_byte(&mut self, byte: u8) -> [i16; 2] {
        [self.decode_nibble(byte >> 4), self.decode_nibble(byte & 0x0f)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_from_reset_state() {
        let mut dec = AdpcmDecoder::default();
        // Smallest step is 7, so magnitude codes 0..=3 all round to zero
        // deltas while the sign bit still picks the direction.
        assert_eq!(dec.decode_nibble(0x0), 0);
        assert_eq!(dec.decode_nibble(0x8), 0);
        assert_eq!(dec.decode_nibble(0xf), -11);
        assert_eq!(dec.step_index, 8);
    }

    #[test]
    fn predictor_saturates_at_sixteen_bits() {
        let mut dec = AdpcmDecoder::default();
        dec.reset(32700);
        for _ in 0..64 {
            dec.decode_nibble(0x7);
        }
        assert_eq!(dec.predictor, 32767);
        dec.reset(-32700);
        for _ in 0..64 {
            dec.decode_nibble(0xf);
        }
        assert_eq!(dec.predictor, -32768);
    }

    #[test]
    fn step_index_is_clamped_to_the_table() {
        let mut dec = AdpcmDecoder::default();
        for _ in 0..32 {
            dec.decode_nibble(0x7);
        }
        assert!((0..=88).contains(&dec.step_index));
        for _ in 0..96 {
            dec.decode_nibble(0x0);
        }
        assert_eq!(dec.step_index, 0);
    }

    #[test]
    fn packed_byte_decodes_high_nibble_first() {
        let mut packed = AdpcmDecoder::default();
        let [a, b] = packed.decode_byte(0x4c);

        let mut serial = AdpcmDecoder::default();
        let first = serial.decode_nibble(0x4);
        let second = serial.decode_nibble(0xc);
        assert_eq!([a, b], [first, second]);
    }
}
