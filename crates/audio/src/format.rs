/// Sample encoding of a guest PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    #[default]
    U8,
    S8,
    U16,
    S16,
}

impl SampleFormat {
    pub fn from_bits_signed(bits: u8, signed: bool) -> Self {
        match (bits, signed) {
            (16, true) => Self::S16,
            (16, false) => Self::U16,
            (_, true) => Self::S8,
            (_, false) => Self::U8,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::S8 | Self::S16)
    }

    /// The byte value that encodes silence in this format.
    ///
    /// Unsigned 8-bit audio is biased around 0x80; everything else is
    /// two's-complement around zero.
    pub fn silence_byte(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            _ => 0x00,
        }
    }
}

/// Format of an output voice, fixed from open until reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub freq: u32,
    pub channels: u8,
    pub fmt: SampleFormat,
}

impl AudioSettings {
    pub fn bytes_per_second(&self) -> u32 {
        self.freq * u32::from(self.channels) * self.fmt.bytes_per_sample() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_properties() {
        assert_eq!(SampleFormat::from_bits_signed(8, false), SampleFormat::U8);
        assert_eq!(SampleFormat::from_bits_signed(16, true), SampleFormat::S16);
        assert_eq!(SampleFormat::U8.silence_byte(), 0x80);
        assert_eq!(SampleFormat::S16.silence_byte(), 0x00);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
    }

    #[test]
    fn bytes_per_second_accounts_for_channels_and_width() {
        let s = AudioSettings {
            freq: 22050,
            channels: 2,
            fmt: SampleFormat::S16,
        };
        assert_eq!(s.bytes_per_second(), 22050 * 2 * 2);
    }
}
