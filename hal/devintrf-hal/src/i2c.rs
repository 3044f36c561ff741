//! I2C transport configuration

/// Addresses above this are not valid 7-bit bus addresses
pub const MAX_7BIT_ADDRESS: u32 = 0x7F;

/// I2C configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };

    /// Fast mode plus (1 MHz)
    pub const FAST_PLUS: Self = Self {
        frequency: 1_000_000,
    };

    /// Bus speeds the transports can run at, slowest first
    pub const MODES: [Self; 3] = [Self::STANDARD, Self::FAST, Self::FAST_PLUS];

    /// Closest supported mode to `frequency`
    ///
    /// Ties go to the slower mode.
    pub fn nearest(frequency: u32) -> Self {
        Self::MODES
            .iter()
            .copied()
            .min_by_key(|mode| mode.frequency.abs_diff(frequency))
            .unwrap_or(Self::STANDARD)
    }
}
