use num_traits::AsPrimitive;
use thiserror::Error;

/// One row of the calibration table: the voice parameters measured for a given input code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoiceParamTableEntry {
    /// The 12-bit CV code this row was calibrated at. Rows are keyed and ordered by this value.
    pub input_code: u16,
    /// DAC code which sets the ramp amplitude for this pitch.
    pub dac_code: u16,
    /// Timer period of the ramp oscillator at this pitch.
    pub period: u16,
}

impl VoiceParamTableEntry {
    /// Constructs a [`VoiceParamTableEntry`]; `const` so tables can live in flash.
    pub const fn new(input_code: u16, dac_code: u16, period: u16) -> Self {
        Self {
            input_code,
            dac_code,
            period,
        }
    }

    /// The parameters stored in this row.
    pub const fn params(&self) -> VoiceParams {
        VoiceParams {
            dac_code: self.dac_code,
            period: self.period,
        }
    }
}

/// Voice parameters resolved for a single CV code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoiceParams {
    /// 12-bit DAC code.
    pub dac_code: u16,
    /// Ramp oscillator timer period.
    pub period: u16,
}

/// Reasons a calibration table is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableError {
    /// A table needs at least one row to clamp to.
    #[error("voice parameter table is empty")]
    Empty,
    /// Keys must be strictly ascending; `index` is the first offending row.
    #[error("voice parameter table row {index} is not above its predecessor")]
    NotAscending {
        /// Position of the row whose key is less than or equal to the previous key.
        index: usize,
    },
}

/// A validated calibration table: non-empty and strictly ascending by [`input_code`](VoiceParamTableEntry::input_code).
///
/// Validation happens once, in [`VoiceParamTable::new`], which is what lets [`resolve_voice_params`] be infallible.
#[derive(Debug, Clone, Copy)]
pub struct VoiceParamTable<'a> {
    entries: &'a [VoiceParamTableEntry],
}

impl<'a> VoiceParamTable<'a> {
    /// Validates `entries` and wraps them.
    pub fn new(entries: &'a [VoiceParamTableEntry]) -> Result<Self, TableError> {
        if entries.is_empty() {
            return Err(TableError::Empty);
        }

        if let Some(position) = entries
            .windows(2)
            .position(|pair| pair[0].input_code >= pair[1].input_code)
        {
            return Err(TableError::NotAscending {
                index: position + 1,
            });
        }

        Ok(Self { entries })
    }

    /// Shorthand for [`resolve_voice_params`].
    pub fn resolve(&self, code: u16) -> VoiceParams {
        resolve_voice_params(self, code)
    }
}

/// Maps a CV code to [`VoiceParams`] using the calibration table.
///
/// Codes at or below the first key return the first row unmodified, and codes at or above the last key return the
/// last row unmodified; nothing is extrapolated. Between two rows every field is interpolated linearly and rounded
/// half up.
pub fn resolve_voice_params(table: &VoiceParamTable<'_>, code: u16) -> VoiceParams {
    let entries = table.entries;

    // index of the first row keyed above `code`
    let upper = entries.partition_point(|entry| entry.input_code <= code);

    if upper == 0 {
        return entries[0].params();
    }
    if upper == entries.len() {
        return entries[upper - 1].params();
    }

    let lo = &entries[upper - 1];
    let hi = &entries[upper];
    if code == lo.input_code {
        return lo.params();
    }

    let offset = code - lo.input_code;
    let span = hi.input_code - lo.input_code;
    VoiceParams {
        dac_code: interpolate(lo.dac_code, hi.dac_code, offset, span),
        period: interpolate(lo.period, hi.period, offset, span),
    }
}

/// Integer linear interpolation, rounding half up. `span` must be non-zero.
fn interpolate<T>(lo: T, hi: T, offset: u16, span: u16) -> T
where
    T: AsPrimitive<i64>,
    i64: AsPrimitive<T>,
{
    let (lo, hi): (i64, i64) = (lo.as_(), hi.as_());
    let (offset, span) = (i64::from(offset), i64::from(span));

    // the interpolated value times `span`; never negative since both endpoints are unsigned
    let scaled = lo * span + (hi - lo) * offset;
    ((2 * scaled + span) / (2 * span)).as_()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAMP: [VoiceParamTableEntry; 2] = [
        VoiceParamTableEntry::new(0, 100, 0),
        VoiceParamTableEntry::new(4095, 4000, 0),
    ];

    const CALIBRATED: [VoiceParamTableEntry; 5] = [
        VoiceParamTableEntry::new(200, 410, 48_000),
        VoiceParamTableEntry::new(1000, 1020, 24_000),
        VoiceParamTableEntry::new(1800, 1690, 12_000),
        VoiceParamTableEntry::new(2600, 2480, 6_000),
        VoiceParamTableEntry::new(3400, 3900, 3_000),
    ];

    /// Straightforward linear scan with the same bracketing rules, used as an oracle.
    fn linear_reference(entries: &[VoiceParamTableEntry], code: u16) -> VoiceParams {
        let first = entries[0];
        let last = entries[entries.len() - 1];
        if code <= first.input_code {
            return first.params();
        }
        if code >= last.input_code {
            return last.params();
        }
        for pair in entries.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if lo.input_code <= code && code <= hi.input_code {
                let offset = i64::from(code - lo.input_code);
                let span = i64::from(hi.input_code - lo.input_code);
                let lerp = |a: u16, b: u16| {
                    let (a, b) = (i64::from(a), i64::from(b));
                    let numerator = a * span + (b - a) * offset;
                    let (quotient, remainder) = (numerator / span, numerator % span);
                    // round half up
                    if 2 * remainder >= span {
                        (quotient + 1) as u16
                    } else {
                        quotient as u16
                    }
                };
                return VoiceParams {
                    dac_code: lerp(lo.dac_code, hi.dac_code),
                    period: lerp(lo.period, hi.period),
                };
            }
        }
        unreachable!("a bracketing pair always exists between the first and last keys")
    }

    mod table {
        use super::*;

        #[test]
        fn empty_table_is_rejected() {
            assert_eq!(
                Err(TableError::Empty),
                VoiceParamTable::new(&[]).map(|_| ()),
                "Expected left but got right"
            );
        }

        #[test]
        fn duplicate_key_is_rejected() {
            let entries = [
                VoiceParamTableEntry::new(0, 0, 0),
                VoiceParamTableEntry::new(10, 1, 0),
                VoiceParamTableEntry::new(10, 2, 0),
            ];
            assert_eq!(
                Err(TableError::NotAscending { index: 2 }),
                VoiceParamTable::new(&entries).map(|_| ()),
                "Expected left but got right"
            );
        }

        #[test]
        fn descending_key_is_rejected() {
            let entries = [
                VoiceParamTableEntry::new(50, 0, 0),
                VoiceParamTableEntry::new(10, 1, 0),
            ];
            assert_eq!(
                Err(TableError::NotAscending { index: 1 }),
                VoiceParamTable::new(&entries).map(|_| ()),
                "Expected left but got right"
            );
        }

        #[test]
        fn single_row_is_accepted() {
            let entries = [VoiceParamTableEntry::new(2048, 7, 9)];
            let table = VoiceParamTable::new(&entries).unwrap();
            for code in [0, 2047, 2048, 2049, 4095] {
                assert_eq!(
                    entries[0].params(),
                    table.resolve(code),
                    "A single row should answer every code"
                );
            }
        }
    }

    mod resolve {
        use super::*;

        #[test]
        fn interpolates_between_rows() {
            let table = VoiceParamTable::new(&RAMP).unwrap();
            // 100 + 3900 * 2047 / 4095 = 2049.52...
            assert_eq!(
                2050,
                resolve_voice_params(&table, 2047).dac_code,
                "Expected left but got right"
            );
        }

        #[test]
        fn rounds_half_up() {
            let entries = [
                VoiceParamTableEntry::new(0, 0, 3),
                VoiceParamTableEntry::new(2, 1, 2),
            ];
            let table = VoiceParamTable::new(&entries).unwrap();
            assert_eq!(
                VoiceParams {
                    dac_code: 1,
                    period: 3
                },
                table.resolve(1),
                "0.5 and 2.5 should both round up; expected left but got right"
            );
        }

        #[test]
        fn clamps_below_first_row() {
            let table = VoiceParamTable::new(&CALIBRATED).unwrap();
            for code in [0, 1, 199, 200] {
                assert_eq!(
                    CALIBRATED[0].params(),
                    table.resolve(code),
                    "Expected the first row unmodified"
                );
            }
        }

        #[test]
        fn clamps_above_last_row() {
            let table = VoiceParamTable::new(&CALIBRATED).unwrap();
            for code in [3400, 3401, 4095, u16::MAX] {
                assert_eq!(
                    CALIBRATED[4].params(),
                    table.resolve(code),
                    "Expected the last row unmodified"
                );
            }
        }

        #[test]
        fn exact_keys_return_their_row() {
            let table = VoiceParamTable::new(&CALIBRATED).unwrap();
            for entry in CALIBRATED {
                assert_eq!(
                    entry.params(),
                    table.resolve(entry.input_code),
                    "Expected left but got right"
                );
            }
        }

        #[test]
        fn matches_linear_scan_for_every_code() {
            let table = VoiceParamTable::new(&CALIBRATED).unwrap();
            for code in 0..=4095 {
                assert_eq!(
                    linear_reference(&CALIBRATED, code),
                    table.resolve(code),
                    "Binary search and linear scan disagree at code {}",
                    code
                );
            }
        }

        #[test]
        fn follows_table_direction() {
            let table = VoiceParamTable::new(&CALIBRATED).unwrap();
            let mut previous = table.resolve(0);
            for code in 1..=4095 {
                let current = table.resolve(code);
                assert!(
                    current.dac_code >= previous.dac_code,
                    "DAC code should never fall as the CV rises (code {})",
                    code
                );
                assert!(
                    current.period <= previous.period,
                    "Period should never grow as the CV rises (code {})",
                    code
                );
                previous = current;
            }
        }
    }
}
