//! Default calibration data.
//!
//! A nominal table, not measurements from any unit: for each Castor CV code, the oscillator period (1 MHz timer ticks)
//! of an ideal exponential response across six octaves up from C1, and an estimated DAC code for the ramp amplitude.
//! A unit tuned by hand will drift from it.

use gemini_lib::voice_params::VoiceParamTableEntry;

pub static FACTORY_TABLE: [VoiceParamTableEntry; 17] = [
    VoiceParamTableEntry::new(0, 181, 30578),
    VoiceParamTableEntry::new(256, 198, 23578),
    VoiceParamTableEntry::new(512, 222, 18180),
    VoiceParamTableEntry::new(768, 252, 14018),
    VoiceParamTableEntry::new(1024, 291, 10808),
    VoiceParamTableEntry::new(1280, 342, 8334),
    VoiceParamTableEntry::new(1536, 408, 6426),
    VoiceParamTableEntry::new(1792, 493, 4955),
    VoiceParamTableEntry::new(2048, 604, 3820),
    VoiceParamTableEntry::new(2304, 748, 2946),
    VoiceParamTableEntry::new(2560, 935, 2271),
    VoiceParamTableEntry::new(2816, 1176, 1751),
    VoiceParamTableEntry::new(3072, 1490, 1350),
    VoiceParamTableEntry::new(3328, 1897, 1041),
    VoiceParamTableEntry::new(3584, 2424, 803),
    VoiceParamTableEntry::new(3840, 3109, 619),
    VoiceParamTableEntry::new(4095, 3992, 478),
];
