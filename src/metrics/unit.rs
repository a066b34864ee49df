//! # Metric units and normalization.
//!
//! [`Unit`] is the closed set of units a metric may carry. Before export every
//! value is normalized to the smallest canonical unit of its family so that
//! values from different operations compare directly:
//!
//! ```text
//! time   : Seconds, Milliseconds         → Microseconds
//! size   : Kilo/Mega/Giga/Terabytes      → Bytes      (×1024 steps)
//!          Kilo/Mega/Giga/Terabits       → Bits       (×1024 steps)
//! rate   : <size>/Second                 → Bytes/Second, Bits/Second
//! other  : Count, Percent, Count/Second, None (unchanged)
//! ```

use std::fmt;

const KI: f64 = 1024.0;

/// Unit of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    BytesPerSecond,
    KilobytesPerSecond,
    MegabytesPerSecond,
    GigabytesPerSecond,
    TerabytesPerSecond,
    BitsPerSecond,
    KilobitsPerSecond,
    MegabitsPerSecond,
    GigabitsPerSecond,
    TerabitsPerSecond,
    CountPerSecond,
    /// Sentinel for "no unit", also returned for absent metrics.
    #[default]
    None,
}

impl Unit {
    /// Returns the display name (`"Bytes/Second"` style).
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Seconds => "Seconds",
            Unit::Microseconds => "Microseconds",
            Unit::Milliseconds => "Milliseconds",
            Unit::Bytes => "Bytes",
            Unit::Kilobytes => "Kilobytes",
            Unit::Megabytes => "Megabytes",
            Unit::Gigabytes => "Gigabytes",
            Unit::Terabytes => "Terabytes",
            Unit::Bits => "Bits",
            Unit::Kilobits => "Kilobits",
            Unit::Megabits => "Megabits",
            Unit::Gigabits => "Gigabits",
            Unit::Terabits => "Terabits",
            Unit::Percent => "Percent",
            Unit::Count => "Count",
            Unit::BytesPerSecond => "Bytes/Second",
            Unit::KilobytesPerSecond => "Kilobytes/Second",
            Unit::MegabytesPerSecond => "Megabytes/Second",
            Unit::GigabytesPerSecond => "Gigabytes/Second",
            Unit::TerabytesPerSecond => "Terabytes/Second",
            Unit::BitsPerSecond => "Bits/Second",
            Unit::KilobitsPerSecond => "Kilobits/Second",
            Unit::MegabitsPerSecond => "Megabits/Second",
            Unit::GigabitsPerSecond => "Gigabits/Second",
            Unit::TerabitsPerSecond => "Terabits/Second",
            Unit::CountPerSecond => "Count/Second",
            Unit::None => "None",
        }
    }

    /// Returns the snake-case export name: `/` becomes `_per_`, words are
    /// lowercased (`"Bytes/Second"` → `"bytes_per_second"`).
    pub fn snake_name(self) -> String {
        self.as_str().to_lowercase().replace('/', "_per_")
    }

    /// Returns `(multiplier, canonical unit)` for this unit.
    fn canonical(self) -> (f64, Unit) {
        match self {
            Unit::Seconds => (1e6, Unit::Microseconds),
            Unit::Milliseconds => (1e3, Unit::Microseconds),
            Unit::Microseconds => (1.0, Unit::Microseconds),

            Unit::Bytes => (1.0, Unit::Bytes),
            Unit::Kilobytes => (KI, Unit::Bytes),
            Unit::Megabytes => (KI * KI, Unit::Bytes),
            Unit::Gigabytes => (KI * KI * KI, Unit::Bytes),
            Unit::Terabytes => (KI * KI * KI * KI, Unit::Bytes),

            Unit::Bits => (1.0, Unit::Bits),
            Unit::Kilobits => (KI, Unit::Bits),
            Unit::Megabits => (KI * KI, Unit::Bits),
            Unit::Gigabits => (KI * KI * KI, Unit::Bits),
            Unit::Terabits => (KI * KI * KI * KI, Unit::Bits),

            Unit::BytesPerSecond => (1.0, Unit::BytesPerSecond),
            Unit::KilobytesPerSecond => (KI, Unit::BytesPerSecond),
            Unit::MegabytesPerSecond => (KI * KI, Unit::BytesPerSecond),
            Unit::GigabytesPerSecond => (KI * KI * KI, Unit::BytesPerSecond),
            Unit::TerabytesPerSecond => (KI * KI * KI * KI, Unit::BytesPerSecond),

            Unit::BitsPerSecond => (1.0, Unit::BitsPerSecond),
            Unit::KilobitsPerSecond => (KI, Unit::BitsPerSecond),
            Unit::MegabitsPerSecond => (KI * KI, Unit::BitsPerSecond),
            Unit::GigabitsPerSecond => (KI * KI * KI, Unit::BitsPerSecond),
            Unit::TerabitsPerSecond => (KI * KI * KI * KI, Unit::BitsPerSecond),

            Unit::Percent => (1.0, Unit::Percent),
            Unit::Count => (1.0, Unit::Count),
            Unit::CountPerSecond => (1.0, Unit::CountPerSecond),
            Unit::None => (1.0, Unit::None),
        }
    }

    /// Converts `value` expressed in `self` into the canonical unit.
    pub fn normalize(self, value: f64) -> (f64, Unit) {
        let (mul, unit) = self.canonical();
        (value * mul, unit)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
