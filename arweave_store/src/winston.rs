use std::{fmt, str::FromStr};

/// Winston per AR.
pub const WINSTON_PER_AR: u128 = 1_000_000_000_000;
const AR_DECIMALS: usize = 12;

/// An amount of the storage network's smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Winston(pub u128);

impl Winston {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Decimal AR amount with up to 12 fractional digits and no trailing
    /// zeros, e.g. `123` winston is `0.000000000123`.
    pub fn to_ar_string(&self) -> String {
        let whole = self.0 / WINSTON_PER_AR;
        let fraction = self.0 % WINSTON_PER_AR;
        if fraction == 0 {
            return whole.to_string();
        }
        let fraction = format!("{:0width$}", fraction, width = AR_DECIMALS);
        format!("{}.{}", whole, fraction.trim_end_matches('0'))
    }
}

impl fmt::Display for Winston {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Winston {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Winston)
    }
}
