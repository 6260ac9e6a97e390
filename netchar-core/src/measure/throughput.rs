use anyhow::{bail, ensure};
use logos::{Lexer, Logos};
use std::{fmt, str::FromStr};

/// A throughput value, stored in megabits per second.
///
/// This is the unit every capacity and allocation in the control plane
/// is expressed in. A zero throughput means "unset": use
/// [`Throughput::or`] to substitute a default where one applies.
///
/// # Example
///
/// ```
/// use netchar_core::measure::Throughput;
///
/// let bw: Throughput = "200mbps".parse().unwrap();
/// assert_eq!(bw.mbps(), 200.0);
///
/// // a bare number is read as Mbps
/// let bare: Throughput = "200".parse().unwrap();
/// assert_eq!(bare, bw);
/// ```
///
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Throughput(f64);

impl Throughput {
    /// The `0` throughput, i.e. unset.
    pub const ZERO: Self = Self(0.0);

    /// create a new [`Throughput`] from a value in megabits per second
    #[inline(always)]
    pub const fn from_mbps(mbps: f64) -> Self {
        Self(mbps)
    }

    /// the value in megabits per second
    #[inline(always)]
    pub const fn mbps(self) -> f64 {
        self.0
    }

    /// Returns `true` when no meaningful value has been configured.
    pub fn is_unset(self) -> bool {
        self.0 <= 0.0
    }

    /// Returns `self`, or `fallback` when unset.
    ///
    /// ```
    /// # use netchar_core::measure::Throughput;
    /// let fallback = Throughput::from_mbps(1000.0);
    /// assert_eq!(Throughput::ZERO.or(fallback), fallback);
    /// assert_eq!(Throughput::from_mbps(50.0).or(fallback).mbps(), 50.0);
    /// ```
    pub fn or(self, fallback: Self) -> Self {
        if self.is_unset() { fallback } else { self }
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mbps = self.0;
        if mbps == 0.0 {
            write!(f, "0mbps")
        } else if mbps >= 1_000.0 && mbps % 1_000.0 == 0.0 {
            write!(f, "{}gbps", mbps / 1_000.0)
        } else if mbps < 1.0 {
            write!(f, "{}kbps", mbps * 1_000.0)
        } else {
            write!(f, "{mbps}mbps")
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum ThroughputToken {
    #[regex("kbps")]
    Kbps,
    #[regex("mbps")]
    Mbps,
    #[regex("gbps")]
    Gbps,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Value,
}

impl FromStr for Throughput {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, ThroughputToken>::new(s);

        let Some(Ok(ThroughputToken::Value)) = lex.next() else {
            bail!("Expecting to parse a number")
        };
        let number: f64 = lex.slice().parse()?;
        let mbps = match lex.next() {
            None => number,
            Some(Ok(ThroughputToken::Kbps)) => number / 1_000.0,
            Some(Ok(ThroughputToken::Mbps)) => number,
            Some(Ok(ThroughputToken::Gbps)) => number * 1_000.0,
            Some(_) => bail!("Expecting to parse a unit (kbps, mbps, gbps)"),
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a throughput"
        );

        Ok(Self(mbps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_throughput() {
        macro_rules! assert_throughput {
            ($string:literal == $mbps:expr) => {
                assert_eq!(
                    $string.parse::<Throughput>().unwrap(),
                    Throughput::from_mbps($mbps)
                );
            };
        }

        assert_throughput!("0" == 0.0);
        assert_throughput!("42" == 42.0);
        assert_throughput!("0.3" == 0.3);
        assert_throughput!("42mbps" == 42.0);
        assert_throughput!("500kbps" == 0.5);
        assert_throughput!("1gbps" == 1_000.0);
        assert_throughput!("1.5gbps" == 1_500.0);
        assert_throughput!("42 mbps" == 42.0);
    }

    #[test]
    fn print_throughput() {
        assert_eq!(Throughput::ZERO.to_string(), "0mbps");
        assert_eq!(Throughput::from_mbps(42.0).to_string(), "42mbps");
        assert_eq!(Throughput::from_mbps(0.5).to_string(), "500kbps");
        assert_eq!(Throughput::from_mbps(1_000.0).to_string(), "1gbps");
        assert_eq!(Throughput::from_mbps(2_500.0).to_string(), "2500mbps");
    }

    #[test]
    fn display_round_trip() {
        for mbps in [0.5, 20.0, 200.0, 1_000.0, 2_500.0] {
            let original = Throughput::from_mbps(mbps);
            let parsed: Throughput = original.to_string().parse().unwrap();
            assert_eq!(original, parsed);
        }
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("mbps".parse::<Throughput>().is_err()); // no number
        assert!("".parse::<Throughput>().is_err()); // empty
        assert!("42mbps extra".parse::<Throughput>().is_err()); // trailing token
        assert!("42tbps".parse::<Throughput>().is_err()); // unknown unit
    }

    #[test]
    fn unset_fallback() {
        let fallback = Throughput::from_mbps(1000.0);
        assert_eq!(Throughput::ZERO.or(fallback), fallback);
        assert_eq!(Throughput::from_mbps(-1.0).or(fallback), fallback);
        assert_eq!(
            Throughput::from_mbps(20.0).or(fallback),
            Throughput::from_mbps(20.0)
        );
    }
}
