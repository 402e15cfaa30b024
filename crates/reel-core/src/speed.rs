//! Playback speed as an exact rational.
//!
//! NTSC rates are not integers (23.976 is really `24000/1001`), so a speed
//! is kept as `num/den` and compared exactly. [`Fps`] lists the common
//! presets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frames per second as `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Speed {
    /// Numerator.
    pub num: u32,
    /// Denominator.
    pub den: u32,
}

impl Speed {
    /// Creates a speed.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// `num > 0 && den > 0`.
    pub const fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// Frames per second, 0 when invalid.
    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Maps a float rate onto the nearest preset within 0.001, or onto
    /// `round(fps * 1000) / 1000`.
    pub fn from_fps(fps: f32) -> Self {
        Fps::ALL
            .iter()
            .map(|p| p.speed())
            .find(|s| (s.to_f64() - fps as f64).abs() < 0.001)
            .unwrap_or_else(|| Self::new((fps.max(0.0) * 1000.0).round() as u32, 1000))
    }

    /// The preset this speed equals, if any.
    pub fn preset(&self) -> Option<Fps> {
        Fps::ALL.iter().copied().find(|p| p.speed() == *self)
    }
}

impl Default for Speed {
    fn default() -> Self {
        Fps::default().speed()
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Speed {
    type Err = Error;

    /// Accepts `"24000/1001"` or a float rate such as `"23.976"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || Error::invalid_argument(format!("bad speed '{s}'"));
        if let Some((n, d)) = s.split_once('/') {
            let num = n.trim().parse().map_err(|_| bad())?;
            let den = d.trim().parse().map_err(|_| bad())?;
            return Ok(Self::new(num, den));
        }
        let fps: f32 = s.parse().map_err(|_| bad())?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(bad());
        }
        Ok(Self::from_fps(fps))
    }
}

/// Standard frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Fps {
    /// 1
    Fps1,
    /// 3
    Fps3,
    /// 6
    Fps6,
    /// 12
    Fps12,
    /// 15
    Fps15,
    /// 16
    Fps16,
    /// 18
    Fps18,
    /// 24000/1001
    Fps23_976,
    /// 24
    #[default]
    Fps24,
    /// 25
    Fps25,
    /// 30000/1001
    Fps29_97,
    /// 30
    Fps30,
    /// 50
    Fps50,
    /// 60000/1001
    Fps59_94,
    /// 60
    Fps60,
    /// 120
    Fps120,
}

impl Fps {
    /// Every preset, slowest first.
    pub const ALL: [Fps; 16] = [
        Self::Fps1,
        Self::Fps3,
        Self::Fps6,
        Self::Fps12,
        Self::Fps15,
        Self::Fps16,
        Self::Fps18,
        Self::Fps23_976,
        Self::Fps24,
        Self::Fps25,
        Self::Fps29_97,
        Self::Fps30,
        Self::Fps50,
        Self::Fps59_94,
        Self::Fps60,
        Self::Fps120,
    ];

    /// Exact speed of the preset.
    pub const fn speed(&self) -> Speed {
        match self {
            Self::Fps1 => Speed::new(1, 1),
            Self::Fps3 => Speed::new(3, 1),
            Self::Fps6 => Speed::new(6, 1),
            Self::Fps12 => Speed::new(12, 1),
            Self::Fps15 => Speed::new(15, 1),
            Self::Fps16 => Speed::new(16, 1),
            Self::Fps18 => Speed::new(18, 1),
            Self::Fps23_976 => Speed::new(24000, 1001),
            Self::Fps24 => Speed::new(24, 1),
            Self::Fps25 => Speed::new(25, 1),
            Self::Fps29_97 => Speed::new(30000, 1001),
            Self::Fps30 => Speed::new(30, 1),
            Self::Fps50 => Speed::new(50, 1),
            Self::Fps59_94 => Speed::new(60000, 1001),
            Self::Fps60 => Speed::new(60, 1),
            Self::Fps120 => Speed::new(120, 1),
        }
    }

    /// Display label, e.g. `"29.97"`.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Fps1 => "1",
            Self::Fps3 => "3",
            Self::Fps6 => "6",
            Self::Fps12 => "12",
            Self::Fps15 => "15",
            Self::Fps16 => "16",
            Self::Fps18 => "18",
            Self::Fps23_976 => "23.976",
            Self::Fps24 => "24",
            Self::Fps25 => "25",
            Self::Fps29_97 => "29.97",
            Self::Fps30 => "30",
            Self::Fps50 => "50",
            Self::Fps59_94 => "59.94",
            Self::Fps60 => "60",
            Self::Fps120 => "120",
        }
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Fps> for Speed {
    fn from(fps: Fps) -> Self {
        fps.speed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_24() {
        assert_eq!(Speed::default(), Speed::new(24, 1));
    }

    #[test]
    fn test_exact_equality() {
        assert_ne!(Speed::new(24000, 1001), Speed::new(23976, 1000));
        assert_eq!(Fps::Fps29_97.speed(), Speed::new(30000, 1001));
    }

    #[test]
    fn test_from_fps() {
        assert_eq!(Speed::from_fps(23.976), Speed::new(24000, 1001));
        assert_eq!(Speed::from_fps(25.0), Speed::new(25, 1));
        assert_eq!(Speed::from_fps(59.94), Speed::new(60000, 1001));
        assert_eq!(Speed::from_fps(48.0), Speed::new(48000, 1000));
    }

    #[test]
    fn test_presets_round_trip() {
        for p in Fps::ALL {
            assert_eq!(Speed::from_fps(p.speed().to_f64() as f32), p.speed(), "{p}");
            assert_eq!(p.speed().preset(), Some(p));
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("24000/1001".parse::<Speed>().unwrap(), Speed::new(24000, 1001));
        assert_eq!("29.97".parse::<Speed>().unwrap(), Speed::new(30000, 1001));
        assert!("abc".parse::<Speed>().is_err());
        assert!("-5".parse::<Speed>().is_err());
        assert_eq!(Speed::new(24000, 1001).to_string(), "24000/1001");
    }

    #[test]
    fn test_validity() {
        assert!(Speed::new(24, 1).is_valid());
        assert!(!Speed::new(0, 1).is_valid());
        assert!(!Speed::new(24, 0).is_valid());
        assert_eq!(Speed::new(24, 0).to_f64(), 0.0);
    }
}
