//! Transit systems and the line colors each one understands

use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Transit system the indicator follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitSystem {
    /// Chicago Transit Authority
    Cta,
    /// Massachusetts Bay Transportation Authority
    Mbta,
}

impl TransitSystem {
    pub const ALL: [TransitSystem; 2] = [TransitSystem::Cta, TransitSystem::Mbta];

    /// Wire token, e.g. `cta`
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitSystem::Cta => "cta",
            TransitSystem::Mbta => "mbta",
        }
    }

    /// Colors this system's firmware table knows about, with display labels
    pub fn colors(&self) -> &'static [(LineColor, &'static str)] {
        match self {
            TransitSystem::Cta => &[
                (LineColor::Pink, "Pink"),
                (LineColor::Red, "Red"),
                (LineColor::Orange, "Orange"),
                (LineColor::Green1, "South Green"),
                (LineColor::Green2, "West Green"),
                (LineColor::Blue, "Blue"),
                (LineColor::Brown, "Brown/Purple"),
            ],
            TransitSystem::Mbta => &[
                (LineColor::Red, "Red"),
                (LineColor::Orange, "Orange"),
                (LineColor::Green1, "Green Main"),
                (LineColor::Green2, "Green E"),
                (LineColor::Blue, "Blue"),
            ],
        }
    }

    pub fn supports(&self, color: LineColor) -> bool {
        self.colors().iter().any(|(c, _)| *c == color)
    }
}

impl fmt::Display for TransitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitSystem {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransitSystem::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownTransitSystem(s.to_string()))
    }
}

/// Line color token. Tokens are case-sensitive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineColor {
    Pink,
    Red,
    Orange,
    Green1,
    Green2,
    Blue,
    Brown,
}

impl LineColor {
    pub const ALL: [LineColor; 7] = [
        LineColor::Pink,
        LineColor::Red,
        LineColor::Orange,
        LineColor::Green1,
        LineColor::Green2,
        LineColor::Blue,
        LineColor::Brown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LineColor::Pink => "pink",
            LineColor::Red => "red",
            LineColor::Orange => "orange",
            LineColor::Green1 => "green1",
            LineColor::Green2 => "green2",
            LineColor::Blue => "blue",
            LineColor::Brown => "brown",
        }
    }
}

impl fmt::Display for LineColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineColor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LineColor::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownColor(s.to_string()))
    }
}
