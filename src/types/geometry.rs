//! Viewport and element geometry.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Size of the browser viewport the page was laid out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

impl Viewport {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The viewport as a rectangle anchored at the origin.
    pub fn bounds(&self) -> Rect {
        Rect {
            x: 0.0,
            y: 0.0,
            width: self.width as f64,
            height: self.height as f64,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1440x900)")]
    InvalidFormat,
    #[error("Invalid {axis}: {value}")]
    InvalidDimension { axis: &'static str, value: String },
    #[error("Viewport {0} must be positive")]
    Zero(&'static str),
}

fn parse_dimension(axis: &'static str, raw: &str) -> Result<u32, ViewportParseError> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ViewportParseError::InvalidDimension {
            axis,
            value: raw.to_string(),
        })?;
    if value == 0 {
        return Err(ViewportParseError::Zero(axis));
    }
    Ok(value)
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if height.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }
        Ok(Viewport {
            width: parse_dimension("width", width)?,
            height: parse_dimension("height", height)?,
        })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Border box of an element in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Area of the overlap between two rectangles; zero when they are disjoint.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return 0.0;
        }
        (right - left) * (bottom - top)
    }
}
