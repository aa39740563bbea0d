//! Color types and utilities

use serde::{Deserialize, Serialize};

/// RGBA color with f32 components (0.0 to 1.0), not premultiplied
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Create from u8 components (0-255)
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Create from hex value (0xRRGGBB or 0xRRGGBBAA)
    pub fn from_hex(hex: u32) -> Self {
        if hex > 0xFFFFFF {
            Self::from_rgba8(
                ((hex >> 24) & 0xFF) as u8,
                ((hex >> 16) & 0xFF) as u8,
                ((hex >> 8) & 0xFF) as u8,
                (hex & 0xFF) as u8,
            )
        } else {
            Self::from_rgba8(
                ((hex >> 16) & 0xFF) as u8,
                ((hex >> 8) & 0xFF) as u8,
                (hex & 0xFF) as u8,
                255,
            )
        }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or a basic color keyword
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            let digits = match hex.len() {
                3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
                6 | 8 => hex.to_string(),
                _ => return None,
            };
            let n = u32::from_str_radix(&digits, 16).ok()?;
            return Some(if digits.len() == 8 {
                Self::from_rgba8((n >> 24) as u8, (n >> 16) as u8, (n >> 8) as u8, n as u8)
            } else {
                Self::from_rgba8((n >> 16) as u8, (n >> 8) as u8, n as u8, 255)
            });
        }
        match value.to_ascii_lowercase().as_str() {
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            "red" => Some(Self::RED),
            "lime" => Some(Self::GREEN),
            "green" => Some(Self::from_rgba8(0, 128, 0, 255)),
            "blue" => Some(Self::BLUE),
            "yellow" => Some(Self::rgb(1.0, 1.0, 0.0)),
            "gray" | "grey" => Some(Self::from_rgba8(128, 128, 128, 255)),
            "transparent" => Some(Self::TRANSPARENT),
            _ => None,
        }
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { a: alpha, ..self }
    }

    /// Multiply alpha, clamping to [0, 1]
    pub fn fade(self, factor: f32) -> Self {
        Self {
            a: (self.a * factor).clamp(0.0, 1.0),
            ..self
        }
    }

    /// ITU-R luminance of the color channels
    pub fn luminance(&self) -> f32 {
        0.2125 * self.r + 0.7154 * self.g + 0.0721 * self.b
    }

    /// Convert to u8 components (0-255)
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.a.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Color::parse("#f00"), Some(Color::RED));
        assert_eq!(Color::parse("#0000ff"), Some(Color::BLUE));
        assert_eq!(Color::parse("#00000080").unwrap().to_rgba8()[3], 128);
        assert_eq!(Color::parse("#12345"), None);
    }

    #[test]
    fn test_luminance_weights_sum_to_one() {
        assert!((Color::WHITE.luminance() - 1.0).abs() < 1e-6);
    }
}
