use serde::{Deserialize, Serialize};

use crate::TileValue;

/// Presentation data derived purely from a tile's magnitude.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileStyle {
    pub bg: &'static str,
    pub text: &'static str,
    pub label: &'static str,
}

const EMPTY_STYLE: TileStyle = TileStyle {
    bg: "#030303",
    text: "#000",
    label: "",
};

/// Everything at or past the last bracket shares this terminal style.
const OVERFLOW_STYLE: TileStyle = TileStyle {
    bg: "#030303",
    text: "#ffffff",
    label: "",
};

/// Exclusive upper bounds, ascending. A non-empty value falls into the
/// first bracket whose bound exceeds it, so odd or negative values (out
/// of contract, but the function stays total) land in the lowest bracket.
const BRACKETS: &[(TileValue, TileStyle)] = &[
    (4, TileStyle { bg: "#776e65", text: "#000", label: "2" }),
    (8, TileStyle { bg: "#eee4da", text: "#000", label: "4" }),
    (16, TileStyle { bg: "#ede0c8", text: "#000", label: "8" }),
    (32, TileStyle { bg: "#f2b179", text: "#000", label: "16" }),
    (64, TileStyle { bg: "#f59563", text: "#000", label: "32" }),
    (128, TileStyle { bg: "#f67c5f", text: "#000", label: "64" }),
    (256, TileStyle { bg: "#f65e3b", text: "#000", label: "128" }),
    (512, TileStyle { bg: "#edcf72", text: "#000", label: "256" }),
    (1024, TileStyle { bg: "#edcc61", text: "#000", label: "512" }),
    (2048, TileStyle { bg: "#edc850", text: "#000", label: "1024" }),
    (4096, TileStyle { bg: "#e8b026", text: "#000", label: "2048" }),
    (8192, TileStyle { bg: "#a86ae4", text: "#000", label: "4096" }),
    (16384, TileStyle { bg: "#6b4fc4", text: "#ffffff", label: "8192" }),
    (32768, TileStyle { bg: "#3c3a32", text: "#ffffff", label: "16k" }),
    (65536, TileStyle { bg: "#2b2b2b", text: "#ffffff", label: "32k" }),
    (131072, TileStyle { bg: "#1e1b2e", text: "#ffffff", label: "64k" }),
    (262144, TileStyle { bg: "#291b1b", text: "#ffffff", label: "128k" }),
    (524288, TileStyle { bg: "#1e2d1e", text: "#ffffff", label: "256k" }),
    (1048576, TileStyle { bg: "#2e1e2d", text: "#ffffff", label: "512k" }),
    (2097152, TileStyle { bg: "#1c1c2e", text: "#ffffff", label: "1M" }),
    (4194304, TileStyle { bg: "#2e2c1c", text: "#ffffff", label: "2M" }),
    (8388608, TileStyle { bg: "#1f1f1f", text: "#ffffff", label: "4M" }),
    (16777216, TileStyle { bg: "#181818", text: "#ffffff", label: "8M" }),
    (33554432, TileStyle { bg: "#141414", text: "#ffffff", label: "16M" }),
    (67108864, TileStyle { bg: "#101010", text: "#ffffff", label: "32M" }),
    (134217728, TileStyle { bg: "#0d0d0d", text: "#ffffff", label: "64M" }),
    (268435456, TileStyle { bg: "#0a0a0a", text: "#ffffff", label: "128M" }),
    (536870912, TileStyle { bg: "#070707", text: "#ffffff", label: "256M" }),
    (1073741824, TileStyle { bg: "#050505", text: "#ffffff", label: "512M" }),
];

/// One board cell. Plain magnitude with no identity of its own; two tiles
/// of equal value are interchangeable. Serializes as the bare number.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tile(TileValue);

impl Tile {
    pub const fn new(value: TileValue) -> Self {
        Self(value)
    }

    pub const fn value(self) -> TileValue {
        self.0
    }

    pub fn set_value(&mut self, value: TileValue) {
        self.0 = value;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn style(self) -> &'static TileStyle {
        if self.0 == 0 {
            return &EMPTY_STYLE;
        }
        BRACKETS
            .iter()
            .find(|(upper, _)| self.0 < *upper)
            .map(|(_, style)| style)
            .unwrap_or(&OVERFLOW_STYLE)
    }

    /// Abbreviated display label, empty for an empty cell.
    pub fn label(self) -> &'static str {
        self.style().label
    }
}
