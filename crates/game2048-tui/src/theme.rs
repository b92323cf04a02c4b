use crossterm::style::Color;

/// Color theme for the TUI
#[derive(Debug, Clone)]
pub struct Theme {
    pub bg: Color,
    /// Default text color
    pub fg: Color,
    /// Grid border color
    pub border: Color,
    /// Empty cell background
    pub empty_bg: Color,
    /// Cell under the swap cursor
    pub cursor_bg: Color,
    /// First cell picked in swap mode
    pub selected_bg: Color,
    /// Cells that merged or spawned on the last move
    pub flash_bg: Color,
    pub error: Color,
    pub success: Color,
    /// Score/info text color
    pub info: Color,
    /// Key binding text color
    pub key: Color,
    /// Tile backgrounds for 2, 4, 8 ... 2048; bigger tiles reuse the last
    pub tiles: [Color; 11],
    /// Text on light tiles (2 and 4)
    pub tile_dark_fg: Color,
    /// Text on everything else
    pub tile_light_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb { r, g, b }
}

/// The classic tile palette
const CLASSIC_TILES: [Color; 11] = [
    rgb(238, 228, 218),
    rgb(237, 224, 200),
    rgb(242, 177, 121),
    rgb(245, 149, 99),
    rgb(246, 124, 95),
    rgb(246, 94, 59),
    rgb(237, 207, 114),
    rgb(237, 204, 97),
    rgb(237, 200, 80),
    rgb(237, 197, 63),
    rgb(237, 194, 46),
];

impl Theme {
    pub fn dark() -> Self {
        Self {
            bg: rgb(20, 22, 30),
            fg: rgb(230, 230, 240),
            border: rgb(70, 75, 90),
            empty_bg: rgb(45, 48, 60),
            cursor_bg: rgb(70, 90, 140),
            selected_bg: rgb(120, 90, 160),
            flash_bg: rgb(255, 255, 255),
            error: rgb(255, 90, 90),
            success: rgb(90, 255, 130),
            info: rgb(160, 165, 185),
            key: rgb(255, 210, 100),
            tiles: CLASSIC_TILES,
            tile_dark_fg: rgb(119, 110, 101),
            tile_light_fg: rgb(249, 246, 242),
        }
    }

    pub fn light() -> Self {
        Self {
            bg: rgb(250, 248, 239),
            fg: rgb(119, 110, 101),
            border: rgb(187, 173, 160),
            empty_bg: rgb(205, 193, 180),
            cursor_bg: rgb(180, 200, 255),
            selected_bg: rgb(200, 170, 230),
            flash_bg: rgb(255, 255, 200),
            error: rgb(220, 50, 50),
            success: rgb(40, 160, 60),
            info: rgb(90, 90, 110),
            key: rgb(200, 120, 20),
            tiles: CLASSIC_TILES,
            tile_dark_fg: rgb(119, 110, 101),
            tile_light_fg: rgb(249, 246, 242),
        }
    }

    /// High contrast theme
    pub fn high_contrast() -> Self {
        Self {
            bg: Color::Black,
            fg: Color::White,
            border: Color::Grey,
            empty_bg: rgb(30, 30, 30),
            cursor_bg: Color::Blue,
            selected_bg: Color::Magenta,
            flash_bg: Color::White,
            error: Color::Red,
            success: Color::Green,
            info: Color::Grey,
            key: Color::Yellow,
            tiles: [
                Color::White,
                Color::Grey,
                Color::Yellow,
                Color::DarkYellow,
                Color::Red,
                Color::DarkRed,
                Color::Cyan,
                Color::DarkCyan,
                Color::Green,
                Color::DarkGreen,
                Color::Magenta,
            ],
            tile_dark_fg: Color::Black,
            tile_light_fg: Color::Black,
        }
    }

    /// Background and text color for a tile value
    pub fn tile_colors(&self, value: u32) -> (Color, Color) {
        if value == 0 {
            return (self.empty_bg, self.info);
        }
        let idx = (value.trailing_zeros().max(1) as usize - 1).min(self.tiles.len() - 1);
        let fg = if value <= 4 {
            self.tile_dark_fg
        } else {
            self.tile_light_fg
        };
        (self.tiles[idx], fg)
    }

    pub const COUNT: usize = 3;

    /// Theme `idx` in cycle order, wrapping
    pub fn by_index(idx: usize) -> Self {
        match idx % Self::COUNT {
            0 => Self::dark(),
            1 => Self::light(),
            _ => Self::high_contrast(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_colors() {
        let theme = Theme::dark();
        assert_eq!(theme.tile_colors(2).0, CLASSIC_TILES[0]);
        assert_eq!(theme.tile_colors(2048).0, CLASSIC_TILES[10]);
        assert_eq!(theme.tile_colors(8192).0, CLASSIC_TILES[10]);
        assert_eq!(theme.tile_colors(4).1, theme.tile_dark_fg);
        assert_eq!(theme.tile_colors(8).1, theme.tile_light_fg);
        assert_eq!(theme.tile_colors(0).0, theme.empty_bg);
    }
}
