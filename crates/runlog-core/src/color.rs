//! Text colors for console lines

use std::fmt;

/// An HTML color applied to a console line or progress bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextColor(&'static str);

impl TextColor {
    pub const BLACK: TextColor = TextColor("#000000");
    pub const DARK_BLUE: TextColor = TextColor("#000080");
    pub const DARK_GREEN: TextColor = TextColor("#008000");
    /// Dark blue-green
    pub const DARK_CYAN: TextColor = TextColor("#008080");
    pub const DARK_RED: TextColor = TextColor("#800000");
    /// Dark purplish-red
    pub const DARK_MAGENTA: TextColor = TextColor("#800080");
    /// Ochre
    pub const DARK_YELLOW: TextColor = TextColor("#808000");
    pub const GRAY: TextColor = TextColor("#c0c0c0");
    pub const DARK_GRAY: TextColor = TextColor("#808080");
    pub const BLUE: TextColor = TextColor("#0000ff");
    pub const GREEN: TextColor = TextColor("#00ff00");
    pub const CYAN: TextColor = TextColor("#00ffff");
    pub const RED: TextColor = TextColor("#ff0000");
    pub const MAGENTA: TextColor = TextColor("#ff00ff");
    pub const YELLOW: TextColor = TextColor("#ffff00");
    pub const WHITE: TextColor = TextColor("#ffffff");

    /// The HTML color string
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TextColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<TextColor> for String {
    fn from(color: TextColor) -> Self {
        color.0.to_string()
    }
}
