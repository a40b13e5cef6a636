//! Cross-platform console symbols
//!
//! ASCII fallbacks on Windows consoles.

/// Checkmark symbol
#[cfg(windows)]
pub const CHECK: &str = "[OK]";
#[cfg(not(windows))]
pub const CHECK: &str = "\u{2713}"; // ✓

/// Cross/error symbol
#[cfg(windows)]
pub const CROSS: &str = "[X]";
#[cfg(not(windows))]
pub const CROSS: &str = "\u{2717}"; // ✗

/// Warning symbol
#[cfg(windows)]
pub const WARN: &str = "[!]";
#[cfg(not(windows))]
pub const WARN: &str = "!";

/// Arrow used in violation listings
#[cfg(windows)]
pub const ARROW: &str = "->";
#[cfg(not(windows))]
pub const ARROW: &str = "\u{2192}"; // →
