//! Centralized tuning constants for Waypoint progression logic.
//!
//! These values define the deterministic math for the XP curve and the
//! defaults applied while normalizing journey definitions. Keeping them
//! together ensures the curve can only be adjusted via reviewed code
//! changes, rather than through journey JSON.

// Level curve ---------------------------------------------------------------
/// XP cost grows by this step per level: `bounds(L) = STEP·(L−1)·L`.
pub(crate) const LEVEL_XP_STEP: f64 = 0.75;
/// Numerator of the inverse-curve factor (`16/3` applied to XP).
pub(crate) const LEVEL_CURVE_NUMERATOR: f64 = 16.0;
/// Denominator of the inverse-curve factor.
pub(crate) const LEVEL_CURVE_DENOMINATOR: f64 = 3.0;
pub(crate) const MIN_LEVEL: u32 = 1;

// Challenge weights ---------------------------------------------------------
pub(crate) const WEIGHT_EASY: f64 = 1.0;
pub(crate) const WEIGHT_MEDIUM: f64 = 2.0;
pub(crate) const WEIGHT_HARD: f64 = 3.0;
pub(crate) const WEIGHT_EXTREME: f64 = 4.0;

// Normalization defaults ----------------------------------------------------
pub(crate) const DEFAULT_REQUIRED_LEVEL: u32 = 1;
pub(crate) const DEFAULT_CHALLENGE_TITLE: &str = "Challenge";
/// Timezone assigned to freshly registered users.
pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";
/// Appended to the title of an official journey copied for editing.
pub const PERSONAL_COPY_SUFFIX: &str = " (My Version)";
/// Top-level keys a complete journey document carries.
pub(crate) const JOURNEY_REQUIRED_FIELDS: [&str; 7] = [
    "title",
    "description",
    "image",
    "intro_text",
    "failure_text",
    "success_text",
    "chapters",
];

// Log targets ---------------------------------------------------------------
pub(crate) const LOG_CATALOG: &str = "waypoint::catalog";
pub(crate) const LOG_ACCESS: &str = "waypoint::access";
pub(crate) const LOG_PROGRESSION: &str = "waypoint::progression";
