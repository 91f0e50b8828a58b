//! Device variants: the firmware-name-driven selection of which action set and behavior a
//! connected device gets beyond the generic Firmata baseline.

pub mod led_controller;

use std::fmt::{Display, Formatter};

/// Which variant a device's firmware identifies it as.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum Variant {
    #[default]
    Generic,
    LedController,
    MajorTom,
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Variant {
    /// Resolves a variant from the firmware name reported by `REPORT_FIRMWARE`, stripping a
    /// trailing `.ino` the way Arduino sketch names carry it. The recommended naming
    /// convention is `<variant>_<unique>.ino` (`unique` is not interpreted here), so the
    /// variant token is taken up to the first `_`, if any.
    ///
    /// `MajorTom` is recognized but, per design, contributes no actions beyond the generic
    /// table — no source material describes its action set, so it only affects identification.
    pub fn resolve(firmware_name: &str) -> Self {
        let name = firmware_name.strip_suffix(".ino").unwrap_or(firmware_name);
        let variant_token = name.split('_').next().unwrap_or(name);
        match variant_token {
            "LedController" => Variant::LedController,
            "MajorTom" => Variant::MajorTom,
            _ => Variant::Generic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_strips_ino_suffix() {
        assert_eq!(Variant::resolve("LedController.ino"), Variant::LedController);
        assert_eq!(Variant::resolve("LedController"), Variant::LedController);
    }

    #[test]
    fn test_resolve_honors_variant_unique_naming_convention() {
        // <variant>_<unique>.ino: the unique suffix must not affect resolution.
        assert_eq!(Variant::resolve("LedController_01.ino"), Variant::LedController);
        assert_eq!(Variant::resolve("MajorTom_rig3.ino"), Variant::MajorTom);
    }

    #[test]
    fn test_resolve_major_tom() {
        assert_eq!(Variant::resolve("MajorTom.ino"), Variant::MajorTom);
    }

    #[test]
    fn test_resolve_unknown_firmware_is_generic() {
        assert_eq!(Variant::resolve("StandardFirmataPlus.ino"), Variant::Generic);
        assert_eq!(Variant::resolve(""), Variant::Generic);
    }
}
