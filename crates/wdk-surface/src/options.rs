// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Toggles for declaration groups whose coverage is deliberately partial.
//!
//! Each toggle corresponds to an [`ExtensionMarker`](crate::ExtensionMarker).
//! Toggles only narrow or widen coverage inside the contexts a group is
//! already admitted to; they never admit a group to another context.

use serde::{Deserialize, Serialize};

use crate::TwoPartVersion;

/// Coverage toggles for provisional declaration groups. Parsed from the
/// `options` table of a `metadata.wdk-surface` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
#[allow(
    clippy::struct_excessive_bools,
    reason = "each bool is an independent, separately tracked coverage toggle"
)]
pub struct SurfaceOptions {
    /// Expose `hidpddi.h` and `hidpi.h`
    pub hid_extended_headers: bool,
    /// Expose the HID SPI class extension (`HidSpiCx/1.0/hidspicx.h`)
    pub hid_spi_cx: bool,
    /// Expose `ntintsafe.h` in kernel-mode builds
    pub kernel_safe_integer: bool,
    /// Expose `ntstrsafe.h` in kernel-mode builds
    pub kernel_safe_string: bool,
    /// Expose `pepfx.h` in kernel-mode builds
    pub power_framework: bool,
    /// Expose `ntddstor.h` in kernel-mode builds
    pub storage: bool,
    /// Expose the USB device emulation class extension in kernel-mode builds
    pub usb_device_emulation: bool,
    /// Version directory of the SPB class extension header (`spb/<version>/spbcx.h`)
    pub spb_cx_version: TwoPartVersion,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            hid_extended_headers: false,
            hid_spi_cx: false,
            kernel_safe_integer: true,
            kernel_safe_string: true,
            power_framework: true,
            storage: true,
            usb_device_emulation: true,
            spb_cx_version: Self::DEFAULT_SPB_CX_VERSION,
        }
    }
}

impl SurfaceOptions {
    /// SPB class extension version pinned when no version is configured
    pub const DEFAULT_SPB_CX_VERSION: TwoPartVersion = TwoPartVersion(1, 1);
    /// Version of the HID SPI class extension header directory
    pub const HID_SPI_CX_VERSION: TwoPartVersion = TwoPartVersion(1, 0);
    /// Version of the USB device emulation class extension header directory
    pub const UDE_VERSION: TwoPartVersion = TwoPartVersion(1, 0);

    /// Creates a new [`SurfaceOptions`] with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let options: SurfaceOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SurfaceOptions::default());
        assert_eq!(options.spb_cx_version, TwoPartVersion(1, 1));
        assert!(!options.hid_extended_headers);
        assert!(options.storage);
    }

    #[test]
    fn partial_table_overrides_only_named_toggles() {
        let options: SurfaceOptions = serde_json::from_str(
            r#"{"hid-extended-headers": true, "storage": false, "spb-cx-version": "1.0"}"#,
        )
        .unwrap();

        assert_eq!(
            options,
            SurfaceOptions {
                hid_extended_headers: true,
                storage: false,
                spb_cx_version: TwoPartVersion(1, 0),
                ..SurfaceOptions::default()
            }
        );
    }

    #[test]
    fn unknown_toggle_is_rejected() {
        assert!(serde_json::from_str::<SurfaceOptions>(r#"{"ndis": true}"#).is_err());
    }

    #[test]
    fn malformed_spb_cx_version_is_rejected() {
        assert!(
            serde_json::from_str::<SurfaceOptions>(r#"{"spb-cx-version": "latest"}"#).is_err()
        );
    }
}
