// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! The build context that decides which WDK declarations are visible to
//! binding generation, along with the driver model details that can pin it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Preprocessor definition that marks a kernel-mode compilation
pub const KERNEL_MODE_DEFINITION: &str = "_KERNEL_MODE";
/// Preprocessor definition that is present in every KMDF compilation
pub const KMDF_VERSION_MAJOR_DEFINITION: &str = "KMDF_VERSION_MAJOR";
/// Preprocessor definition that is present in every UMDF compilation
pub const UMDF_VERSION_MAJOR_DEFINITION: &str = "UMDF_VERSION_MAJOR";

/// The compilation context a declaration surface is selected for. Exactly one
/// context is active per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildContext {
    /// Kernel-mode driver (WDM or KMDF)
    KernelMode,
    /// User-mode driver built on the User Mode Driver Framework
    #[serde(rename = "umdf")]
    UserModeDriverFramework,
    /// Plain user-mode component that consumes WDK headers without a driver
    /// framework
    UserMode,
}

/// Errors that could result from resolving a [`BuildContext`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// Error returned when no build context was supplied
    #[error(
        "no build context was supplied. Set `build-context` (or `driver-model`) in a \
         `metadata.wdk-surface` section, or set the WDK_SURFACE_BUILD_CONTEXT environment variable"
    )]
    Missing,

    /// Error returned when mutually exclusive build contexts are supplied at
    /// the same time
    #[error("mutually exclusive build contexts were supplied simultaneously: {definitions:?}")]
    Conflicting {
        /// The definitions that selected different contexts
        definitions: Vec<String>,
    },

    /// Error returned when a build context string is not recognized
    #[error(
        "unrecognized build context `{value}`. Expected one of: kernel-mode, umdf, user-mode"
    )]
    Unknown {
        /// The string that failed to parse
        value: String,
    },
}

impl BuildContext {
    /// All build contexts, in a stable order
    pub const ALL: [Self; 3] = [
        Self::KernelMode,
        Self::UserModeDriverFramework,
        Self::UserMode,
    ];

    /// Returns `true` for kernel-mode builds
    #[must_use]
    pub const fn is_kernel_mode(self) -> bool {
        matches!(self, Self::KernelMode)
    }

    /// Returns `true` for UMDF builds
    #[must_use]
    pub const fn is_user_mode_driver_framework(self) -> bool {
        matches!(self, Self::UserModeDriverFramework)
    }

    /// Returns `true` when a driver framework (KMDF or UMDF) header set
    /// is available to this context
    #[must_use]
    pub const fn uses_driver_framework(self) -> bool {
        matches!(self, Self::KernelMode | Self::UserModeDriverFramework)
    }

    /// The canonical string for this context. This is the value accepted by
    /// [`FromStr`], written to `metadata.wdk-surface`, and exported as the
    /// `wdk_surface_context` cfg value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KernelMode => "kernel-mode",
            Self::UserModeDriverFramework => "umdf",
            Self::UserMode => "user-mode",
        }
    }

    /// Resolves the build context from a set of preprocessor definitions, the
    /// same way the WDK headers themselves distinguish compilation modes.
    ///
    /// `_KERNEL_MODE` or `KMDF_VERSION_MAJOR` select kernel-mode,
    /// `UMDF_VERSION_MAJOR` selects UMDF and the absence of all of them
    /// selects plain user-mode.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Conflicting`] if both a kernel-mode and a UMDF
    /// definition are present.
    pub fn from_preprocessor_definitions<I, K, V>(definitions: I) -> Result<Self, ContextError>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
    {
        let mut kernel_definitions = vec![];
        let mut umdf_definitions = vec![];

        for (key, _) in definitions {
            match key.as_ref() {
                key @ (KERNEL_MODE_DEFINITION | KMDF_VERSION_MAJOR_DEFINITION) => {
                    kernel_definitions.push(key.to_string());
                }
                key @ UMDF_VERSION_MAJOR_DEFINITION => umdf_definitions.push(key.to_string()),
                _ => {}
            }
        }

        match (kernel_definitions.is_empty(), umdf_definitions.is_empty()) {
            (false, false) => Err(ContextError::Conflicting {
                definitions: kernel_definitions.into_iter().chain(umdf_definitions).collect(),
            }),
            (false, true) => Ok(Self::KernelMode),
            (true, false) => Ok(Self::UserModeDriverFramework),
            (true, true) => Ok(Self::UserMode),
        }
    }
}

impl fmt::Display for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildContext {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kernel-mode" | "kernel" | "km" => Ok(Self::KernelMode),
            "umdf" | "user-mode-driver-framework" => Ok(Self::UserModeDriverFramework),
            "user-mode" | "user" | "um" => Ok(Self::UserMode),
            _ => Err(ContextError::Unknown {
                value: s.to_string(),
            }),
        }
    }
}

/// The driver type with its associated configuration parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "driver-type", deny_unknown_fields, rename_all = "UPPERCASE")]
pub enum DriverConfig {
    /// Windows Driver Model
    Wdm,
    /// Kernel Mode Driver Framework
    Kmdf(KmdfConfig),
    /// User Mode Driver Framework
    Umdf(UmdfConfig),
}

/// The configuration parameters for KMDF drivers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct KmdfConfig {
    /// Major KMDF Version
    pub kmdf_version_major: u8,
    /// Minor KMDF Version (Target Version)
    pub target_kmdf_version_minor: u8,
    /// Minor KMDF Version (Minimum Required)
    pub minimum_kmdf_version_minor: Option<u8>,
}

/// The configuration parameters for UMDF drivers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct UmdfConfig {
    /// Major UMDF Version
    pub umdf_version_major: u8,
    /// Minor UMDF Version (Target Version)
    pub target_umdf_version_minor: u8,
    /// Minor UMDF Version (Minimum Required)
    pub minimum_umdf_version_minor: Option<u8>,
}

impl From<&DriverConfig> for BuildContext {
    fn from(driver_config: &DriverConfig) -> Self {
        match driver_config {
            DriverConfig::Wdm | DriverConfig::Kmdf(_) => Self::KernelMode,
            DriverConfig::Umdf(_) => Self::UserModeDriverFramework,
        }
    }
}

impl Default for KmdfConfig {
    fn default() -> Self {
        Self {
            kmdf_version_major: 1,
            target_kmdf_version_minor: 33,
            minimum_kmdf_version_minor: None,
        }
    }
}

impl KmdfConfig {
    /// Creates a new [`KmdfConfig`] with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for UmdfConfig {
    fn default() -> Self {
        Self {
            umdf_version_major: 2,
            target_umdf_version_minor: 33,
            minimum_umdf_version_minor: None,
        }
    }
}

impl UmdfConfig {
    /// Creates a new [`UmdfConfig`] with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
