// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! [`wdk-surface`] decides which WDK (Windows Driver Kit) declarations are
//! exposed to binding generation for a build, and wires that decision into
//! Cargo build scripts and [`bindgen`](::bindgen).
//!
//! A build resolves exactly one [`BuildContext`] (kernel-mode, UMDF or plain
//! user-mode). [`select`] maps that context to an ordered
//! [`DeclarationSurface`]: the header groups the generator may see, plus the
//! hand-authored supplemental types from the [`ShimRegistry`] that the WDK
//! headers fail to define. [`Config`] locates the WDK on the build host,
//! reads the context from `metadata.wdk-surface` sections of `Cargo.toml`s,
//! and exposes the selection to dependent crates as `cfg` settings.

#![cfg_attr(nightly_toolchain, feature(assert_matches))]

pub use bindgen::{BuilderExt, generate_bindings};
pub use context::{BuildContext, ContextError, DriverConfig, KmdfConfig, UmdfConfig};
use metadata::TryFromCargoMetadataError;
pub use options::SurfaceOptions;
pub use resolve::{FileSystem, HeaderResolver, ResolvedHeader, StdFileSystem};
pub use shim::{ShimRegistry, TypeShim};
pub use surface::{
    DeclarationGroup,
    DeclarationSurface,
    ExtensionMarker,
    Inclusion,
    MarkerKind,
    MarkerScope,
    Subsystem,
    SurfaceDiff,
    select,
    select_with,
};
pub use utils::{
    ParseTwoPartVersionError,
    PathExt,
    StripExtendedPathPrefixError,
    TwoPartVersion,
    detect_wdk_content_root,
    find_max_version_in_directory,
};

pub mod context;
pub mod metadata;
pub mod resolve;
pub mod shim;
pub mod surface;

mod bindgen;
mod options;
/// Module for utility code related to locating the WDK on the build host.
mod utils;

use std::{
    env,
    path::{Path, PathBuf},
};

use cargo_metadata::MetadataCommand;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the build context configured in
/// `metadata.wdk-surface`
pub const BUILD_CONTEXT_ENV_VAR: &str = "WDK_SURFACE_BUILD_CONTEXT";

/// `cfg` key set to the active build context
pub const CONTEXT_CFG_KEY: &str = "wdk_surface_context";

/// `cfg` key set once for every selected declaration group
pub const GROUP_CFG_KEY: &str = "wdk_surface_group";

/// Configuration parameters for a build that selects a WDK declaration
/// surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Path to root of WDK. Corresponds with `WDKContentRoot` environment
    /// variable in eWDK
    wdk_content_root: PathBuf,
    /// CPU architecture to target
    cpu_architecture: CpuArchitecture,
    /// Compilation context the declaration surface is selected for
    pub build_context: BuildContext,
    /// Driver model, when the build is for a driver. Pins the WDF version
    /// whose headers are exposed.
    pub driver_config: Option<DriverConfig>,
    /// Coverage toggles for provisional declaration groups
    pub options: SurfaceOptions,
    /// Windows SDK version directory to use under `Include`. The latest
    /// installed version is used when `None`.
    pub windows_sdk_version: Option<String>,
}

/// The CPU architecture that's configured to be compiled for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CpuArchitecture {
    /// AMD64 CPU architecture. Also known as x64 or x86-64.
    Amd64,
    /// ARM64 CPU architecture. Also known as aarch64.
    Arm64,
}

/// Error returned when a filesystem operation on a specific path fails
#[derive(Debug, Error)]
#[error("failed to perform IO operation on {}", path.display())]
pub struct IoError {
    /// Path the operation was performed on
    pub path: PathBuf,
    /// Underlying [`std::io::Error`]
    #[source]
    pub source: std::io::Error,
}

/// Errors that could result from configuring a build via [`wdk-surface`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error returned when an [`std::io`] operation fails
    #[error(transparent)]
    IoError(#[from] IoError),

    /// Error returned when an expected directory does not exist
    #[error("cannot find directory: {directory}")]
    DirectoryNotFound {
        /// Path of directory that was not found
        directory: String,
    },

    /// Error returned when an
    /// `utils::PathExt::strip_extended_length_path_prefix` operation fails
    #[error(transparent)]
    StripExtendedPathPrefixError(#[from] StripExtendedPathPrefixError),

    /// Error returned when a [`metadata::WdkSurface`] fails to be parsed from
    /// a Cargo Manifest
    #[error(transparent)]
    TryFromCargoMetadataError(#[from] TryFromCargoMetadataError),

    /// Error returned when a [`BuildContext`] cannot be resolved
    #[error(transparent)]
    ContextError(#[from] ContextError),

    /// Error returned when the WDK content root cannot be located
    #[error(
        "WDKContentRoot should be able to be detected. Ensure that the WDK is installed, or that \
         the environment setup scripts in the eWDK have been run."
    )]
    WdkContentRootDetectionError,

    /// Error returned when `cargo_metadata` execution or parsing fails
    #[error(transparent)]
    CargoMetadataError(#[from] cargo_metadata::Error),

    /// Error returned when the driver model belongs to a different build
    /// context than the one configured
    #[error(
        "the {driver_config:?} driver model builds in the `{driver_context}` context, but the \
         `{build_context}` context is configured"
    )]
    ConflictingDriverConfig {
        /// The configured build context
        build_context: BuildContext,
        /// The configured driver model
        driver_config: DriverConfig,
        /// The build context implied by the driver model
        driver_context: BuildContext,
    },
}

/// Errors that could result from checking a declaration surface against a WDK
/// installation or generating bindings for it
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// Error returned when a selected header is not present in any include
    /// path
    #[error("cannot find header `{header}` in any include path: {searched:#?}")]
    MissingHeader {
        /// Header include path, as written in the wrapper header
        header: String,
        /// Include paths that were searched
        searched: Vec<PathBuf>,
    },

    /// Error returned when a native header already defines a name that a
    /// supplemental type would define
    #[error("`{name}` is already defined by {}", header.display())]
    ShimConflict {
        /// The name that is defined twice
        name: String,
        /// Path of the header that defines it
        header: PathBuf,
    },

    /// Error returned when bindgen fails to generate bindings
    #[error("bindgen failed to generate the {pass} bindings")]
    BindingGeneration {
        /// Name of the generation pass that failed
        pass: String,
        /// [`bindgen::BindgenError`](::bindgen::BindgenError) that caused the
        /// failure
        #[source]
        source: ::bindgen::BindgenError,
    },

    /// Error returned when an [`std::io`] operation fails
    #[error(transparent)]
    IoError(#[from] IoError),

    /// Error returned when the build configuration is invalid
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
}

impl IoError {
    /// Creates an [`IoError`] for an operation on `path`
    pub fn with_path(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wdk_content_root: utils::detect_wdk_content_root().expect(
                "WDKContentRoot should be able to be detected. Ensure that the WDK is installed, \
                 or that the environment setup scripts in the eWDK have been run.",
            ),
            cpu_architecture: utils::detect_cpu_architecture_in_build_script(),
            build_context: BuildContext::KernelMode,
            driver_config: None,
            options: SurfaceOptions::default(),
            windows_sdk_version: None,
        }
    }
}

impl Config {
    /// Create a new [`Config`] with default values
    ///
    /// # Panics
    ///
    /// Panics if the WDK content root cannot be detected
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`Config`] for an explicit WDK location, without consulting
    /// the build script environment
    #[must_use]
    pub fn with_wdk_content_root(
        wdk_content_root: impl Into<PathBuf>,
        cpu_architecture: CpuArchitecture,
        build_context: BuildContext,
    ) -> Self {
        Self {
            wdk_content_root: wdk_content_root.into(),
            cpu_architecture,
            build_context,
            driver_config: None,
            options: SurfaceOptions::default(),
            windows_sdk_version: None,
        }
    }

    /// Path to the root of the WDK
    #[must_use]
    pub fn wdk_content_root(&self) -> &Path {
        &self.wdk_content_root
    }

    /// CPU architecture to target
    #[must_use]
    pub const fn cpu_architecture(&self) -> CpuArchitecture {
        self.cpu_architecture
    }

    /// Create a [`Config`] from parsing the top-level Cargo manifest into a
    /// [`metadata::WdkSurface`], and using it to populate the [`Config`]. It
    /// also emits `cargo::rerun-if-changed` directives for any files that are
    /// used to create the [`Config`].
    ///
    /// The build context from the metadata can be overridden with the
    /// `WDK_SURFACE_BUILD_CONTEXT` environment variable.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * the execution of `cargo metadata` fails
    /// * the parsing of [`metadata::WdkSurface`] from any of the Cargo
    ///   manifests fail
    /// * multiple conflicting [`metadata::WdkSurface`] configurations are
    ///   detected
    /// * no [`metadata::WdkSurface`] configurations are detected
    /// * no build context can be resolved, or the resolved context
    ///   contradicts the driver model
    /// * the WDK content root cannot be detected
    ///
    /// # Panics
    ///
    /// Panics if the resolved top-level Cargo manifest path is not valid UTF-8
    pub fn from_env_auto() -> Result<Self, ConfigError> {
        let top_level_manifest = find_top_level_cargo_manifest();
        let cargo_metadata = MetadataCommand::new()
            .manifest_path(&top_level_manifest)
            .exec()?;
        let surface_metadata = metadata::WdkSurface::try_from(&cargo_metadata)?;

        // Force rebuilds if any of the manifest files change (ex. if the
        // wdk-surface metadata section is modified)
        for manifest_path in metadata::iter_manifest_paths(cargo_metadata)
            .into_iter()
            .chain(std::iter::once(
                top_level_manifest
                    .try_into()
                    .expect("Path to Cargo manifests should always be valid UTF8"),
            ))
        {
            println!("cargo::rerun-if-changed={manifest_path}");
        }
        println!("cargo::rerun-if-env-changed={BUILD_CONTEXT_ENV_VAR}");

        Self::from_surface_metadata(
            surface_metadata,
            env::var(BUILD_CONTEXT_ENV_VAR).ok().as_deref(),
            utils::detect_wdk_content_root(),
            utils::detect_cpu_architecture_in_build_script(),
        )
    }

    fn from_surface_metadata(
        surface_metadata: metadata::WdkSurface,
        build_context_override: Option<&str>,
        wdk_content_root: Option<PathBuf>,
        cpu_architecture: CpuArchitecture,
    ) -> Result<Self, ConfigError> {
        let build_context = surface_metadata.resolve_build_context(build_context_override)?;
        tracing::debug!(%build_context, "resolved build context from cargo metadata");

        let wdk_content_root = wdk_content_root.ok_or(ConfigError::WdkContentRootDetectionError)?;

        Ok(Self {
            driver_config: surface_metadata.driver_model,
            options: surface_metadata.options,
            ..Self::with_wdk_content_root(wdk_content_root, cpu_architecture, build_context)
        })
    }

    /// Checks that the driver model, if any, belongs to the configured build
    /// context
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingDriverConfig`] if the driver model
    /// implies a different build context
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(driver_config) = self.driver_config {
            let driver_context = BuildContext::from(&driver_config);
            if driver_context != self.build_context {
                return Err(ConfigError::ConflictingDriverConfig {
                    build_context: self.build_context,
                    driver_config,
                    driver_context,
                });
            }
        }
        Ok(())
    }

    /// The declaration surface selected by this [`Config`]
    #[must_use]
    pub fn surface(&self) -> DeclarationSurface {
        select_with(self.build_context, &self.options)
    }

    /// Return header include paths required to parse the selected
    /// declaration surface
    ///
    /// # Errors
    ///
    /// This function will return an error if the [`Config`] is inconsistent
    /// or if any of the required paths do not exist.
    pub fn get_include_paths(&self) -> Result<Vec<PathBuf>, ConfigError> {
        self.validate()?;

        let include_directory = self.wdk_content_root.join("Include");

        // Based off of logic from WindowsDriver.KernelMode.props &
        // WindowsDriver.UserMode.props in NI(22H2) WDK
        let sdk_version = match &self.windows_sdk_version {
            Some(sdk_version) => sdk_version.clone(),
            None => utils::get_latest_windows_sdk_version(include_directory.as_path())?,
        };
        let windows_sdk_include_path = include_directory.join(sdk_version);

        let mut include_paths = vec![
            windows_sdk_include_path.join("km/crt"),
            windows_sdk_include_path.join(if self.build_context.is_kernel_mode() {
                "km"
            } else {
                "um"
            }),
            windows_sdk_include_path.join("shared"),
        ];

        if let Some(wdf_include_path) = self.wdf_include_path(&include_directory)? {
            include_paths.push(wdf_include_path);
        }

        include_paths
            .into_iter()
            .map(|include_path| {
                if !include_path.is_dir() {
                    return Err(ConfigError::DirectoryNotFound {
                        directory: include_path.to_string_lossy().into(),
                    });
                }
                Ok(include_path
                    .canonicalize()
                    .map_err(|source| IoError::with_path(&include_path, source))?
                    .strip_extended_length_path_prefix()?)
            })
            .collect()
    }

    fn wdf_include_path(&self, include_directory: &Path) -> Result<Option<PathBuf>, ConfigError> {
        Ok(match (self.build_context, self.driver_config) {
            (_, Some(DriverConfig::Kmdf(kmdf_config))) => Some(include_directory.join(format!(
                "wdf/kmdf/{}.{}",
                kmdf_config.kmdf_version_major, kmdf_config.target_kmdf_version_minor
            ))),
            (_, Some(DriverConfig::Umdf(umdf_config))) => Some(include_directory.join(format!(
                "wdf/umdf/{}.{}",
                umdf_config.umdf_version_major, umdf_config.target_umdf_version_minor
            ))),
            // WDF headers are part of every kernel-mode and UMDF surface, so
            // builds without a pinned framework version use the newest one
            (BuildContext::KernelMode, _) => {
                let kmdf_directory = include_directory.join("wdf/kmdf");
                let version = find_max_version_in_directory(&kmdf_directory)?;
                Some(kmdf_directory.join(version.to_string()))
            }
            (BuildContext::UserModeDriverFramework, _) => {
                let umdf_directory = include_directory.join("wdf/umdf");
                let version = find_max_version_in_directory(&umdf_directory)?;
                Some(umdf_directory.join(version.to_string()))
            }
            (BuildContext::UserMode, _) => None,
        })
    }

    /// Return an iterator of strings that represent compiler definitions
    /// derived from the `Config`
    pub fn get_preprocessor_definitions_iter(
        &self,
    ) -> impl Iterator<Item = (String, Option<String>)> {
        match self.cpu_architecture {
            // Definitions sourced from `Program Files\Windows
            // Kits\10\build\10.0.22621.0\WindowsDriver.x64.props`
            CpuArchitecture::Amd64 => {
                vec![("_WIN64", None), ("_AMD64_", None), ("AMD64", None)]
            }
            // Definitions sourced from `Program Files\Windows
            // Kits\10\build\10.0.22621.0\WindowsDriver.arm64.props`
            CpuArchitecture::Arm64 => {
                vec![
                    ("_ARM64_", None),
                    ("ARM64", None),
                    ("_USE_DECLSPECS_FOR_SAL", Some(1)),
                    ("STD_CALL", None),
                ]
            }
        }
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.map(|v| v.to_string())))
        .chain(
            self.build_context
                .is_kernel_mode()
                .then(|| (context::KERNEL_MODE_DEFINITION.to_string(), None)),
        )
        .chain(
            match self.driver_config {
                None | Some(DriverConfig::Wdm) => {
                    vec![]
                }
                Some(DriverConfig::Kmdf(kmdf_config)) => {
                    let mut kmdf_definitions = vec![
                        (
                            context::KMDF_VERSION_MAJOR_DEFINITION,
                            Some(kmdf_config.kmdf_version_major),
                        ),
                        (
                            "KMDF_VERSION_MINOR",
                            Some(kmdf_config.target_kmdf_version_minor),
                        ),
                    ];

                    if let Some(minimum_minor_version) = kmdf_config.minimum_kmdf_version_minor {
                        kmdf_definitions
                            .push(("KMDF_MINIMUM_VERSION_REQUIRED", Some(minimum_minor_version)));
                    }
                    kmdf_definitions
                }
                Some(DriverConfig::Umdf(umdf_config)) => {
                    let mut umdf_definitions = vec![
                        (
                            context::UMDF_VERSION_MAJOR_DEFINITION,
                            Some(umdf_config.umdf_version_major),
                        ),
                        (
                            "UMDF_VERSION_MINOR",
                            Some(umdf_config.target_umdf_version_minor),
                        ),
                        // Definition sourced from: Program Files\Windows
                        // Kits\10\build\10.0.26040.0\Windows.UserMode.props
                        ("_ATL_NO_WIN_SUPPORT", None),
                        // Definition sourced from: Program Files\Windows
                        // Kits\10\build\10.0.26040.0\WindowsDriver.Shared.Props
                        ("WIN32_LEAN_AND_MEAN", Some(1)),
                    ];

                    if let Some(minimum_minor_version) = umdf_config.minimum_umdf_version_minor {
                        umdf_definitions
                            .push(("UMDF_MINIMUM_VERSION_REQUIRED", Some(minimum_minor_version)));
                    }

                    if umdf_config.umdf_version_major >= 2 {
                        umdf_definitions.push(("UMDF_USING_NTSTATUS", None));
                        umdf_definitions.push(("_UNICODE", None));
                        umdf_definitions.push(("UNICODE", None));
                    }

                    umdf_definitions
                }
            }
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.map(|v| v.to_string()))),
        )
    }

    /// Return an iterator of strings that represent compiler flags (i.e.
    /// warnings, settings, etc.) used by bindgen to parse WDK headers
    pub fn wdk_bindgen_compiler_flags() -> impl Iterator<Item = String> {
        vec![
            // Enable Microsoft C/C++ extensions and compatibility options (https://clang.llvm.org/docs/UsersManual.html#microsoft-extensions)
            "-fms-compatibility",
            "-fms-extensions",
            "-fdelayed-template-parsing",
            // Windows SDK & DDK have non-portable paths (ex. #include "DriverSpecs.h" but the
            // file is actually driverspecs.h)
            "--warn-=no-nonportable-include-path",
            // Windows SDK & DDK use pshpack and poppack headers to change packing
            "--warn-=no-pragma-pack",
            "--warn-=no-ignored-attributes",
            "--warn-=no-ignored-pragma-intrinsic",
            "--warn-=no-visibility",
            "--warn-=no-microsoft-anon-tag",
            "--warn-=no-microsoft-enum-forward-reference",
            // Deprecated items are blocklisted in the bindgen invocation instead
            "--warn-=no-deprecated-declarations",
            // Windows SDK & DDK contain unnecessary token pasting (ex. &##_variable: `&` and
            // `_variable` are separate tokens already, and don't need `##` to concatenate
            // them)
            "--warn-=no-invalid-token-paste",
        ]
        .into_iter()
        .map(std::string::ToString::to_string)
    }

    /// Compute the name of the `WdfFunctions` symbol used for WDF function
    /// dispatching based off of the [`Config`]. Returns `None` if no WDF
    /// version is pinned by the driver model.
    #[must_use]
    pub fn compute_wdffunctions_symbol_name(&self) -> Option<String> {
        let (wdf_major_version, wdf_minor_version) = match self.driver_config? {
            DriverConfig::Kmdf(config) => {
                (config.kmdf_version_major, config.target_kmdf_version_minor)
            }
            DriverConfig::Umdf(config) => {
                (config.umdf_version_major, config.target_umdf_version_minor)
            }
            DriverConfig::Wdm => return None,
        };

        Some(format!(
            "WdfFunctions_{wdf_major_version:02}0{wdf_minor_version:02}"
        ))
    }

    /// `cargo::rustc-check-cfg` directives declaring every `cfg` value this
    /// crate can export
    #[must_use]
    pub fn check_cfg_directives() -> Vec<String> {
        let quoted_values = |values: &mut dyn Iterator<Item = &'static str>| {
            values
                .map(|value| format!("\"{value}\""))
                .collect::<Vec<_>>()
                .join(", ")
        };

        vec![
            format!(
                "cargo::rustc-check-cfg=cfg({CONTEXT_CFG_KEY}, values({}))",
                quoted_values(&mut BuildContext::ALL.into_iter().map(BuildContext::as_str))
            ),
            format!(
                "cargo::rustc-check-cfg=cfg({GROUP_CFG_KEY}, values({}))",
                quoted_values(&mut DeclarationGroup::ALL.into_iter().map(DeclarationGroup::name))
            ),
        ]
    }

    /// `cargo::rustc-cfg` directives exposing the build context and every
    /// selected declaration group
    #[must_use]
    pub fn cfg_directives(&self) -> Vec<String> {
        std::iter::once(format!(
            r#"cargo::rustc-cfg={CONTEXT_CFG_KEY}="{}""#,
            self.build_context
        ))
        .chain(
            self.surface()
                .groups()
                .iter()
                .map(|group| format!(r#"cargo::rustc-cfg={GROUP_CFG_KEY}="{group}""#)),
        )
        .collect()
    }

    fn emit_check_cfg_settings() {
        for directive in Self::check_cfg_directives() {
            println!("{directive}");
        }
    }

    /// Expose `cfg` settings based on this [`Config`] to enable conditional
    /// compilation. This emits specially formatted prints to Cargo based on
    /// this [`Config`].
    fn emit_cfg_settings(&self) {
        Self::emit_check_cfg_settings();

        for directive in self.cfg_directives() {
            println!("{directive}");
        }
    }

    /// Configure a Cargo build of a library that exposes the declaration
    /// surface. This emits specially formatted prints to Cargo based on this
    /// [`Config`].
    ///
    /// # Errors
    ///
    /// This function will return an error if the [`Config`] is inconsistent
    pub fn configure_library_build(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.emit_cfg_settings();
        Ok(())
    }

    /// Resolve every header of the selected declaration surface against the
    /// include paths of this [`Config`], and check that no resolved header
    /// already defines a supplemental type.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * the include paths cannot be resolved
    /// * a selected header is missing from every include path
    /// * a resolved header cannot be read
    /// * a resolved header defines the name of a supplemental type
    pub fn check_surface(&self) -> Result<Vec<ResolvedHeader>, SurfaceError> {
        let surface = self.surface();
        let resolver = HeaderResolver::new(self.get_include_paths()?);
        let resolved_headers = resolver.resolve(&surface)?;
        let header_sources = resolver.read_resolved(&resolved_headers)?;

        ShimRegistry::from_shims(surface.shims().to_vec()).ensure_no_conflicts(
            header_sources
                .iter()
                .map(|(header, source)| (header.path.as_path(), source.as_str())),
        )?;

        tracing::debug!(
            context = %self.build_context,
            headers = resolved_headers.len(),
            "declaration surface is consistent with the WDK"
        );
        Ok(resolved_headers)
    }
}

impl CpuArchitecture {
    /// Converts [`CpuArchitecture`] to the string corresponding to what the
    /// architecture is typically referred to in Windows
    #[must_use]
    pub const fn as_windows_str(&self) -> &str {
        match self {
            Self::Amd64 => "x64",
            Self::Arm64 => "ARM64",
        }
    }

    /// Converts from a cargo-provided [`std::str`] to a [`CpuArchitecture`].
    #[must_use]
    pub fn try_from_cargo_str<S: AsRef<str>>(cargo_str: S) -> Option<Self> {
        // Specifically not using the [`std::convert::TryFrom`] trait to be more
        // explicit in function name, since only arch strings from cargo are handled.
        match cargo_str.as_ref() {
            "x86_64" => Some(Self::Amd64),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

/// Find the path of the toplevel Cargo manifest of the currently executing
/// Cargo subcommand. This should resolve to either:
/// 1. the `Cargo.toml` of the package where the Cargo subcommand (build, check,
///    etc.) was run
/// 2. the `Cargo.toml` provided to the `--manifest-path` argument to the Cargo
///    subcommand
/// 3. the `Cargo.toml` of the workspace that contains the package pointed to by
///    1 or 2
///
/// The returned path should be a manifest in the same directory of the
/// lockfile. This does not support invocations that use non-default target
/// directories (ex. via `--target-dir`). This function only works when called
/// from a `build.rs` file
///
/// # Panics
///
/// Panics if a `Cargo.lock` file cannot be found in any of the ancestors of
/// `OUT_DIR` or if this function was called outside of a `build.rs` file
#[must_use]
pub fn find_top_level_cargo_manifest() -> PathBuf {
    let out_dir =
        PathBuf::from(std::env::var("OUT_DIR").expect(
            "Cargo should have set the OUT_DIR environment variable when executing build.rs",
        ));

    out_dir
        .ancestors()
        .find(|path| path.join("Cargo.lock").exists())
        .expect("a Cargo.lock file should exist in the same directory as the top-level Cargo.toml")
        .join("Cargo.toml")
}

/// Configure a Cargo build of a library that exposes the declaration surface.
///
/// This emits specially formatted prints to Cargo based on the [`Config`]
/// derived from `metadata.wdk-surface` sections of `Cargo.toml`s.
///
/// Cargo build graphs that have no `metadata.wdk-surface` configuration will
/// emit a warning, but will still return [`Ok`]. This allows libraries
/// designed for multiple build contexts to sucessfully compile when built in
/// isolation.
///
/// # Errors
///
/// This function will return an error if the [`Config`] cannot be derived
/// from the Cargo metadata, or is inconsistent
pub fn configure_surface_library_build() -> Result<(), ConfigError> {
    configure_surface_library_build_and_then(|_| Ok::<(), ConfigError>(()))
}

/// Configure a Cargo build of a library that exposes the declaration surface,
/// then execute a function or closure with the [`Config`] derived from
/// `metadata.wdk-surface` sections of `Cargo.toml`s.
///
/// Cargo build graphs that have no `metadata.wdk-surface` configuration will
/// emit a warning, but will still return [`Ok`] without calling `f`.
///
/// # Errors
///
/// This function will return an error if the [`Config`] cannot be derived
/// from the Cargo metadata, is inconsistent, or if `f` returns an error
pub fn configure_surface_library_build_and_then<F, E>(mut f: F) -> Result<(), E>
where
    F: FnMut(Config) -> Result<(), E>,
    E: std::convert::From<ConfigError>,
{
    match Config::from_env_auto() {
        Ok(config) => {
            config.configure_library_build()?;
            Ok(f(config)?)
        }
        Err(ConfigError::TryFromCargoMetadataError(
            TryFromCargoMetadataError::NoSurfaceConfigurationsDetected,
        )) => {
            // Libraries built standalone have no consumer that picks a build
            // context, so this is only a warning
            tracing::warn!("No wdk-surface configurations detected.");
            // check_cfg must be emitted even if no configurations are detected, so that
            // cfg options are still checked
            Config::emit_check_cfg_settings();
            Ok(())
        }

        Err(error) => Err(error.into()),
    }
}
