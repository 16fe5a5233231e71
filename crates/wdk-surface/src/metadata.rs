// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Parsing of `metadata.wdk-surface` sections of `Cargo.toml`s
//!
//! This module provides a [`WdkSurface`] struct that represents the cargo
//! metadata specified in the `metadata.wdk-surface` section of any
//! `Cargo.toml` in a build graph. Exactly one configuration is allowed per
//! build graph, since exactly one build context is active per build.
//!
//! ```toml
//! [package.metadata.wdk-surface]
//! build-context = "kernel-mode"
//!
//! [package.metadata.wdk-surface.driver-model]
//! driver-type = "KMDF"
//! kmdf-version-major = 1
//! target-kmdf-version-minor = 33
//!
//! [package.metadata.wdk-surface.options]
//! hid-extended-headers = true
//! ```

use std::collections::HashSet;

use camino::Utf8PathBuf;
use cargo_metadata::Metadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BuildContext, ContextError, DriverConfig, SurfaceOptions};

/// Key of the metadata table, in both `package.metadata` and
/// `workspace.metadata`
pub const METADATA_KEY: &str = "wdk-surface";

/// Metadata specified in the `metadata.wdk-surface` section of the
/// `Cargo.toml` of a crate, or in a cargo workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct WdkSurface {
    /// Build context the declaration surface is selected for. Can be omitted
    /// when `driver-model` is given.
    #[serde(default)]
    pub build_context: Option<BuildContext>,
    /// Driver model of the crate being built
    #[serde(default)]
    pub driver_model: Option<DriverConfig>,
    /// Coverage toggles for provisional declaration groups
    #[serde(default)]
    pub options: SurfaceOptions,
}

/// Errors that could result from trying to construct a
/// [`metadata::WdkSurface`](crate::metadata::WdkSurface) from information
/// parsed by `cargo metadata`
#[derive(Debug, Error)]
pub enum TryFromCargoMetadataError {
    /// Error returned when no `metadata.wdk-surface` section is detected in
    /// the dependency graph
    #[error(
        "no wdk-surface configuration metadata is detected in the dependency graph. This could \
         happen when building library crates that defer the build context to their consumers"
    )]
    NoSurfaceConfigurationsDetected,

    /// Error returned when multiple configurations are detected across the
    /// dependency graph
    #[error(
        "multiple wdk-surface configurations are detected across the dependency graph, but only \
         one configuration is allowed: {surface_metadata_configurations:#?}"
    )]
    MultipleSurfaceConfigurationsDetected {
        /// [`HashSet`] of unique [`WdkSurface`] derived from detected
        /// metadata
        surface_metadata_configurations: HashSet<WdkSurface>,
    },

    /// Error returned when [`WdkSurface`] fails to be deserialized from
    /// [`cargo_metadata::Metadata`] output
    #[error("failed to deserialize metadata::WdkSurface from {metadata_source}")]
    SurfaceMetadataDeserialization {
        /// `String` that describes what part of
        /// `cargo_metadata::Metadata` was used as the source for
        /// deserialization
        metadata_source: String,
        /// [`serde_json::Error`] that caused the deserialization to fail
        #[source]
        error_source: serde_json::Error,
    },

    /// Error returned when neither a build context nor a driver model is
    /// configured
    #[error(transparent)]
    MissingBuildContext(ContextError),

    /// Error returned when the configured build context contradicts the
    /// driver model
    #[error(
        "build context `{build_context}` contradicts the driver model, which builds in the \
         `{driver_model_context}` context"
    )]
    ConflictingBuildContext {
        /// Configured build context
        build_context: BuildContext,
        /// Build context implied by the driver model
        driver_model_context: BuildContext,
    },

    /// Error returned when the build context override is not a valid build
    /// context
    #[error(transparent)]
    InvalidBuildContext(ContextError),
}

impl TryFrom<&Metadata> for WdkSurface {
    type Error = TryFromCargoMetadataError;

    fn try_from(metadata: &Metadata) -> Result<Self, Self::Error> {
        let surface_metadata_configurations = {
            // Parse wdk-surface metadata from workspace and all packages
            let mut configs = parse_packages_surface_metadata(&metadata.packages)?;
            if let Some(workspace_metadata) =
                parse_workspace_surface_metadata(&metadata.workspace_metadata)?
            {
                configs.insert(workspace_metadata);
            }
            configs
        };

        // Only one build context is active per build
        match surface_metadata_configurations.len() {
            1 => Ok(surface_metadata_configurations.into_iter().next().expect(
                "surface_metadata_configurations should have exactly one element because of the \
                 .len() check above",
            )),

            0 => Err(TryFromCargoMetadataError::NoSurfaceConfigurationsDetected),

            _ => Err(
                TryFromCargoMetadataError::MultipleSurfaceConfigurationsDetected {
                    surface_metadata_configurations,
                },
            ),
        }
    }
}

impl WdkSurface {
    /// Resolves the build context of this configuration.
    ///
    /// `env_override` (the value of `WDK_SURFACE_BUILD_CONTEXT`) takes
    /// precedence over `build-context`. When neither is set, the context is
    /// inferred from `driver-model`.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * `env_override` is not a valid build context
    /// * no build context is configured and there is no driver model
    /// * the build context contradicts the driver model
    pub fn resolve_build_context(
        &self,
        env_override: Option<&str>,
    ) -> Result<BuildContext, TryFromCargoMetadataError> {
        let configured_context = match env_override.map(str::trim).filter(|value| !value.is_empty())
        {
            Some(value) => {
                let build_context = value
                    .parse::<BuildContext>()
                    .map_err(TryFromCargoMetadataError::InvalidBuildContext)?;
                tracing::debug!(%build_context, "build context overridden by environment");
                Some(build_context)
            }
            None => self.build_context,
        };
        let driver_model_context = self.driver_model.as_ref().map(BuildContext::from);

        match (configured_context, driver_model_context) {
            (Some(build_context), Some(driver_model_context))
                if build_context != driver_model_context =>
            {
                Err(TryFromCargoMetadataError::ConflictingBuildContext {
                    build_context,
                    driver_model_context,
                })
            }
            (Some(build_context), _) | (None, Some(build_context)) => Ok(build_context),
            (None, None) => Err(TryFromCargoMetadataError::MissingBuildContext(
                ContextError::Missing,
            )),
        }
    }
}

fn parse_packages_surface_metadata(
    packages: &[cargo_metadata::Package],
) -> Result<HashSet<WdkSurface>, TryFromCargoMetadataError> {
    packages
        .iter()
        .filter_map(|package| match &package.metadata[METADATA_KEY] {
            serde_json::Value::Null => None,
            // An empty section only marks the package as a consumer of the surface, so it is
            // treated as if it wasn't there
            serde_json::Value::Object(map) if map.is_empty() => None,
            surface_metadata => Some(WdkSurface::deserialize(surface_metadata).map_err(|err| {
                TryFromCargoMetadataError::SurfaceMetadataDeserialization {
                    metadata_source: format!(
                        "package.metadata[\"{METADATA_KEY}\"] for {} package",
                        package.name
                    ),
                    error_source: err,
                }
            })),
        })
        .collect()
}

fn parse_workspace_surface_metadata(
    workspace_metadata: &serde_json::Value,
) -> Result<Option<WdkSurface>, TryFromCargoMetadataError> {
    Ok(match &workspace_metadata[METADATA_KEY] {
        serde_json::Value::Null => None,
        surface_metadata => Some(WdkSurface::deserialize(surface_metadata).map_err(|err| {
            TryFromCargoMetadataError::SurfaceMetadataDeserialization {
                metadata_source: format!("workspace_metadata[\"{METADATA_KEY}\"]"),
                error_source: err,
            }
        })?),
    })
}

pub(crate) fn iter_manifest_paths(metadata: Metadata) -> impl IntoIterator<Item = Utf8PathBuf> {
    let mut cargo_manifest_paths = HashSet::new();

    // Add all package manifest paths
    for package in metadata.packages {
        cargo_manifest_paths.insert(package.manifest_path);
    }

    // Add workspace manifest path
    let workspace_manifest_path: Utf8PathBuf = {
        let mut path = metadata.workspace_root;
        path.push("Cargo.toml");
        path
    };
    cargo_manifest_paths.insert(workspace_manifest_path);

    cargo_manifest_paths
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::{KmdfConfig, UmdfConfig};

    #[test]
    fn exactly_one_surface_configuration() {
        let cwd = PathBuf::from("C:\\tmp");
        let surface_metadata = get_cargo_metadata_surface_metadata(
            r#"{
                "build-context": "kernel-mode",
                "driver-model": {
                    "driver-type": "KMDF",
                    "kmdf-version-major": 1,
                    "target-kmdf-version-minor": 33
                }
            }"#,
        );
        let (workspace_member, package) =
            get_cargo_metadata_package(&cwd, "sample-kmdf", "0.0.1", Some(surface_metadata));

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            None,
        ));

        let surface = WdkSurface::try_from(&cargo_toml_metadata).unwrap();
        assert_eq!(
            surface,
            WdkSurface {
                build_context: Some(BuildContext::KernelMode),
                driver_model: Some(DriverConfig::Kmdf(KmdfConfig {
                    kmdf_version_major: 1,
                    target_kmdf_version_minor: 33,
                    minimum_kmdf_version_minor: None
                })),
                options: SurfaceOptions::default(),
            }
        );
    }

    #[test]
    fn workspace_configuration_with_options() {
        let cwd = PathBuf::from("C:\\tmp");
        let (workspace_member, package) =
            get_cargo_metadata_package(&cwd, "hid-filter", "0.1.0", None);

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            Some(get_cargo_metadata_surface_metadata(
                r#"{"build-context": "user-mode", "options": {"hid-extended-headers": true}}"#,
            )),
        ));

        let surface = WdkSurface::try_from(&cargo_toml_metadata).unwrap();
        assert_eq!(surface.build_context, Some(BuildContext::UserMode));
        assert!(surface.options.hid_extended_headers);
        assert!(surface.options.storage);
    }

    #[test]
    fn identical_package_and_workspace_configurations() {
        let cwd = PathBuf::from("C:\\tmp");
        let configuration = r#"{"build-context": "umdf"}"#;
        let (workspace_member, package) = get_cargo_metadata_package(
            &cwd,
            "sample-umdf",
            "0.0.1",
            Some(get_cargo_metadata_surface_metadata(configuration)),
        );

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            Some(get_cargo_metadata_surface_metadata(configuration)),
        ));

        assert_eq!(
            WdkSurface::try_from(&cargo_toml_metadata)
                .unwrap()
                .build_context,
            Some(BuildContext::UserModeDriverFramework)
        );
    }

    #[test]
    fn multiple_surface_configurations() {
        let cwd = PathBuf::from("C:\\tmp");
        let (workspace_member1, package1) = get_cargo_metadata_package(
            &cwd,
            "sample-kmdf",
            "0.0.1",
            Some(get_cargo_metadata_surface_metadata(
                r#"{"build-context": "kernel-mode"}"#,
            )),
        );
        let (workspace_member2, package2) = get_cargo_metadata_package(
            &cwd,
            "sample-umdf",
            "0.0.1",
            Some(get_cargo_metadata_surface_metadata(r#"{"build-context": "umdf"}"#)),
        );

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package1, package2],
            &[workspace_member1, workspace_member2],
            None,
        ));

        assert!(matches!(
            WdkSurface::try_from(&cargo_toml_metadata).expect_err("expected an error"),
            TryFromCargoMetadataError::MultipleSurfaceConfigurationsDetected {
                surface_metadata_configurations
            } if surface_metadata_configurations.len() == 2
        ));
    }

    #[test]
    fn no_surface_configuration_detected() {
        let cwd = PathBuf::from("C:\\tmp");
        let (workspace_member, package) =
            get_cargo_metadata_package(&cwd, "sample-kmdf", "0.0.1", None);

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            None,
        ));

        assert!(matches!(
            WdkSurface::try_from(&cargo_toml_metadata).expect_err("expected an error"),
            TryFromCargoMetadataError::NoSurfaceConfigurationsDetected
        ));
    }

    #[test]
    fn empty_section_is_ignored() {
        let cwd = PathBuf::from("C:\\tmp");
        let (workspace_member, package) = get_cargo_metadata_package(
            &cwd,
            "sample-kmdf",
            "0.0.1",
            Some(get_cargo_metadata_surface_metadata("{}")),
        );

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            None,
        ));

        assert!(matches!(
            WdkSurface::try_from(&cargo_toml_metadata).expect_err("expected an error"),
            TryFromCargoMetadataError::NoSurfaceConfigurationsDetected
        ));
    }

    #[test]
    fn invalid_surface_metadata() {
        let cwd = PathBuf::from("C:\\tmp");
        let (workspace_member, package) = get_cargo_metadata_package(
            &cwd,
            "sample-kmdf",
            "0.0.1",
            Some(get_cargo_metadata_surface_metadata(
                r#"{"build-context": "hypervisor"}"#,
            )),
        );

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            None,
        ));

        assert!(matches!(
            WdkSurface::try_from(&cargo_toml_metadata).expect_err("expected an error"),
            TryFromCargoMetadataError::SurfaceMetadataDeserialization {
                metadata_source,
                error_source: _
            } if metadata_source.contains("sample-kmdf")
        ));
    }

    #[test]
    fn iter_manifest_paths_includes_workspace_manifest() {
        let cwd = PathBuf::from("/tmp/workspace");
        let (workspace_member, package) =
            get_cargo_metadata_package(&cwd.join("driver"), "driver", "0.0.1", None);

        let cargo_toml_metadata = parse_cargo_metadata(&get_cargo_metadata(
            &cwd,
            vec![package],
            &[workspace_member],
            None,
        ));

        let manifest_paths = iter_manifest_paths(cargo_toml_metadata)
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(
            manifest_paths,
            HashSet::from([
                Utf8PathBuf::from("/tmp/workspace/Cargo.toml"),
                Utf8PathBuf::from("/tmp/workspace/driver/Cargo.toml"),
            ])
        );
    }

    mod resolve_build_context {
        use super::*;

        fn kmdf_surface(build_context: Option<BuildContext>) -> WdkSurface {
            WdkSurface {
                build_context,
                driver_model: Some(DriverConfig::Kmdf(KmdfConfig::new())),
                options: SurfaceOptions::default(),
            }
        }

        #[test]
        fn inferred_from_driver_model() {
            assert_eq!(
                kmdf_surface(None).resolve_build_context(None).unwrap(),
                BuildContext::KernelMode
            );
            let umdf_surface = WdkSurface {
                driver_model: Some(DriverConfig::Umdf(UmdfConfig::new())),
                ..WdkSurface::default()
            };
            assert_eq!(
                umdf_surface.resolve_build_context(None).unwrap(),
                BuildContext::UserModeDriverFramework
            );
        }

        #[test]
        fn explicit_context_without_driver_model() {
            let surface = WdkSurface {
                build_context: Some(BuildContext::UserMode),
                ..WdkSurface::default()
            };
            assert_eq!(
                surface.resolve_build_context(None).unwrap(),
                BuildContext::UserMode
            );
        }

        #[test]
        fn missing_context() {
            assert!(matches!(
                WdkSurface::default().resolve_build_context(None),
                Err(TryFromCargoMetadataError::MissingBuildContext(
                    ContextError::Missing
                ))
            ));
        }

        #[test]
        fn context_contradicting_driver_model() {
            assert!(matches!(
                kmdf_surface(Some(BuildContext::UserMode)).resolve_build_context(None),
                Err(TryFromCargoMetadataError::ConflictingBuildContext {
                    build_context: BuildContext::UserMode,
                    driver_model_context: BuildContext::KernelMode,
                })
            ));
        }

        #[test]
        fn environment_override_takes_precedence() {
            let surface = WdkSurface {
                build_context: Some(BuildContext::KernelMode),
                ..WdkSurface::default()
            };
            assert_eq!(
                surface.resolve_build_context(Some("umdf")).unwrap(),
                BuildContext::UserModeDriverFramework
            );
            assert_eq!(
                surface.resolve_build_context(Some("  ")).unwrap(),
                BuildContext::KernelMode
            );
        }

        #[test]
        fn environment_override_is_checked_against_driver_model() {
            assert!(matches!(
                kmdf_surface(None).resolve_build_context(Some("user-mode")),
                Err(TryFromCargoMetadataError::ConflictingBuildContext { .. })
            ));
            assert!(matches!(
                kmdf_surface(None).resolve_build_context(Some("kernel")),
                Ok(BuildContext::KernelMode)
            ));
        }

        #[test]
        fn invalid_environment_override() {
            assert!(matches!(
                WdkSurface::default().resolve_build_context(Some("hypervisor")),
                Err(TryFromCargoMetadataError::InvalidBuildContext(
                    ContextError::Unknown { value }
                )) if value == "hypervisor"
            ));
        }
    }

    #[derive(Clone)]
    struct TestMetadataPackage(String);
    #[derive(Clone)]
    struct TestMetadataWorkspaceMemberId(String);
    #[derive(Clone)]
    struct TestSurfaceMetadata(String);

    fn parse_cargo_metadata(cargo_metadata: &str) -> Metadata {
        serde_json::from_str::<Metadata>(cargo_metadata)
            .expect("Failed to parse cargo metadata fixture")
    }

    fn get_cargo_metadata(
        root_dir: &Path,
        package_list: Vec<TestMetadataPackage>,
        workspace_member_list: &[TestMetadataWorkspaceMemberId],
        metadata: Option<TestSurfaceMetadata>,
    ) -> String {
        let metadata_section = match metadata {
            Some(metadata) => metadata.0,
            None => String::from("null"),
        };
        format!(
            r#"
    {{
        "target_directory": "{}",
        "workspace_root": "{}",
        "packages": [
            {}
            ],
        "workspace_members": [{}],
        "metadata": {},
        "version": 1
    }}"#,
            root_dir.join("target").to_string_lossy().escape_default(),
            root_dir.to_string_lossy().escape_default(),
            package_list
                .into_iter()
                .map(|p| p.0)
                .collect::<Vec<String>>()
                .join(", "),
            // Require quotes around each member
            workspace_member_list
                .iter()
                .map(|s| format!("\"{}\"", s.0))
                .collect::<Vec<String>>()
                .join(", "),
            metadata_section
        )
    }

    fn get_cargo_metadata_package(
        root_dir: &Path,
        default_package_name: &str,
        default_package_version: &str,
        metadata: Option<TestSurfaceMetadata>,
    ) -> (TestMetadataWorkspaceMemberId, TestMetadataPackage) {
        let package_id = format!(
            "path+file:///{}#{}@{}",
            root_dir.to_string_lossy().escape_default(),
            default_package_name,
            default_package_version
        );
        let metadata_section = match metadata {
            Some(metadata) => metadata.0,
            None => String::from("null"),
        };
        (
            TestMetadataWorkspaceMemberId(package_id.clone()),
            TestMetadataPackage(format!(
                r#"
            {{
            "name": "{}",
            "version": "{}",
            "id": "{}",
            "dependencies": [],
            "targets": [
                {{
                    "kind": [
                        "lib"
                    ],
                    "crate_types": [
                        "lib"
                    ],
                    "name": "{}",
                    "src_path": "{}",
                    "edition": "2024",
                    "doc": true,
                    "doctest": false,
                    "test": true
                }}
            ],
            "features": {{}},
            "manifest_path": "{}",
            "authors": [],
            "categories": [],
            "keywords": [],
            "edition": "2024",
            "metadata": {}
        }}
        "#,
                default_package_name,
                default_package_version,
                package_id,
                default_package_name,
                root_dir
                    .join("src")
                    .join("lib.rs")
                    .to_string_lossy()
                    .escape_default(),
                root_dir
                    .join("Cargo.toml")
                    .to_string_lossy()
                    .escape_default(),
                metadata_section
            )),
        )
    }

    fn get_cargo_metadata_surface_metadata(configuration: &str) -> TestSurfaceMetadata {
        TestSurfaceMetadata(format!(r#"{{ "{METADATA_KEY}": {configuration} }}"#))
    }
}
