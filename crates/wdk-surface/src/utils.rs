// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Private module for utility code related to locating the WDK on the build
//! host.

use std::{
    env,
    fmt,
    io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConfigError, CpuArchitecture, IoError};

/// Errors that could result from stripping the extended length path prefix
/// (`\\?\`) from a path
#[derive(Debug, Error)]
pub enum StripExtendedPathPrefixError {
    /// Error returned when the path is not valid Unicode
    #[error("path is not valid unicode: {path}")]
    NonUnicodePath {
        /// The lossy representation of the offending path
        path: String,
    },
}

/// A trait for dealing with paths with extended-length prefixes.
pub trait PathExt {
    /// The kinds of errors that can be returned when trying to deal with an
    /// extended path prefix.
    type Error;

    /// Strips the extended length path prefix from a given path.
    ///
    /// # Errors
    ///
    /// Returns an error defined by the implementer if unable to strip the
    /// extended path length prefix.
    fn strip_extended_length_path_prefix(&self) -> Result<PathBuf, Self::Error>;
}

impl<P> PathExt for P
where
    P: AsRef<Path>,
{
    type Error = StripExtendedPathPrefixError;

    fn strip_extended_length_path_prefix(&self) -> Result<PathBuf, Self::Error> {
        const EXTENDED_LENGTH_PATH_PREFIX: &str = r"\\?\";

        let path = self.as_ref();
        let path_string = path
            .to_str()
            .ok_or_else(|| StripExtendedPathPrefixError::NonUnicodePath {
                path: path.to_string_lossy().into(),
            })?;

        Ok(path_string
            .strip_prefix(EXTENDED_LENGTH_PATH_PREFIX)
            .map_or_else(|| path.to_path_buf(), PathBuf::from))
    }
}

/// A version with a major and minor part, formatted as `major.minor`. Used
/// for versioned WDK header directories (ex. `spb/1.1`, `wdf/kmdf/1.33`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TwoPartVersion(pub u32, pub u32);

/// Error returned when a string is not a `major.minor` version
#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{value}` is not a version of the form major.minor")]
pub struct ParseTwoPartVersionError {
    /// The string that failed to parse
    pub value: String,
}

impl fmt::Display for TwoPartVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

impl FromStr for TwoPartVersion {
    type Err = ParseTwoPartVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseTwoPartVersionError {
            value: s.to_string(),
        };

        let (major, minor) = s.split_once('.').ok_or_else(error)?;
        Ok(Self(
            major.parse().map_err(|_| error())?,
            minor.parse().map_err(|_| error())?,
        ))
    }
}

impl TryFrom<String> for TwoPartVersion {
    type Error = ParseTwoPartVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TwoPartVersion> for String {
    fn from(version: TwoPartVersion) -> Self {
        version.to_string()
    }
}

/// Detect `WDKContentRoot` Directory. Logic is based off of Toolset.props in
/// NI(22H2) WDK
#[must_use]
pub fn detect_wdk_content_root() -> Option<PathBuf> {
    // If WDKContentRoot is present in environment(ex. running in an eWDK prompt),
    // use it
    if let Ok(wdk_content_root) = env::var("WDKContentRoot") {
        let path = Path::new(wdk_content_root.as_str());
        if path.is_dir() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(
            "WDKContentRoot was detected to be {}, but does not exist or is not a valid directory.",
            path.display()
        );
    }

    // If MicrosoftKitRoot environment variable is set, use it to set WDKContentRoot
    if let Ok(microsoft_kit_root) = env::var("MicrosoftKitRoot") {
        let path = Path::new(microsoft_kit_root.as_str());

        if !path.is_absolute() {
            tracing::warn!(
                "MicrosoftKitRoot({}) was found in environment, but is not an absolute path.",
                path.display()
            );
        } else if !path.is_dir() {
            tracing::warn!(
                "MicrosoftKitRoot({}) was found in environment, but does not exist or is not a \
                 valid directory.",
                path.display()
            );
        } else {
            let wdk_kit_version = env::var("WDKKitVersion").unwrap_or_else(|_| "10.0".to_string());
            let path = path.join("Windows Kits").join(wdk_kit_version);
            if path.is_dir() {
                return Some(path);
            }
            tracing::warn!(
                "WDKContentRoot was detected to be {}, but does not exist or is not a valid \
                 directory.",
                path.display()
            );
        }
    }

    registry::detect_installed_kits_root()
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        mod registry {
            use std::{ffi::CStr, path::PathBuf};

            use windows::{
                Win32::System::Registry::{
                    HKEY,
                    HKEY_LOCAL_MACHINE,
                    KEY_READ,
                    RRF_RT_REG_SZ,
                    RegCloseKey,
                    RegGetValueA,
                    RegOpenKeyExA,
                },
                core::{PCSTR, s},
            };

            /// Check the `KitsRoot10` value under both the native and the
            /// `Wow6432Node` views of `Windows Kits\Installed Roots`
            pub fn detect_installed_kits_root() -> Option<PathBuf> {
                [
                    s!(r"SOFTWARE\Microsoft\Windows Kits\Installed Roots"),
                    s!(r"SOFTWARE\Wow6432Node\Microsoft\Windows Kits\Installed Roots"),
                ]
                .into_iter()
                .find_map(|sub_key| {
                    read_registry_key_string_value(HKEY_LOCAL_MACHINE, sub_key, s!("KitsRoot10"))
                })
                .map(PathBuf::from)
            }

            /// Read a string value from a registry key
            ///
            /// # Arguments
            ///
            /// * `key_handle` - a [`windows::Win32::System::Registry::HKEY`] to the base
            ///   key
            /// * `sub_key` - a [`windows::core::PCSTR`] that is the path of a registry key
            ///   relative to the `key_handle` argument
            /// * `value` - a [`windows::core::PCSTR`] that is the name of the string
            ///   registry value to read
            fn read_registry_key_string_value(
                key_handle: HKEY,
                sub_key: PCSTR,
                value: PCSTR,
            ) -> Option<String> {
                let mut opened_key_handle = HKEY::default();
                let mut len = 0;

                // SAFETY: `&raw mut opened_key_handle` is a valid, writable address of the
                // correct type for the opened key handle.
                unsafe {
                    RegOpenKeyExA(key_handle, sub_key, 0, KEY_READ, &raw mut opened_key_handle)
                }
                .ok()
                .ok()?;

                // SAFETY: `opened_key_handle` is a valid key opened with the `KEY_QUERY_VALUE`
                // access right (included in `KEY_READ`). `&raw mut len` is a valid, writable
                // address of the correct type.
                let value_string = unsafe {
                    RegGetValueA(
                        opened_key_handle,
                        None,
                        value,
                        RRF_RT_REG_SZ,
                        None,
                        None,
                        Some(&raw mut len),
                    )
                }
                .ok()
                .ok()
                .and_then(|()| {
                    let mut buffer = vec![0u8; len as usize];

                    // SAFETY: `opened_key_handle` is a valid key opened with the `KEY_QUERY_VALUE`
                    // access right. `buffer` is writable for `len` bytes, and `&raw mut len` is a
                    // valid, writable address of the correct type.
                    unsafe {
                        RegGetValueA(
                            opened_key_handle,
                            None,
                            value,
                            RRF_RT_REG_SZ,
                            None,
                            Some(buffer.as_mut_ptr().cast()),
                            Some(&raw mut len),
                        )
                    }
                    .ok()
                    .ok()?;

                    CStr::from_bytes_with_nul(&buffer[..len as usize])
                        .ok()?
                        .to_str()
                        .ok()
                        .map(ToString::to_string)
                });

                // SAFETY: `opened_key_handle` is a valid key that was opened by `RegOpenKeyExA`
                if unsafe { RegCloseKey(opened_key_handle) }.ok().is_err() {
                    tracing::warn!("failed to close registry key handle");
                }

                value_string
            }
        }
    } else {
        mod registry {
            use std::path::PathBuf;

            /// The registry only exists on Windows hosts
            pub const fn detect_installed_kits_root() -> Option<PathBuf> {
                None
            }
        }
    }
}

/// Searches a directory and determines the latest windows SDK version in that
/// directory
///
/// # Errors
///
/// Returns a `ConfigError::DirectoryNotFound` error if the directory provided
/// does not exist or contains no SDK version directories.
pub fn get_latest_windows_sdk_version(path_to_search: &Path) -> Result<String, ConfigError> {
    path_to_search
        .read_dir()
        .map_err(|source| IoError::with_path(path_to_search, source))?
        .filter_map(std::result::Result::ok)
        .map(|valid_directory_entry| valid_directory_entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let directory_name = path.file_name()?.to_str()?.to_string();
            let version_components = sdk_version_components(&directory_name)?;
            Some((version_components, directory_name))
        })
        // Get the latest SDK folder in case there are multiple installed
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, directory_name)| directory_name)
        .ok_or_else(|| ConfigError::DirectoryNotFound {
            directory: format!(
                "Windows SDK Directory in {}",
                path_to_search.to_string_lossy()
            ),
        })
}

/// Numeric components of a `10.x.y.z` SDK version directory name
fn sdk_version_components(directory_name: &str) -> Option<Vec<u32>> {
    if !directory_name.starts_with("10.") {
        return None;
    }
    directory_name
        .split('.')
        .map(|component| component.parse().ok())
        .collect()
}

/// Detect architecture based on cargo TARGET variable.
///
/// # Panics
///
/// Panics if the `CARGO_CFG_TARGET_ARCH` environment variable is not set,
/// or if the cargo architecture is unsupported.
#[must_use]
pub fn detect_cpu_architecture_in_build_script() -> CpuArchitecture {
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").expect(
        "Cargo should have set the CARGO_CFG_TARGET_ARCH environment variable when executing \
         build.rs",
    );

    CpuArchitecture::try_from_cargo_str(&target_arch).unwrap_or_else(|| {
        panic!("The target architecture, {target_arch}, is currently not supported.")
    })
}

/// Finds the maximum version in a directory where subdirectories are named with
/// version format "x.y"
///
/// # Errors
///
/// Returns an [`IoError`] if the directory cannot be read or contains no
/// version directories.
pub fn find_max_version_in_directory<P: AsRef<Path>>(
    directory_path: P,
) -> Result<TwoPartVersion, IoError> {
    let directory_path = directory_path.as_ref();
    std::fs::read_dir(directory_path)
        .map_err(|source| IoError::with_path(directory_path, source))?
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .max()
        .ok_or_else(|| {
            IoError::with_path(
                directory_path,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Maximum version in {} not found", directory_path.display()),
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn two_part_version_parsing() {
        assert_eq!("1.1".parse(), Ok(TwoPartVersion(1, 1)));
        assert_eq!("1.33".parse(), Ok(TwoPartVersion(1, 33)));
        assert!("1".parse::<TwoPartVersion>().is_err());
        assert!("1.".parse::<TwoPartVersion>().is_err());
        assert!(".5".parse::<TwoPartVersion>().is_err());
        assert!("1.2.3".parse::<TwoPartVersion>().is_err());
        assert!("a.b".parse::<TwoPartVersion>().is_err());
    }

    #[test]
    fn two_part_version_ordering_is_numeric() {
        assert!(TwoPartVersion(1, 10) > TwoPartVersion(1, 9));
        assert!(TwoPartVersion(2, 0) > TwoPartVersion(1, 999));
    }

    #[test]
    fn strip_extended_length_path_prefix() {
        assert_eq!(
            Path::new(r"\\?\C:\Program Files (x86)\Windows Kits\10")
                .strip_extended_length_path_prefix()
                .unwrap(),
            PathBuf::from(r"C:\Program Files (x86)\Windows Kits\10")
        );
        assert_eq!(
            Path::new(r"C:\ewdk").strip_extended_length_path_prefix().unwrap(),
            PathBuf::from(r"C:\ewdk")
        );
    }

    #[test]
    fn latest_windows_sdk_version() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        temp_dir.child("10.0.22621.0").create_dir_all().unwrap();
        temp_dir.child("10.0.26100.0").create_dir_all().unwrap();
        temp_dir.child("wdf").create_dir_all().unwrap();
        temp_dir.child("10.0.99999.0").touch().unwrap(); // File: ignored

        assert_eq!(
            get_latest_windows_sdk_version(temp_dir.path()).unwrap(),
            "10.0.26100.0"
        );
    }

    #[test]
    fn latest_windows_sdk_version_compares_numerically() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        temp_dir.child("10.0.9999.0").create_dir_all().unwrap();
        temp_dir.child("10.0.22621.0").create_dir_all().unwrap();
        temp_dir.child("10.0.22621.backup").create_dir_all().unwrap();

        assert_eq!(
            get_latest_windows_sdk_version(temp_dir.path()).unwrap(),
            "10.0.22621.0"
        );
    }

    #[test]
    fn latest_windows_sdk_version_missing() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        temp_dir.child("wdf").create_dir_all().unwrap();

        assert!(matches!(
            get_latest_windows_sdk_version(temp_dir.path()),
            Err(ConfigError::DirectoryNotFound { .. })
        ));
    }

    mod find_max_version_in_directory {
        use super::*;

        #[test]
        fn empty_directory() {
            let temp_dir = assert_fs::TempDir::new().unwrap();
            let result = find_max_version_in_directory(temp_dir.path());
            assert_eq!(
                result.unwrap_err().source.kind(),
                std::io::ErrorKind::NotFound
            );
        }

        #[test]
        fn nonexistent_directory() {
            let nonexistent_path = std::path::Path::new("/this/path/does/not/exist");
            assert!(find_max_version_in_directory(nonexistent_path).is_err());
        }

        #[test]
        fn mixed_valid_and_invalid_entries() {
            let temp_dir = assert_fs::TempDir::new().unwrap();
            temp_dir.child("1.0").create_dir_all().unwrap();
            temp_dir.child("1.1").create_dir_all().unwrap();
            temp_dir.child("invalid").create_dir_all().unwrap();
            temp_dir.child("1.2.3").create_dir_all().unwrap(); // Invalid: too many dots
            temp_dir.child("2.0").touch().unwrap(); // File: ignored
            assert_eq!(
                find_max_version_in_directory(temp_dir.path()).unwrap(),
                TwoPartVersion(1, 1)
            );
        }
    }
}
