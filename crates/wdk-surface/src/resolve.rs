// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Resolution of the headers of a [`DeclarationSurface`] against WDK include
//! paths.

use std::{
    io,
    path::{Path, PathBuf},
};

#[cfg(test)]
use mockall::automock;

use crate::{
    DeclarationSurface,
    IoError,
    SurfaceError,
    TwoPartVersion,
    find_max_version_in_directory,
};

/// Provides the filesystem queries header resolution needs
#[cfg_attr(test, automock)]
pub trait FileSystem {
    /// Returns `true` if `path` exists and is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Reads the entire contents of a file
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the file cannot be read or is not valid
    /// UTF-8
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// [`FileSystem`] backed by [`std::fs`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// A header of a declaration surface and the file it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHeader {
    /// Header include path, as written in the wrapper header
    pub header: String,
    /// File the header resolved to
    pub path: PathBuf,
}

/// Resolves header include paths the way the compiler does: the first
/// include path that contains the header wins
#[derive(Debug, Clone)]
pub struct HeaderResolver<F = StdFileSystem> {
    include_paths: Vec<PathBuf>,
    file_system: F,
}

impl HeaderResolver {
    /// Creates a [`HeaderResolver`] over `include_paths` that searches the
    /// host filesystem
    #[must_use]
    pub const fn new(include_paths: Vec<PathBuf>) -> Self {
        Self::with_file_system(include_paths, StdFileSystem)
    }
}

impl<F: FileSystem> HeaderResolver<F> {
    /// Creates a [`HeaderResolver`] over `include_paths` that searches
    /// `file_system`
    #[must_use]
    pub const fn with_file_system(include_paths: Vec<PathBuf>, file_system: F) -> Self {
        Self {
            include_paths,
            file_system,
        }
    }

    /// Include paths, in search order
    #[must_use]
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Resolves a single header
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::MissingHeader`] if no include path contains
    /// `header`
    pub fn resolve_header(&self, header: &str) -> Result<ResolvedHeader, SurfaceError> {
        self.include_paths
            .iter()
            .map(|include_path| include_path.join(header))
            .find(|candidate| self.file_system.is_file(candidate))
            .map(|path| {
                tracing::trace!(header, path = %path.display(), "resolved header");
                ResolvedHeader {
                    header: header.to_string(),
                    path,
                }
            })
            .ok_or_else(|| SurfaceError::MissingHeader {
                header: header.to_string(),
                searched: self.include_paths.clone(),
            })
    }

    /// Resolves every header of `surface`, in surface order
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::MissingHeader`] for the first header that no
    /// include path contains
    pub fn resolve(
        &self,
        surface: &DeclarationSurface,
    ) -> Result<Vec<ResolvedHeader>, SurfaceError> {
        let resolved_headers = surface
            .headers()
            .iter()
            .map(|header| self.resolve_header(header))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            context = %surface.context(),
            headers = resolved_headers.len(),
            "resolved declaration surface headers"
        );
        Ok(resolved_headers)
    }

    /// Reads the text of every resolved header
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::IoError`] naming the first header that cannot
    /// be read
    pub fn read_resolved<'a>(
        &self,
        resolved_headers: &'a [ResolvedHeader],
    ) -> Result<Vec<(&'a ResolvedHeader, String)>, SurfaceError> {
        resolved_headers
            .iter()
            .map(|resolved_header| {
                self.file_system
                    .read_to_string(&resolved_header.path)
                    .map(|source| (resolved_header, source))
                    .map_err(|source| {
                        SurfaceError::from(IoError::with_path(&resolved_header.path, source))
                    })
            })
            .collect()
    }

    /// Finds the newest `major.minor` version directory of `relative_directory`
    /// (ex. `spb` for the SPB class extension) across the include paths
    #[must_use]
    pub fn find_latest_version_directory(
        &self,
        relative_directory: &str,
    ) -> Option<TwoPartVersion> {
        self.include_paths
            .iter()
            .filter_map(|include_path| {
                find_max_version_in_directory(include_path.join(relative_directory)).ok()
            })
            .max()
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{BuildContext, select};

    fn include_paths() -> Vec<PathBuf> {
        vec![PathBuf::from("/wdk/km"), PathBuf::from("/wdk/shared")]
    }

    #[test]
    fn first_include_path_wins() {
        let mut file_system = MockFileSystem::new();
        file_system.expect_is_file().returning(|_| true);

        let resolver = HeaderResolver::with_file_system(include_paths(), file_system);

        assert_eq!(
            resolver.resolve_header("wdf.h").unwrap(),
            ResolvedHeader {
                header: "wdf.h".to_string(),
                path: PathBuf::from("/wdk/km/wdf.h"),
            }
        );
    }

    #[test]
    fn later_include_path_is_searched() {
        let mut file_system = MockFileSystem::new();
        file_system
            .expect_is_file()
            .with(eq(Path::new("/wdk/km/spb/1.1/spbcx.h")))
            .return_const(false);
        file_system
            .expect_is_file()
            .with(eq(Path::new("/wdk/shared/spb/1.1/spbcx.h")))
            .return_const(true);

        let resolver = HeaderResolver::with_file_system(include_paths(), file_system);

        assert_eq!(
            resolver.resolve_header("spb/1.1/spbcx.h").unwrap().path,
            PathBuf::from("/wdk/shared/spb/1.1/spbcx.h")
        );
    }

    #[test]
    fn missing_header_names_header_and_search_paths() {
        let mut file_system = MockFileSystem::new();
        file_system
            .expect_is_file()
            .returning(|path| !path.ends_with("reshub.h"));

        let resolver = HeaderResolver::with_file_system(include_paths(), file_system);

        match resolver.resolve(&select(BuildContext::UserModeDriverFramework)) {
            Err(SurfaceError::MissingHeader { header, searched }) => {
                assert_eq!(header, "reshub.h");
                assert_eq!(searched, include_paths());
            }
            other => panic!("expected a missing header, got {other:?}"),
        }
    }

    #[test]
    fn resolve_keeps_surface_order() {
        let mut file_system = MockFileSystem::new();
        file_system.expect_is_file().returning(|_| true);

        let resolver = HeaderResolver::with_file_system(include_paths(), file_system);
        let surface = select(BuildContext::KernelMode);

        let headers = resolver
            .resolve(&surface)
            .unwrap()
            .into_iter()
            .map(|resolved_header| resolved_header.header)
            .collect::<Vec<_>>();
        assert_eq!(headers, surface.headers());
    }

    #[test]
    fn unreadable_header_is_an_io_error() {
        let mut file_system = MockFileSystem::new();
        file_system
            .expect_read_to_string()
            .returning(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied)));

        let resolver = HeaderResolver::with_file_system(include_paths(), file_system);
        let resolved_headers = [ResolvedHeader {
            header: "ntddk.h".to_string(),
            path: PathBuf::from("/wdk/km/ntddk.h"),
        }];

        match resolver.read_resolved(&resolved_headers) {
            Err(SurfaceError::IoError(IoError { path, source })) => {
                assert_eq!(path, PathBuf::from("/wdk/km/ntddk.h"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected an io error, got {other:?}"),
        }
    }

    #[test]
    fn latest_version_directory_across_include_paths() {
        let wdk_root = assert_fs::TempDir::new().unwrap();
        wdk_root.child("km/spb/1.0").create_dir_all().unwrap();
        wdk_root.child("shared/spb/1.1").create_dir_all().unwrap();
        wdk_root.child("um").create_dir_all().unwrap();

        let resolver = HeaderResolver::new(vec![
            wdk_root.path().join("km"),
            wdk_root.path().join("shared"),
            wdk_root.path().join("um"),
        ]);

        assert_eq!(
            resolver.find_latest_version_directory("spb"),
            Some(TwoPartVersion(1, 1))
        );
        assert_eq!(resolver.find_latest_version_directory("HidSpiCx"), None);
    }
}
