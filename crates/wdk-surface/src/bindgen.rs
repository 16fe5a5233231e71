// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

use std::{
    borrow::Borrow,
    path::{Path, PathBuf},
};

use bindgen::{
    Builder,
    CodegenConfig,
    callbacks::{ItemInfo, ItemKind, ParseCallbacks},
};

use crate::{
    Config,
    ConfigError,
    DeclarationSurface,
    IoError,
    Subsystem,
    SurfaceError,
    surface::WRAPPER_HEADER_NAME,
};

/// An extension trait that provides a way to create a [`bindgen::Builder`]
/// configured for generating bindings to a WDK declaration surface
pub trait BuilderExt {
    /// Returns a `bindgen::Builder` whose only input is the wrapper header of
    /// `surface`, with the default configuration for generation of bindings
    /// to the WDK
    ///
    /// # Errors
    ///
    /// Implementation may return `wdk_surface::ConfigError` if it fails to
    /// create a builder
    fn wdk_surface_default(
        surface: &DeclarationSurface,
        config: impl Borrow<Config>,
    ) -> Result<Builder, ConfigError>;

    /// Restricts code generation to declarations from the files `subsystem`
    /// claims, so that no item is generated by two subsystem passes
    #[must_use]
    fn allowlist_subsystem(self, surface: &DeclarationSurface, subsystem: Subsystem) -> Builder;
}

#[derive(Debug)]
struct WdkCallbacks {
    wdf_function_table_symbol_name: Option<String>,
}

impl BuilderExt for Builder {
    /// Returns a `bindgen::Builder` whose only input is the wrapper header of
    /// `surface`, with the default configuration for generation of bindings
    /// to the WDK
    ///
    /// # Errors
    ///
    /// Will return `wdk_surface::ConfigError` if the [`Config`] is
    /// inconsistent or if any of the resolved include paths do not exist
    fn wdk_surface_default(
        surface: &DeclarationSurface,
        config: impl Borrow<Config>,
    ) -> Result<Self, ConfigError> {
        let config = config.borrow();

        let builder = Self::default()
            .header_contents(WRAPPER_HEADER_NAME, &surface.render_wrapper_header())
            .use_core() // Can't use std for kernel code
            .derive_default(true) // allows for default initializing structs
            // CStr types are safer and easier to work with when interacting with string constants
            // from C
            .generate_cstr(true)
            // Building in eWDK can pollute system search path when clang-sys tries to detect
            // c_search_paths
            .detect_include_paths(false)
            .clang_args(config.get_include_paths()?.iter().map(|include_path| {
                format!("--include-directory={}", include_path.to_string_lossy())
            }))
            .clang_args(
                config
                    .get_preprocessor_definitions_iter()
                    .map(|(key, value)| {
                        format!(
                            "--define-macro={key}{}",
                            value.map(|v| format!("={v}")).unwrap_or_default()
                        )
                    })
                    .chain(Config::wdk_bindgen_compiler_flags()),
            )
            .blocklist_item("ExAllocatePoolWithTag") // Deprecated
            .blocklist_item("ExAllocatePoolWithQuotaTag") // Deprecated
            .blocklist_item("ExAllocatePoolWithTagPriority") // Deprecated
            .blocklist_item("ExAllocatePool") // Deprecated
            // FIXME: bitfield generated with non-1byte alignment in _MCG_CAP
            .blocklist_item(".*MCG_CAP(?:__bindgen.*)?")
            .blocklist_item(".*WHEA_XPF_MCA_SECTION")
            .blocklist_item(".*WHEA_ARM_BUS_ERROR(?:__bindgen.*)?")
            .blocklist_item(".*WHEA_ARM_PROCESSOR_ERROR")
            .blocklist_item(".*WHEA_ARM_CACHE_ERROR");

        let builder = DECLARED_HANDLE_TYPES
            .iter()
            .fold(builder, |builder, handle_type| builder.opaque_type(*handle_type))
            // FIXME: arrays with more than 32 entries currently fail to generate a `Default`` impl: https://github.com/rust-lang/rust-bindgen/issues/2803
            .no_default(".*tagMONITORINFOEXA")
            .must_use_type("NTSTATUS")
            .must_use_type("HRESULT")
            // Defaults enums to generate as a set of constants contained in a module (default value
            // is EnumVariation::Consts which generates enums as global constants)
            .default_enum_style(bindgen::EnumVariation::ModuleConsts)
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .parse_callbacks(Box::new(WdkCallbacks::new(config)))
            .formatter(bindgen::Formatter::Prettyplease);

        Ok(builder)
    }

    fn allowlist_subsystem(self, surface: &DeclarationSurface, subsystem: Subsystem) -> Self {
        let builder = surface
            .allowlist_patterns(subsystem)
            .iter()
            .fold(self, |builder, pattern| builder.allowlist_file(pattern));
        surface
            .blocklist_patterns(subsystem)
            .iter()
            .fold(builder, |builder, pattern| builder.blocklist_file(pattern))
    }
}

/// Handle types declared with `DECLARE_HANDLE`, which are generated as opaque
/// types
const DECLARED_HANDLE_TYPES: &[&str] = &[
    // wdm.h
    "POHANDLE__",
    "PO_EPM_HANDLE__",
    // wdf_types.h
    "WDFDRIVER__",
    "WDFDEVICE__",
    "WDFWMIPROVIDER__",
    "WDFWMIINSTANCE__",
    "WDFQUEUE__",
    "WDFREQUEST__",
    "WDFFILEOBJECT__",
    "WDFDPC__",
    "WDFTIMER__",
    "WDFWORKITEM__",
    "WDFINTERRUPT__",
    "WDFWAITLOCK__",
    "WDFSPINLOCK__",
    "WDFMEMORY__",
    "WDFLOOKASIDE__",
    "WDFIOTARGET__",
    "WDFUSBDEVICE__",
    "WDFUSBINTERFACE__",
    "WDFUSBPIPE__",
    "WDFDMAENABLER__",
    "WDFDMATRANSACTION__",
    "WDFCOMMONBUFFER__",
    "WDFKEY__",
    "WDFSTRING__",
    "WDFCOLLECTION__",
    "WDFCHILDLIST__",
    "WDFIORESREQLIST__",
    "WDFIORESLIST__",
    "WDFCMRESLIST__",
    "WDFCOMPANION__",
    "WDFTASKQUEUE__",
    "WDFCOMPANIONTARGET__",
    // minwindef.h
    "HKEY__",
    "HMETAFILE__",
    "HINSTANCE__",
    "HRGN__",
    "HRSRC__",
    "HSPRITE__",
    "HLSURF__",
    "HSTR__",
    "HTASK__",
    "HWINSTA__",
    "HKL__",
    // windef.h
    "HWND__",
    "HHOOK__",
    "HEVENT__",
    "HGDIOBJ__",
    "HACCEL__",
    "HBITMAP__",
    "HBRUSH__",
    "HCOLORSPACE__",
    "HDC__",
    "HGLRC__",
    "HDESK__",
    "HENHMETAFILE__",
    "HFONT__",
    "HICON__",
    "HMENU__",
    "HPALETTE__",
    "HPEN__",
    "HWINEVENTHOOK__",
    "HMONITOR__",
    "HUMPD__",
    "HCURSOR__",
    "DPI_AWARENESS_CONTEXT__",
    // WinUser.h
    "HTOUCHINPUT__",
    "HSYNTHETICPOINTERDEVICE__",
    "HRAWINPUT__",
    "HGESTUREINFO__",
    // WinNls.h
    "HSAVEDUILANGUAGES__",
];

impl ParseCallbacks for WdkCallbacks {
    fn generated_name_override(&self, item_info: ItemInfo) -> Option<String> {
        // Override the generated name for the WDF function table symbol, since bindgen is unable to currently translate the #define automatically: https://github.com/rust-lang/rust-bindgen/issues/2544
        match (&self.wdf_function_table_symbol_name, item_info) {
            (
                Some(wdf_function_table_symbol_name),
                ItemInfo {
                    name: item_name,
                    kind: ItemKind::Var,
                    ..
                },
            ) if item_name == wdf_function_table_symbol_name => Some("WdfFunctions".to_string()),
            _ => None,
        }
    }
}

impl WdkCallbacks {
    fn new(config: &Config) -> Self {
        Self {
            wdf_function_table_symbol_name: config.compute_wdffunctions_symbol_name(),
        }
    }
}

/// Generate bindings for the declaration surface selected by `config` into
/// `out_dir`.
///
/// Types and constants of the whole surface are generated into `types.rs` and
/// `constants.rs`. Everything else (functions and globals) is generated into
/// one `<subsystem>.rs` file per selected subsystem, restricted to the headers
/// of that subsystem. Returns the paths of the written files.
///
/// # Errors
///
/// This function will return an error if:
/// * the [`Config`] is inconsistent, or its include paths cannot be resolved
/// * bindgen fails to generate any of the passes
/// * any of the generated files cannot be written
pub fn generate_bindings(config: &Config, out_dir: &Path) -> Result<Vec<PathBuf>, SurfaceError> {
    let surface = config.surface();
    let mut generated_files = vec![];

    for (pass, codegen_config) in [
        ("types", CodegenConfig::TYPES),
        ("constants", CodegenConfig::VARS),
    ] {
        let builder =
            Builder::wdk_surface_default(&surface, config)?.with_codegen_config(codegen_config);
        generated_files.push(write_pass(builder, pass, out_dir)?);
    }

    for subsystem in surface.subsystems() {
        let mut builder = Builder::wdk_surface_default(&surface, config)?
            .with_codegen_config((CodegenConfig::TYPES | CodegenConfig::VARS).complement())
            .allowlist_subsystem(&surface, subsystem);

        if subsystem == Subsystem::Framework {
            // WDF functions are mostly inlined dispatch wrappers
            builder = builder
                .clang_arg("-fkeep-inline-functions")
                .generate_inline_functions(true);
        }

        generated_files.push(write_pass(builder, subsystem.name(), out_dir)?);
    }

    tracing::info!(
        context = %surface.context(),
        files = generated_files.len(),
        out_dir = %out_dir.display(),
        "generated declaration surface bindings"
    );
    Ok(generated_files)
}

fn write_pass(builder: Builder, pass: &str, out_dir: &Path) -> Result<PathBuf, SurfaceError> {
    let output_path = out_dir.join(format!("{pass}.rs"));

    tracing::debug!(pass, "generating bindings");
    builder
        .generate()
        .map_err(|source| SurfaceError::BindingGeneration {
            pass: pass.to_string(),
            source,
        })?
        .write_to_file(&output_path)
        .map_err(|source| IoError::with_path(&output_path, source))?;

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_types_are_unique() {
        let mut handle_types = DECLARED_HANDLE_TYPES.to_vec();
        handle_types.sort_unstable();
        handle_types.dedup();
        assert_eq!(handle_types.len(), DECLARED_HANDLE_TYPES.len());
        assert!(handle_types.iter().all(|handle_type| handle_type.ends_with("__")));
    }

    #[test]
    fn callbacks_follow_pinned_framework_version() {
        let kmdf_config = Config {
            driver_config: Some(crate::DriverConfig::Kmdf(crate::KmdfConfig::new())),
            ..Config::with_wdk_content_root(
                "C:\\WDK",
                crate::CpuArchitecture::Amd64,
                crate::BuildContext::KernelMode,
            )
        };
        assert_eq!(
            WdkCallbacks::new(&kmdf_config).wdf_function_table_symbol_name,
            Some("WdfFunctions_01033".to_string())
        );

        let user_mode_config = Config::with_wdk_content_root(
            "C:\\WDK",
            crate::CpuArchitecture::Amd64,
            crate::BuildContext::UserMode,
        );
        assert_eq!(
            WdkCallbacks::new(&user_mode_config).wdf_function_table_symbol_name,
            None
        );
    }
}
