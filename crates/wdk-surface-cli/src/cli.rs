// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0
//! This module defines the top-level CLI layer, its argument types and the
//! subcommands that inspect and check a declaration surface.
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::Verbosity;
use tracing::{debug, info};
use wdk_surface::{
    BuildContext,
    Config,
    CpuArchitecture,
    DeclarationSurface,
    ExtensionMarker,
    SurfaceOptions,
    TwoPartVersion,
    detect_wdk_content_root,
    select_with,
};

const ABOUT_STRING: &str = "wdk-surface shows which Windows Driver Kit (WDK) declarations are \
                            exposed to binding generation for a build context, and checks them \
                            against a WDK installation.";

/// Coverage toggles for provisional declaration groups
#[derive(Debug, Default, Args)]
pub struct OptionArgs {
    /// Expose hidpddi.h and hidpi.h
    #[arg(long)]
    pub hid_extended_headers: bool,

    /// Expose the HID SPI class extension
    #[arg(long)]
    pub hid_spi_cx: bool,

    /// Hide ntintsafe.h in kernel-mode builds
    #[arg(long)]
    pub no_kernel_safe_integer: bool,

    /// Hide ntstrsafe.h in kernel-mode builds
    #[arg(long)]
    pub no_kernel_safe_string: bool,

    /// Hide pepfx.h in kernel-mode builds
    #[arg(long)]
    pub no_power_framework: bool,

    /// Hide ntddstor.h in kernel-mode builds
    #[arg(long)]
    pub no_storage: bool,

    /// Hide the USB device emulation class extension in kernel-mode builds
    #[arg(long)]
    pub no_usb_device_emulation: bool,

    /// Version directory of the SPB class extension header
    #[arg(long, value_name = "MAJOR.MINOR")]
    pub spb_cx_version: Option<TwoPartVersion>,
}

impl OptionArgs {
    fn to_surface_options(&self) -> SurfaceOptions {
        let defaults = SurfaceOptions::default();
        SurfaceOptions {
            hid_extended_headers: self.hid_extended_headers,
            hid_spi_cx: self.hid_spi_cx,
            kernel_safe_integer: !self.no_kernel_safe_integer,
            kernel_safe_string: !self.no_kernel_safe_string,
            power_framework: !self.no_power_framework,
            storage: !self.no_storage,
            usb_device_emulation: !self.no_usb_device_emulation,
            spb_cx_version: self.spb_cx_version.unwrap_or(defaults.spb_cx_version),
        }
    }
}

/// Arguments shared by subcommands that select a surface
#[derive(Debug, Args)]
pub struct SurfaceArgs {
    /// Build context to select the declaration surface for (kernel-mode,
    /// umdf or user-mode)
    #[arg(long, value_name = "CONTEXT")]
    pub context: BuildContext,

    #[command(flatten)]
    pub options: OptionArgs,
}

impl SurfaceArgs {
    fn select(&self) -> DeclarationSurface {
        select_with(self.context, &self.options.to_surface_options())
    }
}

/// Arguments for the `render` subcommand
#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub surface: SurfaceArgs,

    /// Write the wrapper header to this path instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `markers` subcommand
#[derive(Debug, Args)]
pub struct MarkersArgs {
    /// Only list the markers relevant to this build context
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<BuildContext>,
}

/// Arguments for the `diff` subcommand
#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Build context of the surface to compare from. Selected with the
    /// default options.
    #[arg(value_name = "FROM")]
    pub from: BuildContext,

    /// Build context of the surface to compare to. Selected with the option
    /// flags.
    #[arg(value_name = "TO")]
    pub to: BuildContext,

    #[command(flatten)]
    pub options: OptionArgs,
}

/// CPU architecture whose preprocessor definitions are used for the check
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum TargetArch {
    /// AMD64 CPU architecture
    #[default]
    X64,
    /// ARM64 CPU architecture
    Arm64,
}

impl From<TargetArch> for CpuArchitecture {
    fn from(target_arch: TargetArch) -> Self {
        match target_arch {
            TargetArch::X64 => Self::Amd64,
            TargetArch::Arm64 => Self::Arm64,
        }
    }
}

/// Arguments for the `check` subcommand
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub surface: SurfaceArgs,

    /// Root of the WDK installation. Detected from the environment when
    /// omitted.
    #[arg(long, value_name = "PATH")]
    pub wdk_content_root: Option<PathBuf>,

    /// Windows SDK version directory under `Include`. The latest installed
    /// version is used when omitted.
    #[arg(long, value_name = "VERSION")]
    pub sdk_version: Option<String>,

    /// Target architecture
    #[arg(long, ignore_case = true, default_value = "x64")]
    pub target_arch: TargetArch,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Subcmd {
    #[clap(
        name = "list",
        about = "List the subsystems, declaration groups and headers of a surface"
    )]
    List(SurfaceArgs),
    #[clap(name = "render", about = "Render the wrapper header of a surface")]
    Render(RenderArgs),
    #[clap(name = "markers", about = "List pending-coverage markers")]
    Markers(MarkersArgs),
    #[clap(
        name = "diff",
        about = "Show the groups, headers and supplemental types that differ between two surfaces"
    )]
    Diff(DiffArgs),
    #[clap(
        name = "check",
        about = "Resolve every header of a surface against a WDK installation"
    )]
    Check(CheckArgs),
}

/// Top level command line interface for wdk-surface
#[derive(Debug, Parser)]
#[clap(
    name = "wdk-surface",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = ABOUT_STRING,
    styles = clap_cargo::style::CLAP_STYLING,
)]
pub struct Cli {
    #[clap(subcommand)]
    pub sub_cmd: Subcmd,
    #[command(flatten)]
    #[clap(next_help_heading = "Verbosity")]
    pub verbose: Verbosity,
}

impl Cli {
    /// Entry point method to run the subcommand with the arguments provided by
    /// the user.
    pub fn run(self) -> Result<()> {
        match self.sub_cmd {
            Subcmd::List(cli_args) => {
                print!("{}", list_surface(&cli_args.select()));
            }
            Subcmd::Render(cli_args) => {
                let surface = cli_args.surface.select();
                let wrapper_header = surface.render_wrapper_header();
                match cli_args.output {
                    Some(output) => {
                        std::fs::write(&output, wrapper_header).with_context(|| {
                            format!("failed to write wrapper header to {}", output.display())
                        })?;
                        info!(
                            "Wrote the `{}` wrapper header to {}",
                            surface.context(),
                            output.display()
                        );
                    }
                    None => print!("{wrapper_header}"),
                }
            }
            Subcmd::Markers(cli_args) => {
                print!("{}", list_markers(cli_args.context, &SurfaceOptions::default()));
            }
            Subcmd::Diff(cli_args) => print!("{}", diff_surfaces(&cli_args)),
            Subcmd::Check(cli_args) => check_surface(cli_args)?,
        }
        Ok(())
    }
}

fn list_surface(surface: &DeclarationSurface) -> String {
    let mut out = format!("build context: {}\n", surface.context());

    for subsystem in surface.subsystems() {
        out.push_str(&format!("{subsystem} ({})\n", subsystem.title()));
        for group in surface.groups_in(subsystem) {
            out.push_str(&format!("  {group}\n"));
            for header in group.headers(surface.options()) {
                out.push_str(&format!("    {header}\n"));
            }
        }
    }

    if !surface.shims().is_empty() {
        out.push_str("supplemental types\n");
        for shim in surface.shims() {
            out.push_str(&format!(
                "  {} ({}, {}): {}\n",
                shim.tag, shim.typedef_name, shim.pointer_typedef_name, shim.reason
            ));
        }
    }
    out
}

fn list_markers(context: Option<BuildContext>, options: &SurfaceOptions) -> String {
    let markers: Vec<&ExtensionMarker> = match context {
        Some(context) => select_with(context, options).markers().collect(),
        None => ExtensionMarker::all().iter().collect(),
    };

    markers.iter().fold(String::new(), |mut out, marker| {
        out.push_str(&format!("{marker}\n"));
        out
    })
}

fn diff_surfaces(cli_args: &DiffArgs) -> String {
    let from = select_with(cli_args.from, &SurfaceOptions::default());
    let to = select_with(cli_args.to, &cli_args.options.to_surface_options());
    let diff = from.diff(&to);

    if diff.is_empty() {
        format!(
            "the `{}` and `{}` surfaces expose the same declarations\n",
            cli_args.from, cli_args.to
        )
    } else {
        diff.to_string()
    }
}

fn check_surface(cli_args: CheckArgs) -> Result<()> {
    let context = cli_args.surface.context;
    let wdk_content_root = match cli_args.wdk_content_root {
        Some(wdk_content_root) => wdk_content_root,
        None => detect_wdk_content_root().ok_or_else(|| {
            anyhow!(
                "WDKContentRoot could not be detected. Pass --wdk-content-root, or run from an \
                 eWDK prompt"
            )
        })?,
    };

    let mut config =
        Config::with_wdk_content_root(wdk_content_root, cli_args.target_arch.into(), context);
    config.options = cli_args.surface.options.to_surface_options();
    config.windows_sdk_version = cli_args.sdk_version;

    let resolved_headers = config.check_surface()?;
    for resolved_header in &resolved_headers {
        debug!(
            "{} -> {}",
            resolved_header.header,
            resolved_header.path.display()
        );
    }

    println!(
        "{} headers of the `{context}` surface resolved with no supplemental type conflicts",
        resolved_headers.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use wdk_surface::{DeclarationGroup, select};

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn option_args_default_to_surface_defaults() {
        assert_eq!(
            OptionArgs::default().to_surface_options(),
            SurfaceOptions::default()
        );
    }

    #[test]
    fn option_args_flip_toggles() {
        let cli = Cli::try_parse_from([
            "wdk-surface",
            "list",
            "--context",
            "user-mode",
            "--hid-extended-headers",
            "--no-storage",
            "--spb-cx-version",
            "1.0",
        ])
        .unwrap();

        let Subcmd::List(surface_args) = cli.sub_cmd else {
            panic!("expected the list subcommand");
        };
        let options = surface_args.options.to_surface_options();
        assert!(options.hid_extended_headers);
        assert!(!options.storage);
        assert_eq!(options.spb_cx_version, TwoPartVersion(1, 0));
        assert_eq!(surface_args.context, BuildContext::UserMode);
    }

    #[test]
    fn unknown_context_is_rejected() {
        assert!(
            Cli::try_parse_from(["wdk-surface", "list", "--context", "hypervisor"]).is_err()
        );
    }

    #[test]
    fn umdf_listing_has_no_supplemental_types() {
        let listing = list_surface(&select(BuildContext::UserModeDriverFramework));

        assert!(listing.starts_with("build context: umdf\n"));
        assert!(listing.contains(&format!("  {}\n", DeclarationGroup::Wdf)));
        assert!(!listing.contains("supplemental types"));
        assert!(!listing.contains("hidsdi.h"));
    }

    #[test]
    fn kernel_mode_listing_has_supplemental_types() {
        let listing = list_surface(&select(BuildContext::KernelMode));

        assert!(listing.contains("    ntddk.h\n"));
        assert!(listing.contains("  _KGDTENTRY64 (KGDTENTRY64, PKGDTENTRY64): "));
        assert!(listing.contains("  _KIDTENTRY64 (KIDTENTRY64, PKIDTENTRY64): "));
    }

    #[test]
    fn diff_of_option_toggle() {
        let cli = Cli::try_parse_from([
            "wdk-surface",
            "diff",
            "user-mode",
            "user-mode",
            "--hid-extended-headers",
        ])
        .unwrap();

        let Subcmd::Diff(diff_args) = cli.sub_cmd else {
            panic!("expected the diff subcommand");
        };
        assert_eq!(
            diff_surfaces(&diff_args),
            "+ group hid-extended\n+ header hidpddi.h\n+ header hidpi.h\n"
        );
    }

    #[test]
    fn diff_of_identical_surfaces() {
        let diff_args = DiffArgs {
            from: BuildContext::KernelMode,
            to: BuildContext::KernelMode,
            options: OptionArgs::default(),
        };
        assert_eq!(
            diff_surfaces(&diff_args),
            "the `kernel-mode` and `kernel-mode` surfaces expose the same declarations\n"
        );
    }

    #[test]
    fn markers_without_context_lists_every_marker() {
        assert_eq!(
            list_markers(None, &SurfaceOptions::default()).lines().count(),
            ExtensionMarker::all().len()
        );
    }

    #[test]
    fn umdf_markers_exclude_device_class_markers() {
        let markers = list_markers(
            Some(BuildContext::UserModeDriverFramework),
            &SurfaceOptions::default(),
        );

        assert!(!markers.contains("[hid]"));
        assert!(!markers.contains("[shims]"));
        assert!(markers.contains("[peripheral-bus] TODO:"));
    }
}
