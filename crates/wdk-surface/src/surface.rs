// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Selection of the WDK declaration groups exposed to binding generation.
//!
//! The set of declarations visible to the binding generator depends on the
//! [`BuildContext`]: kernel-mode builds see the native kernel interface and
//! the kernel-only helper headers, UMDF builds see only the user-mode system
//! interface plus the framework, and plain user-mode builds see everything
//! that is not tied to the kernel or to a driver framework. [`select`] maps a
//! context to an ordered [`DeclarationSurface`] as a pure function, so the
//! selection can be inspected and tested without invoking a generator.

use std::{collections::HashSet, fmt};

use crate::{BuildContext, ShimRegistry, SurfaceOptions, TypeShim};

/// Name of the generated wrapper header, as seen by the binding generator
pub const WRAPPER_HEADER_NAME: &str = "wdk-surface-input.h";

/// Matches every header of the WDF family, including the versioned
/// `wdf/kmdf/x.y` and `wdf/umdf/x.y` directories
const WDF_FILE_PATTERN: &str = "(?i).*wdf.*";

/// The subsystem a [`DeclarationGroup`] belongs to. The variant order is the
/// order subsystems appear in a [`DeclarationSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subsystem {
    /// Native system interface and the kernel-mode helper headers
    Core,
    /// Human Interface Devices
    Hid,
    /// Universal Serial Bus
    Usb,
    /// Storage and USB Device Emulation
    StorageAndUde,
    /// Serial Peripheral Bus, Resource Hub, PWM and GPIO
    PeripheralBus,
    /// Parallel and serial ports
    Ports,
    /// Windows Driver Frameworks
    Framework,
    /// TraceLogging
    Diagnostics,
}

/// The build contexts a declaration group (or supplemental type) is admitted
/// to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inclusion {
    /// Every build context
    Always,
    /// Kernel-mode only
    KernelModeOnly,
    /// Every context except kernel-mode
    NonKernelModeOnly,
    /// Every context except UMDF
    OutsideUserModeDriverFramework,
    /// Kernel-mode and UMDF
    DriverFrameworkOnly,
}

/// A named set of WDK headers that is either exposed or hidden as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclarationGroup {
    /// Native kernel interface
    NtKernel,
    /// Native user-mode system interface
    Windows,
    /// Kernel-mode safe integer functions
    KernelSafeInteger,
    /// Kernel-mode safe string functions
    KernelSafeString,
    /// Power engine plug-in framework
    PowerFramework,
    /// HID class driver interfaces
    HidClass,
    /// HID parser and preparsed data interfaces
    HidExtended,
    /// HID over SPI class extension
    HidSpiCx,
    /// Legacy keyboard and mouse filter interfaces
    KeyboardMouseFilter,
    /// Virtual HID framework
    VirtualHid,
    /// USB specification definitions
    UsbSpec,
    /// USB bus and client driver interfaces
    UsbBus,
    /// USB function controller interfaces
    UsbFunction,
    /// Storage device interfaces
    Storage,
    /// USB Device Emulation class extension
    UsbDeviceEmulation,
    /// Serial Peripheral Bus
    Spb,
    /// Serial Peripheral Bus controller class extension
    SpbCx,
    /// Resource Hub
    ResourceHub,
    /// Pulse Width Modulation
    Pwm,
    /// General-Purpose I/O
    Gpio,
    /// General-Purpose I/O controller class extension
    GpioClx,
    /// Parallel port
    ParallelPort,
    /// Serial port
    SerialPort,
    /// Windows Driver Frameworks
    Wdf,
    /// Windows Driver Frameworks USB extension
    WdfUsb,
    /// TraceLogging provider
    TraceLogging,
}

/// Whether an [`ExtensionMarker`] flags a known defect or planned work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Coverage is known to be wrong or incomplete
    Fixme,
    /// Coverage is intentionally narrow until follow-up work lands
    Todo,
}

/// What an [`ExtensionMarker`] is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerScope {
    /// A subsystem block of the surface
    Subsystem(Subsystem),
    /// The supplemental type definitions
    Shims,
}

/// A deliberately partial or provisional inclusion, kept visible so it can be
/// tracked and resolved on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionMarker {
    /// Where the marker applies
    pub scope: MarkerScope,
    /// Defect or planned work
    pub kind: MarkerKind,
    /// Build contexts the marker is relevant to
    pub inclusion: Inclusion,
    /// Description of the partial coverage
    pub note: &'static str,
    /// Documentation index for the affected headers
    pub reference: Option<&'static str>,
    /// [`SurfaceOptions`] keys that adjust the coverage this marker describes
    pub toggles: &'static [&'static str],
}

/// The ordered set of declaration groups and supplemental types exposed for
/// one build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationSurface {
    context: BuildContext,
    options: SurfaceOptions,
    groups: Vec<DeclarationGroup>,
    shims: Vec<&'static TypeShim>,
}

const HID_DDI_REFERENCE: &str =
    "https://learn.microsoft.com/en-us/windows-hardware/drivers/ddi/_hid/";
const STORAGE_DDI_REFERENCE: &str =
    "https://learn.microsoft.com/en-us/windows-hardware/drivers/ddi/_storage/";

static EXTENSION_MARKERS: [ExtensionMarker; 7] = [
    ExtensionMarker {
        scope: MarkerScope::Subsystem(Subsystem::Core),
        kind: MarkerKind::Fixme,
        inclusion: Inclusion::KernelModeOnly,
        note: "ntintsafe.h, ntstrsafe.h and pepfx.h should be gated behind separate features",
        reference: None,
        toggles: &["kernel-safe-integer", "kernel-safe-string", "power-framework"],
    },
    ExtensionMarker {
        scope: MarkerScope::Subsystem(Subsystem::Hid),
        kind: MarkerKind::Fixme,
        inclusion: Inclusion::OutsideUserModeDriverFramework,
        note: "hidpddi.h and hidpi.h are not exposed by default",
        reference: Some(HID_DDI_REFERENCE),
        toggles: &["hid-extended-headers"],
    },
    ExtensionMarker {
        scope: MarkerScope::Subsystem(Subsystem::Hid),
        kind: MarkerKind::Fixme,
        inclusion: Inclusion::OutsideUserModeDriverFramework,
        note: "HidSpiCx/1.0/hidspicx.h is not exposed by default",
        reference: Some(HID_DDI_REFERENCE),
        toggles: &["hid-spi-cx"],
    },
    ExtensionMarker {
        scope: MarkerScope::Subsystem(Subsystem::StorageAndUde),
        kind: MarkerKind::Fixme,
        inclusion: Inclusion::KernelModeOnly,
        note: "only ntddstor.h is exposed. Additional storage APIs are pending",
        reference: Some(STORAGE_DDI_REFERENCE),
        toggles: &["storage"],
    },
    ExtensionMarker {
        scope: MarkerScope::Subsystem(Subsystem::PeripheralBus),
        kind: MarkerKind::Todo,
        inclusion: Inclusion::Always,
        note: "SPB headers are not gated and the SPB class extension version is pinned",
        reference: None,
        toggles: &["spb-cx-version"],
    },
    ExtensionMarker {
        scope: MarkerScope::Subsystem(Subsystem::Framework),
        kind: MarkerKind::Todo,
        inclusion: Inclusion::KernelModeOnly,
        note: "WDF headers are exposed to kernel-mode builds that do not use WDF (ex. WDM)",
        reference: None,
        toggles: &[],
    },
    ExtensionMarker {
        scope: MarkerScope::Shims,
        kind: MarkerKind::Fixme,
        inclusion: Inclusion::OutsideUserModeDriverFramework,
        note: "_KGDTENTRY64 and _KIDTENTRY64 have no definition in the native headers",
        reference: None,
        toggles: &[],
    },
];

impl Subsystem {
    /// All subsystems, in surface order
    pub const ALL: [Self; 8] = [
        Self::Core,
        Self::Hid,
        Self::Usb,
        Self::StorageAndUde,
        Self::PeripheralBus,
        Self::Ports,
        Self::Framework,
        Self::Diagnostics,
    ];

    /// Short identifier, used for generated file names and cfg values
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Hid => "hid",
            Self::Usb => "usb",
            Self::StorageAndUde => "storage",
            Self::PeripheralBus => "peripheral-bus",
            Self::Ports => "ports",
            Self::Framework => "wdf",
            Self::Diagnostics => "diagnostics",
        }
    }

    /// Human readable title, used for block comments in the wrapper header
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Core => "Core",
            Self::Hid => "Human Interface Devices",
            Self::Usb => "Universal Serial Bus",
            Self::StorageAndUde => "Storage and USB Device Emulation",
            Self::PeripheralBus => "Peripheral Buses (SPB, GPIO, PWM)",
            Self::Ports => "Parallel and Serial Ports",
            Self::Framework => "Windows Driver Frameworks",
            Self::Diagnostics => "Diagnostics",
        }
    }

    /// Declaration groups of this subsystem, in surface order
    pub fn groups(self) -> impl Iterator<Item = DeclarationGroup> {
        DeclarationGroup::ALL
            .into_iter()
            .filter(move |group| group.subsystem() == self)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Inclusion {
    /// Returns `true` if this rule admits `context`
    #[must_use]
    pub const fn admits(self, context: BuildContext) -> bool {
        match self {
            Self::Always => true,
            Self::KernelModeOnly => context.is_kernel_mode(),
            Self::NonKernelModeOnly => !context.is_kernel_mode(),
            Self::OutsideUserModeDriverFramework => !context.is_user_mode_driver_framework(),
            Self::DriverFrameworkOnly => context.uses_driver_framework(),
        }
    }
}

impl DeclarationGroup {
    /// All declaration groups, in surface order
    pub const ALL: [Self; 26] = [
        Self::NtKernel,
        Self::Windows,
        Self::KernelSafeInteger,
        Self::KernelSafeString,
        Self::PowerFramework,
        Self::HidClass,
        Self::HidExtended,
        Self::HidSpiCx,
        Self::KeyboardMouseFilter,
        Self::VirtualHid,
        Self::UsbSpec,
        Self::UsbBus,
        Self::UsbFunction,
        Self::Storage,
        Self::UsbDeviceEmulation,
        Self::Spb,
        Self::SpbCx,
        Self::ResourceHub,
        Self::Pwm,
        Self::Gpio,
        Self::GpioClx,
        Self::ParallelPort,
        Self::SerialPort,
        Self::Wdf,
        Self::WdfUsb,
        Self::TraceLogging,
    ];

    /// Identifier of the group, used for cfg values and CLI output
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NtKernel => "nt-kernel",
            Self::Windows => "windows",
            Self::KernelSafeInteger => "kernel-safe-integer",
            Self::KernelSafeString => "kernel-safe-string",
            Self::PowerFramework => "power-framework",
            Self::HidClass => "hid-class",
            Self::HidExtended => "hid-extended",
            Self::HidSpiCx => "hid-spi-cx",
            Self::KeyboardMouseFilter => "keyboard-mouse-filter",
            Self::VirtualHid => "virtual-hid",
            Self::UsbSpec => "usb-spec",
            Self::UsbBus => "usb-bus",
            Self::UsbFunction => "usb-function",
            Self::Storage => "storage",
            Self::UsbDeviceEmulation => "usb-device-emulation",
            Self::Spb => "spb",
            Self::SpbCx => "spb-cx",
            Self::ResourceHub => "resource-hub",
            Self::Pwm => "pwm",
            Self::Gpio => "gpio",
            Self::GpioClx => "gpio-clx",
            Self::ParallelPort => "parallel-port",
            Self::SerialPort => "serial-port",
            Self::Wdf => "wdf",
            Self::WdfUsb => "wdf-usb",
            Self::TraceLogging => "trace-logging",
        }
    }

    /// The subsystem the group belongs to
    #[must_use]
    pub const fn subsystem(self) -> Subsystem {
        match self {
            Self::NtKernel
            | Self::Windows
            | Self::KernelSafeInteger
            | Self::KernelSafeString
            | Self::PowerFramework => Subsystem::Core,
            Self::HidClass
            | Self::HidExtended
            | Self::HidSpiCx
            | Self::KeyboardMouseFilter
            | Self::VirtualHid => Subsystem::Hid,
            Self::UsbSpec | Self::UsbBus | Self::UsbFunction => Subsystem::Usb,
            Self::Storage | Self::UsbDeviceEmulation => Subsystem::StorageAndUde,
            Self::Spb
            | Self::SpbCx
            | Self::ResourceHub
            | Self::Pwm
            | Self::Gpio
            | Self::GpioClx => Subsystem::PeripheralBus,
            Self::ParallelPort | Self::SerialPort => Subsystem::Ports,
            Self::Wdf | Self::WdfUsb => Subsystem::Framework,
            Self::TraceLogging => Subsystem::Diagnostics,
        }
    }

    /// The build contexts the group is admitted to
    #[must_use]
    pub const fn inclusion(self) -> Inclusion {
        match self {
            Self::NtKernel
            | Self::KernelSafeInteger
            | Self::KernelSafeString
            | Self::PowerFramework
            | Self::Storage
            | Self::UsbDeviceEmulation => Inclusion::KernelModeOnly,
            Self::Windows => Inclusion::NonKernelModeOnly,
            Self::HidClass
            | Self::HidExtended
            | Self::HidSpiCx
            | Self::KeyboardMouseFilter
            | Self::VirtualHid
            | Self::UsbSpec
            | Self::UsbBus
            | Self::UsbFunction => Inclusion::OutsideUserModeDriverFramework,
            Self::Wdf | Self::WdfUsb => Inclusion::DriverFrameworkOnly,
            Self::Spb
            | Self::SpbCx
            | Self::ResourceHub
            | Self::Pwm
            | Self::Gpio
            | Self::GpioClx
            | Self::ParallelPort
            | Self::SerialPort
            | Self::TraceLogging => Inclusion::Always,
        }
    }

    /// Returns `false` if `options` turns the group off. Groups without a
    /// toggle are always enabled.
    #[must_use]
    pub const fn is_enabled(self, options: &SurfaceOptions) -> bool {
        match self {
            Self::KernelSafeInteger => options.kernel_safe_integer,
            Self::KernelSafeString => options.kernel_safe_string,
            Self::PowerFramework => options.power_framework,
            Self::HidExtended => options.hid_extended_headers,
            Self::HidSpiCx => options.hid_spi_cx,
            Self::Storage => options.storage,
            Self::UsbDeviceEmulation => options.usb_device_emulation,
            _ => true,
        }
    }

    /// Headers of the group, as include paths relative to the WDK include
    /// directories
    #[must_use]
    pub fn headers(self, options: &SurfaceOptions) -> Vec<String> {
        let headers: &[&str] = match self {
            Self::NtKernel => &["ntifs.h", "ntddk.h"],
            Self::Windows => &["windows.h"],
            Self::KernelSafeInteger => &["ntintsafe.h"],
            Self::KernelSafeString => &["ntstrsafe.h"],
            Self::PowerFramework => &["pepfx.h"],
            Self::HidClass => &["hidclass.h", "hidport.h", "hidsdi.h"],
            Self::HidExtended => &["hidpddi.h", "hidpi.h"],
            Self::HidSpiCx => {
                return vec![format!(
                    "HidSpiCx/{}/hidspicx.h",
                    SurfaceOptions::HID_SPI_CX_VERSION
                )];
            }
            Self::KeyboardMouseFilter => &["kbdmou.h", "ntdd8042.h"],
            Self::VirtualHid => &["vhf.h"],
            Self::UsbSpec => &["usbspec.h"],
            Self::UsbBus => &["usb.h", "usbbusif.h", "usbioctl.h", "usbdlib.h"],
            Self::UsbFunction => &["usbfnbase.h", "usbfnattach.h", "usbfnioctl.h"],
            Self::Storage => &["ntddstor.h"],
            Self::UsbDeviceEmulation => {
                return vec![format!("ude/{}/UdeCx.h", SurfaceOptions::UDE_VERSION)];
            }
            Self::Spb => &["spb.h"],
            Self::SpbCx => return vec![format!("spb/{}/spbcx.h", options.spb_cx_version)],
            Self::ResourceHub => &["reshub.h"],
            Self::Pwm => &["pwmutil.h"],
            Self::Gpio => &["gpio.h"],
            Self::GpioClx => &["gpioclx.h"],
            Self::ParallelPort => &["ntddpar.h", "parallel.h"],
            Self::SerialPort => &["ntddser.h"],
            Self::Wdf => &["wdf.h"],
            Self::WdfUsb => &["wdfusb.h"],
            Self::TraceLogging => &["TraceLoggingProvider.h"],
        };
        headers.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for DeclarationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl MarkerKind {
    /// Comment tag the marker is rendered with
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Fixme => "FIXME",
            Self::Todo => "TODO",
        }
    }
}

impl ExtensionMarker {
    /// Every marker known to the selector, independent of build context
    #[must_use]
    pub fn all() -> &'static [Self] {
        &EXTENSION_MARKERS
    }

    /// Renders the marker as a single C++-style comment line
    #[must_use]
    pub fn render_comment(&self) -> String {
        match self.reference {
            Some(reference) => format!("// {}: {} ({reference})", self.kind.tag(), self.note),
            None => format!("// {}: {}", self.kind.tag(), self.note),
        }
    }
}

impl fmt::Display for ExtensionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            MarkerScope::Subsystem(subsystem) => subsystem.name(),
            MarkerScope::Shims => "shims",
        };
        write!(f, "[{scope}] {}: {}", self.kind.tag(), self.note)?;
        if let Some(reference) = self.reference {
            write!(f, " ({reference})")?;
        }
        if !self.toggles.is_empty() {
            write!(f, " [options: {}]", self.toggles.join(", "))?;
        }
        Ok(())
    }
}

/// Selects the declaration surface for `context` with default
/// [`SurfaceOptions`]
#[must_use]
pub fn select(context: BuildContext) -> DeclarationSurface {
    select_with(context, &SurfaceOptions::default())
}

/// Selects the declaration surface for `context`.
///
/// `options` can only remove toggled groups from, or add toggled groups to,
/// the contexts their [`Inclusion`] admits. Selection is deterministic and
/// never fails.
#[must_use]
pub fn select_with(context: BuildContext, options: &SurfaceOptions) -> DeclarationSurface {
    let groups = DeclarationGroup::ALL
        .into_iter()
        .filter(|group| group.inclusion().admits(context) && group.is_enabled(options))
        .collect::<Vec<_>>();

    let shims = ShimRegistry::builtin()
        .iter()
        .filter(|shim| shim.inclusion.admits(context))
        .collect::<Vec<_>>();

    tracing::debug!(
        %context,
        groups = groups.len(),
        shims = shims.len(),
        "selected declaration surface"
    );

    DeclarationSurface {
        context,
        options: *options,
        groups,
        shims,
    }
}

impl DeclarationSurface {
    /// The build context this surface was selected for
    #[must_use]
    pub const fn context(&self) -> BuildContext {
        self.context
    }

    /// The options this surface was selected with
    #[must_use]
    pub const fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    /// Selected declaration groups, in surface order
    #[must_use]
    pub fn groups(&self) -> &[DeclarationGroup] {
        &self.groups
    }

    /// Returns `true` if `group` is part of this surface
    #[must_use]
    pub fn contains(&self, group: DeclarationGroup) -> bool {
        self.groups.contains(&group)
    }

    /// Subsystems with at least one selected group, in surface order
    #[must_use]
    pub fn subsystems(&self) -> Vec<Subsystem> {
        let mut subsystems = self
            .groups
            .iter()
            .map(|group| group.subsystem())
            .collect::<Vec<_>>();
        subsystems.dedup();
        subsystems
    }

    /// Selected groups of `subsystem`, in surface order
    pub fn groups_in(&self, subsystem: Subsystem) -> impl Iterator<Item = DeclarationGroup> + '_ {
        self.groups
            .iter()
            .copied()
            .filter(move |group| group.subsystem() == subsystem)
    }

    /// Headers of every selected group, in surface order, without duplicates
    #[must_use]
    pub fn headers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flat_map(|group| group.headers(&self.options))
            .filter(|header| seen.insert(header.clone()))
            .collect()
    }

    /// Headers of the selected groups of `subsystem`, in surface order
    #[must_use]
    pub fn subsystem_headers(&self, subsystem: Subsystem) -> Vec<String> {
        self.groups_in(subsystem)
            .flat_map(|group| group.headers(&self.options))
            .collect()
    }

    /// Supplemental type definitions emitted with this surface
    #[must_use]
    pub fn shims(&self) -> &[&'static TypeShim] {
        &self.shims
    }

    /// Pending-coverage markers relevant to this surface
    pub fn markers(&self) -> impl Iterator<Item = &'static ExtensionMarker> + '_ {
        ExtensionMarker::all().iter().filter(|marker| {
            marker.inclusion.admits(self.context)
                && match marker.scope {
                    MarkerScope::Subsystem(subsystem) => {
                        self.groups_in(subsystem).next().is_some()
                    }
                    MarkerScope::Shims => !self.shims.is_empty(),
                }
        })
    }

    /// `allowlist_file` patterns of the files whose items a `subsystem`
    /// generator pass emits.
    ///
    /// Framework claims every file with `wdf` in its path, since `wdf.h` pulls
    /// in the rest of the `Wdf*.h` family. Core has no allowlist: its pass
    /// takes every file the other selected subsystems do not claim (see
    /// [`DeclarationSurface::blocklist_patterns`]), which is where `wdm.h` and
    /// the other transitively included system headers end up.
    #[must_use]
    pub fn allowlist_patterns(&self, subsystem: Subsystem) -> Vec<String> {
        match subsystem {
            Subsystem::Core => vec![],
            Subsystem::Framework => {
                if self.groups_in(subsystem).next().is_some() {
                    vec![WDF_FILE_PATTERN.to_string()]
                } else {
                    vec![]
                }
            }
            _ => self
                .subsystem_headers(subsystem)
                .iter()
                .map(|header| {
                    let file_name = header.rsplit('/').next().unwrap_or(header);
                    format!("(?i).*{}", regex::escape(file_name))
                })
                .collect(),
        }
    }

    /// `blocklist_file` patterns of the files a `subsystem` generator pass
    /// must leave to other passes.
    ///
    /// Only the Core pass has any: the allowlist patterns of every other
    /// selected subsystem. Together with
    /// [`DeclarationSurface::allowlist_patterns`] this assigns every file to
    /// exactly one pass.
    #[must_use]
    pub fn blocklist_patterns(&self, subsystem: Subsystem) -> Vec<String> {
        if subsystem != Subsystem::Core {
            return vec![];
        }
        self.subsystems()
            .into_iter()
            .filter(|other| *other != Subsystem::Core)
            .flat_map(|other| self.allowlist_patterns(other))
            .collect()
    }

    /// Renders the C wrapper header the binding generator is invoked on
    #[must_use]
    pub fn render_wrapper_header(&self) -> String {
        let mut out = format!(
            "// Declaration surface for the `{}` build context.\n// Generated by wdk-surface. \
             Do not edit.\n\n#pragma once\n",
            self.context
        );

        for subsystem in self.subsystems() {
            out.push_str(&format!("\n// {}\n", subsystem.title()));
            for marker in self
                .markers()
                .filter(|marker| marker.scope == MarkerScope::Subsystem(subsystem))
            {
                out.push_str(&marker.render_comment());
                out.push('\n');
            }
            for header in self.subsystem_headers(subsystem) {
                out.push_str(&format!("#include \"{header}\"\n"));
            }
        }

        if !self.shims.is_empty() {
            out.push_str("\n// Supplemental Type Definitions\n");
            for marker in self
                .markers()
                .filter(|marker| marker.scope == MarkerScope::Shims)
            {
                out.push_str(&marker.render_comment());
                out.push('\n');
            }
            for shim in &self.shims {
                out.push('\n');
                out.push_str(&shim.render_c());
            }
        }

        out
    }

    /// Changes in groups, headers and supplemental types going from this
    /// surface to `other`. Added entries are in `other`'s order, removed
    /// entries in this surface's order.
    #[must_use]
    pub fn diff(&self, other: &Self) -> SurfaceDiff {
        fn changes<T: PartialEq + Clone>(from: &[T], to: &[T]) -> (Vec<T>, Vec<T>) {
            let added = to.iter().filter(|&item| !from.contains(item)).cloned();
            let removed = from.iter().filter(|&item| !to.contains(item)).cloned();
            (added.collect(), removed.collect())
        }

        let shim_tags = |surface: &Self| {
            surface
                .shims
                .iter()
                .map(|shim| shim.tag)
                .collect::<Vec<_>>()
        };

        let (added_groups, removed_groups) = changes(&self.groups, &other.groups);
        let (added_headers, removed_headers) = changes(&self.headers(), &other.headers());
        let (added_shims, removed_shims) = changes(&shim_tags(self), &shim_tags(other));

        SurfaceDiff {
            added_groups,
            removed_groups,
            added_headers,
            removed_headers,
            added_shims,
            removed_shims,
        }
    }
}

/// Differences between two [`DeclarationSurface`]s, as returned by
/// [`DeclarationSurface::diff`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceDiff {
    /// Groups only the second surface selects
    pub added_groups: Vec<DeclarationGroup>,
    /// Groups only the first surface selects
    pub removed_groups: Vec<DeclarationGroup>,
    /// Headers only the second surface exposes
    pub added_headers: Vec<String>,
    /// Headers only the first surface exposes
    pub removed_headers: Vec<String>,
    /// Tags of the supplemental types only the second surface emits
    pub added_shims: Vec<&'static str>,
    /// Tags of the supplemental types only the first surface emits
    pub removed_shims: Vec<&'static str>,
}

impl SurfaceDiff {
    /// Returns `true` when both surfaces expose the same declarations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl fmt::Display for SurfaceDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn to_strings<T: ToString>(entries: &[T]) -> Vec<String> {
            entries.iter().map(ToString::to_string).collect()
        }

        for (sign, kind, entries) in [
            ('-', "group", to_strings(&self.removed_groups)),
            ('+', "group", to_strings(&self.added_groups)),
            ('-', "header", to_strings(&self.removed_headers)),
            ('+', "header", to_strings(&self.added_headers)),
            ('-', "shim", to_strings(&self.removed_shims)),
            ('+', "shim", to_strings(&self.added_shims)),
        ] {
            for entry in entries {
                writeln!(f, "{sign} {kind} {entry}")?;
            }
        }
        Ok(())
    }
}
