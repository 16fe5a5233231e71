// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Hand-authored supplemental type definitions.
//!
//! Some native types are only forward declared by the WDK headers, or are
//! defined with constructs the binding generator cannot translate. The
//! [`ShimRegistry`] maps each such native type name to an explicit field
//! layout, annotated with the reason the shim exists, so every entry can be
//! audited and retired on its own once the generator handles the type.

use std::path::Path;

use regex::Regex;

use crate::{Inclusion, SurfaceError};

/// A C scalar type, sized for the LLP64 data model the WDK targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    /// `unsigned char`
    UnsignedChar,
    /// `unsigned short`
    UnsignedShort,
    /// `unsigned long` (32 bits under LLP64)
    UnsignedLong,
    /// `unsigned __int64`
    UnsignedInt64,
}

impl CType {
    /// Spelling of the type in C source
    #[must_use]
    pub const fn c_name(self) -> &'static str {
        match self {
            Self::UnsignedChar => "unsigned char",
            Self::UnsignedShort => "unsigned short",
            Self::UnsignedLong => "unsigned long",
            Self::UnsignedInt64 => "unsigned __int64",
        }
    }

    /// Size in bytes. Scalars are naturally aligned, so this is also the
    /// alignment.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::UnsignedChar => 1,
            Self::UnsignedShort => 2,
            Self::UnsignedLong => 4,
            Self::UnsignedInt64 => 8,
        }
    }

    /// Width in bits
    #[must_use]
    pub const fn bits(self) -> usize {
        self.size() * 8
    }
}

/// Whether an aggregate lays its fields out sequentially or overlapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// `struct`
    Struct,
    /// `union`
    Union,
}

/// A `struct` or `union` body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aggregate {
    /// `struct` or `union`
    pub kind: AggregateKind,
    /// Fields in declaration order
    pub fields: &'static [Field],
}

/// A single member of an [`Aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    /// Member name. `None` for anonymous nested aggregates.
    pub name: Option<&'static str>,
    /// Member type
    pub ty: FieldType,
}

/// The type of a [`Field`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A plain scalar member
    Scalar(CType),
    /// A bit-field member of the given width in bits
    BitField {
        /// Declared (allocation unit) type
        ty: CType,
        /// Width in bits
        width: u8,
    },
    /// A nested `struct` or `union`
    Aggregate(Aggregate),
}

/// Size and alignment of a type, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeAndAlign {
    /// Size in bytes, including tail padding
    pub size: usize,
    /// Alignment in bytes
    pub align: usize,
}

/// One hand-authored supplemental type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeShim {
    /// Tag name of the native type (ex. `_KGDTENTRY64`)
    pub tag: &'static str,
    /// Name of the typedef for the type
    pub typedef_name: &'static str,
    /// Name of the pointer typedef for the type
    pub pointer_typedef_name: &'static str,
    /// Why automatic translation could not produce this type
    pub reason: &'static str,
    /// Build contexts the shim is emitted for
    pub inclusion: Inclusion,
    /// Expected size of the type in bytes, as defined by the processor
    pub expected_size: usize,
    /// Field layout
    pub layout: Aggregate,
}

/// A registry of [`TypeShim`]s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimRegistry {
    shims: Vec<&'static TypeShim>,
}

/// A shim whose name is already defined by a native header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConflict {
    /// The conflicting shim
    pub shim: &'static TypeShim,
    /// The name that is defined twice
    pub name: &'static str,
}

const KGDTENTRY64_BYTES: &[Field] = &[
    Field::scalar("BaseMiddle", CType::UnsignedChar),
    Field::scalar("Flags1", CType::UnsignedChar),
    Field::scalar("Flags2", CType::UnsignedChar),
    Field::scalar("BaseHigh", CType::UnsignedChar),
];

const KGDTENTRY64_BITS: &[Field] = &[
    Field::bit_field("BaseMiddle", CType::UnsignedLong, 8),
    Field::bit_field("Type", CType::UnsignedLong, 5),
    Field::bit_field("Dpl", CType::UnsignedLong, 2),
    Field::bit_field("Present", CType::UnsignedLong, 1),
    Field::bit_field("LimitHigh", CType::UnsignedLong, 4),
    Field::bit_field("System", CType::UnsignedLong, 1),
    Field::bit_field("LongMode", CType::UnsignedLong, 1),
    Field::bit_field("DefaultBig", CType::UnsignedLong, 1),
    Field::bit_field("Granularity", CType::UnsignedLong, 1),
    Field::bit_field("BaseHigh", CType::UnsignedLong, 8),
];

const KGDTENTRY64_DESCRIPTOR: &[Field] = &[
    Field::scalar("LimitLow", CType::UnsignedShort),
    Field::scalar("BaseLow", CType::UnsignedShort),
    Field::anonymous(Aggregate::union(&[
        Field::aggregate("Bytes", Aggregate::structure(KGDTENTRY64_BYTES)),
        Field::aggregate("Bits", Aggregate::structure(KGDTENTRY64_BITS)),
    ])),
    Field::scalar("BaseUpper", CType::UnsignedLong),
    Field::scalar("MustBeZero", CType::UnsignedLong),
];

const KIDTENTRY64_DESCRIPTOR: &[Field] = &[
    Field::scalar("OffsetLow", CType::UnsignedShort),
    Field::scalar("Selector", CType::UnsignedShort),
    Field::bit_field("IstIndex", CType::UnsignedShort, 3),
    Field::bit_field("Reserved0", CType::UnsignedShort, 5),
    Field::bit_field("Type", CType::UnsignedShort, 5),
    Field::bit_field("Dpl", CType::UnsignedShort, 2),
    Field::bit_field("Present", CType::UnsignedShort, 1),
    Field::scalar("OffsetMiddle", CType::UnsignedShort),
    Field::scalar("OffsetHigh", CType::UnsignedLong),
    Field::scalar("Reserved1", CType::UnsignedLong),
];

/// 64-bit segment descriptor (GDT entry)
pub static KGDTENTRY64: TypeShim = TypeShim {
    tag: "_KGDTENTRY64",
    typedef_name: "KGDTENTRY64",
    pointer_typedef_name: "PKGDTENTRY64",
    reason: "ntddk.h only forward declares this union (typedef union _KGDTENTRY64 \
             *PKGDTENTRY64), so no definition reaches the generator",
    inclusion: Inclusion::OutsideUserModeDriverFramework,
    expected_size: 16,
    layout: Aggregate::union(&[
        Field::anonymous(Aggregate::structure(KGDTENTRY64_DESCRIPTOR)),
        Field::scalar("Alignment", CType::UnsignedInt64),
    ]),
};

/// 64-bit interrupt gate descriptor (IDT entry)
pub static KIDTENTRY64: TypeShim = TypeShim {
    tag: "_KIDTENTRY64",
    typedef_name: "KIDTENTRY64",
    pointer_typedef_name: "PKIDTENTRY64",
    reason: "ntddk.h only forward declares this union (typedef union _KIDTENTRY64 \
             *PKIDTENTRY64), so no definition reaches the generator",
    inclusion: Inclusion::OutsideUserModeDriverFramework,
    expected_size: 16,
    layout: Aggregate::union(&[
        Field::anonymous(Aggregate::structure(KIDTENTRY64_DESCRIPTOR)),
        Field::scalar("Alignment", CType::UnsignedInt64),
    ]),
};

static BUILTIN_SHIMS: [&TypeShim; 2] = [&KGDTENTRY64, &KIDTENTRY64];

impl Field {
    /// A named scalar member
    #[must_use]
    pub const fn scalar(name: &'static str, ty: CType) -> Self {
        Self {
            name: Some(name),
            ty: FieldType::Scalar(ty),
        }
    }

    /// A named bit-field member
    #[must_use]
    pub const fn bit_field(name: &'static str, ty: CType, width: u8) -> Self {
        Self {
            name: Some(name),
            ty: FieldType::BitField { ty, width },
        }
    }

    /// A named nested aggregate
    #[must_use]
    pub const fn aggregate(name: &'static str, aggregate: Aggregate) -> Self {
        Self {
            name: Some(name),
            ty: FieldType::Aggregate(aggregate),
        }
    }

    /// An anonymous nested aggregate whose members are accessed directly
    #[must_use]
    pub const fn anonymous(aggregate: Aggregate) -> Self {
        Self {
            name: None,
            ty: FieldType::Aggregate(aggregate),
        }
    }
}

impl Aggregate {
    /// A `struct` body
    #[must_use]
    pub const fn structure(fields: &'static [Field]) -> Self {
        Self {
            kind: AggregateKind::Struct,
            fields,
        }
    }

    /// A `union` body
    #[must_use]
    pub const fn union(fields: &'static [Field]) -> Self {
        Self {
            kind: AggregateKind::Union,
            fields,
        }
    }

    /// Computes size and alignment the way MSVC lays out the aggregate for
    /// x64 and ARM64.
    ///
    /// Bit-fields are packed into allocation units of their declared type. A
    /// bit-field starts a new unit when its declared type differs from the
    /// open unit's or when it does not fit in the bits the unit has left.
    #[must_use]
    pub fn size_and_align(&self) -> SizeAndAlign {
        let member_layouts = self.fields.iter().map(|field| match field.ty {
            FieldType::Scalar(ty) | FieldType::BitField { ty, .. } => SizeAndAlign {
                size: ty.size(),
                align: ty.size(),
            },
            FieldType::Aggregate(aggregate) => aggregate.size_and_align(),
        });

        match self.kind {
            AggregateKind::Union => {
                let (size, align) =
                    member_layouts.fold((0_usize, 1_usize), |(size, align), member| {
                        (size.max(member.size), align.max(member.align))
                    });
                SizeAndAlign {
                    size: size.next_multiple_of(align),
                    align,
                }
            }
            AggregateKind::Struct => {
                let mut offset: usize = 0;
                let mut align: usize = 1;
                // (declared type, bits used) of the open bit-field unit
                let mut open_unit: Option<(CType, usize)> = None;

                for (field, member) in self.fields.iter().zip(member_layouts) {
                    align = align.max(member.align);

                    if let FieldType::BitField { ty, width } = field.ty {
                        let width = usize::from(width);
                        match &mut open_unit {
                            Some((unit_ty, used))
                                if *unit_ty == ty && *used + width <= ty.bits() =>
                            {
                                *used += width;
                            }
                            _ => {
                                offset = offset.next_multiple_of(member.align) + member.size;
                                open_unit = Some((ty, width));
                            }
                        }
                    } else {
                        open_unit = None;
                        offset = offset.next_multiple_of(member.align) + member.size;
                    }
                }

                SizeAndAlign {
                    size: offset.next_multiple_of(align),
                    align,
                }
            }
        }
    }

    fn write_c(&self, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        out.push_str(&format!("{pad}{{\n"));
        for field in self.fields {
            field.write_c(out, indent + 2);
        }
        out.push_str(&format!("{pad}}}"));
    }

    fn bit_field_widths_fit(&self) -> bool {
        self.fields.iter().all(|field| match field.ty {
            FieldType::Scalar(_) => true,
            FieldType::BitField { ty, width } => width > 0 && usize::from(width) <= ty.bits(),
            FieldType::Aggregate(aggregate) => aggregate.bit_field_widths_fit(),
        })
    }
}

impl AggregateKind {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Struct => "struct",
            Self::Union => "union",
        }
    }
}

impl Field {
    fn write_c(&self, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        match (self.ty, self.name) {
            (FieldType::Scalar(ty), Some(name)) => {
                out.push_str(&format!("{pad}{} {name};\n", ty.c_name()));
            }
            (FieldType::BitField { ty, width }, Some(name)) => {
                out.push_str(&format!("{pad}{} {name} : {width};\n", ty.c_name()));
            }
            (FieldType::Aggregate(aggregate), name) => {
                out.push_str(&format!("{pad}{}\n", aggregate.kind.keyword()));
                aggregate.write_c(out, indent);
                match name {
                    Some(name) => out.push_str(&format!(" {name};\n")),
                    None => out.push_str(";\n"),
                }
            }
            (FieldType::Scalar(_) | FieldType::BitField { .. }, None) => {
                unreachable!("scalar and bit-field members are always named")
            }
        }
    }
}

impl TypeShim {
    /// Size and alignment of the shim's layout
    #[must_use]
    pub fn size_and_align(&self) -> SizeAndAlign {
        self.layout.size_and_align()
    }

    /// Returns `true` when every bit-field fits its declared type and the
    /// computed size matches the processor-defined size
    #[must_use]
    pub fn is_layout_consistent(&self) -> bool {
        self.layout.bit_field_widths_fit() && self.size_and_align().size == self.expected_size
    }

    /// Every name this shim defines: the tag, the typedef and the pointer
    /// typedef
    #[must_use]
    pub const fn defined_names(&self) -> [&'static str; 3] {
        [self.tag, self.typedef_name, self.pointer_typedef_name]
    }

    /// Renders the shim as a C typedef
    #[must_use]
    pub fn render_c(&self) -> String {
        let mut out = format!("typedef {} {}\n", self.layout.kind.keyword(), self.tag);
        self.layout.write_c(&mut out, 0);
        out.push_str(&format!(
            " {}, *{};\n",
            self.typedef_name, self.pointer_typedef_name
        ));
        out
    }

    /// Returns the name of the first definition of this shim's tag or typedefs
    /// found in `header_source`. Comments are ignored.
    ///
    /// A conflict is a definition of the tag, a typedef of the typedef name,
    /// or a pointer typedef of the pointer name to some other type. Forward
    /// declarations that alias the shim's own tag (ex.
    /// `typedef union _KGDTENTRY64 *PKGDTENTRY64;`) redeclare the same type and
    /// do not conflict.
    #[must_use]
    pub fn find_definition_in(&self, header_source: &str) -> Option<&'static str> {
        let source = strip_comments(header_source);
        let keyword = self.layout.kind.keyword();

        let tag_definition = Regex::new(&format!(
            r"\b{keyword}\s+{}\s*\{{",
            regex::escape(self.tag)
        ))
        .expect("tag definition pattern should always be a valid regex");
        if tag_definition.is_match(&source) {
            return Some(self.tag);
        }

        let own_tag_alias = Regex::new(&format!(r"^{keyword}\s+{}\b", regex::escape(self.tag)))
            .expect("own tag alias pattern should always be a valid regex");
        // Declarator lists following the body of a typedef'd aggregate, or the
        // aliased type of a typedef without a body
        let typedef_declarators = Regex::new(r"\}([^;{}]*);|\btypedef\s+([^;{}]*);")
            .expect("typedef declarator pattern should always be a valid regex");
        let declarator_pattern = Regex::new(r"(\**)\s*(\w+)\s*$")
            .expect("declarator pattern should always be a valid regex");

        for captures in typedef_declarators.captures_iter(&source) {
            let declarators = match (captures.get(1), captures.get(2)) {
                (Some(after_body), _) => after_body.as_str(),
                (None, Some(alias)) if own_tag_alias.is_match(alias.as_str()) => continue,
                (None, Some(alias)) => alias.as_str(),
                (None, None) => continue,
            };

            for declarator in declarators
                .split(',')
                .filter_map(|declarator_text| declarator_pattern.captures(declarator_text))
            {
                let is_pointer = !declarator[1].is_empty();
                let name = &declarator[2];
                if !is_pointer && name == self.typedef_name {
                    return Some(self.typedef_name);
                }
                if is_pointer && name == self.pointer_typedef_name {
                    return Some(self.pointer_typedef_name);
                }
            }
        }

        None
    }
}

/// Replaces every block and line comment of C source with a single space
fn strip_comments(source: &str) -> std::borrow::Cow<'_, str> {
    Regex::new(r"(?s)/\*.*?\*/|//[^\n]*")
        .expect("comment pattern should always be a valid regex")
        .replace_all(source, " ")
}

impl ShimRegistry {
    /// The shims this crate ships with: `_KGDTENTRY64` and `_KIDTENTRY64`
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            shims: BUILTIN_SHIMS.to_vec(),
        }
    }

    /// Creates a registry from an explicit list of shims
    #[must_use]
    pub const fn from_shims(shims: Vec<&'static TypeShim>) -> Self {
        Self { shims }
    }

    /// Iterates over all registered shims
    pub fn iter(&self) -> impl Iterator<Item = &'static TypeShim> + '_ {
        self.shims.iter().copied()
    }

    /// Looks up a shim by tag, typedef or pointer typedef name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static TypeShim> {
        self.iter()
            .find(|shim| shim.defined_names().contains(&name))
    }

    /// Returns every shim whose names are already defined by
    /// `header_source`
    #[must_use]
    pub fn find_conflicts(&self, header_source: &str) -> Vec<ShimConflict> {
        self.iter()
            .filter_map(|shim| {
                shim.find_definition_in(header_source)
                    .map(|name| ShimConflict { shim, name })
            })
            .collect()
    }

    /// Checks a set of resolved native headers for definitions that would
    /// collide with a registered shim.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::ShimConflict`] naming the first header that
    /// already defines a shim's type.
    pub fn ensure_no_conflicts<'a, I, P>(&self, headers: I) -> Result<(), SurfaceError>
    where
        I: IntoIterator<Item = (P, &'a str)>,
        P: AsRef<Path>,
    {
        for (path, source) in headers {
            if let Some(conflict) = self.find_conflicts(source).into_iter().next() {
                return Err(SurfaceError::ShimConflict {
                    name: conflict.name.to_string(),
                    header: path.as_ref().to_path_buf(),
                });
            }
            tracing::trace!(header = %path.as_ref().display(), "no shim conflicts");
        }
        Ok(())
    }
}
