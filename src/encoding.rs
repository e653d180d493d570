//! Type encoding resolution.
//!
//! The Objective-C runtime describes every parameter and return value with a
//! short type encoding (`"Q"`, `"r*"`, `"@"`, ...). Resolution strips leading
//! method qualifiers and maps the first significant character to an
//! [`ElementKind`]. Everything here is a pure function of the encoding string.

use std::fmt::{self, Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Void,
    ByteString,
    Object,
    Class,
    Selector,
    Unsupported,
}

impl ElementKind {
    pub const COUNT: usize = 17;

    pub const ALL: [ElementKind; Self::COUNT] = [
        ElementKind::I8,
        ElementKind::I16,
        ElementKind::I32,
        ElementKind::I64,
        ElementKind::U8,
        ElementKind::U16,
        ElementKind::U32,
        ElementKind::U64,
        ElementKind::F32,
        ElementKind::F64,
        ElementKind::Bool,
        ElementKind::Void,
        ElementKind::ByteString,
        ElementKind::Object,
        ElementKind::Class,
        ElementKind::Selector,
        ElementKind::Unsupported,
    ];

    /// Position of this kind in [`ElementKind::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.is_integral() || self.is_float()
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::I8 => "int8",
            ElementKind::I16 => "int16",
            ElementKind::I32 => "int32",
            ElementKind::I64 => "int64",
            ElementKind::U8 => "uint8",
            ElementKind::U16 => "uint16",
            ElementKind::U32 => "uint32",
            ElementKind::U64 => "uint64",
            ElementKind::F32 => "float",
            ElementKind::F64 => "double",
            ElementKind::Bool => "bool",
            ElementKind::Void => "void",
            ElementKind::ByteString => "char *",
            ElementKind::Object => "id",
            ElementKind::Class => "Class",
            ElementKind::Selector => "SEL",
            ElementKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// const, in, inout, out, bycopy, byref, oneway
pub const QUALIFIERS: [char; 7] = ['r', 'n', 'N', 'o', 'O', 'R', 'V'];

pub fn strip_qualifiers(encoding: &str) -> &str {
    encoding.trim_start_matches(QUALIFIERS)
}

/// Maps one significant encoding character to its kind.
///
/// `l`/`L` are 32 bits wide in the runtime's encoding on every platform,
/// whatever the width of the C `long` that produced them.
pub fn kind_for(c: char) -> Option<ElementKind> {
    let kind = match c {
        'c' => ElementKind::I8,
        's' => ElementKind::I16,
        'i' | 'l' => ElementKind::I32,
        'q' => ElementKind::I64,
        'C' => ElementKind::U8,
        'S' => ElementKind::U16,
        'I' | 'L' => ElementKind::U32,
        'Q' => ElementKind::U64,
        'f' => ElementKind::F32,
        'd' => ElementKind::F64,
        'B' => ElementKind::Bool,
        'v' => ElementKind::Void,
        '*' => ElementKind::ByteString,
        '@' => ElementKind::Object,
        '#' => ElementKind::Class,
        ':' => ElementKind::Selector,
        // structs, arrays, unions, pointers, bitfields, unknown, long double,
        // complex and atoms are all recognized but not marshalled
        '{' | '[' | '(' | '^' | 'b' | '?' | 'D' | 'j' | '%' => ElementKind::Unsupported,
        _ => return None,
    };
    Some(kind)
}

/// Resolves an encoding to its kind and the text following the significant
/// character.
///
/// An empty encoding, one made only of qualifiers, or one starting with an
/// unknown character resolves to `None`; in the last case the remainder
/// still starts at the unknown character.
pub fn resolve(encoding: &str) -> (Option<ElementKind>, &str) {
    let stripped = strip_qualifiers(encoding);
    let mut chars = stripped.chars();
    match chars.next() {
        None => (None, stripped),
        Some(c) => match kind_for(c) {
            Some(kind) => (Some(kind), chars.as_str()),
            None => (None, stripped),
        },
    }
}
