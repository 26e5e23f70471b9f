use std::fmt;

/// A raw on-disk code that was either recognized as a known variant `T` or
/// kept verbatim as `Raw`.
///
/// Format fields such as vertex data types are stored as plain integers. An
/// unfamiliar code is not a decode error by itself, only a value the loader
/// has no typed meaning for, so it is preserved for callers to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Recognized<T, Raw = i32> {
    Known(T),
    Unknown(Raw),
}

/// Conversion from a raw format code into a typed variant.
pub trait FromRawCode<Raw>: Sized {
    fn from_raw_code(raw: Raw) -> Option<Self>;
}

impl<T, Raw: Copy> Recognized<T, Raw>
where
    T: FromRawCode<Raw>,
{
    pub fn from_raw(raw: Raw) -> Self {
        match T::from_raw_code(raw) {
            Some(known) => Recognized::Known(known),
            None => Recognized::Unknown(raw),
        }
    }
}

impl<T: fmt::Display, Raw: fmt::Display> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => t.fmt(f),
            Recognized::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}
