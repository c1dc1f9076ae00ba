//! Source datatypes and their IR representations.
//!
//! A [`Datatype`] is what the programmer wrote; an [`IrType`] is how
//! the value is represented in the emitted IR. The mapping between the
//! two depends on the target word width for `ptr` and array slots.

use std::fmt;

/// Built-in base datatypes of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    /// Signed 64-bit integer.
    Int,
    /// Pointer to bytes.
    Str,
    Void,
    /// 8-bit character.
    Chr,
    /// Integer wide enough to hold a native pointer.
    Ptr,
    Int32,
    Int16,
}

impl BaseType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(BaseType::Int),
            "str" => Some(BaseType::Str),
            "void" => Some(BaseType::Void),
            "chr" => Some(BaseType::Chr),
            "ptr" => Some(BaseType::Ptr),
            "int32" => Some(BaseType::Int32),
            "int16" => Some(BaseType::Int16),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseType::Int => "int",
            BaseType::Str => "str",
            BaseType::Void => "void",
            BaseType::Chr => "chr",
            BaseType::Ptr => "ptr",
            BaseType::Int32 => "int32",
            BaseType::Int16 => "int16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datatype {
    pub base: BaseType,
    pub is_array: bool,
}

impl Datatype {
    pub fn scalar(base: BaseType) -> Self {
        Datatype {
            base,
            is_array: false,
        }
    }

    pub fn array(base: BaseType) -> Self {
        Datatype {
            base,
            is_array: true,
        }
    }

    /// Whether indexing this variable addresses memory rather than bits.
    ///
    /// Arrays and `str` are pointers; every other scalar is a bit-set.
    pub fn is_memory_indexed(&self) -> bool {
        self.is_array || self.base == BaseType::Str
    }

    /// IR representation for a target with `word_bits`-wide pointers.
    pub fn ir_type(&self, word_bits: u32) -> IrType {
        let single = match self.base {
            BaseType::Int => IrType::Int(64),
            BaseType::Str => IrType::pointer_to(IrType::Int(8)),
            BaseType::Void => IrType::Void,
            BaseType::Chr => IrType::Int(8),
            BaseType::Ptr => IrType::Int(word_bits),
            BaseType::Int32 => IrType::Int(32),
            BaseType::Int16 => IrType::Int(16),
        };
        if self.is_array {
            IrType::pointer_to(single)
        } else {
            single
        }
    }

    /// Size in bytes used by offset layouts.
    pub fn size_in_bytes(&self, word_bits: u32) -> i64 {
        let word = i64::from(word_bits / 8);
        if self.is_array {
            return word;
        }
        match self.base {
            BaseType::Int => 8,
            BaseType::Str | BaseType::Ptr => word,
            BaseType::Void => 0,
            BaseType::Chr => 1,
            BaseType::Int32 => 4,
            BaseType::Int16 => 2,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.name())?;
        if self.is_array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// Representation of a value in the emitted IR.
///
/// Pointers are printed opaquely as `ptr`; the pointee is kept so that
/// element accesses know what to load and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Void,
    Int(u32),
    Ptr(Box<IrType>),
}

impl IrType {
    pub fn pointer_to(pointee: IrType) -> IrType {
        IrType::Ptr(Box::new(pointee))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Two types with the same representation need no conversion.
    pub fn same_repr(&self, other: &IrType) -> bool {
        match (self, other) {
            (IrType::Ptr(_), IrType::Ptr(_)) => true,
            _ => self == other,
        }
    }

    /// Literal zero of this type, used for default initializers.
    pub fn zero(&self) -> &'static str {
        match self {
            IrType::Ptr(_) => "null",
            _ => "0",
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => f.write_str("void"),
            IrType::Int(bits) => write!(f, "i{bits}"),
            IrType::Ptr(_) => f.write_str("ptr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_datatypes_to_ir() {
        assert_eq!(Datatype::scalar(BaseType::Int).ir_type(64), IrType::Int(64));
        assert_eq!(Datatype::scalar(BaseType::Chr).ir_type(64), IrType::Int(8));
        assert_eq!(Datatype::scalar(BaseType::Ptr).ir_type(32), IrType::Int(32));
        assert_eq!(
            Datatype::array(BaseType::Int16).ir_type(64),
            IrType::pointer_to(IrType::Int(16))
        );
        assert_eq!(
            Datatype::array(BaseType::Str).ir_type(64),
            IrType::pointer_to(IrType::pointer_to(IrType::Int(8)))
        );
        assert_eq!(Datatype::scalar(BaseType::Str).ir_type(64).to_string(), "ptr");
    }

    #[test]
    fn sizes_follow_word_width() {
        assert_eq!(Datatype::scalar(BaseType::Ptr).size_in_bytes(64), 8);
        assert_eq!(Datatype::scalar(BaseType::Ptr).size_in_bytes(32), 4);
        assert_eq!(Datatype::array(BaseType::Chr).size_in_bytes(32), 4);
        assert_eq!(Datatype::scalar(BaseType::Int16).size_in_bytes(64), 2);
    }

    #[test]
    fn pointers_share_representation() {
        let bytes = IrType::pointer_to(IrType::Int(8));
        let words = IrType::pointer_to(IrType::Int(64));
        assert!(bytes.same_repr(&words));
        assert!(!IrType::Int(8).same_repr(&IrType::Int(16)));
    }

    #[test]
    fn only_arrays_and_strings_index_memory() {
        assert!(Datatype::array(BaseType::Int).is_memory_indexed());
        assert!(Datatype::scalar(BaseType::Str).is_memory_indexed());
        assert!(!Datatype::scalar(BaseType::Int).is_memory_indexed());
        assert!(!Datatype::scalar(BaseType::Ptr).is_memory_indexed());
    }
}
