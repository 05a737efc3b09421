//! Type descriptors for the Oberon-0 language: the primitive `integer`
//! and `bool` types plus composite array and record types.
//!
//! Every type has a byte size that is computable at declaration time;
//! there are no generic or variable-length types. Composite types are
//! shared through `Rc` because several declarations may name the same
//! type declaration.

use std::rc::Rc;

/// The size of a machine word in bytes. Addresses and scalars occupy one
/// word.
pub const WORD_SIZE: i32 = 4;

/// A field of a record type, with its byte offset within the record.
#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub offset: i32,
    pub ty: Rc<Type>,
}

/// An array type: a fixed number of elements of one base type.
#[derive(Debug)]
pub struct ArrayType {
    pub length: i32,
    pub element: Rc<Type>,
    size: i32,
}

/// A record type: a sequence of named fields at fixed offsets.
#[derive(Debug)]
pub struct RecordType {
    pub fields: Vec<Field>,
    size: i32,
}

/// An Oberon-0 type descriptor.
#[derive(Debug)]
pub enum Type {
    Bool,
    Int,
    Array(ArrayType),
    Record(RecordType),
}

impl Type {
    /// Creates an array type of `length` elements.
    pub fn array(length: i32, element: Rc<Type>) -> Self {
        let size = length * element.size();
        Type::Array(ArrayType {
            length,
            element,
            size,
        })
    }

    /// Creates a record type, assigning each field the next free offset.
    pub fn record(fields: Vec<(String, Rc<Type>)>) -> Self {
        let mut offset = 0;
        let fields = fields
            .into_iter()
            .map(|(name, ty)| {
                let field = Field {
                    name,
                    offset,
                    ty: ty.clone(),
                };
                offset += ty.size();
                field
            })
            .collect();
        Type::Record(RecordType {
            fields,
            size: offset,
        })
    }

    /// The size of a value of this type in bytes.
    pub fn size(&self) -> i32 {
        match self {
            Type::Bool | Type::Int => WORD_SIZE,
            Type::Array(array) => array.size,
            Type::Record(record) => record.size,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    /// True for types whose values fit a register and may be assigned
    /// directly.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Bool | Type::Int)
    }

    /// Finds a field of a record type by name.
    pub fn find_field(&self, name: &str) -> Option<&Field> {
        match self {
            Type::Record(record) => record.fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Type compatibility: scalars are compatible structurally; composite
    /// types only by identity, that is, when both sides refer to the same
    /// type declaration.
    pub fn compatible(a: &Rc<Type>, b: &Rc<Type>) -> bool {
        match (a.as_ref(), b.as_ref()) {
            (Type::Bool, Type::Bool) | (Type::Int, Type::Int) => true,
            _ => Rc::ptr_eq(a, b),
        }
    }
}
