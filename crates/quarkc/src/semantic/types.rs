//! Resolved types and the lexically-nested symbol table (spec §3 "Type",
//! "Symbol table").

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Double,
    Bool,
    Str,
    Void,
    Null,
    Struct(String),
    Pointer(Box<Type>, u32),
    /// `size_or_zero == 0` means a dynamically-sized `T[]`.
    Array(Box<Type>, u32),
    Unknown,
}

impl Type {
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Double)
    }

    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    #[must_use]
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Self::Pointer(..) | Self::Str | Self::Struct(_) | Self::Null)
    }

    /// The wider of two floating types, used when promoting mixed
    /// arithmetic (spec §4.3 "promoted to the wider floating type").
    #[must_use]
    pub fn wider_float(a: &Self, b: &Self) -> Self {
        if matches!(a, Self::Double) || matches!(b, Self::Double) {
            Self::Double
        } else {
            Self::Float
        }
    }

    #[must_use]
    pub fn pointer_to(self) -> Self {
        match self {
            Self::Pointer(pointee, depth) => Self::Pointer(pointee, depth + 1),
            other => Self::Pointer(Box::new(other), 1),
        }
    }

    /// `null` is compatible with any pointer or struct-pointer type but not
    /// with scalars (spec §4.3's explicit open decision, [Open Question] §9
    /// answered in full in the design notes).
    #[must_use]
    pub fn accepts_null(&self) -> bool {
        matches!(self, Self::Pointer(..) | Self::Struct(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Bool => write!(f, "bool"),
            Self::Str => write!(f, "str"),
            Self::Void => write!(f, "void"),
            Self::Null => write!(f, "null"),
            Self::Struct(name) => write!(f, "{name}"),
            Self::Pointer(pointee, depth) => write!(f, "{pointee}{}", "*".repeat(*depth as usize)),
            Self::Array(element, 0) => write!(f, "{element}[]"),
            Self::Array(element, size) => write!(f, "{element}[{size}]"),
            Self::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// Layout of one struct declaration, flattened once rather than re-walked
/// per lookup (spec §3 "Struct record", §9 "resolved once into a flat
/// record").
#[derive(Debug, Clone)]
pub struct StructRecord {
    pub name: String,
    pub parent: Option<String>,
    /// Declaration order, parent fields first when the struct has a parent
    /// (spec §4.4.5 "prepends the parent's fields").
    pub fields: Vec<(String, Type)>,
    pub method_names: Vec<String>,
}

impl StructRecord {
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|(field_name, _)| field_name == name).map(|(_, ty)| ty)
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(field_name, _)| field_name == name)
    }
}

/// All struct records known to the current compilation, keyed by name.
#[derive(Debug, Default)]
pub struct StructRegistry {
    records: HashMap<String, StructRecord>,
}

impl StructRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: StructRecord) {
        self.records.insert(record.name.clone(), record);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StructRecord> {
        self.records.get(name)
    }

    /// Resolves field lookups by walking the parent chain, child first
    /// (spec §4.4.5 "method lookup searches child first, then parents" —
    /// fields share the same search order for name resolution purposes).
    #[must_use]
    pub fn resolve_field(&self, struct_name: &str, field: &str) -> Option<&Type> {
        let mut current = self.records.get(struct_name);
        while let Some(record) = current {
            if let Some(ty) = record.field_type(field) {
                return Some(ty);
            }
            current = record.parent.as_deref().and_then(|parent| self.records.get(parent));
        }
        None
    }

    #[must_use]
    pub fn is_acyclic(&self, struct_name: &str) -> bool {
        let mut seen = std::collections::HashSet::new();
        let mut current = Some(struct_name);
        while let Some(name) = current {
            if !seen.insert(name) {
                return false;
            }
            current = self.records.get(name).and_then(|record| record.parent.as_deref());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_registry_resolves_inherited_fields() {
        let mut registry = StructRegistry::new();
        registry.insert(StructRecord {
            name: "Base".to_owned(),
            parent: None,
            fields: vec![("id".to_owned(), Type::Int)],
            method_names: vec![],
        });
        registry.insert(StructRecord {
            name: "Child".to_owned(),
            parent: Some("Base".to_owned()),
            fields: vec![("extra".to_owned(), Type::Bool)],
            method_names: vec![],
        });
        assert_eq!(registry.resolve_field("Child", "id"), Some(&Type::Int));
        assert_eq!(registry.resolve_field("Child", "extra"), Some(&Type::Bool));
        assert!(registry.is_acyclic("Child"));
    }
}
