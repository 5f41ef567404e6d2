//! Field descriptor meta-kinds
//!
//! The name of a field descriptor's own class selects how its typed payload is read.
//! Names outside the known set parse to [`MetaKind::Unknown`], which carries no typed
//! payload field and maps to an opaque byte type.

use strum::{Display, EnumString, IntoStaticStr};

use crate::offset::FieldId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display)]
pub enum MetaKind {
    ObjectProperty,
    ObjectPropertyBase,
    ClassProperty,
    WeakObjectProperty,
    LazyObjectProperty,
    SoftObjectProperty,
    SoftClassProperty,
    InterfaceProperty,
    StructProperty,
    ArrayProperty,
    SetProperty,
    MapProperty,
    EnumProperty,
    ByteProperty,
    BoolProperty,
    DelegateProperty,
    MulticastDelegateProperty,
    MulticastInlineDelegateProperty,
    MulticastSparseDelegateProperty,
    Int8Property,
    Int16Property,
    IntProperty,
    Int64Property,
    UInt16Property,
    UInt32Property,
    UInt64Property,
    FloatProperty,
    DoubleProperty,
    NameProperty,
    StrProperty,
    TextProperty,
    FieldPathProperty,
    #[strum(default)]
    Unknown(String),
}

impl MetaKind {
    pub fn parse(name: &str) -> Self {
        // `default` makes this infallible
        name.parse().unwrap_or_else(|_| MetaKind::Unknown(name.to_string()))
    }

    /// The typed-pointer field this kind's payload is discovered through
    pub fn typed_target(&self) -> Option<FieldId> {
        match self {
            Self::ObjectProperty | Self::ObjectPropertyBase => Some(FieldId::ObjectPropertyClass),
            Self::ClassProperty | Self::SoftClassProperty => Some(FieldId::ClassPropertyMetaClass),
            Self::StructProperty => Some(FieldId::StructPropertyStruct),
            Self::ArrayProperty => Some(FieldId::ArrayPropertyInner),
            Self::SetProperty => Some(FieldId::SetPropertyElement),
            Self::MapProperty => Some(FieldId::MapPropertyBase),
            Self::EnumProperty => Some(FieldId::EnumPropertyBase),
            Self::ByteProperty => Some(FieldId::BytePropertyEnum),
            Self::BoolProperty => Some(FieldId::BoolPropertyBase),
            Self::DelegateProperty => Some(FieldId::DelegatePropertySignature),
            _ => None,
        }
    }

    /// Type spelling when nothing more specific is read from the payload.
    /// Unknown kinds fall back to a single byte.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ObjectProperty | Self::ObjectPropertyBase => "class UObject*",
            Self::ClassProperty => "class UClass*",
            Self::WeakObjectProperty => "TWeakObjectPtr<UObject>",
            Self::LazyObjectProperty => "TLazyObjectPtr<class UObject>",
            Self::SoftObjectProperty => "TSoftObjectPtr<class UObject>",
            Self::SoftClassProperty => "TSoftClassPtr<class UObject>",
            Self::InterfaceProperty => "TScriptInterface<class IInterface>",
            Self::StructProperty => "struct FUnknownStruct",
            Self::ArrayProperty => "TArray<uint8>",
            Self::SetProperty => "TSet<uint8>",
            Self::MapProperty => "TMap<uint8, uint8>",
            Self::EnumProperty | Self::ByteProperty => "uint8",
            Self::BoolProperty => "bool",
            Self::DelegateProperty => "TDelegate<void()>",
            Self::MulticastSparseDelegateProperty => "FMulticastSparseDelegateProperty_",
            Self::MulticastDelegateProperty | Self::MulticastInlineDelegateProperty => {
                "TMulticastInlineDelegate<void()>"
            }
            Self::Int8Property => "int8",
            Self::Int16Property => "int16",
            Self::IntProperty => "int32",
            Self::Int64Property => "int64",
            Self::UInt16Property => "uint16",
            Self::UInt32Property => "uint32",
            Self::UInt64Property => "uint64",
            Self::FloatProperty => "float",
            Self::DoubleProperty => "double",
            Self::NameProperty => "class FName",
            Self::StrProperty => "class FString",
            Self::TextProperty => "class FText",
            Self::FieldPathProperty => "struct FFieldPath",
            Self::Unknown(_) => "uint8",
        }
    }
}

/// Does a meta-kind name look like a property descriptor class?
pub fn is_property_kind_name(name: &str) -> bool {
    name.contains("Property")
}
