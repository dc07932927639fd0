//! Vocabularies and their surrogate id types

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six string vocabularies that get integer surrogate keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vocabulary {
    ResourceType,
    SearchParam,
    ClaimType,
    CompartmentType,
    System,
    QuantityCode,
}

impl Vocabulary {
    pub const ALL: [Vocabulary; 6] = [
        Self::ResourceType,
        Self::SearchParam,
        Self::ClaimType,
        Self::CompartmentType,
        Self::System,
        Self::QuantityCode,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::ResourceType => "resource_type",
            Self::SearchParam => "search_param",
            Self::ClaimType => "claim_type",
            Self::CompartmentType => "compartment_type",
            Self::System => "coding_system",
            Self::QuantityCode => "quantity_code",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            Self::ResourceType => "resource_type_id",
            Self::SearchParam => "search_param_id",
            Self::ClaimType => "claim_type_id",
            Self::CompartmentType => "compartment_type_id",
            Self::System => "coding_system_id",
            Self::QuantityCode => "quantity_code_id",
        }
    }

    /// Column holding the natural key.
    pub fn key_column(&self) -> &'static str {
        match self {
            Self::ResourceType | Self::ClaimType | Self::CompartmentType => "name",
            Self::SearchParam => "uri",
            Self::System | Self::QuantityCode => "value",
        }
    }

    /// Fixed vocabularies are closed after bootstrap.
    pub fn is_fixed(&self) -> bool {
        !matches!(self, Self::System | Self::QuantityCode)
    }

    /// Label used for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceType => "resource_type",
            Self::SearchParam => "search_param",
            Self::ClaimType => "claim_type",
            Self::CompartmentType => "compartment_type",
            Self::System => "system",
            Self::QuantityCode => "quantity_code",
        }
    }
}

impl fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ResourceType => "resource type",
            Self::SearchParam => "search parameter",
            Self::ClaimType => "claim type",
            Self::CompartmentType => "compartment type",
            Self::System => "coding system",
            Self::QuantityCode => "quantity code",
        };
        f.write_str(label)
    }
}

/// The two vocabularies that grow at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnboundedVocabulary {
    System,
    QuantityCode,
}

impl UnboundedVocabulary {
    pub fn vocabulary(&self) -> Vocabulary {
        match self {
            Self::System => Vocabulary::System,
            Self::QuantityCode => Vocabulary::QuantityCode,
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.vocabulary().table_name()
    }

    pub fn id_column(&self) -> &'static str {
        self.vocabulary().id_column()
    }
}

impl fmt::Display for UnboundedVocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.vocabulary().fmt(f)
    }
}

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            pub fn get(self) -> $repr {
                self.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                i64::from(id.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

surrogate_id!(
    /// 16-bit id of a resource type name
    ResourceTypeId(i16)
);
surrogate_id!(
    /// 16-bit id of a search parameter canonical URI
    SearchParamId(i16)
);
surrogate_id!(
    /// 8-bit id of an access-control claim name
    ClaimTypeId(u8)
);
surrogate_id!(
    /// 8-bit id of a compartment type name
    CompartmentTypeId(u8)
);
surrogate_id!(
    /// 32-bit id of a coding system
    SystemId(i32)
);
surrogate_id!(
    /// 32-bit id of a quantity unit/code
    QuantityCodeId(i32)
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_system_and_quantity_code_are_unbounded() {
        let unbounded: Vec<_> = Vocabulary::ALL.iter().filter(|v| !v.is_fixed()).collect();
        assert_eq!(unbounded, vec![&Vocabulary::System, &Vocabulary::QuantityCode]);
        assert_eq!(UnboundedVocabulary::System.table_name(), "coding_system");
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&ClaimTypeId(3)).unwrap();
        assert_eq!(json, "3");
        assert_eq!(i64::from(ResourceTypeId(-2)), -2);
    }
}
