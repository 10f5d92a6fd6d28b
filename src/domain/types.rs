//! Catalog enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "product_mode", rename_all = "snake_case")]
pub enum ProductMode {
    Normal,
    VariableVariationParent,
    VariationChild,
    PackageParent,
    PackageChild,
    Subscription,
}

impl ProductMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductMode::Normal => "normal",
            ProductMode::VariableVariationParent => "variable_variation_parent",
            ProductMode::VariationChild => "variation_child",
            ProductMode::PackageParent => "package_parent",
            ProductMode::PackageChild => "package_child",
            ProductMode::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "shop_product_visibility", rename_all = "snake_case")]
pub enum Visibility {
    NotVisible,
    Listed,
    Searchable,
    AlwaysVisible,
}

/// Where a catalog row is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Listing,
    Search,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self != Visibility::NotVisible
    }

    pub fn shows_on(self, surface: Surface) -> bool {
        match (self, surface) {
            (Visibility::AlwaysVisible, _) => true,
            (Visibility::Listed, Surface::Listing) => true,
            (Visibility::Searchable, Surface::Search) => true,
            _ => false,
        }
    }
}
