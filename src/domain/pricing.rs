//! Price scope resolution.
//!
//! A shop product is indexed into one anonymous scope plus one scope per group
//! that has a rule for it. Reads combine stored scopes, they never re-run the
//! rules.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entities::{CatalogPriceRow, DiscountRuleRecord, PriceRuleRecord};
use super::error::DomainError;
use super::ids::GroupId;

/// Price pair as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPrice {
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
}

impl CatalogPrice {
    /// Price used for sorting and range filters.
    pub fn effective(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePrice {
    pub group_id: Option<GroupId>,
    pub price: CatalogPrice,
}

/// Computes every price scope for one shop product. Rules must already be
/// restricted to the shop and product being indexed.
pub fn price_scopes(
    default_price: Decimal,
    price_rules: &[PriceRuleRecord],
    discount_rules: &[DiscountRuleRecord],
) -> Result<Vec<ScopePrice>, DomainError> {
    if default_price.is_sign_negative() {
        return Err(DomainError::validation(format!(
            "default price {default_price} is negative"
        )));
    }

    let mut unrestricted: Option<Decimal> = None;
    let mut overrides: BTreeMap<GroupId, Decimal> = BTreeMap::new();
    for rule in price_rules {
        if rule.override_price.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "override price {} for product {} is negative",
                rule.override_price, rule.product_id
            )));
        }
        match rule.group_id {
            None => unrestricted = Some(min_of(unrestricted, rule.override_price)),
            Some(group) => {
                let slot = overrides.entry(group).or_insert(rule.override_price);
                *slot = (*slot).min(rule.override_price);
            }
        }
    }

    let mut discounts: BTreeMap<GroupId, Decimal> = BTreeMap::new();
    for rule in discount_rules {
        if rule.discount_amount.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "discount amount {} for product {} is negative",
                rule.discount_amount, rule.product_id
            )));
        }
        let slot = discounts.entry(rule.group_id).or_insert(rule.discount_amount);
        *slot = (*slot).max(rule.discount_amount);
    }

    let anonymous = min_of(unrestricted, default_price);
    let mut scopes = vec![ScopePrice {
        group_id: None,
        price: CatalogPrice {
            price: anonymous,
            discounted_price: None,
        },
    }];

    let groups: BTreeSet<GroupId> = overrides.keys().chain(discounts.keys()).copied().collect();
    for group in groups {
        let price = overrides
            .get(&group)
            .map_or(anonymous, |value| anonymous.min(*value));
        let discounted_price = discounts
            .get(&group)
            .and_then(|amount| apply_discount(price, *amount));
        scopes.push(ScopePrice {
            group_id: Some(group),
            price: CatalogPrice {
                price,
                discounted_price,
            },
        });
    }

    Ok(scopes)
}

/// Subtracts a discount, clamped at zero. `None` when it does not lower the price.
pub fn apply_discount(price: Decimal, amount: Decimal) -> Option<Decimal> {
    let discounted = (price - amount).max(Decimal::ZERO);
    (discounted < price).then_some(discounted)
}

/// Resolves the price seen by a shopper in `groups` from stored scope rows.
///
/// The anonymous scope always participates; group scopes participate when the
/// shopper is a member. Returns `None` when no anonymous row is stored.
pub fn resolve_for_groups<'a, I>(rows: I, groups: &BTreeSet<GroupId>) -> Option<CatalogPrice>
where
    I: IntoIterator<Item = &'a CatalogPriceRow>,
{
    let mut anonymous_seen = false;
    let mut price: Option<Decimal> = None;
    let mut discounted: Option<Decimal> = None;

    for row in rows {
        let applies = match row.group_id {
            None => {
                anonymous_seen = true;
                true
            }
            Some(group) => groups.contains(&group),
        };
        if !applies {
            continue;
        }
        price = Some(min_of(price, row.price));
        if let Some(value) = row.discounted_price {
            discounted = Some(min_of(discounted, value));
        }
    }

    if !anonymous_seen {
        return None;
    }
    let price = price?;
    Some(CatalogPrice {
        price,
        discounted_price: discounted.filter(|value| *value < price),
    })
}

fn min_of(current: Option<Decimal>, candidate: Decimal) -> Decimal {
    current.map_or(candidate, |value| value.min(candidate))
}
