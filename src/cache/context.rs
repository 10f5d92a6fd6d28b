//! Request context reduced to the attributes that may change a cached answer.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::domain::ids::{ContactId, GroupId, ShopId};

/// A shopper as seen by call sites. Only its group memberships reach a
/// [`CacheContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub group_ids: Vec<GroupId>,
}

/// Fixed allow-list of context attributes. Nothing else can influence a
/// fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheContext {
    pub shop_id: Option<ShopId>,
    pub group_ids: BTreeSet<GroupId>,
    pub discriminators: BTreeMap<String, String>,
}

impl CacheContext {
    pub fn anonymous(shop_id: ShopId) -> Self {
        Self {
            shop_id: Some(shop_id),
            ..Self::default()
        }
    }

    pub fn for_groups(shop_id: ShopId, groups: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            shop_id: Some(shop_id),
            group_ids: groups.into_iter().collect(),
            discriminators: BTreeMap::new(),
        }
    }

    /// Context for a known contact. The contact id is dropped so contacts in
    /// the same groups share entries.
    pub fn for_contact(shop_id: ShopId, contact: &Contact) -> Self {
        Self::for_groups(shop_id, contact.group_ids.iter().copied())
    }

    pub fn with_discriminator(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.discriminators.insert(key.into(), value.into());
        self
    }

    /// Hex-encoded SHA-256 of the canonical context form.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn canonical(&self) -> String {
        let mut out = String::from("shop=");
        match self.shop_id {
            Some(shop) => {
                let _ = write!(out, "{shop}");
            }
            None => out.push('-'),
        }
        out.push_str(";groups=");
        let groups: Vec<String> = self.group_ids.iter().map(ToString::to_string).collect();
        out.push_str(&groups.join(","));
        for (key, value) in &self.discriminators {
            // Length prefixes keep `a=b;c` and `a=b`,`c=` apart.
            let _ = write!(out, ";{}:{key}={}:{value}", key.len(), value.len());
        }
        out
    }
}
