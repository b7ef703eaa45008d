//! Metadata filters and the public-content merge rule.

use serde::{Deserialize, Serialize};

use super::{VectorMeta, PUBLIC_USER_ID};

/// Filter as submitted by callers. Consumers set `user_id` alone; the adapter
/// widens it before the index sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaFilter {
    pub user_id: Option<String>,
    pub category: Option<String>,
    pub mime_type: Option<String>,
    /// Inclusive lower bound on `created_at` (epoch seconds).
    pub created_after: Option<i64>,
    /// Inclusive upper bound on `created_at` (epoch seconds).
    pub created_before: Option<i64>,
    pub version: Option<u32>,
}

impl MetaFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Composes the effective filter: a concrete `user_id` becomes the set
    /// `{user_id, PUBLIC_USER_ID}` so public content is always co-retrieved;
    /// everything else passes through unchanged. Absence of a range bound
    /// means unbounded on that side.
    pub fn compose(&self) -> IndexFilter {
        let user_ids = self.user_id.as_ref().map(|u| {
            if u == PUBLIC_USER_ID {
                vec![u.clone()]
            } else {
                vec![u.clone(), PUBLIC_USER_ID.to_string()]
            }
        });
        IndexFilter {
            user_ids,
            category: self.category.clone(),
            mime_type: self.mime_type.clone(),
            created_after: self.created_after,
            created_before: self.created_before,
            version: self.version,
        }
    }
}

/// Effective filter handed to the index, after the public-content merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFilter {
    /// `$in` semantics; None matches every owner.
    pub user_ids: Option<Vec<String>>,
    pub category: Option<String>,
    pub mime_type: Option<String>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub version: Option<u32>,
}

impl IndexFilter {
    /// Whether a record's metadata passes this filter.
    pub fn matches(&self, meta: &VectorMeta) -> bool {
        if let Some(ids) = &self.user_ids {
            if !ids.iter().any(|u| u == &meta.user_id) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if category != &meta.category {
                return false;
            }
        }
        if let Some(mime) = &self.mime_type {
            if mime != &meta.mime_type {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if meta.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if meta.created_at > before {
                return false;
            }
        }
        if let Some(version) = self.version {
            if meta.version != version {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(user_id: &str, created_at: i64) -> VectorMeta {
        VectorMeta {
            user_id: user_id.into(),
            content_id: "c1".into(),
            category: "note".into(),
            mime_type: "text/markdown".into(),
            created_at,
            version: 1,
        }
    }

    /// **Scenario**: A concrete user id widens to {user, public}; the public
    /// sentinel stays singleton.
    #[test]
    fn compose_widens_user_id() {
        let composed = MetaFilter::for_user("u1").compose();
        assert_eq!(
            composed.user_ids,
            Some(vec!["u1".to_string(), PUBLIC_USER_ID.to_string()])
        );

        let composed = MetaFilter::for_user(PUBLIC_USER_ID).compose();
        assert_eq!(composed.user_ids, Some(vec![PUBLIC_USER_ID.to_string()]));

        let composed = MetaFilter::default().compose();
        assert_eq!(composed.user_ids, None);
    }

    /// **Scenario**: The composed filter admits the user's own and public
    /// content, nothing else.
    #[test]
    fn composed_filter_matches_user_and_public_only() {
        let filter = MetaFilter::for_user("u1").compose();
        assert!(filter.matches(&meta("u1", 100)));
        assert!(filter.matches(&meta(PUBLIC_USER_ID, 100)));
        assert!(!filter.matches(&meta("u2", 100)));
    }

    /// **Scenario**: Range bounds are inclusive; a missing bound is unbounded.
    #[test]
    fn created_at_range_bounds() {
        let filter = MetaFilter {
            created_after: Some(100),
            created_before: Some(200),
            ..MetaFilter::default()
        }
        .compose();
        assert!(filter.matches(&meta("u1", 100)));
        assert!(filter.matches(&meta("u1", 200)));
        assert!(!filter.matches(&meta("u1", 99)));
        assert!(!filter.matches(&meta("u1", 201)));

        let open_ended = MetaFilter {
            created_after: Some(100),
            ..MetaFilter::default()
        }
        .compose();
        assert!(open_ended.matches(&meta("u1", i64::MAX)));
    }

    /// **Scenario**: Category and mime filters pass through unchanged.
    #[test]
    fn passthrough_fields() {
        let filter = MetaFilter {
            category: Some("note".into()),
            mime_type: Some("text/plain".into()),
            ..MetaFilter::default()
        }
        .compose();
        assert!(!filter.matches(&meta("u1", 100)), "mime_type differs");
        let mut ok = meta("u1", 100);
        ok.mime_type = "text/plain".into();
        assert!(filter.matches(&ok));
    }
}
