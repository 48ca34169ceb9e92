//! Content units and their association with courses.

use serde::{Deserialize, Serialize};

use super::{ArticleId, CourseId};

/// Namespace number of mainspace articles.
pub const MAINSPACE_NAMESPACE: i32 = 0;

/// A content unit on the wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Identifier supplied by the content source.
    pub id: ArticleId,
    /// Page title.
    pub title: String,
    /// Wiki namespace number.
    pub namespace: i32,
    /// Whether the page has been deleted.
    pub deleted: bool,
}

impl Article {
    /// Returns `true` for live mainspace articles.
    ///
    /// Talk, user and project pages are tracked but never counted.
    #[must_use]
    pub const fn counts_as_article(&self) -> bool {
        self.namespace == MAINSPACE_NAMESPACE && !self.deleted
    }
}

/// Cached edit metrics for one article within one course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCache {
    /// Bytes added by enrolled students in the window.
    pub character_sum: u64,
    /// Latest known cumulative view count.
    pub view_sum: u64,
    /// Edits by enrolled students in the window.
    pub revision_count: u64,
    /// Whether a student created the article during the window.
    pub new_article: bool,
}

/// Association between a course and an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleAssociation {
    /// The course.
    pub course_id: CourseId,
    /// The article, with its metadata.
    pub article: Article,
    /// Cached metrics.
    pub cache: ArticleCache,
}

impl ArticleAssociation {
    /// Returns `true` if this association feeds the course article counters.
    #[must_use]
    pub const fn qualifies(&self) -> bool {
        self.article.counts_as_article() && self.cache.revision_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(namespace: i32, deleted: bool) -> Article {
        Article {
            id: ArticleId::new("a1"),
            title: "Selfie".to_string(),
            namespace,
            deleted,
        }
    }

    #[test]
    fn test_only_live_mainspace_counts() {
        assert!(article(MAINSPACE_NAMESPACE, false).counts_as_article());
        assert!(!article(1, false).counts_as_article());
        assert!(!article(MAINSPACE_NAMESPACE, true).counts_as_article());
    }

    #[test]
    fn test_association_needs_revisions_to_qualify() {
        let mut assoc = ArticleAssociation {
            course_id: CourseId::new("c1"),
            article: article(MAINSPACE_NAMESPACE, false),
            cache: ArticleCache::default(),
        };
        assert!(!assoc.qualifies());
        assoc.cache.revision_count = 2;
        assert!(assoc.qualifies());
    }
}
