//! Data models for AdIntel.
//!
//! Offers are tracked marketing targets. Each offer accumulates ad-count
//! samples over time and free-text notes. Request and query types for the
//! HTTP API live here as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::performance::{AnalysisParams, PerformanceAnalysis, Sample};

/// A tracked offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    pub id: i64,

    pub name: String,

    /// Landing page or ad library link; empty when not provided.
    pub link: String,

    /// Free-form tags, `None` when the offer has none.
    pub tags: Option<Vec<String>>,

    /// Denormalized copy of the newest ad count, 0 when there is none.
    pub last_ad_count: i64,

    /// When `last_ad_count` was observed.
    pub last_ad_count_timestamp: Option<DateTime<Utc>>,

    pub is_archived: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,
}

/// One recorded ad count for an offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdCount {
    pub id: i64,
    pub offer_id: i64,
    pub count: i64,
    pub timestamp: DateTime<Utc>,
}

/// A free-text note attached to an offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: i64,
    pub offer_id: i64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Validated fields for a new offer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOffer {
    pub name: String,
    pub link: String,
    pub tags: Option<Vec<String>>,
}

/// Validated partial update for an offer. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferUpdate {
    pub name: Option<String>,
    pub link: Option<String>,
    pub tags: Option<Option<Vec<String>>>,
}

/// Tags as sent by clients: either a list or a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    /// Trim every tag and drop blanks. An empty result becomes `None`.
    pub fn normalize(self) -> Option<Vec<String>> {
        let raw: Vec<String> = match self {
            TagsInput::List(tags) => tags,
            TagsInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };

        let tags: Vec<String> = raw
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();

        if tags.is_empty() { None } else { Some(tags) }
    }
}

/// Request body for POST /offers.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOfferRequest {
    pub name: String,

    #[serde(default)]
    pub link: Option<String>,

    #[serde(default)]
    pub tags: Option<TagsInput>,
}

impl CreateOfferRequest {
    pub fn validate(self) -> Result<NewOffer, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("offer name is required".to_string()));
        }

        Ok(NewOffer {
            name: name.to_string(),
            link: self.link.map(|l| l.trim().to_string()).unwrap_or_default(),
            tags: self.tags.and_then(TagsInput::normalize),
        })
    }
}

/// Request body for PATCH /offers/:id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOfferRequest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub link: Option<String>,

    #[serde(default)]
    pub tags: Option<TagsInput>,
}

impl UpdateOfferRequest {
    pub fn validate(self) -> Result<OfferUpdate, AppError> {
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(AppError::Validation("offer name cannot be blank".to_string()));
            }
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };

        Ok(OfferUpdate {
            name,
            link: self.link.map(|l| l.trim().to_string()),
            tags: self.tags.map(TagsInput::normalize),
        })
    }
}

/// Request body for POST /offers/:id/ad-counts.
#[derive(Debug, Clone, Deserialize)]
pub struct AdCountRequest {
    pub count: i64,
}

/// Request body for POST /offers/:id/notes.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteRequest {
    pub text: String,
}

/// Per-request overrides of the configured analysis thresholds.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnalysisQuery {
    pub days: Option<i64>,
    pub min_ads: Option<i64>,
    pub max_drop: Option<f64>,
}

impl AnalysisQuery {
    pub fn resolve(&self, defaults: &AnalysisParams) -> AnalysisParams {
        AnalysisParams {
            days_to_analyze: self.days.unwrap_or(defaults.days_to_analyze),
            min_ads_threshold: self.min_ads.unwrap_or(defaults.min_ads_threshold),
            max_drop_percentage: self.max_drop.unwrap_or(defaults.max_drop_percentage),
        }
    }
}

/// Query parameters for GET /offers.
///
/// Kept flat rather than flattening [`AnalysisQuery`] because
/// `serde_urlencoded` cannot parse numbers through `#[serde(flatten)]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferListQuery {
    /// Show archived offers instead of active ones (default: false).
    #[serde(default)]
    pub archived: bool,

    /// Case-insensitive match against the name or any tag.
    pub search: Option<String>,

    pub days: Option<i64>,
    pub min_ads: Option<i64>,
    pub max_drop: Option<f64>,
}

impl OfferListQuery {
    pub fn analysis(&self) -> AnalysisQuery {
        AnalysisQuery {
            days: self.days,
            min_ads: self.min_ads,
            max_drop: self.max_drop,
        }
    }

    pub fn filter(&self) -> OfferFilter {
        OfferFilter {
            archived: self.archived,
            search: self.search.clone(),
        }
    }
}

/// Which offers to show in a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferFilter {
    pub archived: bool,
    pub search: Option<String>,
}

impl OfferFilter {
    pub fn matches(&self, offer: &Offer) -> bool {
        if offer.is_archived != self.archived {
            return false;
        }

        let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let term = term.to_lowercase();

        offer.name.to_lowercase().contains(&term)
            || offer
                .tags
                .iter()
                .flatten()
                .any(|tag| tag.to_lowercase().contains(&term))
    }
}

/// An offer with the classification of its most recent samples.
#[derive(Debug, Clone, Serialize)]
pub struct OfferSummary {
    #[serde(flatten)]
    pub offer: Offer,
    pub performance: PerformanceAnalysis,
}

/// Full view of one offer.
#[derive(Debug, Clone, Serialize)]
pub struct OfferDetail {
    pub offer: Offer,

    /// Newest first.
    pub ad_counts: Vec<AdCount>,

    /// Newest first.
    pub notes: Vec<Note>,

    /// Classification over the full history.
    pub performance: PerformanceAnalysis,
}

/// Request body for POST /performance.
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceRequest {
    #[serde(default)]
    pub samples: Vec<Sample>,

    pub days_to_analyze: Option<i64>,
    pub min_ads_threshold: Option<i64>,
    pub max_drop_percentage: Option<f64>,
}

impl PerformanceRequest {
    pub fn params(&self, defaults: &AnalysisParams) -> AnalysisParams {
        AnalysisQuery {
            days: self.days_to_analyze,
            min_ads: self.min_ads_threshold,
            max_drop: self.max_drop_percentage,
        }
        .resolve(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(name: &str, tags: Option<Vec<&str>>, archived: bool) -> Offer {
        Offer {
            id: 1,
            name: name.to_string(),
            link: String::new(),
            tags: tags.map(|t| t.into_iter().map(str::to_string).collect()),
            last_ad_count: 0,
            last_ad_count_timestamp: None,
            is_archived: archived,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_tags_from_csv() {
        let tags = TagsInput::Csv(" health, ,Keto ,".to_string()).normalize();
        assert_eq!(tags, Some(vec!["health".to_string(), "Keto".to_string()]));

        assert_eq!(TagsInput::Csv(" , ".to_string()).normalize(), None);
    }

    #[test]
    fn test_tags_from_list() {
        let tags = TagsInput::List(vec!["  a ".to_string(), "".to_string()]).normalize();
        assert_eq!(tags, Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_create_request_requires_name() {
        let request = CreateOfferRequest {
            name: "   ".to_string(),
            link: None,
            tags: None,
        };

        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_create_request_trims_fields() {
        let request: CreateOfferRequest = serde_json::from_value(serde_json::json!({
            "name": "  Keto Max ",
            "link": " https://example.com ",
            "tags": "diet, supplements"
        }))
        .unwrap();

        let new_offer = request.validate().unwrap();

        assert_eq!(new_offer.name, "Keto Max");
        assert_eq!(new_offer.link, "https://example.com");
        assert_eq!(
            new_offer.tags,
            Some(vec!["diet".to_string(), "supplements".to_string()])
        );
    }

    #[test]
    fn test_update_request_rejects_blank_name() {
        let request = UpdateOfferRequest {
            name: Some(" ".to_string()),
            ..Default::default()
        };

        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_update_request_can_clear_tags() {
        let request: UpdateOfferRequest =
            serde_json::from_value(serde_json::json!({ "tags": "" })).unwrap();

        let update = request.validate().unwrap();

        assert_eq!(update.tags, Some(None));
        assert_eq!(update.name, None);
    }

    #[test]
    fn test_filter_by_archived_flag() {
        let active = offer("Alpha", None, false);
        let archived = offer("Beta", None, true);

        let filter = OfferFilter::default();
        assert!(filter.matches(&active));
        assert!(!filter.matches(&archived));

        let filter = OfferFilter {
            archived: true,
            search: None,
        };
        assert!(!filter.matches(&active));
        assert!(filter.matches(&archived));
    }

    #[test]
    fn test_filter_by_search_term() {
        let tagged = offer("Alpha", Some(vec!["Fitness", "US"]), false);

        let by_name = OfferFilter {
            archived: false,
            search: Some("alp".to_string()),
        };
        let by_tag = OfferFilter {
            archived: false,
            search: Some("FIT".to_string()),
        };
        let miss = OfferFilter {
            archived: false,
            search: Some("crypto".to_string()),
        };

        assert!(by_name.matches(&tagged));
        assert!(by_tag.matches(&tagged));
        assert!(!miss.matches(&tagged));
    }

    #[test]
    fn test_analysis_query_overrides_defaults() {
        let query = AnalysisQuery {
            days: Some(14),
            min_ads: None,
            max_drop: Some(35.0),
        };

        let params = query.resolve(&AnalysisParams::default());

        assert_eq!(params.days_to_analyze, 14);
        assert_eq!(params.min_ads_threshold, 10);
        assert_eq!(params.max_drop_percentage, 35.0);
    }
}
