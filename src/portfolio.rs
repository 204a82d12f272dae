//! Offer listings and detail views with performance classification.
//!
//! This is where stored ad counts meet the classifier: summaries look at the
//! most recent [`CARD_SAMPLE_LIMIT`] samples of each offer, detail views at
//! the full history.

use crate::model::{OfferDetail, OfferFilter, OfferSummary};
use crate::performance::{AnalysisParams, CARD_SAMPLE_LIMIT, Sample, analyze_offer_performance};
use crate::storage::Storage;

/// List offers matching `filter`, each with a classification of its recent samples.
///
/// Offers are returned newest first.
pub async fn list_offer_summaries(
    storage: &Storage,
    filter: &OfferFilter,
    params: &AnalysisParams,
) -> anyhow::Result<Vec<OfferSummary>> {
    let offers = storage.list_offers().await?;

    let mut summaries = Vec::new();

    for offer in offers.into_iter().filter(|offer| filter.matches(offer)) {
        let recent = storage
            .list_ad_counts(offer.id, Some(CARD_SAMPLE_LIMIT))
            .await?;
        let samples: Vec<Sample> = recent.iter().map(Sample::from).collect();

        summaries.push(OfferSummary {
            performance: analyze_offer_performance(&samples, params),
            offer,
        });
    }

    Ok(summaries)
}

/// Load one offer with its full history, notes and classification.
///
/// Returns `None` if the offer does not exist.
pub async fn offer_detail(
    storage: &Storage,
    offer_id: i64,
    params: &AnalysisParams,
) -> anyhow::Result<Option<OfferDetail>> {
    let Some(offer) = storage.get_offer(offer_id).await? else {
        return Ok(None);
    };

    let ad_counts = storage.list_ad_counts(offer_id, None).await?;
    let notes = storage.list_notes(offer_id).await?;

    let samples: Vec<Sample> = ad_counts.iter().map(Sample::from).collect();
    let performance = analyze_offer_performance(&samples, params);

    Ok(Some(OfferDetail {
        offer,
        ad_counts,
        notes,
        performance,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewOffer;
    use crate::performance::{PercentageChange, PerformanceStatus};
    use chrono::{Duration, Utc};

    async fn setup_test_storage() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    fn new_offer(name: &str, tags: &[&str]) -> NewOffer {
        NewOffer {
            name: name.to_string(),
            link: String::new(),
            tags: if tags.is_empty() {
                None
            } else {
                Some(tags.iter().map(|t| t.to_string()).collect())
            },
        }
    }

    #[tokio::test]
    async fn test_summaries_empty() {
        let storage = setup_test_storage().await;

        let summaries = list_offer_summaries(
            &storage,
            &OfferFilter::default(),
            &AnalysisParams::default(),
        )
        .await
        .unwrap();

        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn test_summary_without_samples_is_no_data() {
        let storage = setup_test_storage().await;
        storage
            .insert_offer(&new_offer("Keto", &[]), Utc::now())
            .await
            .unwrap();

        let summaries = list_offer_summaries(
            &storage,
            &OfferFilter::default(),
            &AnalysisParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].performance.status, PerformanceStatus::NoData);
    }

    #[tokio::test]
    async fn test_summary_uses_recent_samples_only() {
        let storage = setup_test_storage().await;
        let now = Utc::now();
        let offer = storage
            .insert_offer(&new_offer("Keto", &[]), now)
            .await
            .unwrap();

        // 20 samples an hour apart; the card only sees the newest 15
        for i in 0..20 {
            let count = if i < 5 { 1 } else { 40 };
            storage
                .insert_ad_count(offer.id, count, now - Duration::hours(20 - i))
                .await
                .unwrap();
        }

        let summaries = list_offer_summaries(
            &storage,
            &OfferFilter::default(),
            &AnalysisParams::default(),
        )
        .await
        .unwrap();
        let detail = offer_detail(&storage, offer.id, &AnalysisParams::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summaries[0].performance.period_change, PercentageChange::Value(0.0));
        assert_eq!(summaries[0].performance.status, PerformanceStatus::Test);
        assert_eq!(detail.performance.period_change.to_string(), "+3900.0%");
        assert_eq!(detail.ad_counts.len(), 20);
    }

    #[tokio::test]
    async fn test_summaries_respect_filter() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        storage
            .insert_offer(&new_offer("Keto Max", &["diet"]), now)
            .await
            .unwrap();
        storage
            .insert_offer(&new_offer("Crypto Pro", &["finance"]), now)
            .await
            .unwrap();
        let archived = storage
            .insert_offer(&new_offer("Old Diet", &["diet"]), now)
            .await
            .unwrap();
        storage.toggle_archived(archived.id, now).await.unwrap();

        let filter = OfferFilter {
            archived: false,
            search: Some("diet".to_string()),
        };
        let summaries = list_offer_summaries(&storage, &filter, &AnalysisParams::default())
            .await
            .unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.offer.name.as_str()).collect();
        assert_eq!(names, vec!["Keto Max"]);

        let filter = OfferFilter {
            archived: true,
            search: None,
        };
        let summaries = list_offer_summaries(&storage, &filter, &AnalysisParams::default())
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].offer.name, "Old Diet");
    }

    #[tokio::test]
    async fn test_offer_detail_missing() {
        let storage = setup_test_storage().await;

        let detail = offer_detail(&storage, 42, &AnalysisParams::default())
            .await
            .unwrap();

        assert!(detail.is_none());
    }

    #[tokio::test]
    async fn test_offer_detail_drop() {
        let storage = setup_test_storage().await;
        let now = Utc::now();
        let offer = storage
            .insert_offer(&new_offer("Keto", &[]), now)
            .await
            .unwrap();

        storage
            .insert_ad_count(offer.id, 100, now - Duration::days(6))
            .await
            .unwrap();
        storage.insert_ad_count(offer.id, 50, now).await.unwrap();
        storage
            .insert_note(offer.id, "creatives rotated", now)
            .await
            .unwrap();

        let detail = offer_detail(&storage, offer.id, &AnalysisParams::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(detail.performance.status, PerformanceStatus::ExcludeRisk);
        assert_eq!(detail.performance.period_change.to_string(), "-50.0%");
        assert_eq!(detail.offer.last_ad_count, 50);
        assert_eq!(detail.notes.len(), 1);
    }
}
