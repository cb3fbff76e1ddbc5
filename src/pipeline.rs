use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::db::{Replaced, Review, Store, StoreError, VehicleKey, VehicleSpec};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub cleared: usize,
    pub inserted: usize,
    pub vehicles: usize,
}

/// Replace all stored reviews with `reviews`, then record each vehicle seen.
/// A rejected row leaves the stored reviews as they were.
pub fn load_reviews(store: &Store, reviews: &[Review]) -> Result<LoadReport, StoreError> {
    let Replaced { cleared, inserted } = store.replace_reviews(reviews)?;

    let seen: BTreeSet<VehicleKey> = reviews
        .iter()
        .map(|r| VehicleKey::new(r.car_name.clone(), r.car_year))
        .collect();

    let mut vehicles = 0;
    for key in &seen {
        match store.upsert_vehicle(&key.model, key.year) {
            Ok(_) => vehicles += 1,
            Err(e) => warn!(vehicle = %key, error = %e, "Failed to record vehicle"),
        }
    }

    info!(cleared, inserted, vehicles, "Loaded reviews");
    Ok(LoadReport {
        cleared,
        inserted,
        vehicles,
    })
}

/// Replace the `cars` table with `specs`. Later specs for the same vehicle
/// win. Clearing `cars` also drops every stored summary, unless a row is
/// rejected, in which case nothing changes.
pub fn load_specs(store: &Store, specs: &[VehicleSpec]) -> Result<LoadReport, StoreError> {
    let mut latest: BTreeMap<VehicleKey, &VehicleSpec> = BTreeMap::new();
    for spec in specs {
        latest.insert(VehicleKey::new(spec.model.clone(), spec.year), spec);
    }
    let unique: Vec<VehicleSpec> = latest.into_values().cloned().collect();
    if unique.len() < specs.len() {
        warn!(dropped = specs.len() - unique.len(), "Duplicate specs collapsed");
    }

    let Replaced { cleared, inserted } = store.replace_vehicle_specs(&unique)?;

    info!(cleared, inserted, "Loaded vehicle specs");
    Ok(LoadReport {
        cleared,
        inserted,
        vehicles: inserted,
    })
}

/// All stored summaries as `{"<model> <year>": {"sentiment": text}}`.
pub fn summaries_json(store: &Store) -> Result<Value, StoreError> {
    let mut out = Map::new();
    for (key, text) in store.list_summaries()? {
        out.insert(key.to_string(), json!({ "sentiment": text }));
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::crawl::{CrawlPlan, CrawlTarget, Crawler, ReviewTarget};
    use crate::fetch::{FetchError, PageFetcher};

    struct StubFetcher(HashMap<String, String>);

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.0.get(url).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("cars.sqlite"));
        store.init_schema().unwrap();
        (dir, store)
    }

    fn listing(items: &[Option<&str>]) -> String {
        let body: String = items
            .iter()
            .map(|title| {
                let heading = title
                    .map(|t| format!(r#"<h3 class="heading-5">{t}</h3>"#))
                    .unwrap_or_default();
                format!(
                    r#"<div class="review-item">
                         <div class="rating-stars"><span class="rating-star icon-star-full"></span></div>
                         {heading}<div class="truncated-text">text</div>
                       </div>"#
                )
            })
            .collect();
        format!("<html><body>{body}</body></html>")
    }

    fn spec(model: &str, year: i32, hp: f64) -> VehicleSpec {
        VehicleSpec {
            model: model.into(),
            year,
            msrp: Some("$30,000".into()),
            horsepower: hp,
            mpg: 30,
            num_seats: 5,
            drive_type: "Front-wheel Drive".into(),
        }
    }

    #[tokio::test]
    async fn crawl_and_load_end_to_end() {
        let target = ReviewTarget {
            base_url: "http://reviews.test/toyota".into(),
            page_size: 3,
            max_pages: 5,
        };
        let key = VehicleKey::new("x", 2024);
        let mut pages = HashMap::new();
        pages.insert(target.page_url(&key, 1), listing(&[Some("a"), Some("b"), Some("c")]));
        pages.insert(target.page_url(&key, 2), listing(&[Some("d"), None, Some("f")]));
        pages.insert(target.page_url(&key, 3), listing(&[]));
        let fetcher = StubFetcher(pages);

        let plan = CrawlPlan::new(vec!["x".into()], vec![2024]);
        let outcome = Crawler::new(&fetcher, Duration::ZERO).run(&target, &plan).await;
        assert_eq!(outcome.records.len(), 5);

        let (_dir, store) = store();
        let report = load_reviews(&store, &outcome.records).unwrap();
        assert_eq!(report.inserted, 5);

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.reviews, 5);
        assert_eq!(stats.vehicles, 1);
        assert!(store.get_vehicle_spec("x", 2024).unwrap().is_some());
    }

    #[test]
    fn reload_replaces_reviews() {
        let (_dir, store) = store();
        let r = |title: &str| Review {
            car_name: "prius".into(),
            car_year: 2024,
            title: title.into(),
            body: String::new(),
            rating: 3,
        };
        load_reviews(&store, &[r("a"), r("b")]).unwrap();
        let second = load_reviews(&store, &[r("c")]).unwrap();

        assert_eq!(second.cleared, 2);
        assert_eq!(store.get_stats().unwrap().reviews, 1);
        assert_eq!(store.get_stats().unwrap().vehicles, 1);
    }

    #[test]
    fn rejected_reload_keeps_previous_reviews() {
        let (_dir, store) = store();
        let r = |title: &str, rating: u8| Review {
            car_name: "prius".into(),
            car_year: 2024,
            title: title.into(),
            body: format!("{title} body"),
            rating,
        };
        load_reviews(&store, &[r("a", 4), r("b", 3)]).unwrap();

        let err = load_reviews(&store, &[r("c", 4), r("bad", 9)]).unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));

        let bodies: Vec<String> = store.fetch_review_bodies().unwrap().into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies, vec!["a body", "b body"]);
    }

    #[test]
    fn rejected_spec_reload_keeps_summaries() {
        let (_dir, store) = store();
        load_specs(&store, &[spec("camry", 2024, 200.0)]).unwrap();
        store.upsert_summary("camry", 2024, "good").unwrap();

        // Refuse one row mid-batch so the replace fails after the clear
        store
            .connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_rav4 BEFORE INSERT ON cars WHEN NEW.car_model = 'rav4'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(load_specs(&store, &[spec("prius", 2024, 196.0), spec("rav4", 2023, 203.0)]).is_err());
        assert!(store.get_vehicle_spec("camry", 2024).unwrap().is_some());
        assert_eq!(store.get_summary("camry", 2024).unwrap().as_deref(), Some("good"));
    }

    #[test]
    fn duplicate_specs_keep_the_last() {
        let (_dir, store) = store();
        let report = load_specs(&store, &[spec("camry", 2024, 200.0), spec("camry", 2024, 225.0)]).unwrap();
        assert_eq!(report.inserted, 1);

        let camry = store.get_vehicle_spec("camry", 2024).unwrap().unwrap();
        assert_eq!(camry.horsepower, Some(225.0));
    }

    #[test]
    fn spec_reload_is_a_full_replace() {
        let (_dir, store) = store();
        load_specs(&store, &[spec("camry", 2024, 200.0), spec("prius", 2024, 196.0)]).unwrap();
        store.upsert_summary("camry", 2024, "good").unwrap();

        let report = load_specs(&store, &[spec("rav4", 2023, 203.0)]).unwrap();
        assert_eq!(report.cleared, 2);
        assert!(store.get_vehicle_spec("camry", 2024).unwrap().is_none());
        assert_eq!(store.get_summary("camry", 2024).unwrap(), None);
        assert_eq!(store.list_all_vehicles().unwrap().len(), 1);
    }

    #[test]
    fn export_keys_by_model_and_year() {
        let (_dir, store) = store();
        store.upsert_summary("prius", 2024, "Efficient").unwrap();
        store.upsert_summary("camry", 2023, "Comfortable").unwrap();

        let exported = summaries_json(&store).unwrap();
        assert_eq!(exported["prius 2024"]["sentiment"], "Efficient");
        assert_eq!(exported["camry 2023"]["sentiment"], "Comfortable");
        assert_eq!(exported.as_object().map(Map::len), Some(2));
    }
}
