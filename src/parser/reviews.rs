use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::fields::{best_effort, first_text, FieldError};
use crate::db::{Review, VehicleKey};

static REVIEW_ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".review-item").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".heading-5").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".truncated-text").unwrap());
static STARS_WIDGET: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".rating-stars").unwrap());
static STAR: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".rating-star").unwrap());

const FULL_STAR_CLASS: &str = "icon-star-full";
const MAX_STARS: u8 = 5;

/// Extract every review on a consumer-reviews listing page.
pub fn extract(html: &str, key: &VehicleKey) -> Vec<Review> {
    let doc = Html::parse_document(html);
    let mut reviews = Vec::new();

    for (idx, item) in doc.select(&REVIEW_ITEM).enumerate() {
        // Title is the only required field
        let title = match first_text(item, &TITLE) {
            Ok(t) if !t.is_empty() => t,
            _ => {
                debug!(vehicle = %key, idx, "Dropping review without title");
                continue;
            }
        };

        reviews.push(Review {
            car_name: key.model.clone(),
            car_year: key.year,
            title,
            body: best_effort("body", String::new(), first_text(item, &BODY)),
            rating: best_effort("rating", 0, star_rating(item)),
        });
    }

    reviews
}

/// Count whole stars in the rating widget. Half and empty stars don't count.
fn star_rating(item: ElementRef<'_>) -> Result<u8, FieldError> {
    let widget = item.select(&STARS_WIDGET).next().ok_or(FieldError::Missing)?;
    let full = widget
        .select(&STAR)
        .filter(|star| star.value().classes().any(|c| c == FULL_STAR_CLASS))
        .count();
    Ok(full.min(MAX_STARS as usize) as u8)
}
