use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::fields::{best_effort, first_text, parse_digits, FieldError};
use crate::db::{VehicleKey, VehicleSpec};

static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".price-amount").unwrap());
static KEY_SPEC: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".key-spec").unwrap());
static ICON_USE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("svg use").unwrap());
static LABEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").unwrap());

pub const UNKNOWN_DRIVE: &str = "Unknown";

const DRIVE_ICONS: &[&str] = &["#fwd", "#rwd", "#awd", "#4wd"];

/// Which spec a `.key-spec` block carries, judged by its icon reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecKind {
    Drive,
    Seats,
    Mpg,
    Engine,
}

impl SpecKind {
    fn from_icon(href: &str) -> Option<Self> {
        if DRIVE_ICONS.iter().any(|icon| href.contains(icon)) {
            Some(SpecKind::Drive)
        } else if href.contains("#seat") {
            Some(SpecKind::Seats)
        } else if href.contains("#mpg") {
            Some(SpecKind::Mpg)
        } else if href.contains("#engine") {
            Some(SpecKind::Engine)
        } else {
            None
        }
    }
}

/// Extract the spec summary from a vehicle's spec page. Returns an empty
/// list when the page has neither a price nor any key-spec block.
pub fn extract(html: &str, key: &VehicleKey) -> Vec<VehicleSpec> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let price = first_text(root, &PRICE).ok().filter(|p| !p.is_empty());
    let blocks: Vec<ElementRef<'_>> = doc.select(&KEY_SPEC).collect();
    if price.is_none() && blocks.is_empty() {
        return Vec::new();
    }

    let mut drive: Result<String, FieldError> = Err(FieldError::Missing);
    let mut seats: Result<i32, FieldError> = Err(FieldError::Missing);
    let mut mpg: Result<i32, FieldError> = Err(FieldError::Missing);
    let mut horsepower: Result<f64, FieldError> = Err(FieldError::Missing);

    // Each block is independent: a broken icon or label only loses that field
    for block in blocks {
        let Some(kind) = icon_ref(block).and_then(SpecKind::from_icon) else {
            continue;
        };
        let label = first_text(block, &LABEL);
        match kind {
            SpecKind::Drive => drive = label.and_then(non_empty),
            SpecKind::Seats => seats = label.and_then(|l| parse_digits(&l)),
            SpecKind::Mpg => mpg = label.and_then(|l| parse_digits(&l)),
            SpecKind::Engine => horsepower = label.and_then(|l| parse_digits(leading_figure(&l))),
        }
    }

    vec![VehicleSpec {
        model: key.model.clone(),
        year: key.year,
        msrp: price,
        horsepower: best_effort("horsepower", 0.0, horsepower),
        mpg: best_effort("mpg", 0, mpg),
        num_seats: best_effort("num_seats", 0, seats),
        drive_type: best_effort("drive_type", UNKNOWN_DRIVE.to_string(), drive),
    }]
}

/// The `href` of the block's icon. SVG parsing maps `xlink:href` to a
/// namespaced attribute whose local name is `href`.
fn icon_ref(block: ElementRef<'_>) -> Option<&str> {
    let icon = block.select(&ICON_USE).next()?;
    icon.value()
        .attrs()
        .find(|(name, _)| name.ends_with("href"))
        .map(|(_, value)| value)
}

/// "265 hp, 2.4L I-4" → "265 hp"; keeps displacement digits out of the count.
fn leading_figure(label: &str) -> &str {
    let head = label.split(',').next().unwrap_or(label);
    head.split('.').next().unwrap_or(head)
}

fn non_empty(text: String) -> Result<String, FieldError> {
    if text.is_empty() {
        Err(FieldError::Missing)
    } else {
        Ok(text)
    }
}
