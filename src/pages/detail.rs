use chromiumoxide::page::Page;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ScraperError};
use crate::marketplace::DetailProfile;
use crate::models::ItemDetail;

/// Where a field's raw value comes from on the page.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource {
    /// Inner text of the first matching element.
    Text,
    /// A named attribute of the first matching element.
    Attribute(&'static str),
    /// Inner text of every matching element, in document order.
    TextList,
}

/// How a raw value is turned into a typed field value; also defines the
/// default used when extraction fails.
#[derive(Debug, Clone, Copy)]
pub enum FieldCast {
    Text,
    Integer,
    Float,
    TextList,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(u32),
    Float(f64),
    List(Vec<String>),
}

impl FieldCast {
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldCast::Text => FieldValue::Text(String::new()),
            FieldCast::Integer => FieldValue::Integer(0),
            FieldCast::Float => FieldValue::Float(0.0),
            FieldCast::TextList => FieldValue::List(Vec::new()),
        }
    }

    pub fn cast(&self, raw: &str) -> Result<FieldValue> {
        match self {
            FieldCast::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldCast::Integer => parse_integer_loose(raw)
                .map(FieldValue::Integer)
                .ok_or_else(|| ScraperError::Parse(format!("not an integer: '{}'", raw))),
            FieldCast::Float => parse_float_loose(raw)
                .map(FieldValue::Float)
                .ok_or_else(|| ScraperError::Parse(format!("not a number: '{}'", raw))),
            FieldCast::TextList => Ok(FieldValue::List(vec![raw.to_string()])),
        }
    }
}

/// One entry of the declarative field-extractor table:
/// name, locator, value source, caster (with its default), and deadline.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub selector: &'static str,
    pub source: FieldSource,
    pub cast: FieldCast,
    pub timeout_ms: u64,
}

impl FieldSpec {
    pub fn new(
        name: &'static str,
        selector: &'static str,
        source: FieldSource,
        cast: FieldCast,
        timeout_ms: u64,
    ) -> Self {
        Self {
            name,
            selector,
            source,
            cast,
            timeout_ms,
        }
    }
}

/// Pull the first numeric token out of text like "¥19,800" or "4.8 stars".
pub(crate) fn parse_float_loose(text: &str) -> Option<f64> {
    let mut run = String::new();
    let mut seen_digit = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            run.push(c);
            seen_digit = true;
        } else if (c == '.' || c == ',') && seen_digit {
            run.push(c);
        } else if seen_digit {
            break;
        }
    }
    if !seen_digit {
        return None;
    }
    run.replace(',', "").trim_end_matches('.').parse().ok()
}

pub(crate) fn parse_integer_loose(text: &str) -> Option<u32> {
    parse_float_loose(text).map(|value| value.max(0.0) as u32)
}

/// Drives one page context through a single detail fetch: navigate, wait
/// for the readiness anchor, then run the field table with per-field fault
/// isolation. No single field's failure can fail the whole fetch.
pub struct DetailPage<'a> {
    page: &'a Page,
    profile: &'a DetailProfile,
    page_ready_timeout: Duration,
    field_timeout_ms: u64,
}

impl<'a> DetailPage<'a> {
    pub fn new(
        page: &'a Page,
        profile: &'a DetailProfile,
        page_ready_timeout: Duration,
        field_timeout_ms: u64,
    ) -> Self {
        Self {
            page,
            profile,
            page_ready_timeout,
            field_timeout_ms,
        }
    }

    pub async fn get_detail(&self, detail_url: &str) -> Result<ItemDetail> {
        debug!("Fetching item detail: {}", detail_url);
        self.page.goto(detail_url).await.map_err(|e| {
            ScraperError::Browser(format!("Failed to navigate to {}: {}", detail_url, e))
        })?;
        self.wait_for_page_ready().await?;

        if self.profile.scroll_after_ready {
            // lazy-loaded sections only render once scrolled into view
            let _ = self
                .page
                .evaluate("window.scrollBy(0, window.innerHeight)")
                .await;
        }

        let specs = (self.profile.fields)(self.field_timeout_ms);
        let values =
            futures::future::join_all(specs.iter().map(|spec| self.extract_field(spec))).await;

        let mut detail = ItemDetail::default();
        for (spec, value) in specs.iter().zip(values) {
            if !apply_field(&mut detail, spec.name, value) {
                debug!("Ignoring unknown detail field '{}'", spec.name);
            }
        }
        Ok(detail)
    }

    async fn wait_for_page_ready(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.page_ready_timeout;
        loop {
            if self
                .page
                .find_element(self.profile.ready_selector)
                .await
                .is_ok()
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScraperError::Browser(
                    "timed out waiting for detail page".to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Run one table entry, resolving any failure (missing node, timeout,
    /// cast error) to the caster's default.
    async fn extract_field(&self, spec: &FieldSpec) -> FieldValue {
        match tokio::time::timeout(
            Duration::from_millis(spec.timeout_ms),
            self.read_field(spec),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                debug!("Could not extract field '{}': {}", spec.name, e);
                spec.cast.default_value()
            }
            Err(_) => {
                debug!("Timed out extracting field '{}'", spec.name);
                spec.cast.default_value()
            }
        }
    }

    async fn read_field(&self, spec: &FieldSpec) -> Result<FieldValue> {
        match spec.source {
            FieldSource::Text => {
                let element = self.page.find_element(spec.selector).await?;
                let text = element.inner_text().await?.unwrap_or_default();
                spec.cast.cast(text.trim())
            }
            FieldSource::Attribute(attr) => {
                let element = self.page.find_element(spec.selector).await?;
                let value = element.attribute(attr).await?.ok_or_else(|| {
                    ScraperError::Parse(format!("attribute '{}' missing", attr))
                })?;
                spec.cast.cast(value.trim())
            }
            FieldSource::TextList => {
                let elements = self.page.find_elements(spec.selector).await?;
                let mut items = Vec::new();
                for element in elements {
                    if let Ok(Some(text)) = element.inner_text().await {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            items.push(text);
                        }
                    }
                }
                Ok(FieldValue::List(items))
            }
        }
    }
}

impl FieldValue {
    fn into_text(self) -> String {
        match self {
            FieldValue::Text(s) => s,
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::List(items) => items.join(" "),
        }
    }

    fn into_u32(self) -> u32 {
        match self {
            FieldValue::Integer(i) => i,
            FieldValue::Float(f) => f.max(0.0) as u32,
            _ => 0,
        }
    }

    fn into_f64(self) -> f64 {
        match self {
            FieldValue::Float(f) => f,
            FieldValue::Integer(i) => i as f64,
            _ => 0.0,
        }
    }

    fn into_list(self) -> Vec<String> {
        match self {
            FieldValue::List(items) => items,
            FieldValue::Text(s) if !s.is_empty() => vec![s],
            _ => Vec::new(),
        }
    }
}

/// Name-keyed assembly of extracted values into the detail record.
/// Returns false for names the record does not know.
fn apply_field(detail: &mut ItemDetail, name: &str, value: FieldValue) -> bool {
    match name {
        "description" => detail.description = value.into_text(),
        "condition_text" => detail.condition_text = value.into_text(),
        "posted_date" => detail.posted_date = value.into_text(),
        "delivery_origin" => detail.delivery_origin = value.into_text(),
        "shipping_fee" => detail.shipping_fee = value.into_text(),
        "seller_name" => {
            // JP exposes the name via an aria-label suffixed "'s profile"
            detail.seller_name = value
                .into_text()
                .trim_end_matches("'s profile")
                .trim()
                .to_string();
        }
        "seller_handle" => detail.seller_handle = value.into_text(),
        "seller_review_count" => detail.seller_review_count = value.into_u32(),
        "seller_rating" => detail.seller_rating = value.into_f64(),
        "categories" => detail.categories = value.into_list(),
        "seller_verification_status" => detail.seller_verification_status = value.into_text(),
        "num_likes" => detail.num_likes = value.into_u32(),
        "converted_price" => detail.converted_price = value.into_text(),
        "price_drop" => detail.price_drop = value.into_text(),
        _ => return false,
    }
    true
}
