//! Merchant extractors: one per supported merchant template plus a generic
//! fallback, selected by lookup rather than inheritance.

use std::sync::LazyLock;

use ordertrail_core::{LifecycleStage, Money, ParsedProduct, ParsedRecord, ShippingInfo};
use regex::Regex;
use rust_decimal::Decimal;

use crate::document::{element_text, Document};
use crate::patterns::{
    amount_in, compile, looks_like_order_id, merchant_for_sender, MERCHANT_DOMAINS, DELIVERED_ON,
    ESTIMATED_DELIVERY, LOGISTICS_PARTNER, ORDER_DATE, ORDER_ID, ORDER_TOTAL, RETURN_DEADLINE,
    RETURN_WINDOW_DAYS, SHIPPING_DATE, TRACKING_NUMBER,
};
use crate::probe::Probe;
use crate::products::{
    extract_products, extract_quantity, extract_size, is_valid_label, CascadeProfile,
};
use crate::ExtractError;

/// Per-stage confidence weights in hundredths. Integer weights keep the
/// threshold comparison exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceWeights {
    pub merchant: u32,
    pub order_id: u32,
    pub products: u32,
    pub amount: u32,
    pub order_date: u32,
    pub delivery_date: u32,
    pub return_deadline: u32,
    pub promised_date: u32,
    pub tracking_number: u32,
    pub shipping_dates: u32,
}

impl ConfidenceWeights {
    const NONE: ConfidenceWeights = ConfidenceWeights {
        merchant: 0,
        order_id: 0,
        products: 0,
        amount: 0,
        order_date: 0,
        delivery_date: 0,
        return_deadline: 0,
        promised_date: 0,
        tracking_number: 0,
        shipping_dates: 0,
    };

    pub const DELIVERY: ConfidenceWeights = ConfidenceWeights {
        merchant: 10,
        order_id: 30,
        delivery_date: 20,
        return_deadline: 20,
        products: 10,
        amount: 10,
        ..Self::NONE
    };

    pub const CONFIRMATION: ConfidenceWeights = ConfidenceWeights {
        merchant: 10,
        order_id: 30,
        order_date: 20,
        amount: 20,
        products: 10,
        promised_date: 10,
        ..Self::NONE
    };

    pub const SHIPPING: ConfidenceWeights = ConfidenceWeights {
        merchant: 10,
        order_id: 30,
        tracking_number: 20,
        shipping_dates: 20,
        products: 10,
        amount: 10,
        ..Self::NONE
    };

    pub fn for_stage(stage: LifecycleStage) -> Self {
        match stage {
            LifecycleStage::Confirmation => Self::CONFIRMATION,
            LifecycleStage::Shipping => Self::SHIPPING,
            LifecycleStage::Delivery | LifecycleStage::Unknown => Self::DELIVERY,
        }
    }

    pub fn total(&self) -> u32 {
        self.merchant
            + self.order_id
            + self.products
            + self.amount
            + self.order_date
            + self.delivery_date
            + self.return_deadline
            + self.promised_date
            + self.tracking_number
            + self.shipping_dates
    }

    /// `has_products` is false when only a cascade placeholder is present.
    pub fn score(&self, record: &ParsedRecord, has_products: bool) -> f64 {
        let shipping = &record.shipping;
        let parts = [
            (record.merchant_name.is_some(), self.merchant),
            (record.order_id.is_some(), self.order_id),
            (has_products, self.products),
            (record.total.is_some(), self.amount),
            (record.order_date.is_some(), self.order_date),
            (record.delivery_date.is_some(), self.delivery_date),
            (
                record.return_deadline.is_some() || record.return_window_days.is_some(),
                self.return_deadline,
            ),
            (
                record.delivery_date.is_some() || shipping.estimated_delivery.is_some(),
                self.promised_date,
            ),
            (shipping.tracking_number.is_some(), self.tracking_number),
            (
                shipping.shipping_date.is_some() || shipping.estimated_delivery.is_some(),
                self.shipping_dates,
            ),
        ];
        let hundredths: u32 = parts.iter().filter(|(hit, _)| *hit).map(|(_, w)| w).sum();
        f64::from(hundredths.min(100)) / 100.0
    }
}

pub trait MerchantExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract_confirmation(&self, document: &Document) -> Result<ParsedRecord, ExtractError>;

    fn extract_shipping(&self, document: &Document) -> Result<ParsedRecord, ExtractError>;

    fn extract_delivery(&self, document: &Document) -> Result<ParsedRecord, ExtractError>;

    /// Best-effort extraction of every field, used for `unknown` messages.
    fn extract_generic(&self, document: &Document) -> Result<ParsedRecord, ExtractError>;

    fn extract(
        &self,
        document: &Document,
        stage: LifecycleStage,
    ) -> Result<ParsedRecord, ExtractError> {
        match stage {
            LifecycleStage::Confirmation => self.extract_confirmation(document),
            LifecycleStage::Shipping => self.extract_shipping(document),
            LifecycleStage::Delivery => self.extract_delivery(document),
            LifecycleStage::Unknown => self.extract_generic(document),
        }
    }
}

pub fn extractor_for_merchant(merchant: &str) -> Box<dyn MerchantExtractor> {
    match merchant.trim().to_ascii_lowercase().as_str() {
        "myntra" => Box::new(MyntraExtractor),
        "h&m" | "hm" | "h & m" => Box::new(HmExtractor),
        other => {
            let known = MERCHANT_DOMAINS
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(other))
                .map(|(_, name)| *name);
            Box::new(GenericExtractor { merchant: known })
        }
    }
}

pub fn extractor_for_sender(sender: &str) -> Box<dyn MerchantExtractor> {
    match merchant_for_sender(sender) {
        Some(merchant) => extractor_for_merchant(merchant),
        None => Box::new(GenericExtractor::default()),
    }
}

fn record_from(
    probe: Probe<'_>,
    stage: LifecycleStage,
    fields: RecordFields,
    weights: ConfidenceWeights,
    has_products: bool,
) -> ParsedRecord {
    let mut record = ParsedRecord {
        merchant_name: fields.merchant_name,
        order_id: fields.order_id,
        order_date: fields.order_date,
        delivery_date: fields.delivery_date,
        return_deadline: fields.return_deadline,
        return_window_days: fields.return_window_days,
        total: fields.total.map(Money::inr),
        stage,
        confidence: 0.0,
        shipping: fields.shipping,
        products: fields.products,
        provenance: probe.finish(),
    };
    record.confidence = weights.score(&record, has_products);
    record
}

#[derive(Debug, Default)]
struct RecordFields {
    merchant_name: Option<String>,
    order_id: Option<String>,
    order_date: Option<chrono::NaiveDate>,
    delivery_date: Option<chrono::NaiveDate>,
    return_deadline: Option<chrono::NaiveDate>,
    return_window_days: Option<u32>,
    total: Option<Decimal>,
    shipping: ShippingInfo,
    products: Vec<ParsedProduct>,
}

static TRACK_ORDER_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)track.*order").expect("track order regex"));

/// Carrier tracking link: a "track order" button first, then any link that
/// points at tracking or shipping, then a merchant link about the order.
fn find_tracking_url(
    probe: &mut Probe<'_>,
    merchant_domain: &str,
) -> Result<Option<String>, ExtractError> {
    let links = probe.document().select("tracking_url", "a[href]")?;
    let href_of = |link: &scraper::ElementRef<'_>| link.value().attr("href").map(str::to_string);

    let by_text = links
        .iter()
        .find(|link| TRACK_ORDER_TEXT.is_match(&element_text(**link)))
        .and_then(href_of);
    let by_href = || {
        links
            .iter()
            .filter_map(href_of)
            .find(|href| {
                let lower = href.to_ascii_lowercase();
                lower.contains("track") || lower.contains("shipping")
            })
    };
    let by_domain = || {
        links.iter().filter_map(href_of).find(|href| {
            let lower = href.to_ascii_lowercase();
            lower.contains(merchant_domain) && (lower.contains("track") || lower.contains("order"))
        })
    };
    let url = by_text.or_else(by_href).or_else(by_domain);
    if let Some(url) = &url {
        probe.record("tracking_url", "a[href]", url);
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Myntra

const MYNTRA: &str = "Myntra";

static MYNTRA_ITEM_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Item(?:ProductDescription|ProductBrandName|ProductName)(?:-(\d+))?$")
        .expect("myntra item id regex")
});
static SOLD_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Sold\s+by:?\s*(.+)").expect("sold by regex"));

static MYNTRA_ORDER_ID: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Your\s+order\s+ID\s*[:\s]*([A-Z0-9\-]+)",
        r"Order\s+ID[:\s]+([A-Z0-9\-]+)",
        r"Your\s+Packet\s+Id\s*:\s*(\d+)",
        r"Order\s*#?\s*([A-Z0-9\-]+)",
    ])
});
static MYNTRA_SHIPMENT_ID: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Order\s+ID[:\s]+([A-Z0-9\-]+)",
        r"Your\s+Tracking\s+Id[:\s]+([A-Z0-9\-]+)",
        r"Tracking\s+Id[:\s]+([A-Z0-9\-]+)",
    ])
});
static MYNTRA_CONFIRMED_ON: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Order.*?confirmed.*?\bon\s+([^.\n]+)",
        r"Order.*?placed.*?\bon\s+([^.\n]+)",
        r"confirmed.*?\bon\s+([^.\n]+)",
    ])
});
static MYNTRA_PROMISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Delivery\s+by\s+([^.\n]+)",
        r"Expected\s+delivery\s+(?:by\s+)?([^.\n]+)",
    ])
});
static MYNTRA_DELIVERED_ON: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Delivered.*?\bon\s+([^.\n]+)",
        r"Delivery.*?\bon\s+([^.\n]+)",
    ])
});
static MYNTRA_AVAILABLE_TILL: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"Available\s+till\s+([^.\n]+)"]));

const MYNTRA_PROFILE: CascadeProfile = CascadeProfile {
    product_link_markers: &["/buy", "myntra.com/p/"],
    line_item_selectors: &["[id^=\"ItemProductDescription\"]", "tr[class*=\"item\"]"],
    placeholder_name: crate::products::PLACEHOLDER_PRODUCT,
};

/// Myntra's templates tag every field with an element id; text patterns
/// only cover for older layouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct MyntraExtractor;

impl MyntraExtractor {
    fn order_id(
        &self,
        probe: &mut Probe<'_>,
        patterns: &[Regex],
    ) -> Result<Option<String>, ExtractError> {
        let from_element = probe
            .element_text("order_id", "li#OrderId")?
            .filter(|id| looks_like_order_id(id));
        Ok(from_element.or_else(|| probe.pattern_order_id("order_id", patterns)))
    }

    fn total(&self, probe: &mut Probe<'_>) -> Result<Option<Decimal>, ExtractError> {
        let from_element = probe.element_amount("total", "#TotalAmountValueId")?;
        Ok(from_element.or_else(|| probe.pattern_amount("total", &ORDER_TOTAL)))
    }

    fn packet_date(
        &self,
        probe: &mut Probe<'_>,
        field: &'static str,
        patterns: &[Regex],
    ) -> Result<Option<chrono::NaiveDate>, ExtractError> {
        let from_element = probe.element_date(field, "span#PacketCreationTimeId")?;
        Ok(from_element.or_else(|| probe.pattern_date(field, patterns)))
    }

    fn promised_date(
        &self,
        probe: &mut Probe<'_>,
    ) -> Result<Option<chrono::NaiveDate>, ExtractError> {
        let from_element = probe.element_date("estimated_delivery", "span#CustomerPromiseTimeId")?;
        Ok(from_element.or_else(|| probe.pattern_date("estimated_delivery", &MYNTRA_PROMISE)))
    }

    fn delivered_date(
        &self,
        probe: &mut Probe<'_>,
    ) -> Result<Option<chrono::NaiveDate>, ExtractError> {
        let from_element = probe.element_date("delivery_date", "span#OrderDeliveredDateId")?;
        Ok(from_element.or_else(|| probe.pattern_date("delivery_date", &MYNTRA_DELIVERED_ON)))
    }

    fn available_till(
        &self,
        probe: &mut Probe<'_>,
    ) -> Result<Option<chrono::NaiveDate>, ExtractError> {
        let from_element = probe.element_date("return_deadline", "span#AvailableTillDateId")?;
        Ok(from_element.or_else(|| probe.pattern_date("return_deadline", &MYNTRA_AVAILABLE_TILL)))
    }

    fn courier(&self, probe: &mut Probe<'_>) -> Result<Option<String>, ExtractError> {
        let from_element = probe.element_text("logistics_partner", "span#CourierDisplayNameId")?;
        Ok(from_element.or_else(|| probe.pattern_text("logistics_partner", &LOGISTICS_PARTNER)))
    }

    /// Line items keyed by the numeric suffix on their element ids. Layouts
    /// without suffixes carry a single item.
    fn items(&self, probe: &mut Probe<'_>) -> Result<Vec<ParsedProduct>, ExtractError> {
        let document = probe.document();
        let mut keys: Vec<Option<String>> = Vec::new();
        for element in document.select("products", "[id^=\"Item\"]")? {
            let item_id = element.value().attr("id");
            let Some(caps) = item_id.and_then(|id| MYNTRA_ITEM_ID.captures(id)) else {
                continue;
            };
            let key = caps.get(1).map(|m| m.as_str().to_string());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut items = Vec::new();
        for key in keys {
            let css = |base: &str| match &key {
                Some(index) => format!("[id=\"{base}-{index}\"]"),
                None => format!("[id=\"{base}\"]"),
            };
            let brand = document.select_first_text("products", &css("ItemProductBrandName"))?;
            let product = document.select_first_text("products", &css("ItemProductName"))?;
            let name = match (brand, product) {
                (Some(brand), Some(product)) => format!("{brand} {product}"),
                (None, Some(only)) | (Some(only), None) => only,
                (None, None) => continue,
            };
            let size = document
                .select_first_text("products", &css("ItemSize"))?
                .unwrap_or_default();
            let quantity = document
                .select_first_text("products", &css("ItemQuantity"))?
                .and_then(|q| q.trim().parse::<u32>().ok())
                .filter(|q| *q > 0)
                .unwrap_or(1);
            let price = document
                .select_first_text("products", &css("ItemTotal"))?
                .and_then(|text| amount_in(&text))
                .unwrap_or(Decimal::ZERO);
            let seller = document
                .select_first_text("products", &css("ItemSellerName"))?
                .map(|text| {
                    SOLD_BY
                        .captures(&text)
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or(text)
                })
                .unwrap_or_default();
            probe.record("products", &css("ItemProductName"), &name);
            items.push(ParsedProduct {
                name,
                size,
                quantity,
                price,
                seller,
            });
        }
        Ok(items)
    }

    /// Template items, else whatever the cascade finds. The placeholder is
    /// dropped so the merger can price its own fallback item.
    fn products(&self, probe: &mut Probe<'_>) -> Result<Vec<ParsedProduct>, ExtractError> {
        let items = self.items(probe)?;
        if !items.is_empty() {
            probe.note("products", "template");
            return Ok(items);
        }
        let outcome = extract_products(probe.document(), &MYNTRA_PROFILE);
        probe.note(
            "products",
            outcome.strategy.map(|s| s.as_str()).unwrap_or("placeholder"),
        );
        Ok(outcome.found())
    }
}

impl MerchantExtractor for MyntraExtractor {
    fn name(&self) -> &'static str {
        "myntra"
    }

    fn extract_confirmation(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        let mut probe = Probe::new(document, "html-myntra-confirmation-v1");
        let mut fields = RecordFields {
            merchant_name: Some(MYNTRA.to_string()),
            order_id: self.order_id(&mut probe, &MYNTRA_ORDER_ID)?,
            order_date: self.packet_date(&mut probe, "order_date", &MYNTRA_CONFIRMED_ON)?,
            total: self.total(&mut probe)?,
            products: self.products(&mut probe)?,
            ..Default::default()
        };
        fields.shipping.estimated_delivery = self.promised_date(&mut probe)?;
        let has_products = !fields.products.is_empty();
        Ok(record_from(
            probe,
            LifecycleStage::Confirmation,
            fields,
            ConfidenceWeights::CONFIRMATION,
            has_products,
        ))
    }

    fn extract_shipping(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        let mut probe = Probe::new(document, "html-myntra-shipping-v1");
        let order_id = self.order_id(&mut probe, &MYNTRA_SHIPMENT_ID)?;
        let tracking_number = probe
            .pattern_text("tracking_number", &TRACKING_NUMBER)
            .or_else(|| order_id.clone());
        let shipping = ShippingInfo {
            tracking_number,
            tracking_url: find_tracking_url(&mut probe, "myntra.com")?,
            logistics_partner: self.courier(&mut probe)?,
            shipping_date: self.packet_date(&mut probe, "shipping_date", &SHIPPING_DATE)?,
            estimated_delivery: self.promised_date(&mut probe)?,
        };
        let fields = RecordFields {
            merchant_name: Some(MYNTRA.to_string()),
            order_id,
            total: self.total(&mut probe)?,
            products: self.products(&mut probe)?,
            shipping,
            ..Default::default()
        };
        let has_products = !fields.products.is_empty();
        Ok(record_from(
            probe,
            LifecycleStage::Shipping,
            fields,
            ConfidenceWeights::SHIPPING,
            has_products,
        ))
    }

    fn extract_delivery(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        let mut probe = Probe::new(document, "html-myntra-delivery-v1");
        let fields = RecordFields {
            merchant_name: Some(MYNTRA.to_string()),
            order_id: self.order_id(&mut probe, &MYNTRA_ORDER_ID)?,
            delivery_date: self.delivered_date(&mut probe)?,
            return_deadline: self.available_till(&mut probe)?,
            total: self.total(&mut probe)?,
            products: self.products(&mut probe)?,
            ..Default::default()
        };
        let has_products = !fields.products.is_empty();
        Ok(record_from(
            probe,
            LifecycleStage::Delivery,
            fields,
            ConfidenceWeights::DELIVERY,
            has_products,
        ))
    }

    fn extract_generic(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        let mut probe = Probe::new(document, "html-myntra-generic");
        let mut fields = RecordFields {
            merchant_name: Some(MYNTRA.to_string()),
            order_id: self.order_id(&mut probe, &MYNTRA_ORDER_ID)?,
            order_date: self.packet_date(&mut probe, "order_date", &MYNTRA_CONFIRMED_ON)?,
            delivery_date: self.delivered_date(&mut probe)?,
            return_deadline: self.available_till(&mut probe)?,
            total: self.total(&mut probe)?,
            products: self.products(&mut probe)?,
            ..Default::default()
        };
        fields.shipping.estimated_delivery = self.promised_date(&mut probe)?;
        fields.shipping.logistics_partner = self.courier(&mut probe)?;
        let has_products = !fields.products.is_empty();
        Ok(record_from(
            probe,
            LifecycleStage::Unknown,
            fields,
            ConfidenceWeights::DELIVERY,
            has_products,
        ))
    }
}

// ---------------------------------------------------------------------------
// H&M

const HM: &str = "H&M";

static HM_ORDER_ID: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Order\s+Number[:\s]+(\d+)",
        r"Order\s+ID[:\s]+(\d+)",
        r"Order\s*#?\s*(\d+)",
        r"Your\s+order\s+(\d+)",
    ])
});

const HM_PROFILE: CascadeProfile = CascadeProfile {
    product_link_markers: &["productpage", "/product/"],
    line_item_selectors: &["tr.article", "[class*=\"article-row\"]", "[class*=\"product-row\"]"],
    placeholder_name: "H&M Product",
};

/// H&M sends one message that carries everything, so every stage runs the
/// same extraction and reports `delivery`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmExtractor;

impl HmExtractor {
    fn extract_everything(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        let mut probe = Probe::new(document, "html-hm-delivery-v1");
        let total = probe.pattern_amount("total", &ORDER_TOTAL);

        let outcome = extract_products(document, &HM_PROFILE);
        let (mut products, has_products) = match outcome.strategy {
            Some(strategy) => {
                probe.note("products", strategy.as_str());
                (outcome.products, true)
            }
            None => {
                let named = named_product_links(&mut probe, &HM_PROFILE)?;
                if named.is_empty() {
                    probe.note("products", "placeholder");
                    (outcome.products, false)
                } else {
                    probe.note("products", "named_links");
                    (named, true)
                }
            }
        };
        for product in &mut products {
            if product.seller.is_empty() {
                product.seller = HM.to_string();
            }
        }
        if let Some(total) = total {
            if distribute_total(&mut products, total) {
                probe.note("price_distribution", "even");
            }
        }

        let shipping = ShippingInfo {
            tracking_number: probe.pattern_text("tracking_number", &TRACKING_NUMBER),
            tracking_url: find_tracking_url(&mut probe, "hm.com")?,
            ..Default::default()
        };
        let fields = RecordFields {
            merchant_name: Some(HM.to_string()),
            order_id: probe.pattern_order_id("order_id", &HM_ORDER_ID),
            order_date: probe.pattern_date("order_date", &ORDER_DATE),
            delivery_date: probe.pattern_date("delivery_date", &DELIVERED_ON),
            return_deadline: probe.pattern_date("return_deadline", &RETURN_DEADLINE),
            return_window_days: probe.pattern_days("return_window_days", &RETURN_WINDOW_DAYS),
            total,
            shipping,
            products,
        };
        Ok(record_from(
            probe,
            LifecycleStage::Delivery,
            fields,
            ConfidenceWeights::DELIVERY,
            has_products,
        ))
    }
}

/// Product-page links whose text reads like a product name. H&M lists
/// items without prices, so these come back unpriced.
fn named_product_links(
    probe: &mut Probe<'_>,
    profile: &CascadeProfile,
) -> Result<Vec<ParsedProduct>, ExtractError> {
    let mut items: Vec<ParsedProduct> = Vec::new();
    for link in probe.document().select("products", "a[href]")? {
        let href = link.value().attr("href").unwrap_or_default().to_ascii_lowercase();
        if !profile.product_link_markers.iter().any(|m| href.contains(m)) {
            continue;
        }
        let name = element_text(link);
        if !is_valid_label(&name, 3) || items.iter().any(|p| p.name == name) {
            continue;
        }
        let row = link
            .ancestors()
            .filter_map(scraper::ElementRef::wrap)
            .find(|el| matches!(el.value().name(), "tr" | "li" | "div"))
            .map(element_text)
            .unwrap_or_else(|| name.clone());
        probe.record("products", "a[href]", &name);
        items.push(ParsedProduct {
            size: extract_size(&row),
            quantity: extract_quantity(&row),
            ..ParsedProduct::new(name, Decimal::ZERO)
        });
    }
    Ok(items)
}

/// Spread `total` evenly over items when none carries a price of its own.
pub fn distribute_total(products: &mut [ParsedProduct], total: Decimal) -> bool {
    if products.is_empty() || total.is_zero() || products.iter().any(|p| !p.price.is_zero()) {
        return false;
    }
    let share = (total / Decimal::from(products.len())).round_dp(2);
    for product in products.iter_mut() {
        product.price = share;
    }
    true
}

impl MerchantExtractor for HmExtractor {
    fn name(&self) -> &'static str {
        "hm"
    }

    fn extract_confirmation(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_everything(document)
    }

    fn extract_shipping(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_everything(document)
    }

    fn extract_delivery(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_everything(document)
    }

    fn extract_generic(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_everything(document)
    }
}

// ---------------------------------------------------------------------------
// Generic

/// Text patterns plus the product cascade, for merchants without a
/// dedicated template. The merchant comes from the sender domain unless
/// fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericExtractor {
    merchant: Option<&'static str>,
}

impl GenericExtractor {
    pub fn for_merchant(merchant: &'static str) -> Self {
        Self {
            merchant: Some(merchant),
        }
    }

    fn extract_stage(
        &self,
        document: &Document,
        stage: LifecycleStage,
    ) -> Result<ParsedRecord, ExtractError> {
        let mut probe = Probe::new(document, format!("text-generic-{stage}-v1"));
        let all = stage == LifecycleStage::Unknown;
        let mut fields = RecordFields::default();

        fields.merchant_name = match self.merchant {
            Some(merchant) => Some(merchant.to_string()),
            None => {
                let merchant = merchant_for_sender(document.sender());
                if let Some(merchant) = merchant {
                    probe.record("merchant_name", "sender-domain", document.sender());
                }
                merchant.map(str::to_string)
            }
        };
        fields.order_id = probe.pattern_order_id("order_id", &ORDER_ID);
        fields.total = probe.pattern_amount("total", &ORDER_TOTAL);

        if all || stage == LifecycleStage::Confirmation {
            fields.order_date = probe.pattern_date("order_date", &ORDER_DATE);
        }
        if all || stage == LifecycleStage::Delivery {
            fields.delivery_date = probe.pattern_date("delivery_date", &DELIVERED_ON);
            fields.return_deadline = probe.pattern_date("return_deadline", &RETURN_DEADLINE);
            fields.return_window_days =
                probe.pattern_days("return_window_days", &RETURN_WINDOW_DAYS);
        }
        if all || stage != LifecycleStage::Delivery {
            fields.shipping.estimated_delivery =
                probe.pattern_date("estimated_delivery", &ESTIMATED_DELIVERY);
        }
        if all || stage != LifecycleStage::Confirmation {
            fields.shipping.tracking_number =
                probe.pattern_text("tracking_number", &TRACKING_NUMBER);
        }
        if all || stage == LifecycleStage::Shipping {
            fields.shipping.logistics_partner =
                probe.pattern_text("logistics_partner", &LOGISTICS_PARTNER);
            fields.shipping.shipping_date = probe.pattern_date("shipping_date", &SHIPPING_DATE);
            let domain = fields
                .merchant_name
                .as_deref()
                .and_then(|name| MERCHANT_DOMAINS.iter().find(|(_, m)| *m == name))
                .map(|(domain, _)| *domain)
                .unwrap_or("track");
            fields.shipping.tracking_url = find_tracking_url(&mut probe, domain)?;
        }

        let outcome = extract_products(document, &CascadeProfile::GENERIC);
        probe.note(
            "products",
            outcome.strategy.map(|s| s.as_str()).unwrap_or("placeholder"),
        );
        fields.products = outcome.found();
        let has_products = !fields.products.is_empty();

        Ok(record_from(
            probe,
            stage,
            fields,
            ConfidenceWeights::for_stage(stage),
            has_products,
        ))
    }
}

impl MerchantExtractor for GenericExtractor {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn extract_confirmation(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_stage(document, LifecycleStage::Confirmation)
    }

    fn extract_shipping(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_stage(document, LifecycleStage::Shipping)
    }

    fn extract_delivery(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_stage(document, LifecycleStage::Delivery)
    }

    fn extract_generic(&self, document: &Document) -> Result<ParsedRecord, ExtractError> {
        self.extract_stage(document, LifecycleStage::Unknown)
    }
}
