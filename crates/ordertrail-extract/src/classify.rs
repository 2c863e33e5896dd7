use ordertrail_core::LifecycleStage;
use tracing::warn;

use crate::document::Document;
use crate::ExtractError;

/// Template markers unique to a merchant's layout. Checked in this order,
/// first hit wins; they break ties the keyword scan cannot.
#[derive(Debug, Clone, Copy)]
enum Marker {
    Element(&'static str),
    SpanIdContains(&'static str),
    ElementWithText(&'static str, &'static str),
}

const STRUCTURAL_MARKERS: &[(Marker, LifecycleStage)] = &[
    (Marker::Element("span#AvailableTillDateId"), LifecycleStage::Delivery),
    (Marker::Element("span#OrderDeliveredDateId"), LifecycleStage::Delivery),
    (Marker::Element("span#CourierDisplayNameId"), LifecycleStage::Shipping),
    (Marker::SpanIdContains("tracking"), LifecycleStage::Shipping),
    (Marker::ElementWithText("li#OrderId", "shipped"), LifecycleStage::Shipping),
    (Marker::Element("li#OrderId"), LifecycleStage::Confirmation),
    (Marker::Element("span#PacketCreationTimeId"), LifecycleStage::Confirmation),
    (Marker::Element("span#CustomerPromiseTimeId"), LifecycleStage::Confirmation),
];

const KEYWORDS: &[(LifecycleStage, &[&str])] = &[
    (
        LifecycleStage::Confirmation,
        &[
            "order confirmed",
            "order placed",
            "order received",
            "payment successful",
            "order confirmation",
            "thank you for your order",
            "order details",
            "order summary",
        ],
    ),
    (
        LifecycleStage::Shipping,
        &[
            "shipped",
            "dispatched",
            "on the way",
            "in transit",
            "tracking",
            "shipment",
            "out for delivery",
            "track your order",
        ],
    ),
    (
        LifecycleStage::Delivery,
        &[
            "delivered",
            "delivery successful",
            "package delivered",
            "order delivered",
            "received your order",
            "delivered successfully",
            "available till",
            "return window",
            "return policy",
        ],
    ),
];

/// Map a message to its lifecycle stage. Pure and total.
pub fn classify(document: &Document) -> LifecycleStage {
    let flat_text = document.lines().join(" ").to_lowercase();

    for (marker, stage) in STRUCTURAL_MARKERS {
        match marker_fires(document, *marker, &flat_text) {
            Ok(true) => return *stage,
            Ok(false) => {}
            Err(err) => warn!(?marker, %err, "structural marker check failed"),
        }
    }

    KEYWORDS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| flat_text.contains(phrase)))
        .map(|(stage, _)| *stage)
        .unwrap_or(LifecycleStage::Unknown)
}

fn marker_fires(
    document: &Document,
    marker: Marker,
    flat_text: &str,
) -> Result<bool, ExtractError> {
    match marker {
        Marker::Element(css) => document.exists("stage", css),
        Marker::ElementWithText(css, needle) => {
            Ok(document.exists("stage", css)? && flat_text.contains(needle))
        }
        Marker::SpanIdContains(needle) => {
            let spans = document.select("stage", "span[id]")?;
            Ok(spans.iter().any(|span| {
                span.value()
                    .attr("id")
                    .is_some_and(|id| id.to_ascii_lowercase().contains(needle))
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn doc(html: &str) -> Document {
        Document::parse(html, "", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    #[test]
    fn structural_markers_beat_keywords() {
        let html = r#"<p>Order confirmed on 1 Jan</p><span id="OrderDeliveredDateId">on 10 Jan</span>"#;
        assert_eq!(classify(&doc(html)), LifecycleStage::Delivery);
    }

    #[test]
    fn marker_order_is_preserved() {
        let both = r#"<span id="CourierDisplayNameId">Ekart</span><span id="AvailableTillDateId">20 Jan</span>"#;
        assert_eq!(classify(&doc(both)), LifecycleStage::Delivery);

        let tracking = r#"<span id="shipmentTrackingNo">TRK1</span><li id="OrderId">123</li>"#;
        assert_eq!(classify(&doc(tracking)), LifecycleStage::Shipping);

        let shipped = r#"<ul><li id="OrderId">123</li></ul><p>Your item has been shipped</p>"#;
        assert_eq!(classify(&doc(shipped)), LifecycleStage::Shipping);

        let placed = r#"<ul><li id="OrderId">123</li></ul><p>Thanks!</p>"#;
        assert_eq!(classify(&doc(placed)), LifecycleStage::Confirmation);

        let promise = r#"<span id="CustomerPromiseTimeId">Fri, 3 Jan</span>"#;
        assert_eq!(classify(&doc(promise)), LifecycleStage::Confirmation);
    }

    #[test]
    fn keyword_categories_are_checked_in_order() {
        assert_eq!(
            classify(&doc("<p>Order placed. It will be shipped soon.</p>")),
            LifecycleStage::Confirmation
        );
        assert_eq!(
            classify(&doc("<p>Your package is in transit</p>")),
            LifecycleStage::Shipping
        );
        assert_eq!(
            classify(&doc("<p>Your parcel was delivered today</p>")),
            LifecycleStage::Delivery
        );
    }

    #[test]
    fn keywords_in_hidden_markup_are_ignored() {
        let html = "<head><title>Delivered</title></head><body><p>Hello there</p></body>";
        assert_eq!(classify(&doc(html)), LifecycleStage::Unknown);
    }

    #[test]
    fn classification_is_total_and_deterministic() {
        for html in ["", "<p></p>", "<<<>>>", "plain words only", "<span id=''>x</span>"] {
            let first = classify(&doc(html));
            assert_eq!(first, classify(&doc(html)));
            assert!(LifecycleStage::ALL.contains(&first));
        }
    }
}
