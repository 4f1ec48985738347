//! Conversion funnel: ordered stage counters and derived progression rates.

use serde::{Deserialize, Serialize};

use pulse_core::types::DataEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionFunnel {
    pub page_views: u64,
    pub add_to_cart: u64,
    pub checkout_started: u64,
    pub purchases: u64,
    pub customer_created: u64,
    pub leads: u64,
    #[serde(rename = "conversionRates")]
    pub conversion_rates: ConversionRates,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRates {
    pub cart_to_purchase: f64,
    pub view_to_cart: f64,
    pub view_to_purchase: f64,
    pub checkout_to_purchase: f64,
}

/// Percentage with a zero-guarded denominator: 0 rather than NaN/infinity.
fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

pub fn conversion_funnel(events: &[DataEvent]) -> ConversionFunnel {
    let mut funnel = ConversionFunnel::default();

    for event in events {
        let event_type = event.event_type.to_lowercase();

        if event_type.contains("page_view") || event_type.contains("pageview") {
            funnel.page_views += 1;
        }
        if event_type.contains("add_to_cart") || event_type.contains("addtocart") {
            funnel.add_to_cart += 1;
        }
        if event_type.contains("checkout_started") || event_type.contains("checkoutstarted") {
            funnel.checkout_started += 1;
        }
        if event_type.contains("purchase") {
            funnel.purchases += 1;
        }
        if event_type.contains("customer_created") || event_type.contains("customercreated") {
            funnel.customer_created += 1;
        }
        if event_type.contains("lead") || event_type.contains("complete_registration") {
            funnel.leads += 1;
        }
    }

    funnel.conversion_rates = ConversionRates {
        cart_to_purchase: rate(funnel.purchases, funnel.add_to_cart),
        view_to_cart: rate(funnel.add_to_cart, funnel.page_views),
        view_to_purchase: rate(funnel.purchases, funnel.page_views),
        checkout_to_purchase: rate(funnel.purchases, funnel.checkout_started),
    };

    funnel
}
