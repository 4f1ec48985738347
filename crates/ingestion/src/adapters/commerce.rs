//! Commerce adapter: admin-API access to recent orders, customers, and
//! products, bounded by a rolling lookback window.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use pulse_core::config::IngestionConfig;
use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::{ConnectionStatus, RawEvent, SourceType};

use super::{config_field, connect_timeout, fetch_timeout, SourceAdapter};

const API_VERSION: &str = "2023-10";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

pub struct CommerceAdapter {
    http: reqwest::Client,
    ingestion: IngestionConfig,
}

impl CommerceAdapter {
    pub fn new(ingestion: IngestionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            ingestion,
        }
    }

    fn admin_url(shop_domain: &str, resource: &str) -> String {
        format!("https://{shop_domain}.myshopify.com/admin/api/{API_VERSION}/{resource}")
    }

    async fn get_json(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, &str)],
        timeout: std::time::Duration,
    ) -> PulseResult<Value> {
        let response = self
            .http
            .get(url)
            .header(ACCESS_TOKEN_HEADER, access_token)
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, url, "commerce API call failed");
            return Err(PulseError::Connection(format!(
                "commerce API returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    /// Shop metadata from the admin API.
    pub async fn shop_info(&self, config: &Value) -> PulseResult<Value> {
        let shop_domain = config_field(config, "shopDomain")?;
        let access_token = config_field(config, "accessToken")?;

        let response = self
            .get_json(
                &Self::admin_url(shop_domain, "shop.json"),
                access_token,
                &[],
                fetch_timeout(&self.ingestion),
            )
            .await?;
        Ok(response.get("shop").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SourceAdapter for CommerceAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Commerce
    }

    async fn test_connection(
        &self,
        _user_id: Uuid,
        config: &Value,
    ) -> PulseResult<ConnectionStatus> {
        let (shop_domain, access_token) = match (
            config_field(config, "shopDomain"),
            config_field(config, "accessToken"),
        ) {
            (Ok(s), Ok(t)) => (s, t),
            _ => {
                return Ok(ConnectionStatus::failed(
                    "Missing required configuration: shopDomain and accessToken",
                ))
            }
        };

        let result = self
            .get_json(
                &Self::admin_url(shop_domain, "shop.json"),
                access_token,
                &[],
                connect_timeout(&self.ingestion),
            )
            .await;

        Ok(match result {
            Ok(_) => ConnectionStatus::ok("Shopify connection successful"),
            Err(_) => ConnectionStatus::failed("Shopify connection test failed"),
        })
    }

    async fn fetch_events(&self, _user_id: Uuid, config: &Value) -> PulseResult<Vec<RawEvent>> {
        let shop_domain = config_field(config, "shopDomain")?;
        let access_token = config_field(config, "accessToken")?;

        let limit = self.ingestion.commerce_page_size.to_string();
        let created_at_min =
            (Utc::now() - Duration::days(self.ingestion.lookback_days)).to_rfc3339();
        let timeout = fetch_timeout(&self.ingestion);

        // Orders, customers, and products are independent listings.
        let orders_url = Self::admin_url(shop_domain, "orders.json");
        let customers_url = Self::admin_url(shop_domain, "customers.json");
        let products_url = Self::admin_url(shop_domain, "products.json");
        let orders_params = [
            ("limit", limit.as_str()),
            ("status", "any"),
            ("created_at_min", created_at_min.as_str()),
        ];
        let customers_params = [
            ("limit", limit.as_str()),
            ("created_at_min", created_at_min.as_str()),
        ];
        let products_params = [
            ("limit", limit.as_str()),
            ("created_at_min", created_at_min.as_str()),
        ];
        let (orders, customers, products) = tokio::try_join!(
            self.get_json(&orders_url, access_token, &orders_params, timeout),
            self.get_json(&customers_url, access_token, &customers_params, timeout),
            self.get_json(&products_url, access_token, &products_params, timeout),
        )?;

        let mut events = map_orders_response(&orders);
        events.extend(map_customers_response(&customers));
        events.extend(map_products_response(&products));

        info!(shop_domain, count = events.len(), "fetched commerce records");
        Ok(events)
    }
}

fn created_at(item: &Value) -> DateTime<Utc> {
    item.get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now)
}

fn map_orders_response(response: &Value) -> Vec<RawEvent> {
    let Some(orders) = response.get("orders").and_then(Value::as_array) else {
        return Vec::new();
    };

    orders
        .iter()
        .map(|order| {
            RawEvent::new(
                "shopify_order",
                json!({
                    "orderId": order.get("id"),
                    "orderNumber": order.get("order_number"),
                    "totalPrice": order.get("total_price"),
                    "currency": order.get("currency"),
                    "customer": order.get("customer"),
                    "lineItems": order.get("line_items"),
                    "financialStatus": order.get("financial_status"),
                    "fulfillmentStatus": order.get("fulfillment_status"),
                    "createdAt": order.get("created_at"),
                    "updatedAt": order.get("updated_at"),
                }),
                created_at(order),
            )
            .with_source(SourceType::Commerce)
        })
        .collect()
}

fn map_customers_response(response: &Value) -> Vec<RawEvent> {
    let Some(customers) = response.get("customers").and_then(Value::as_array) else {
        return Vec::new();
    };

    customers
        .iter()
        .map(|customer| {
            RawEvent::new(
                "shopify_customer",
                json!({
                    "customerId": customer.get("id"),
                    "email": customer.get("email"),
                    "firstName": customer.get("first_name"),
                    "lastName": customer.get("last_name"),
                    "totalSpent": customer.get("total_spent"),
                    "ordersCount": customer.get("orders_count"),
                    "state": customer.get("state"),
                    "createdAt": customer.get("created_at"),
                    "updatedAt": customer.get("updated_at"),
                }),
                created_at(customer),
            )
            .with_source(SourceType::Commerce)
        })
        .collect()
}

fn map_products_response(response: &Value) -> Vec<RawEvent> {
    let Some(products) = response.get("products").and_then(Value::as_array) else {
        return Vec::new();
    };

    products
        .iter()
        .map(|product| {
            RawEvent::new(
                "shopify_product",
                json!({
                    "productId": product.get("id"),
                    "title": product.get("title"),
                    "handle": product.get("handle"),
                    "vendor": product.get("vendor"),
                    "productType": product.get("product_type"),
                    "status": product.get("status"),
                    "tags": product.get("tags"),
                    "variants": product.get("variants"),
                    "images": product.get("images"),
                    "createdAt": product.get("created_at"),
                    "updatedAt": product.get("updated_at"),
                }),
                created_at(product),
            )
            .with_source(SourceType::Commerce)
        })
        .collect()
}
