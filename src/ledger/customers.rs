use crate::domain::{CustomerSummary, Sale};
use rust_decimal::Decimal;
use std::collections::HashMap;

const PREFERRED_PRODUCTS_LIMIT: usize = 5;

/// Customers are keyed by their id when the order carries one, otherwise by
/// lower-cased email.
pub fn customer_key(sale: &Sale) -> String {
    match &sale.customer.customer_id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => sale.customer.email.trim().to_lowercase(),
    }
}

/// Builds the customer report from sale history. Cancelled sales are ignored;
/// contact details and customer type come from each customer's latest order.
/// Sorted by total spent, highest first.
pub fn aggregate_customers(sales: &[Sale]) -> Vec<CustomerSummary> {
    let mut grouped: HashMap<String, Vec<&Sale>> = HashMap::new();
    for sale in sales.iter().filter(|s| s.status.holds_slots()) {
        grouped.entry(customer_key(sale)).or_default().push(sale);
    }

    let mut summaries: Vec<CustomerSummary> = grouped
        .into_iter()
        .filter_map(|(key, orders)| summarize(key, &orders))
        .collect();

    summaries.sort_by(|a, b| {
        b.total_spent
            .cmp(&a.total_spent)
            .then_with(|| a.name.cmp(&b.name))
    });
    summaries
}

fn summarize(key: String, orders: &[&Sale]) -> Option<CustomerSummary> {
    let latest = orders.iter().max_by_key(|s| s.order_date)?;

    let total_spent: Decimal = orders.iter().map(|s| s.total).sum();

    let mut quantities: HashMap<&str, i64> = HashMap::new();
    for item in orders.iter().flat_map(|s| s.items.iter()) {
        *quantities.entry(item.product_name.as_str()).or_default() += i64::from(item.quantity);
    }
    let mut ranked: Vec<(&str, i64)> = quantities.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    Some(CustomerSummary {
        customer_key: key,
        name: latest.customer.name.clone(),
        email: latest.customer.email.clone(),
        phone: latest.customer.phone.clone(),
        customer_type: latest.customer_type,
        total_spent,
        total_orders: orders.len(),
        last_order_date: latest.order_date,
        preferred_products: ranked
            .into_iter()
            .take(PREFERRED_PRODUCTS_LIMIT)
            .map(|(name, _)| name.to_string())
            .collect(),
    })
}
