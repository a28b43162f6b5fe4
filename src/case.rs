//! Name helpers for default key columns: table "SaleItems" -> "sale_item_id".

/// Convert a single identifier from CamelCase/camelCase to snake_case.
/// e.g. "SaleItems" -> "sale_items", "productId" -> "product_id"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Naive English singular: "categories" -> "category", "sales" -> "sale", "stock" -> "stock".
pub fn singular(s: &str) -> String {
    if let Some(stem) = s.strip_suffix("ies") {
        format!("{}y", stem)
    } else if s.ends_with("ss") {
        s.to_string()
    } else if let Some(stem) = s.strip_suffix('s') {
        stem.to_string()
    } else {
        s.to_string()
    }
}

/// Default name of a column referencing rows of `table`.
pub fn key_column_for(table: &str) -> String {
    format!("{}_id", singular(&to_snake_case(table)))
}
