//! Standard response envelope helpers.

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Pagination block of an index response. `from`/`to` are 1-based and null on an empty page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub count: u64,
    pub total: u64,
    pub current_page: u64,
    pub per_page: u64,
    pub last_page: u64,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl PageMeta {
    pub fn new(count: u64, total: u64, page: u64, per_page: u64, offset: u64) -> Self {
        let per_page = per_page.max(1);
        PageMeta {
            count,
            total,
            current_page: page,
            per_page,
            last_page: total.div_ceil(per_page).max(1),
            from: (count > 0).then_some(offset + 1),
            to: (count > 0).then_some(offset + count),
        }
    }
}

pub fn success_one<T: Serialize>(data: T) -> Value {
    serde_json::to_value(SuccessOne { data }).unwrap_or(Value::Null)
}

pub fn success_many<T: Serialize>(data: Vec<T>, meta: PageMeta) -> Value {
    serde_json::to_value(SuccessMany { data, meta }).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_meta_bounds() {
        let meta = PageMeta::new(20, 45, 2, 20, 20);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.from, Some(21));
        assert_eq!(meta.to, Some(40));

        let empty = PageMeta::new(0, 0, 1, 20, 0);
        assert_eq!(empty.last_page, 1);
        assert_eq!(empty.from, None);
    }
}
