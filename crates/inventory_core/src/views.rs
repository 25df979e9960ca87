//! crates/inventory_core/src/views.rs
//!
//! Presentation-layer derived views over a fetched item list. Pure
//! functions: the repository returns store-native order and these reorder
//! or narrow it for display.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Item, ItemFilter, ItemStatus, SortKey};

/// Items with fewer units than this count as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// "Recently added" means within this many days.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Sorts items for display. Name is lexicographic ascending; quantity and
/// date-added are descending. A document without a timestamp sorts as if it
/// were added at `now`.
pub fn sort_items(mut items: Vec<Item>, key: SortKey, now: DateTime<Utc>) -> Vec<Item> {
    match key {
        SortKey::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Quantity => items.sort_by(|a, b| b.quantity.cmp(&a.quantity)),
        SortKey::DateAdded => items.sort_by(|a, b| {
            let a = a.date_added.unwrap_or(now);
            let b = b.date_added.unwrap_or(now);
            b.cmp(&a)
        }),
    }
    items
}

/// Narrows items for display.
pub fn filter_items(items: Vec<Item>, filter: ItemFilter, now: DateTime<Utc>) -> Vec<Item> {
    let week_ago = now - Duration::days(RECENT_WINDOW_DAYS);
    items
        .into_iter()
        .filter(|item| match filter {
            ItemFilter::All => true,
            ItemFilter::LowStock => item.quantity < LOW_STOCK_THRESHOLD,
            ItemFilter::RecentlyAdded => {
                item.date_added.map(|d| d >= week_ago).unwrap_or(false)
            }
            ItemFilter::Active => item.status == ItemStatus::Active,
            ItemFilter::Inactive => item.status == ItemStatus::Inactive,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, quantity: u32, status: ItemStatus, added_days_ago: Option<i64>) -> Item {
        Item {
            name: name.to_string(),
            quantity,
            status,
            date_added: added_days_ago.map(|d| Utc::now() - Duration::days(d)),
            total_received: u64::from(quantity),
        }
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn sorts_by_name_ascending() {
        let sorted = sort_items(
            vec![
                item("pen", 1, ItemStatus::Active, Some(1)),
                item("eraser", 2, ItemStatus::Active, Some(1)),
                item("notebook", 3, ItemStatus::Active, Some(1)),
            ],
            SortKey::Name,
            Utc::now(),
        );
        assert_eq!(names(&sorted), vec!["eraser", "notebook", "pen"]);
    }

    #[test]
    fn sorts_by_quantity_descending() {
        let sorted = sort_items(
            vec![
                item("a", 2, ItemStatus::Active, Some(1)),
                item("b", 9, ItemStatus::Active, Some(1)),
                item("c", 5, ItemStatus::Active, Some(1)),
            ],
            SortKey::Quantity,
            Utc::now(),
        );
        assert_eq!(names(&sorted), vec!["b", "c", "a"]);
    }

    #[test]
    fn missing_timestamps_sort_as_now_which_is_newest_first() {
        let sorted = sort_items(
            vec![
                item("old", 1, ItemStatus::Active, Some(30)),
                item("new", 1, ItemStatus::Active, Some(1)),
                item("legacy", 1, ItemStatus::Active, None),
            ],
            SortKey::DateAdded,
            Utc::now(),
        );
        assert_eq!(names(&sorted), vec!["legacy", "new", "old"]);
    }

    #[test]
    fn low_stock_filter_uses_the_threshold_exclusively() {
        let filtered = filter_items(
            vec![
                item("low", 4, ItemStatus::Active, Some(1)),
                item("edge", 5, ItemStatus::Active, Some(1)),
                item("high", 50, ItemStatus::Active, Some(1)),
            ],
            ItemFilter::LowStock,
            Utc::now(),
        );
        assert_eq!(names(&filtered), vec!["low"]);
    }

    #[test]
    fn recently_added_filter_keeps_the_last_seven_days() {
        let filtered = filter_items(
            vec![
                item("fresh", 1, ItemStatus::Active, Some(2)),
                item("stale", 1, ItemStatus::Active, Some(8)),
                item("undated", 1, ItemStatus::Active, None),
            ],
            ItemFilter::RecentlyAdded,
            Utc::now(),
        );
        assert_eq!(names(&filtered), vec!["fresh"]);
    }

    #[test]
    fn status_filters_split_active_and_inactive() {
        let all = vec![
            item("live", 3, ItemStatus::Active, Some(1)),
            item("gone", 0, ItemStatus::Inactive, Some(1)),
        ];
        let active = filter_items(all.clone(), ItemFilter::Active, Utc::now());
        assert_eq!(names(&active), vec!["live"]);
        let inactive = filter_items(all, ItemFilter::Inactive, Utc::now());
        assert_eq!(names(&inactive), vec!["gone"]);
    }
}
