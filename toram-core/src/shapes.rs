//! Column sniffing and physical column maps for the legacy scraped tables.
//!
//! The scraped tables carry generated column names (`div6`, `column_13`,
//! `table_grid_15`, ...). Each recognised naming convention is a [`Shape`], and
//! each shape has a [`ColumnMap`] that names the physical columns behind every
//! logical field. Maps are plain static data so they can be checked against the
//! live schema before any row is mapped.

use serde::Serialize;
use std::fmt;

/// Recognised legacy column conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Shape {
    /// `card_title` + numbered `table_grid_N` cells
    Equipment,
    /// `title` + `divN`/`column_N` stat pairs (the crystal table and look-alikes)
    CrystalLike,
    Unsupported,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Shape::Equipment => "equipment",
            Shape::CrystalLike => "crystal-like",
            Shape::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// A (label column, value column) pair holding one stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatPair {
    pub label: &'static str,
    pub value: &'static str,
}

const fn pair(label: &'static str, value: &'static str) -> StatPair {
    StatPair { label, value }
}

/// Columns of one drop slot. Only the monster name is mandatory; the
/// equipment shape has no level or location cells at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropColumns {
    pub monster: &'static str,
    pub url: Option<&'static str>,
    pub level: Option<&'static str>,
    pub location: Option<&'static str>,
    pub location_url: Option<&'static str>,
}

const fn monster_link(monster: &'static str, url: Option<&'static str>) -> DropColumns {
    DropColumns {
        monster,
        url,
        level: None,
        location: None,
        location_url: None,
    }
}

/// The single "Used For" slot of the dedicated crystal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageColumns {
    pub marker: &'static str,
    pub usage_type: &'static str,
    pub target: &'static str,
    pub target_url: &'static str,
    pub location: &'static str,
    pub location_url: &'static str,
}

/// Value the usage marker cell must hold for the slot to be read.
pub const USED_FOR_MARKER: &str = "Used For";

/// Usage type whose location comes from the target crystal's own drop.
pub const UPGRADE_INTO: &str = "Upgrade Into";

/// Logical field -> physical column(s) for one shape.
///
/// Scalar fields list alternates in fallback order; the first non-null cell wins.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    pub shape: Shape,
    pub name: &'static [&'static str],
    pub item_type: &'static [&'static str],
    pub sell_price: &'static [&'static str],
    pub secondary_cost: &'static [&'static str],
    pub description: &'static [&'static str],
    pub stats: &'static [StatPair],
    pub drops: &'static [DropColumns],
    pub usage: Option<UsageColumns>,
}

pub const CRYSTAL_STAT_PAIRS: [StatPair; 4] = [
    pair("div", "column_11"),
    pair("div6", "column_13"),
    pair("div7", "column_15"),
    pair("div11", "column_17"),
];

pub const CRYSTAL_DROP_COLUMNS: [DropColumns; 2] = [
    DropColumns {
        monster: "a",
        url: Some("url"),
        level: Some("avoidwrap"),
        location: Some("a4"),
        location_url: Some("url5"),
    },
    DropColumns {
        monster: "a8",
        url: Some("url9"),
        level: Some("avoidwrap10"),
        location: Some("a12"),
        location_url: Some("url13"),
    },
];

pub const CRYSTAL_USAGE_COLUMNS: UsageColumns = UsageColumns {
    marker: "div22",
    usage_type: "title23",
    target: "a24",
    target_url: "url25",
    location: "a26",
    location_url: "url27",
};

pub const EQUIPMENT_GRID_PAIRS: [StatPair; 9] = [
    pair("table_grid_3", "table_grid_4"),
    pair("table_grid_5", "table_grid_6"),
    pair("table_grid_7", "table_grid_8"),
    pair("table_grid_15", "table_grid_16"),
    pair("table_grid_17", "table_grid_18"),
    pair("table_grid_19", "table_grid_20"),
    pair("table_grid_21", "table_grid_22"),
    pair("table_grid_23", "table_grid_24"),
    pair("table_grid_26", "table_grid_27"),
];

// The scrape produced one more item cell than href cells; the last slot has no link.
pub const EQUIPMENT_DROP_COLUMNS: [DropColumns; 13] = [
    monster_link("pagination_js_item", Some("pagination_js_item_href")),
    monster_link("pagination_js_item_2", Some("pagination_js_item_href_2")),
    monster_link("pagination_js_item_3", Some("pagination_js_item_href_3")),
    monster_link("pagination_js_item_4", Some("pagination_js_item_href_4")),
    monster_link("pagination_js_item_5", Some("pagination_js_item_href_5")),
    monster_link("pagination_js_item_6", Some("pagination_js_item_href_6")),
    monster_link("pagination_js_item_7", Some("pagination_js_item_href_7")),
    monster_link("pagination_js_item_8", Some("pagination_js_item_href_8")),
    monster_link("pagination_js_item_9", Some("pagination_js_item_href_9")),
    monster_link("pagination_js_item_10", Some("pagination_js_item_href_10")),
    monster_link("pagination_js_item_11", Some("pagination_js_item_href_11")),
    monster_link("pagination_js_item_12", Some("pagination_js_item_href_12")),
    monster_link("pagination_js_item_13", None),
];

pub static EQUIPMENT_MAP: ColumnMap = ColumnMap {
    shape: Shape::Equipment,
    name: &["card_title"],
    item_type: &["card_title_2"],
    sell_price: &["item_prop"],
    secondary_cost: &["item_prop_2"],
    description: &[],
    stats: &EQUIPMENT_GRID_PAIRS,
    drops: &EQUIPMENT_DROP_COLUMNS,
    usage: None,
};

/// Generic tables that happen to share the crystal table's layout.
pub static CRYSTAL_LIKE_MAP: ColumnMap = ColumnMap {
    shape: Shape::CrystalLike,
    name: &["title", "name"],
    item_type: &["font", "type", "category"],
    sell_price: &["p", "sell_price"],
    secondary_cost: &["p2", "buy_price"],
    description: &["description", "desc"],
    stats: &CRYSTAL_STAT_PAIRS,
    drops: &CRYSTAL_DROP_COLUMNS,
    usage: None,
};

/// The dedicated crystal table.
pub static CRYSTAL_MAP: ColumnMap = ColumnMap {
    shape: Shape::CrystalLike,
    name: &["title"],
    item_type: &["font"],
    sell_price: &["p"],
    secondary_cost: &["p2"],
    description: &[],
    stats: &CRYSTAL_STAT_PAIRS,
    drops: &CRYSTAL_DROP_COLUMNS,
    usage: Some(CRYSTAL_USAGE_COLUMNS),
};

impl ColumnMap {
    /// Physical columns this map reads that the live schema lacks.
    ///
    /// A fallback chain only counts as missing when none of its alternates exist.
    pub fn missing_columns(&self, columns: &[String]) -> Vec<&'static str> {
        let mut missing = Vec::new();

        for chain in [
            self.name,
            self.item_type,
            self.sell_price,
            self.secondary_cost,
            self.description,
        ] {
            if !chain.is_empty() && !chain.iter().any(|c| has(columns, c)) {
                missing.push(chain[0]);
            }
        }

        let stat_columns = self.stats.iter().flat_map(|p| [p.label, p.value]);
        let drop_columns = self.drops.iter().flat_map(|d| {
            std::iter::once(d.monster).chain(
                [d.url, d.level, d.location, d.location_url]
                    .into_iter()
                    .flatten(),
            )
        });
        let usage_columns = self.usage.iter().flat_map(|u| {
            [
                u.marker,
                u.usage_type,
                u.target,
                u.target_url,
                u.location,
                u.location_url,
            ]
        });

        missing.extend(
            stat_columns
                .chain(drop_columns)
                .chain(usage_columns)
                .filter(|c| !has(columns, c)),
        );
        missing
    }
}

fn has(columns: &[String], name: &str) -> bool {
    columns.iter().any(|c| c == name)
}

/// Classify a table by its column names.
///
/// The crystal-like rule wins when a table satisfies both.
pub fn sniff(columns: &[String]) -> Shape {
    let crystal_like = has(columns, "title")
        && CRYSTAL_STAT_PAIRS
            .iter()
            .any(|p| has(columns, p.label) && has(columns, p.value));
    if crystal_like {
        return Shape::CrystalLike;
    }

    let first_grid = EQUIPMENT_GRID_PAIRS[0];
    if has(columns, "card_title") && has(columns, first_grid.label) && has(columns, first_grid.value) {
        return Shape::Equipment;
    }

    Shape::Unsupported
}

/// Best available ordering column: a title-like field, else `name`, else `id`,
/// else SQLite's implicit `rowid`.
pub fn order_column(columns: &[String]) -> &'static str {
    ["card_title", "title", "name", "id"]
        .into_iter()
        .find(|c| has(columns, c))
        .unwrap_or("rowid")
}

/// Column map used to read a generic table of the given shape.
pub fn column_map(shape: Shape) -> Option<&'static ColumnMap> {
    match shape {
        Shape::Equipment => Some(&EQUIPMENT_MAP),
        Shape::CrystalLike => Some(&CRYSTAL_LIKE_MAP),
        Shape::Unsupported => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sniff_crystal_like_any_pair() {
        assert_eq!(sniff(&cols(&["id", "title", "div7", "column_15"])), Shape::CrystalLike);
        assert_eq!(sniff(&cols(&["title", "div", "column_11"])), Shape::CrystalLike);
    }

    #[test]
    fn test_sniff_crystal_like_needs_both_halves() {
        assert_eq!(sniff(&cols(&["title", "div", "column_13"])), Shape::Unsupported);
        assert_eq!(sniff(&cols(&["div", "column_11"])), Shape::Unsupported);
    }

    #[test]
    fn test_sniff_equipment() {
        assert_eq!(
            sniff(&cols(&["id", "card_title", "table_grid_3", "table_grid_4"])),
            Shape::Equipment
        );
        assert_eq!(sniff(&cols(&["card_title", "table_grid_3"])), Shape::Unsupported);
    }

    #[test]
    fn test_sniff_prefers_crystal_like() {
        let both = cols(&["title", "div", "column_11", "card_title", "table_grid_3", "table_grid_4"]);
        assert_eq!(sniff(&both), Shape::CrystalLike);
    }

    #[test]
    fn test_sniff_empty() {
        assert_eq!(sniff(&[]), Shape::Unsupported);
    }

    #[test]
    fn test_order_column_fallbacks() {
        assert_eq!(order_column(&cols(&["title", "card_title"])), "card_title");
        assert_eq!(order_column(&cols(&["id", "title"])), "title");
        assert_eq!(order_column(&cols(&["id", "name"])), "name");
        assert_eq!(order_column(&cols(&["id", "x"])), "id");
        assert_eq!(order_column(&cols(&["x"])), "rowid");
    }

    #[test]
    fn test_missing_columns_respects_fallback_chains() {
        let live = cols(&["id", "name", "div", "column_11"]);
        let missing = CRYSTAL_LIKE_MAP.missing_columns(&live);

        assert!(!missing.contains(&"title"), "name satisfies the name chain");
        assert!(missing.contains(&"font"));
        assert!(missing.contains(&"div6"));
        assert!(!missing.contains(&"div"));
        assert!(missing.contains(&"a8"));
    }

    #[test]
    fn test_equipment_map_shape() {
        assert_eq!(EQUIPMENT_MAP.stats.len(), 9);
        assert_eq!(EQUIPMENT_MAP.drops.len(), 13);
        assert_eq!(EQUIPMENT_MAP.drops.iter().filter(|d| d.url.is_some()).count(), 12);
        assert!(EQUIPMENT_MAP.usage.is_none());
    }

    #[test]
    fn test_crystal_map_reads_usage() {
        assert!(CRYSTAL_MAP.usage.is_some());
        let missing = CRYSTAL_MAP.missing_columns(&cols(&["title", "div", "column_11"]));
        assert!(missing.contains(&"div22"));
        assert!(missing.contains(&"url27"));
    }
}
