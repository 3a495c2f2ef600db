//! Row mapping from legacy table rows to [`CompleteView`] records.

use crate::models::{Attribute, CompleteView, Item, ItemDrop, RawRow, StatValue, Usage, render_value};
use crate::shapes::{
    CRYSTAL_LIKE_MAP, CRYSTAL_MAP, ColumnMap, DropColumns, EQUIPMENT_MAP, Shape, UPGRADE_INTO,
    USED_FOR_MARKER, UsageColumns,
};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::Value;
use std::collections::HashMap;

lazy_static! {
    static ref TRAILING_TAGS: Regex = Regex::new(r"(\s*\[[^\]]*\])+\s*$").unwrap();
}

const UNKNOWN: &str = "Unknown";

/// Strip trailing `[...]` tags and surrounding whitespace: `"Foo [Bar]"` -> `"Foo"`.
pub fn sanitize_name(name: &str) -> String {
    TRAILING_TAGS.replace(name, "").trim().to_string()
}

pub fn strip_brackets(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '[' | ']')).collect::<String>().trim().to_string()
}

pub fn strip_parens(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '(' | ')')).collect()
}

/// Crystal tables store stat values as text more often than not.
fn coerce_number(value: &Value) -> StatValue {
    match value {
        Value::Integer(i) => StatValue::Integer(*i),
        Value::Real(f) => StatValue::Real(*f),
        other => {
            let text = render_value(other);
            parse_number(&text).unwrap_or(StatValue::Text(text))
        }
    }
}

fn parse_number(text: &str) -> Option<StatValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<i64>()
        .map(StatValue::Integer)
        .ok()
        .or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(StatValue::Real)
        })
}

fn keep_type(value: &Value) -> StatValue {
    match value {
        Value::Integer(i) => StatValue::Integer(*i),
        Value::Real(f) => StatValue::Real(*f),
        other => StatValue::Text(render_value(other)),
    }
}

/// Item header. `type_fallback` is used when the type cell is empty.
fn build_item(row: &RawRow, map: &ColumnMap, type_fallback: Option<&str>) -> Item {
    let name = map
        .name
        .iter()
        .find_map(|c| row.present_text(c))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut item_type = strip_brackets(&row.first_text(map.item_type).unwrap_or_default());
    if item_type.is_empty() {
        if let Some(fallback) = type_fallback {
            item_type = fallback.to_string();
        }
    }

    Item {
        id: row.id(),
        name: sanitize_name(&name),
        item_type,
        sell_price: row.first_text(map.sell_price).unwrap_or_default(),
        secondary_cost: row.first_text(map.secondary_cost).unwrap_or_default(),
        description: row.first_text(map.description).unwrap_or_default(),
    }
}

fn extract_attributes(row: &RawRow, map: &ColumnMap, item_id: i64) -> Vec<Attribute> {
    let mut attributes = Vec::new();

    for pair in map.stats {
        let Some(label) = row.present_text(pair.label) else {
            continue;
        };
        let Some(raw) = row.get(pair.value) else {
            continue;
        };

        let value = match map.shape {
            Shape::CrystalLike => coerce_number(raw),
            _ => keep_type(raw),
        };

        attributes.push(Attribute {
            id: attributes.len() as u32 + 1,
            item_id,
            label,
            value,
        });
    }

    attributes
}

fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed == "-"
}

fn extract_drops(row: &RawRow, map: &ColumnMap, item_id: i64) -> Vec<ItemDrop> {
    let optional = |column: Option<&str>| column.map(|c| row.text_or_empty(c)).unwrap_or_default();
    let mut drops = Vec::new();

    for slot in map.drops {
        let Some(monster_name) = row.present_text(slot.monster) else {
            continue;
        };
        if map.shape == Shape::Equipment && is_placeholder(&monster_name) {
            continue;
        }

        drops.push(ItemDrop {
            id: drops.len() as u32 + 1,
            item_id,
            monster_name,
            monster_url: optional(slot.url),
            monster_level: strip_parens(&optional(slot.level)),
            location_name: optional(slot.location),
            location_url: optional(slot.location_url),
        });
    }

    drops
}

fn map_with(row: &RawRow, map: &ColumnMap, table: &str, type_fallback: Option<&str>) -> CompleteView {
    let item = build_item(row, map, type_fallback);
    let attributes = extract_attributes(row, map, item.id);
    let drops = extract_drops(row, map, item.id);

    CompleteView {
        table: table.to_string(),
        item,
        attributes,
        drops,
        usage: None,
    }
}

/// Map a row of a generic candidate table according to its sniffed map.
/// An empty type falls back to the table name.
pub fn map_row(row: &RawRow, map: &ColumnMap, table: &str) -> CompleteView {
    map_with(row, map, table, Some(table))
}

pub fn map_equipment_row(row: &RawRow, table: &str) -> CompleteView {
    map_row(row, &EQUIPMENT_MAP, table)
}

pub fn map_crystal_like_row(row: &RawRow, table: &str) -> CompleteView {
    map_row(row, &CRYSTAL_LIKE_MAP, table)
}

/// Rows of the crystal table keyed by their raw title, for the
/// "Upgrade Into" self-join. A repeated title keeps the last row.
pub struct TitleIndex<'a> {
    by_title: HashMap<String, &'a RawRow>,
}

impl<'a> TitleIndex<'a> {
    pub fn build(rows: &'a [RawRow]) -> Self {
        let by_title = rows
            .iter()
            .filter_map(|row| row.present_text("title").map(|title| (title, row)))
            .collect();
        Self { by_title }
    }

    pub fn get(&self, title: &str) -> Option<&'a RawRow> {
        self.by_title.get(title).copied()
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}

fn extract_usage(
    row: &RawRow,
    columns: &UsageColumns,
    first_drop: &DropColumns,
    index: &TitleIndex<'_>,
    item_id: i64,
) -> Vec<Usage> {
    if row.text(columns.marker).as_deref() != Some(USED_FOR_MARKER) {
        return Vec::new();
    }
    let Some(item_name) = row.present_text(columns.target) else {
        return Vec::new();
    };

    let usage_type = row
        .present_text(columns.usage_type)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let (location_name, location_url) = if usage_type == UPGRADE_INTO {
        match index.get(&item_name) {
            Some(target) => (
                first_drop.location.map(|c| target.text_or_empty(c)).unwrap_or_default(),
                first_drop.location_url.map(|c| target.text_or_empty(c)).unwrap_or_default(),
            ),
            None => {
                tracing::debug!("Upgrade target {:?} not found in crystal table", item_name);
                (String::new(), String::new())
            }
        }
    } else {
        (
            row.text_or_empty(columns.location),
            row.text_or_empty(columns.location_url),
        )
    };

    vec![Usage {
        id: 1,
        item_id,
        usage_type,
        item_name,
        item_url: row.text_or_empty(columns.target_url),
        location_name,
        location_url,
    }]
}

/// Map a row of the dedicated crystal table, resolving usage through `index`.
pub fn map_crystal_row(row: &RawRow, table: &str, index: &TitleIndex<'_>) -> CompleteView {
    let mut view = map_with(row, &CRYSTAL_MAP, table, None);

    let usage = match (&CRYSTAL_MAP.usage, CRYSTAL_MAP.drops.first()) {
        (Some(columns), Some(first_drop)) => extract_usage(row, columns, first_drop, index, view.item.id),
        _ => Vec::new(),
    };
    view.usage = Some(usage);
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn crystal(title: &str) -> RawRow {
        RawRow::new()
            .with("id", 1i64)
            .with("title", text(title))
            .with("font", text("[Weapon]"))
            .with("p", text("1,000"))
            .with("p2", text("250"))
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Sword [Rare]"), "Sword");
        assert_eq!(sanitize_name("  Plain  "), "Plain");
        assert_eq!(sanitize_name("Bow [A] [B] "), "Bow");
        assert_eq!(sanitize_name("[Tag] Name"), "[Tag] Name");
    }

    #[test]
    fn test_sanitize_name_idempotent() {
        for name in ["Sword [Rare]", "Bow [A] [B]", "Staff", " [x] ", "Orb [unclosed"] {
            let once = sanitize_name(name);
            assert_eq!(sanitize_name(&once), once, "input {:?}", name);
        }
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_brackets("[Armor]"), "Armor");
        assert_eq!(strip_parens("(Lv 120)"), "Lv 120");
    }

    #[test]
    fn test_equipment_row() {
        let row = RawRow::new()
            .with("id", 5i64)
            .with("card_title", text("Dragon Blade [NPC]"))
            .with("card_title_2", text("[1 Handed Sword]"))
            .with("item_prop", text("5,000 Spina"))
            .with("item_prop_2", Value::Null)
            .with("table_grid_3", text("Base ATK"))
            .with("table_grid_4", 120i64)
            .with("table_grid_5", text("Base Stability"))
            .with("table_grid_6", text("60%"))
            .with("table_grid_7", text("Unused"))
            .with("table_grid_8", Value::Null)
            .with("table_grid_26", text("STR"))
            .with("table_grid_27", text("+5"));

        let view = map_equipment_row(&row, "equipment");
        assert_eq!(view.item.id, 5);
        assert_eq!(view.item.name, "Dragon Blade");
        assert_eq!(view.item.item_type, "1 Handed Sword");
        assert_eq!(view.item.sell_price, "5,000 Spina");
        assert_eq!(view.item.secondary_cost, "");
        assert!(view.usage.is_none());

        let labels: Vec<_> = view.attributes.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["Base ATK", "Base Stability", "STR"]);
        assert_eq!(view.attributes[0].value, StatValue::Integer(120));
        // equipment values keep their stored type
        assert_eq!(view.attributes[2].value, StatValue::Text("+5".to_string()));
        let ids: Vec<_> = view.attributes.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(view.attributes.iter().all(|a| a.item_id == 5));
    }

    #[test]
    fn test_equipment_type_falls_back_to_table() {
        let row = RawRow::new().with("card_title", text("Shield"));
        let view = map_equipment_row(&row, "armor_extra");
        assert_eq!(view.item.item_type, "armor_extra");
    }

    #[test]
    fn test_equipment_drop_placeholders() {
        let row = RawRow::new()
            .with("card_title", text("Helm"))
            .with("pagination_js_item", text("Goblin"))
            .with("pagination_js_item_href", text("/monster/1"))
            .with("pagination_js_item_2", text(" - "))
            .with("pagination_js_item_3", text("   "))
            .with("pagination_js_item_4", text(""))
            .with("pagination_js_item_5", text("Orc"))
            .with("pagination_js_item_13", text("Last Boss"));

        let view = map_equipment_row(&row, "equipment");
        let names: Vec<_> = view.drops.iter().map(|d| d.monster_name.as_str()).collect();
        assert_eq!(names, vec!["Goblin", "Orc", "Last Boss"]);
        assert_eq!(view.drops[0].monster_url, "/monster/1");
        assert_eq!(view.drops[1].monster_url, "");
        assert_eq!(view.drops[2].monster_url, "");
        assert_eq!(view.drops[2].id, 3);
        assert!(view.drops.iter().all(|d| d.monster_level.is_empty() && d.location_name.is_empty()));
    }

    #[test]
    fn test_crystal_like_numeric_coercion() {
        let row = crystal("Goblin Crystal")
            .with("div", text("ATK"))
            .with("column_11", text("123"))
            .with("div6", text("Critical Damage"))
            .with("column_13", text("1.5"))
            .with("div7", text("Note"))
            .with("column_15", text("see wiki"))
            .with("div11", Value::Null)
            .with("column_17", text("9"));

        let view = map_crystal_like_row(&row, "extra_xtals");
        assert_eq!(view.attributes.len(), 3);
        assert_eq!(view.attributes[0].value, StatValue::Integer(123));
        assert_eq!(view.attributes[1].value, StatValue::Real(1.5));
        assert_eq!(view.attributes[2].value, StatValue::Text("see wiki".to_string()));
    }

    #[test]
    fn test_crystal_like_fallback_fields() {
        let row = RawRow::new()
            .with("id", text("42"))
            .with("name", text("Loose Crystal [Event]"))
            .with("category", text("[Ring]"))
            .with("sell_price", text("300"))
            .with("buy_price", text("900"))
            .with("desc", text("Event only"));

        let view = map_crystal_like_row(&row, "event_table");
        assert_eq!(view.item.id, 42);
        assert_eq!(view.item.name, "Loose Crystal");
        assert_eq!(view.item.item_type, "Ring");
        assert_eq!(view.item.sell_price, "300");
        assert_eq!(view.item.secondary_cost, "900");
        assert_eq!(view.item.description, "Event only");
    }

    #[test]
    fn test_missing_name_defaults_to_unknown() {
        let view = map_crystal_like_row(&RawRow::new(), "t");
        assert_eq!(view.item.name, "Unknown");
        assert_eq!(view.item.item_type, "t");
        assert_eq!(view.item.id, 0);
    }

    #[test]
    fn test_crystal_drops() {
        let row = crystal("Pillar Golem")
            .with("a", text("Pillar Golem"))
            .with("url", text("/m/pg"))
            .with("avoidwrap", text("(Lv 50)"))
            .with("a4", text("Ancient Empress Tomb"))
            .with("url5", text("/map/aet"))
            .with("a8", Value::Null)
            .with("url9", text("/m/ignored"));

        let view = map_crystal_like_row(&row, "xtal_copy");
        assert_eq!(view.drops.len(), 1);
        let drop = &view.drops[0];
        assert_eq!(drop.monster_level, "Lv 50");
        assert_eq!(drop.location_name, "Ancient Empress Tomb");
        assert_eq!(drop.location_url, "/map/aet");
    }

    fn used_for(title: &str, usage_type: &str, target: &str) -> RawRow {
        crystal(title)
            .with("a4", text("Own Field"))
            .with("url5", text("/map/own-drop"))
            .with("div22", text("Used For"))
            .with("title23", text(usage_type))
            .with("a24", text(target))
            .with("url25", text("/item/target"))
            .with("a26", text("Own Location"))
            .with("url27", text("/map/own"))
    }

    #[test]
    fn test_usage_upgrade_into_uses_target_location() {
        let rows = vec![
            used_for("Brutal Dragon Decel", "Upgrade Into", "Decel Crystal II"),
            crystal("Decel Crystal II")
                .with("a", text("Decel"))
                .with("a4", text("Dark Castle"))
                .with("url5", text("/map/dark-castle")),
        ];
        let index = TitleIndex::build(&rows);

        let view = map_crystal_row(&rows[0], "xtal", &index);
        let usage = view.usage();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].usage_type, "Upgrade Into");
        assert_eq!(usage[0].item_name, "Decel Crystal II");
        assert_eq!(usage[0].item_url, "/item/target");
        assert_eq!(usage[0].location_name, "Dark Castle");
        assert_eq!(usage[0].location_url, "/map/dark-castle");
    }

    #[test]
    fn test_usage_other_type_uses_own_location() {
        let rows = vec![
            used_for("Mochelo", "Furniture", "Decel Crystal II"),
            crystal("Decel Crystal II").with("a4", text("Dark Castle")),
        ];
        let index = TitleIndex::build(&rows);

        let view = map_crystal_row(&rows[0], "xtal", &index);
        let usage = view.usage();
        assert_eq!(usage[0].location_name, "Own Location");
        assert_eq!(usage[0].location_url, "/map/own");
    }

    #[test]
    fn test_usage_unresolved_target() {
        let rows = vec![used_for("Orphan", "Upgrade Into", "Nowhere Crystal")];
        let index = TitleIndex::build(&rows);

        let view = map_crystal_row(&rows[0], "xtal", &index);
        assert_eq!(view.usage()[0].location_name, "");
        assert_eq!(view.usage()[0].location_url, "");
    }

    #[test]
    fn test_usage_requires_marker_and_target() {
        let no_marker = used_for("A", "Furniture", "B").with("div22", text("Obtained From"));
        let no_target = used_for("A", "Furniture", "B").with("a24", text(""));
        let rows = vec![no_marker, no_target];
        let index = TitleIndex::build(&rows);

        for row in &rows {
            let view = map_crystal_row(row, "xtal", &index);
            assert_eq!(view.usage, Some(Vec::new()));
        }
    }

    #[test]
    fn test_usage_type_defaults_to_unknown() {
        let row = used_for("A", "", "B");
        let rows = vec![row];
        let index = TitleIndex::build(&rows);
        let view = map_crystal_row(&rows[0], "xtal", &index);
        assert_eq!(view.usage()[0].usage_type, "Unknown");
    }

    #[test]
    fn test_crystal_table_keeps_empty_type() {
        let row = crystal("Typeless").with("font", Value::Null);
        let rows = vec![row];
        let index = TitleIndex::build(&rows);
        let view = map_crystal_row(&rows[0], "xtal", &index);
        assert_eq!(view.item.item_type, "");
        assert_eq!(view.item.secondary_cost, "250");
    }

    #[test]
    fn test_title_index_last_duplicate_wins() {
        let rows = vec![
            crystal("Same").with("a4", text("First")),
            crystal("Same").with("a4", text("Second")),
            crystal(""),
        ];
        let index = TitleIndex::build(&rows);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("Same").unwrap().text("a4").as_deref(), Some("Second"));
    }
}
