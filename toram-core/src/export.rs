//! JSON and CSV export of listings.

use crate::error::Result;
use crate::models::CompleteView;
use serde::Serialize;
use std::io::Write;

/// Flat CSV record; nested lists are joined with `"; "`.
#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    table: &'a str,
    id: i64,
    name: &'a str,
    #[serde(rename = "type")]
    item_type: &'a str,
    sell_price: &'a str,
    secondary_cost: &'a str,
    attributes: String,
    drops: String,
    usage: String,
}

impl<'a> From<&'a CompleteView> for CsvRecord<'a> {
    fn from(view: &'a CompleteView) -> Self {
        let attributes = view
            .attributes
            .iter()
            .map(|a| format!("{}: {}", a.label, a.value))
            .collect::<Vec<_>>()
            .join("; ");

        let drops = view
            .drops
            .iter()
            .map(|d| {
                let mut entry = d.monster_name.clone();
                if !d.monster_level.is_empty() {
                    entry.push_str(&format!(" ({})", d.monster_level));
                }
                if !d.location_name.is_empty() {
                    entry.push_str(&format!(" @ {}", d.location_name));
                }
                entry
            })
            .collect::<Vec<_>>()
            .join("; ");

        let usage = view
            .usage()
            .iter()
            .map(|u| format!("{}: {}", u.usage_type, u.item_name))
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            table: &view.table,
            id: view.item.id,
            name: &view.item.name,
            item_type: &view.item.item_type,
            sell_price: &view.item.sell_price,
            secondary_cost: &view.item.secondary_cost,
            attributes,
            drops,
            usage,
        }
    }
}

pub fn write_csv<W: Write>(views: &[&CompleteView], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for view in views {
        csv_writer.serialize(CsvRecord::from(*view))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(views: &[&CompleteView], writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, views)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attribute, Item, ItemDrop, StatValue, Usage};

    fn sample() -> CompleteView {
        CompleteView {
            table: "xtal".to_string(),
            item: Item {
                id: 3,
                name: "Goblin Boss".to_string(),
                item_type: "Normal".to_string(),
                sell_price: "100".to_string(),
                secondary_cost: "50".to_string(),
                description: String::new(),
            },
            attributes: vec![
                Attribute { id: 1, item_id: 3, label: "ATK".to_string(), value: StatValue::Integer(5) },
                Attribute { id: 2, item_id: 3, label: "Note".to_string(), value: StatValue::Text("x, y".to_string()) },
            ],
            drops: vec![ItemDrop {
                id: 1,
                item_id: 3,
                monster_name: "Boss Goblin".to_string(),
                monster_url: String::new(),
                monster_level: "Lv 10".to_string(),
                location_name: "Cave".to_string(),
                location_url: String::new(),
            }],
            usage: Some(vec![Usage {
                id: 1,
                item_id: 3,
                usage_type: "Upgrade Into".to_string(),
                item_name: "Goblin King".to_string(),
                item_url: String::new(),
                location_name: String::new(),
                location_url: String::new(),
            }]),
        }
    }

    #[test]
    fn test_write_csv() {
        let view = sample();
        let mut out = Vec::new();
        write_csv(&[&view], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next(),
            Some("table,id,name,type,sell_price,secondary_cost,attributes,drops,usage")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("xtal,3,Goblin Boss,Normal,100,50,"));
        assert!(row.contains("\"ATK: 5; Note: x, y\""));
        assert!(row.contains("Boss Goblin (Lv 10) @ Cave"));
        assert!(row.ends_with("Upgrade Into: Goblin King"));
    }

    #[test]
    fn test_write_json() {
        let view = sample();
        let mut out = Vec::new();
        write_json(&[&view], &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json[0]["item"]["name"], "Goblin Boss");
        assert_eq!(json[0]["item"]["secondaryCost"], "50");
        assert_eq!(json[0]["attributes"][0]["value"], 5);
        assert_eq!(json[0]["drops"][0]["monsterLevel"], "Lv 10");
        assert_eq!(json[0]["usage"][0]["usageType"], "Upgrade Into");
    }
}
