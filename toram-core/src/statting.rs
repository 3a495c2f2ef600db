//! Statting estimates: success chance of a formula, simulated attempts, and
//! an automatic stat plan for a piece of equipment.
//!
//! Randomness is always taken from a caller-supplied [`Rng`].

use crate::error::{Result, ToramError};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const MIN_SUCCESS_RATE: f64 = 5.0;
pub const MAX_SUCCESS_RATE: f64 = 95.0;

/// Flat cost charged per material on every attempt.
pub const MATERIAL_COST: u32 = 1000;

/// A statting recipe and the smith performing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub materials: Vec<String>,
    pub base_success_rate: f64,
    pub smith_level: f64,
    pub base_level: f64,
    pub starting_potential: i64,
    pub target_potential: i64,
}

impl Default for Formula {
    fn default() -> Self {
        Self {
            materials: Vec::new(),
            base_success_rate: 75.0,
            smith_level: 50.0,
            base_level: 100.0,
            starting_potential: 100,
            target_potential: 150,
        }
    }
}

impl Formula {
    pub fn validate(&self) -> Result<()> {
        if self.materials.iter().all(|m| m.trim().is_empty()) {
            return Err(ToramError::Config("a formula needs at least one material".to_string()));
        }
        if self.starting_potential < 0 || self.target_potential < 0 {
            return Err(ToramError::Config("potential cannot be negative".to_string()));
        }
        Ok(())
    }

    /// Success chance in percent, clamped to 5..=95.
    pub fn success_rate(&self) -> f64 {
        let smith_bonus = ((self.smith_level - 50.0) * 0.5).min(20.0);
        let level_penalty = ((self.base_level - 100.0) * 0.3).max(0.0);
        let material_bonus = self.materials.len() as f64 * 5.0;
        let potential_penalty = ((self.target_potential - self.starting_potential) as f64 * 0.2).max(0.0);

        let rate = self.base_success_rate + smith_bonus - level_penalty + material_bonus - potential_penalty;
        rate.clamp(MIN_SUCCESS_RATE, MAX_SUCCESS_RATE)
    }

    pub fn cost(&self) -> u32 {
        self.materials.len() as u32 * MATERIAL_COST
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub success: bool,
    pub final_potential: i64,
    pub success_rate: f64,
    pub cost: u32,
}

/// One attempt. A success gains 70% to 130% of the potential gap, capped at
/// the target; a failure loses 10% of the starting potential plus up to 10.
pub fn attempt<R: Rng + ?Sized>(formula: &Formula, rng: &mut R) -> Attempt {
    let success_rate = formula.success_rate();
    let roll = rng.gen_range(0.0..1.0) * 100.0;
    let success = roll <= success_rate;

    let start = formula.starting_potential;
    let final_potential = if success {
        let gap = (formula.target_potential - start) as f64;
        let gain = (gap * (0.7 + rng.gen_range(0.0..1.0) * 0.6)).floor() as i64;
        (start + gain).min(formula.target_potential)
    } else {
        let loss = (start as f64 * 0.1 + rng.gen_range(0.0..1.0) * 10.0).floor() as i64;
        (start - loss).max(0)
    };

    Attempt {
        success,
        final_potential,
        success_rate,
        cost: formula.cost(),
    }
}

pub fn simulate<R: Rng + ?Sized>(formula: &Formula, iterations: usize, rng: &mut R) -> Vec<Attempt> {
    (0..iterations).map(|_| attempt(formula, rng)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub attempts: usize,
    pub successes: usize,
    /// Observed success ratio in percent.
    pub observed_rate: f64,
    pub average_potential: f64,
    pub best_potential: i64,
    pub worst_potential: i64,
    pub total_cost: u64,
}

impl SimulationSummary {
    pub fn from_attempts(attempts: &[Attempt]) -> Self {
        let successes = attempts.iter().filter(|a| a.success).count();
        let (observed_rate, average_potential) = if attempts.is_empty() {
            (0.0, 0.0)
        } else {
            let n = attempts.len() as f64;
            let potential: i64 = attempts.iter().map(|a| a.final_potential).sum();
            (successes as f64 * 100.0 / n, potential as f64 / n)
        };

        Self {
            attempts: attempts.len(),
            successes,
            observed_rate,
            average_potential,
            best_potential: attempts.iter().map(|a| a.final_potential).max().unwrap_or(0),
            worst_potential: attempts.iter().map(|a| a.final_potential).min().unwrap_or(0),
            total_cost: attempts.iter().map(|a| u64::from(a.cost)).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentKind {
    Weapon,
    Armor,
    Accessory,
}

impl FromStr for EquipmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weapon" => Ok(Self::Weapon),
            "armor" | "armour" => Ok(Self::Armor),
            "accessory" | "additional" => Ok(Self::Accessory),
            other => Err(format!("unknown equipment kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Share of the stat cap to aim for, in percent.
    fn target_percent(self) -> u32 {
        match self {
            Priority::High => 80,
            Priority::Medium => 60,
            Priority::Low => 30,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.pad(label)
    }
}

struct StatSlot {
    name: &'static str,
    max_value: u32,
    base_cost: u32,
}

const fn slot(name: &'static str, max_value: u32, base_cost: u32) -> StatSlot {
    StatSlot { name, max_value, base_cost }
}

const WEAPON_SLOTS: [StatSlot; 8] = [
    slot("ATK", 999, 100),
    slot("MATK", 999, 100),
    slot("CRIT", 100, 150),
    slot("CRIT DMG", 100, 200),
    slot("ACCURACY", 100, 120),
    slot("PENETRATION", 100, 180),
    slot("MP", 999, 80),
    slot("HP", 999, 80),
];

const ARMOR_SLOTS: [StatSlot; 8] = [
    slot("DEF", 999, 100),
    slot("MDEF", 999, 100),
    slot("HP", 999, 80),
    slot("MP", 999, 80),
    slot("AGI", 100, 150),
    slot("VIT", 100, 150),
    slot("INT", 100, 150),
    slot("STR", 100, 150),
];

const ACCESSORY_SLOTS: [StatSlot; 8] = [
    slot("HP", 999, 80),
    slot("MP", 999, 80),
    slot("AGI", 100, 150),
    slot("VIT", 100, 150),
    slot("INT", 100, 150),
    slot("STR", 100, 150),
    slot("CRIT", 100, 150),
    slot("CRIT DMG", 100, 200),
];

fn slots(kind: EquipmentKind) -> &'static [StatSlot] {
    match kind {
        EquipmentKind::Weapon => &WEAPON_SLOTS,
        EquipmentKind::Armor => &ARMOR_SLOTS,
        EquipmentKind::Accessory => &ACCESSORY_SLOTS,
    }
}

/// Stat priorities for a character class. Unlisted stats, and every stat of
/// an unknown class, are medium.
fn class_priority(class: &str, stat: &str) -> Priority {
    use Priority::*;
    let table: &[(&str, Priority)] = match class.to_ascii_lowercase().as_str() {
        "swordman" => &[
            ("ATK", High),
            ("CRIT", High),
            ("CRIT DMG", High),
            ("HP", Medium),
            ("DEF", Medium),
            ("STR", Medium),
            ("AGI", Low),
            ("MP", Low),
        ],
        "mage" => &[
            ("MATK", High),
            ("MP", High),
            ("INT", High),
            ("CRIT", Medium),
            ("HP", Medium),
            ("MDEF", Medium),
            ("ATK", Low),
            ("DEF", Low),
        ],
        "archer" => &[
            ("ATK", High),
            ("CRIT", High),
            ("CRIT DMG", High),
            ("ACCURACY", High),
            ("AGI", Medium),
            ("HP", Medium),
            ("MP", Low),
            ("DEF", Low),
        ],
        _ => &[],
    };
    table
        .iter()
        .find(|(name, _)| *name == stat)
        .map(|(_, priority)| *priority)
        .unwrap_or(Medium)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatPlan {
    pub name: String,
    pub value: u32,
    pub max_value: u32,
    pub priority: Priority,
    pub cost: f64,
}

/// Suggested value for every stat slot of `kind`. Each cap is the slot's
/// maximum, limited to ten times the equipment level. Highest priority
/// first, then highest value.
pub fn plan_stats(class: &str, kind: EquipmentKind, level: u32) -> Vec<StatPlan> {
    let level_cap = level.saturating_mul(10);
    let mut plans: Vec<StatPlan> = slots(kind)
        .iter()
        .map(|slot| {
            let priority = class_priority(class, slot.name);
            let max_value = slot.max_value.min(level_cap);
            let value = max_value * priority.target_percent() / 100;
            StatPlan {
                name: slot.name.to_string(),
                value,
                max_value,
                priority,
                cost: f64::from(slot.base_cost) * f64::from(value) / 100.0,
            }
        })
        .collect();

    plans.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.value.cmp(&a.value)));
    plans
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub stat: String,
    pub materials: Vec<&'static str>,
    pub success_rate: u32,
    pub cost: f64,
    pub risk: Risk,
}

/// Recipe suggestions per planned stat: high priority stats get a safe and a
/// cheap option, the rest get one.
pub fn suggest_recipes(plans: &[StatPlan]) -> Vec<Recipe> {
    let mut recipes = Vec::new();
    for plan in plans {
        let mut push = |materials: Vec<&'static str>, success_rate: u32, factor: f64, risk: Risk| {
            recipes.push(Recipe {
                stat: plan.name.clone(),
                materials,
                success_rate,
                cost: plan.cost * factor,
                risk,
            });
        };
        match plan.priority {
            Priority::High => {
                push(vec!["High Grade Material", "Premium Catalyst"], 85, 2.0, Risk::Low);
                push(vec!["Standard Material", "Basic Catalyst"], 65, 1.2, Risk::Medium);
            }
            Priority::Medium => push(vec!["Standard Material"], 75, 1.0, Risk::Medium),
            Priority::Low => push(vec!["Basic Material"], 90, 0.8, Risk::Low),
        }
    }
    recipes
}
