//! The five sensors shown for each tracked student
//!
//! Every value is derived from the coordinator's cumulative exp, so the
//! sensors never disagree with each other.

use std::collections::HashMap;

use favor_core::{slugify, Context, EntityId, EntityIdError, State, SENSOR_DOMAIN, STATE_UNKNOWN};
use favor_config_entries::FavorEntryData;
use favor_rank::{percent_of_max, RankTable, PERCENT_DECIMALS};
use favor_state_store::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ICON: &str = "mdi:heart";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Rank,
    Exp,
    LevelExp,
    LevelRemainExp,
    HundredPercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Total,
    TotalIncreasing,
    Measurement,
}

impl StateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::TotalIncreasing => "total_increasing",
            Self::Measurement => "measurement",
        }
    }
}

impl SensorKind {
    pub const ALL: [SensorKind; 5] = [
        SensorKind::Rank,
        SensorKind::Exp,
        SensorKind::LevelExp,
        SensorKind::LevelRemainExp,
        SensorKind::HundredPercent,
    ];

    /// Last part of the entity id
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::Exp => "exp",
            Self::LevelExp => "level_exp",
            Self::LevelRemainExp => "level_remain_exp",
            Self::HundredPercent => "hundred_percent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Rank => "Favor Rank",
            Self::Exp => "Favor Exp",
            Self::LevelExp => "Level Exp",
            Self::LevelRemainExp => "Level Remain Exp",
            Self::HundredPercent => "Hundred Percent",
        }
    }

    pub fn state_class(&self) -> StateClass {
        match self {
            Self::LevelExp => StateClass::TotalIncreasing,
            Self::LevelRemainExp => StateClass::Measurement,
            _ => StateClass::Total,
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::HundredPercent => Some("%"),
            _ => None,
        }
    }

    pub fn display_precision(&self) -> Option<i32> {
        match self {
            Self::HundredPercent => Some(PERCENT_DECIMALS),
            _ => None,
        }
    }

    /// Sensor value for a cumulative exp total
    pub fn value(&self, table: &RankTable, cumulative: u64, max_exp: u64) -> Value {
        match self {
            Self::Rank => json!(table.rank_for(cumulative).rank),
            Self::Exp => json!(cumulative),
            Self::LevelExp => json!(table.rank_for(cumulative).exp_into_rank),
            Self::LevelRemainExp => json!(table.remaining_to_next(cumulative)),
            Self::HundredPercent => json!(percent_of_max(cumulative, max_exp)),
        }
    }
}

/// One sensor entity of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavorSensor {
    pub entity_id: EntityId,
    /// `"{usercode}_{stuid}_{suffix}"`
    pub unique_id: String,
    pub name: String,
    pub kind: SensorKind,
}

impl FavorSensor {
    pub fn new(
        data: &FavorEntryData,
        student_name: &str,
        kind: SensorKind,
    ) -> Result<Self, EntityIdError> {
        let unique_id = format!("{}_{}", data.unique_id(), kind.suffix());
        let entity_id = EntityId::new(SENSOR_DOMAIN, slugify(&unique_id))?;

        Ok(Self {
            entity_id,
            unique_id,
            name: format!("{} {}", student_name, kind.label()),
            kind,
        })
    }

    pub fn attributes(&self) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("friendly_name".to_string(), json!(self.name));
        attributes.insert("icon".to_string(), json!(ICON));
        attributes.insert("state_class".to_string(), json!(self.kind.state_class().as_str()));
        if let Some(unit) = self.kind.unit() {
            attributes.insert("unit_of_measurement".to_string(), json!(unit));
        }
        if let Some(precision) = self.kind.display_precision() {
            attributes.insert("suggested_display_precision".to_string(), json!(precision));
        }
        attributes
    }

    /// State string, `unknown` until the coordinator has data
    pub fn state(&self, table: &RankTable, data: Option<u64>, max_exp: u64) -> String {
        match data {
            Some(cumulative) => match self.kind.value(table, cumulative, max_exp) {
                Value::String(s) => s,
                other => other.to_string(),
            },
            None => STATE_UNKNOWN.to_string(),
        }
    }

    pub fn write_state(
        &self,
        store: &StateStore,
        table: &RankTable,
        data: Option<u64>,
        max_exp: u64,
        context: Context,
    ) -> State {
        store.set(
            self.entity_id.clone(),
            self.state(table, data, max_exp),
            self.attributes(),
            context,
        )
    }
}

/// All five sensors of an entry
pub fn sensors_for(
    data: &FavorEntryData,
    student_name: &str,
) -> Result<Vec<FavorSensor>, EntityIdError> {
    SensorKind::ALL
        .iter()
        .map(|&kind| FavorSensor::new(data, student_name, kind))
        .collect()
}
