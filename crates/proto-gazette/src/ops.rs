//! Types mirroring the subset of `ops.proto` used for Shard labeling.

use crate::flow::RangeSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum TaskType {
    InvalidType = 0,
    Capture = 1,
    Derivation = 2,
    Materialization = 3,
}

impl TaskType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            TaskType::InvalidType => "invalid",
            TaskType::Capture => "capture",
            TaskType::Derivation => "derivation",
            TaskType::Materialization => "materialization",
        }
    }

    pub fn from_str_name(name: &str) -> Option<TaskType> {
        Some(match name {
            "capture" => TaskType::Capture,
            "derivation" => TaskType::Derivation,
            "materialization" => TaskType::Materialization,
            _ => return None,
        })
    }
}

pub mod log {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[repr(i32)]
    pub enum Level {
        UndefinedLevel = 0,
        Error = 1,
        Warn = 2,
        Info = 3,
        Debug = 4,
        Trace = 5,
    }

    impl Level {
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Level::UndefinedLevel => "undefined",
                Level::Error => "error",
                Level::Warn => "warn",
                Level::Info => "info",
                Level::Debug => "debug",
                Level::Trace => "trace",
            }
        }

        pub fn from_str_name(name: &str) -> Option<Level> {
            Some(match name {
                "error" => Level::Error,
                "warn" => Level::Warn,
                "info" => Level::Info,
                "debug" => Level::Debug,
                "trace" => Level::Trace,
                _ => return None,
            })
        }
    }
}

/// The decoded form of a Shard's label set: identity, range, build, and
/// split bookkeeping. Mirrors `ops::ShardLabeling` in the teacher corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardLabeling {
    pub build: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    pub log_level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub split_source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub split_target: String,
    pub task_name: String,
    pub task_type: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logs_journal: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stats_journal: String,
}

impl ShardLabeling {
    pub fn log_level(&self) -> log::Level {
        match self.log_level {
            1 => log::Level::Error,
            2 => log::Level::Warn,
            3 => log::Level::Info,
            4 => log::Level::Debug,
            5 => log::Level::Trace,
            _ => log::Level::UndefinedLevel,
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self.task_type {
            1 => TaskType::Capture,
            2 => TaskType::Derivation,
            3 => TaskType::Materialization,
            _ => TaskType::InvalidType,
        }
    }
}
