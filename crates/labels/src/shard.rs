use crate::{expect_one, expect_one_u32, maybe_one, set_value, Error, Result, KEY_BEGIN, RCLOCK_BEGIN};
use proto_gazette::broker::LabelSet;
use proto_gazette::flow::RangeSpec;
use proto_gazette::ops::{self, ShardLabeling};

/// Encode a ShardLabeling into a LabelSet.
pub fn encode_labeling(mut set: LabelSet, labeling: &ShardLabeling) -> LabelSet {
    set = set_value(set, crate::BUILD, &labeling.build);

    if !labeling.hostname.is_empty() {
        set = set_value(set, crate::HOSTNAME, &labeling.hostname);
    }
    set = set_value(set, crate::LOG_LEVEL, labeling.log_level().as_str_name());

    if let Some(range) = &labeling.range {
        set = encode_range_spec(set, range);
    }

    if !labeling.split_source.is_empty() {
        set = set_value(set, crate::SPLIT_SOURCE, &labeling.split_source);
    }
    if !labeling.split_target.is_empty() {
        set = set_value(set, crate::SPLIT_TARGET, &labeling.split_target);
    }

    set = set_value(set, crate::TASK_NAME, &labeling.task_name);
    set = set_value(set, crate::TASK_TYPE, labeling.task_type().as_str_name());

    if !labeling.logs_journal.is_empty() {
        set = set_value(set, crate::LOGS_JOURNAL, &labeling.logs_journal);
    }
    if !labeling.stats_journal.is_empty() {
        set = set_value(set, crate::STATS_JOURNAL, &labeling.stats_journal);
    }

    set
}

/// Decode a ShardLabeling from a LabelSet. Synthesizes `logs_journal` /
/// `stats_journal` per §6 when the corresponding labels are absent:
/// `ops.<region>.v1/{logs,stats}/kind=<task-type>/name=<task-name>/pivot=00`.
pub fn decode_labeling(set: &LabelSet, region: &str) -> Result<ShardLabeling> {
    let build = expect_one(set, crate::BUILD)?.to_string();
    let hostname = maybe_one(set, crate::HOSTNAME)?.to_string();

    let log_level = expect_one(set, crate::LOG_LEVEL)?;
    let log_level = match ops::log::Level::from_str_name(log_level) {
        None | Some(ops::log::Level::UndefinedLevel) => {
            return Err(Error::InvalidValue {
                name: crate::LOG_LEVEL.to_string(),
                value: log_level.to_string(),
            })
        }
        Some(e) => e as i32,
    };

    let range = if has_range_spec(set) {
        Some(decode_range_spec(set)?)
    } else {
        None
    };
    let split_source = maybe_one(set, crate::SPLIT_SOURCE)?.to_string();
    let split_target = maybe_one(set, crate::SPLIT_TARGET)?.to_string();
    let task_name = expect_one(set, crate::TASK_NAME)?.to_string();

    let task_type_str = expect_one(set, crate::TASK_TYPE)?;
    let task_type = match ops::TaskType::from_str_name(task_type_str) {
        None => {
            return Err(Error::InvalidValue {
                name: crate::TASK_TYPE.to_string(),
                value: task_type_str.to_string(),
            })
        }
        Some(e) => e as i32,
    };

    if !split_source.is_empty() && !split_target.is_empty() {
        return Err(Error::SplitSourceAndTarget(split_source, split_target));
    }

    let logs_journal = match maybe_one(set, crate::LOGS_JOURNAL)? {
        "" => synthesize_ops_journal(region, task_type_str, &task_name, "logs"),
        other => other.to_string(),
    };
    let stats_journal = match maybe_one(set, crate::STATS_JOURNAL)? {
        "" => synthesize_ops_journal(region, task_type_str, &task_name, "stats"),
        other => other.to_string(),
    };

    Ok(ShardLabeling {
        build,
        hostname,
        log_level,
        range,
        split_source,
        split_target,
        task_name,
        task_type,
        logs_journal,
        stats_journal,
    })
}

fn synthesize_ops_journal(region: &str, task_type: &str, task_name: &str, kind: &str) -> String {
    format!("ops.{region}.v1/{kind}/kind={task_type}/name={task_name}/pivot=00")
}

/// Encode a RangeSpec into a LabelSet.
pub fn encode_range_spec(set: LabelSet, spec: &RangeSpec) -> LabelSet {
    let set = crate::partition::encode_key_range(set, spec.key_begin, spec.key_end);
    let set = crate::encode_hex_u32(set, RCLOCK_BEGIN, spec.r_clock_begin);
    crate::encode_hex_u32(set, crate::RCLOCK_END, spec.r_clock_end)
}

/// Decode a RangeSpec from a LabelSet.
pub fn decode_range_spec(set: &LabelSet) -> Result<RangeSpec> {
    Ok(RangeSpec {
        key_begin: expect_one_u32(set, KEY_BEGIN)?,
        key_end: expect_one_u32(set, crate::KEY_END)?,
        r_clock_begin: expect_one_u32(set, RCLOCK_BEGIN)?,
        r_clock_end: expect_one_u32(set, crate::RCLOCK_END)?,
    })
}

/// Determine if the LabelSet encodes a RangeSpec.
pub fn has_range_spec(set: &LabelSet) -> bool {
    for name in [KEY_BEGIN, crate::KEY_END, RCLOCK_BEGIN, crate::RCLOCK_END] {
        if !crate::range(set, name).is_empty() {
            return true;
        }
    }
    false
}

/// Build the shard ID suffix implied by the LabelSet: `<keybegin>-<rclockbegin>`.
pub fn id_suffix(set: &LabelSet) -> Result<String> {
    let key_begin = expect_one(set, KEY_BEGIN)?;
    let rclock_begin = expect_one(set, RCLOCK_BEGIN)?;
    Ok(format!("{key_begin}-{rclock_begin}"))
}

/// Extract a shard's templated ID prefix.
pub fn id_prefix(name: &str) -> Option<&str> {
    name.rsplitn(2, '/').nth(1)
}
