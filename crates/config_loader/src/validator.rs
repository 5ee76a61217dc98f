//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个 dispatcher，数量不超过 limits.max_dispatchers
//! - dispatcher 名称非空、唯一、不超过 NAME_MAX_LEN 字节
//! - 队列 / pending / 模块容量 > 0
//! - stack_size >= MIN_STACK_SIZE
//! - post_timeout_ms > 0, max_payload_len > 0
//! - system_dispatcher 存在

use std::collections::HashSet;

use contracts::{ContractError, DispatchBlueprint, DispatcherSpec, MIN_STACK_SIZE, NAME_MAX_LEN};

/// 校验 DispatchBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &DispatchBlueprint) -> Result<(), ContractError> {
    validate_limits(blueprint)?;
    validate_names(blueprint)?;
    for spec in &blueprint.dispatchers {
        validate_dispatcher(spec)?;
    }
    validate_system_dispatcher(blueprint)?;
    Ok(())
}

/// 校验 dispatcher 数量
fn validate_limits(blueprint: &DispatchBlueprint) -> Result<(), ContractError> {
    if blueprint.limits.max_dispatchers == 0 {
        return Err(ContractError::config_validation(
            "limits.max_dispatchers",
            "max_dispatchers must be > 0",
        ));
    }
    if blueprint.dispatchers.is_empty() {
        return Err(ContractError::config_validation(
            "dispatchers",
            "at least one dispatcher is required",
        ));
    }
    if blueprint.dispatchers.len() > blueprint.limits.max_dispatchers {
        return Err(ContractError::config_validation(
            "dispatchers",
            format!(
                "{} dispatchers exceed limits.max_dispatchers ({})",
                blueprint.dispatchers.len(),
                blueprint.limits.max_dispatchers
            ),
        ));
    }
    Ok(())
}

/// 校验名称唯一性与长度
fn validate_names(blueprint: &DispatchBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, spec) in blueprint.dispatchers.iter().enumerate() {
        if spec.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("dispatchers[{idx}].name"),
                "dispatcher name cannot be empty",
            ));
        }
        if spec.name.len() > NAME_MAX_LEN {
            return Err(ContractError::config_validation(
                format!("dispatchers[{idx}].name"),
                format!(
                    "dispatcher name '{}' is longer than {NAME_MAX_LEN} bytes",
                    spec.name
                ),
            ));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("dispatchers[name={}]", spec.name),
                "duplicate dispatcher name",
            ));
        }
    }
    Ok(())
}

/// 校验单个 dispatcher 的容量参数
fn validate_dispatcher(spec: &DispatcherSpec) -> Result<(), ContractError> {
    let positive = [
        ("queue_capacity", spec.queue_capacity),
        ("pending_capacity", spec.pending_capacity),
        ("max_modules", spec.max_modules),
        ("max_payload_len", spec.max_payload_len),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(ContractError::config_validation(
                format!("dispatchers[{}].{field}", spec.name),
                format!("{field} must be > 0"),
            ));
        }
    }
    if spec.post_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            format!("dispatchers[{}].post_timeout_ms", spec.name),
            "post_timeout_ms must be > 0; use post_try for non-blocking posts",
        ));
    }
    if spec.stack_size < MIN_STACK_SIZE {
        return Err(ContractError::config_validation(
            format!("dispatchers[{}].stack_size", spec.name),
            format!(
                "stack_size must be >= {MIN_STACK_SIZE}, got {}",
                spec.stack_size
            ),
        ));
    }
    Ok(())
}

/// 校验 system_dispatcher 引用
fn validate_system_dispatcher(blueprint: &DispatchBlueprint) -> Result<(), ContractError> {
    let Some(system) = &blueprint.system_dispatcher else {
        return Ok(());
    };
    if blueprint.dispatcher(system).is_none() {
        return Err(ContractError::config_validation(
            "system_dispatcher",
            format!("system_dispatcher '{system}' not found in dispatchers"),
        ));
    }
    Ok(())
}
