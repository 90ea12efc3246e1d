//! Raw Tronscan transaction JSON → `TransactionRecord`
//!
//! The upstream schema is only partially populated depending on contract
//! type, so every field is optional here. Missing or unparsable values fall
//! back to zero / empty string; normalization never fails.

use crate::pipeline::types::{CostBreakdown, TransactionRecord, TriggerInfo, TxStatus};
use serde_json::Value;

/// Map one upstream transaction object onto the canonical record
pub fn normalize_transaction(raw: &Value, wallet: &str) -> TransactionRecord {
    let status = if raw.get("contractRet").and_then(Value::as_str) == Some("SUCCESS") {
        TxStatus::Success
    } else {
        TxStatus::Failed
    };

    TransactionRecord {
        hash: text_field(raw, "hash"),
        wallet: wallet.to_string(),
        timestamp: int_field(raw, "timestamp"),
        block: int_field(raw, "block"),
        contract_type: int_field(raw, "contractType"),
        status,
        amount: num_field(raw, "amount"),
        cost: raw.get("cost").map(extract_cost).unwrap_or_default(),
        trigger: raw.get("trigger_info").map(extract_trigger).unwrap_or_default(),
        orig_query_json: raw.to_string(),
    }
}

/// Normalize a whole page, preserving upstream order
pub fn normalize_page(raw: &[Value], wallet: &str) -> Vec<TransactionRecord> {
    raw.iter().map(|tx| normalize_transaction(tx, wallet)).collect()
}

fn extract_cost(cost: &Value) -> CostBreakdown {
    CostBreakdown {
        fee: num_field(cost, "fee"),
        net_fee: num_field(cost, "net_fee"),
        energy_fee: num_field(cost, "energy_fee"),
        energy_usage: num_field(cost, "energy_usage"),
        energy_usage_total: num_field(cost, "energy_usage_total"),
        origin_energy_usage: num_field(cost, "origin_energy_usage"),
        energy_penalty_total: num_field(cost, "energy_penalty_total"),
        net_usage: num_field(cost, "net_usage"),
    }
}

fn extract_trigger(trigger: &Value) -> TriggerInfo {
    let parameter = trigger.get("parameter");
    TriggerInfo {
        method: text_field(trigger, "method"),
        method_id: text_field(trigger, "methodId"),
        method_name: text_field(trigger, "methodName"),
        contract_address: text_field(trigger, "contract_address"),
        parameter_to: parameter.map(|p| text_field(p, "_to")).unwrap_or_default(),
        parameter_value: parameter.map(|p| text_field(p, "_value")).unwrap_or_default(),
    }
}

/// Float field; accepts JSON numbers and numeric strings
pub(crate) fn num_field(obj: &Value, key: &str) -> f64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Integer field; accepts integers, floats (truncated) and numeric strings
pub(crate) fn int_field(obj: &Value, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// String field; numbers and booleans are rendered as text, anything else is empty
pub(crate) fn text_field(obj: &Value, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
