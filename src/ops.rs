//! The modify engine's command language: a tagged union over the six
//! operations a caller may apply to a session in one `modify_session` call.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    AddLine {
        sku: String,
        #[schema(value_type = Object)]
        qty: serde_json::Value,
        #[serde(default)]
        unit_price_q: Option<i64>,
        #[serde(default)]
        #[schema(value_type = Object)]
        meta: Option<serde_json::Value>,
        #[serde(default)]
        name: Option<String>,
    },
    RemoveLine {
        line_id: String,
    },
    SetQty {
        line_id: String,
        #[schema(value_type = Object)]
        qty: serde_json::Value,
    },
    ReplaceSku {
        line_id: String,
        sku: String,
        #[serde(default)]
        unit_price_q: Option<i64>,
        #[serde(default)]
        #[schema(value_type = Object)]
        meta: Option<serde_json::Value>,
    },
    SetData {
        path: String,
        #[schema(value_type = Object)]
        value: serde_json::Value,
    },
    MergeLines {
        from_line_id: String,
        into_line_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_line_deserializes_from_json() {
        let raw = serde_json::json!({
            "op": "add_line",
            "sku": "COFFEE",
            "qty": 2,
            "unit_price_q": 500
        });
        let op: Op = serde_json::from_value(raw).unwrap();
        match op {
            Op::AddLine { sku, unit_price_q, .. } => {
                assert_eq!(sku, "COFFEE");
                assert_eq!(unit_price_q, Some(500));
            }
            _ => panic!("expected AddLine"),
        }
    }

    #[test]
    fn merge_lines_round_trips() {
        let raw = serde_json::json!({
            "op": "merge_lines",
            "from_line_id": "L-1",
            "into_line_id": "L-2"
        });
        let op: Op = serde_json::from_value(raw).unwrap();
        assert!(matches!(op, Op::MergeLines { .. }));
    }

    #[test]
    fn unknown_op_fails_to_deserialize() {
        let raw = serde_json::json!({ "op": "teleport_line" });
        assert!(serde_json::from_value::<Op>(raw).is_err());
    }
}
