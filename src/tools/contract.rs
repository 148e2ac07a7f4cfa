//! 能力的输入契约与成本/风险分级
//!
//! 每个能力声明自己的参数（名称、类型、是否必填）；Reasoner 派发前、Reflector 提出修复时都按契约校验参数。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 成本 / 风险分级，排序为 low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 参数类型（JSON 取值层面）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    fn json_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// 单个参数声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub required: bool,
    pub description: String,
}

/// 输入契约：有序的参数声明列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputContract {
    fields: Vec<FieldSpec>,
}

impl InputContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, ty: FieldType, description: &str) -> Self {
        self.field(name, ty, true, description)
    }

    pub fn optional(self, name: &str, ty: FieldType, description: &str) -> Self {
        self.field(name, ty, false, description)
    }

    fn field(mut self, name: &str, ty: FieldType, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            ty,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// 校验参数：必填项齐全、类型匹配、不含未声明的参数
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for field in &self.fields {
            match args.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required argument '{}'", field.name));
                }
                Some(v) if !v.is_null() && !field.ty.matches(v) => {
                    return Err(format!(
                        "argument '{}' must be {}",
                        field.name,
                        field.ty.json_name()
                    ));
                }
                _ => {}
            }
        }
        if let Some(unknown) = args
            .keys()
            .find(|k| !self.fields.iter().any(|f| &f.name == *k))
        {
            return Err(format!("unexpected argument '{unknown}'"));
        }
        Ok(())
    }

    /// 以 JSON Schema 形式描述契约，供 prompt 中的能力目录使用
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for f in &self.fields {
            properties.insert(
                f.name.clone(),
                serde_json::json!({ "type": f.ty.json_name(), "description": f.description }),
            );
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract() -> InputContract {
        InputContract::new()
            .required("expression", FieldType::String, "math expression")
            .optional("precision", FieldType::Integer, "digits")
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Low < Tier::Medium);
        assert!(Tier::Medium < Tier::High);
        assert_eq!(Tier::Medium.to_string(), "medium");
    }

    #[test]
    fn test_validate_accepts_well_formed_args() {
        assert!(contract().validate(&args(json!({"expression": "1+1"}))).is_ok());
        assert!(contract()
            .validate(&args(json!({"expression": "1+1", "precision": 2})))
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_wrong_type_and_unknown() {
        let err = contract().validate(&Map::new()).unwrap_err();
        assert!(err.contains("expression"));

        let err = contract()
            .validate(&args(json!({"expression": 42})))
            .unwrap_err();
        assert!(err.contains("must be string"));

        let err = contract()
            .validate(&args(json!({"expression": "1", "query": "x"})))
            .unwrap_err();
        assert!(err.contains("query"));
    }

    #[test]
    fn test_json_schema_lists_required_fields() {
        let schema = contract().to_json_schema();
        assert_eq!(schema["required"], json!(["expression"]));
        assert_eq!(schema["properties"]["precision"]["type"], "integer");
    }
}
