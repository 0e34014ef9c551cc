use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionType {
    GetUserData,
    Register,
    WatchAd,
    Commission,
    Spin,
    SpinResult,
    Withdraw,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::GetUserData => "getUserData",
            ActionType::Register => "register",
            ActionType::WatchAd => "watchAd",
            ActionType::Commission => "commission",
            ActionType::Spin => "spin",
            ActionType::SpinResult => "spinResult",
            ActionType::Withdraw => "withdraw",
        }
    }

    /// `commission` is addressed by referrer/referee instead of `user_id`.
    pub fn requires_user_id(&self) -> bool {
        !matches!(self, ActionType::Commission)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getUserData" => Ok(ActionType::GetUserData),
            "register" => Ok(ActionType::Register),
            "watchAd" => Ok(ActionType::WatchAd),
            "commission" => Ok(ActionType::Commission),
            "spin" => Ok(ActionType::Spin),
            "spinResult" => Ok(ActionType::SpinResult),
            "withdraw" => Ok(ActionType::Withdraw),
            other => Err(other.to_string()),
        }
    }
}

/// Result of reading an identity field out of the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdField {
    Missing,
    Invalid,
    Id(i64),
}

impl IdField {
    pub fn id(self) -> Option<i64> {
        match self {
            IdField::Id(id) => Some(id),
            _ => None,
        }
    }
}

/// Inbound JSON object. Fields are read lazily because each action needs a
/// different subset and absent, null, zero and empty values all count as missing.
#[derive(Clone, Debug)]
pub struct ActionPayload {
    fields: Map<String, Value>,
}

impl ActionPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        let fields = match value {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| is_present(value))
    }

    /// Raw `type` value, rendered as text when it is not a string.
    pub fn action_type(&self) -> Option<String> {
        self.get("type").map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn init_data(&self) -> Option<&str> {
        self.get("initData").and_then(Value::as_str)
    }

    pub fn str_field(&self, key: &str) -> Option<String> {
        self.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn id_field(&self, key: &str) -> IdField {
        let Some(value) = self.get(key) else {
            return IdField::Missing;
        };

        let parsed = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        match parsed {
            Some(id) => IdField::Id(id),
            None => IdField::Invalid,
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiResponse {
    Success { ok: bool, data: Value },
    Failure { ok: bool, error: String },
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        ApiResponse::Success { ok: true, data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ApiResponse::Failure {
            ok: false,
            error: error.into(),
        }
    }
}
