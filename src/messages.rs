use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kana::ReadingMode;
use crate::services::DictionaryEntry;
use crate::token::Token;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "TOKENIZE_PARAGRAPHS")]
    TokenizeParagraphs { paragraphs: Vec<String> },
    #[serde(rename = "JISHO_LOOKUP")]
    JishoLookup { word: String },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "addReadings")]
    AddReadings,
    #[serde(rename = "removeReadings")]
    RemoveReadings,
    #[serde(rename = "changeReadingType", rename_all = "camelCase")]
    ChangeReadingType { reading_type: ReadingMode },
    #[serde(rename = "updateSettings")]
    UpdateSettings { settings: Map<String, Value> },
    #[serde(rename = "addPosAnnotations")]
    AddPosAnnotations,
    #[serde(rename = "removePosAnnotations")]
    RemovePosAnnotations,
    #[serde(rename = "excludeToken")]
    ExcludeToken { surface: String },
    #[serde(rename = "includeToken")]
    IncludeToken { surface: String },
    #[serde(rename = "clearExcludedTokens")]
    ClearExcludedTokens,
    #[serde(rename = "getExcludedTokens")]
    GetExcludedTokens,
    #[serde(rename = "setPosState")]
    SetPosState { pos: String, enabled: bool },
    #[serde(rename = "setPosColor")]
    SetPosColor {
        pos: String,
        light: String,
        #[serde(default)]
        dark: Option<String>,
    },
    #[serde(rename = "resetPosColor")]
    ResetPosColor { pos: String },
    #[serde(rename = "reextract")]
    Reextract,
}

impl Request {
    // Parses a raw message; unknown actions and malformed payloads are `Err` with
    // the reply the sender should get.
    pub fn parse(value: Value) -> Result<Self, Response> {
        let known = value
            .get("action")
            .and_then(Value::as_str)
            .map(is_known_action)
            .unwrap_or(false);
        if !known {
            return Err(Response::failure("Unknown action"));
        }
        serde_json::from_value(value)
            .map_err(|err| Response::failure(format!("Invalid message: {}", err)))
    }
}

const ACTIONS: &[&str] = &[
    "TOKENIZE_PARAGRAPHS",
    "JISHO_LOOKUP",
    "ping",
    "addReadings",
    "removeReadings",
    "changeReadingType",
    "updateSettings",
    "addPosAnnotations",
    "removePosAnnotations",
    "excludeToken",
    "includeToken",
    "clearExcludedTokens",
    "getExcludedTokens",
    "setPosState",
    "setPosColor",
    "resetPosColor",
    "reextract",
];

fn is_known_action(action: &str) -> bool {
    ACTIONS.contains(&action)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Tokenize(TokenizeReply),
    Lookup(LookupReply),
    Action(ActionReply),
    Ping(PingReply),
}

impl Response {
    pub fn success() -> Self {
        Response::Action(ActionReply {
            success: true,
            error: None,
            tokens: None,
        })
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Response::Action(ActionReply {
            success: false,
            error: Some(error.into()),
            tokens: None,
        })
    }

    pub fn from_result(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Response::success(),
            Err(err) => Response::failure(format!("{:#}", err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Response::Tokenize(reply) => reply.ok,
            Response::Lookup(reply) => reply.ok,
            Response::Action(reply) => reply.success,
            Response::Ping(reply) => reply.ok,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizeReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Vec<Token>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<DictionaryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingReply {
    pub ok: bool,
}
